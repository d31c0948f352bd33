//! Register sink adapters for the three sound chips

// SPDX-FileCopyrightText: © 2025 Marcus Rowe <undisbeliever@gmail.com>
//
// SPDX-License-Identifier: MIT

use serde::Serialize;

/// PSG register indices (AUDF/AUDC interleaved, AUDCTL last).
pub mod psg_registers {
    pub const fn audf(voice: u8) -> u8 {
        voice * 2
    }
    pub const fn audc(voice: u8) -> u8 {
        voice * 2 + 1
    }
    pub const AUDCTL: u8 = 8;
}

/// The write-only hardware interface of the sound board.
///
/// PSG writes never fail.  FM writes must be preceded by a `fm_ready` poll
/// (the engine polls a bounded number of times and then forces the write).
/// Speech bytes may only be streamed while `speech_ready` is true.
pub trait SoundHardware {
    fn psg_write(&mut self, register: u8, value: u8);

    fn fm_ready(&self) -> bool;
    fn fm_write(&mut self, register: u8, value: u8);

    fn speech_ready(&self) -> bool;
    fn speech_write(&mut self, value: u8);
    /// The "squeak" oscillator port: changes the LPC voice pitch.
    fn speech_pitch(&mut self, value: u8);

    /// One byte: bits 7..5 speech, 4..3 effects, 2..0 music.
    fn mixer_write(&mut self, value: u8);

    fn irq_ack(&mut self) {}
    fn fm_reset(&mut self) {}
    fn speech_reset(&mut self) {}
}

/// One captured chip-register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "chip", rename_all = "snake_case")]
pub enum RegisterWrite {
    Psg { register: u8, value: u8 },
    Fm { register: u8, value: u8 },
    Speech { value: u8 },
    SpeechPitch { value: u8 },
    Mixer { value: u8 },
    FmReset,
    SpeechReset,
}

/// Records the register-write stream instead of driving chip models.
pub struct TraceHardware {
    pub writes: Vec<RegisterWrite>,
    pub fm_ready: bool,
    pub speech_ready: bool,
}

impl TraceHardware {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            writes: Vec::new(),
            fm_ready: true,
            speech_ready: true,
        }
    }

    pub fn psg_writes(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        self.writes.iter().filter_map(|w| match w {
            RegisterWrite::Psg { register, value } => Some((*register, *value)),
            _ => None,
        })
    }

    pub fn speech_bytes(&self) -> impl Iterator<Item = u8> + '_ {
        self.writes.iter().filter_map(|w| match w {
            RegisterWrite::Speech { value } => Some(*value),
            _ => None,
        })
    }
}

impl SoundHardware for TraceHardware {
    fn psg_write(&mut self, register: u8, value: u8) {
        self.writes.push(RegisterWrite::Psg { register, value });
    }

    fn fm_ready(&self) -> bool {
        self.fm_ready
    }

    fn fm_write(&mut self, register: u8, value: u8) {
        self.writes.push(RegisterWrite::Fm { register, value });
    }

    fn speech_ready(&self) -> bool {
        self.speech_ready
    }

    fn speech_write(&mut self, value: u8) {
        self.writes.push(RegisterWrite::Speech { value });
    }

    fn speech_pitch(&mut self, value: u8) {
        self.writes.push(RegisterWrite::SpeechPitch { value });
    }

    fn mixer_write(&mut self, value: u8) {
        self.writes.push(RegisterWrite::Mixer { value });
    }

    fn fm_reset(&mut self) {
        self.writes.push(RegisterWrite::FmReset);
    }

    fn speech_reset(&mut self) {
        self.writes.push(RegisterWrite::SpeechReset);
    }
}
