//! Tick-rate constants and note duration maths

// SPDX-FileCopyrightText: © 2025 Marcus Rowe <undisbeliever@gmail.com>
//
// SPDX-License-Identifier: MIT

/// The periodic tick is video derived (~245 Hz).  POKEY and FM updates
/// alternate, so each hardware group sees half of it.
pub const TICK_RATE_HZ: u32 = 245;

/// Nominal rate used by the duration tables (`seconds = frames / 120`).
pub const NOMINAL_FRAME_RATE: u32 = 120;

/// Sustained notes load the secondary timer with the 0x7f marker in the high
/// byte so the envelope release point is never reached.
pub const SUSTAIN_TIMER: u16 = 0x7fff;

/// Primary timer value for a note: the table duration, plus half of itself
/// when dotted.
pub fn primary_timer_value(base: u16, dotted: bool) -> u16 {
    if dotted {
        base.saturating_add(base / 2)
    } else {
        base
    }
}

/// Secondary (envelope-trigger) timer value.  Bits 4..5 of the duration byte
/// select a power-of-two division of the primary timer.
pub fn secondary_timer_value(primary: u16, division: u8, sustain: bool) -> u16 {
    if sustain {
        SUSTAIN_TIMER
    } else {
        primary >> (division & 0x03)
    }
}

/// Number of ticks a note occupies at the given channel tempo.
///
/// `frames = duration * (1 + dotted/2) / tempo`
pub fn note_frames(duration: u16, dotted: bool, tempo: u8) -> f64 {
    if tempo == 0 {
        return 0.0;
    }
    f64::from(primary_timer_value(duration, dotted)) / f64::from(tempo)
}

pub fn note_seconds(duration: u16, dotted: bool, tempo: u8) -> f64 {
    note_frames(duration, dotted, tempo) / f64::from(NOMINAL_FRAME_RATE)
}
