//! Sound ROM image and table accessors

// SPDX-FileCopyrightText: © 2025 Marcus Rowe <undisbeliever@gmail.com>
//
// SPDX-License-Identifier: MIT

use crate::driver_constants::{
    addresses, MAX_COMMANDS, N_MUSIC_SEQUENCES, N_SFX_OFFSETS, N_SFX_PARAMS, ROM_BASE, ROM_SIZE,
};
use crate::errors::RomError;

use std::path::Path;

/// Handler type of the PSG SFX allocator.
pub const HANDLER_TYPE_SFX: u8 = 7;
/// Handler type of the music/speech starter.
pub const HANDLER_TYPE_MUSIC: u8 = 11;
/// Unrouted command marker in the dispatch-type table.
pub const HANDLER_TYPE_INVALID: u8 = 0xff;

/// The 48 KiB sound ROM, addressed with CPU addresses (0x4000..=0xffff).
///
/// Out-of-range reads return 0xff: an end-of-sequence byte, so a runaway
/// sequence pointer terminates its channel instead of wrapping.
pub struct SoundRom {
    data: Vec<u8>,
}

impl SoundRom {
    pub fn new(data: Vec<u8>) -> Result<SoundRom, RomError> {
        if data.len() != ROM_SIZE {
            return Err(RomError::WrongSize(data.len()));
        }

        let rom = SoundRom { data };
        rom.validate()?;

        Ok(rom)
    }

    pub fn from_file(path: &Path) -> Result<SoundRom, RomError> {
        match std::fs::read(path) {
            Ok(data) => SoundRom::new(data),
            Err(e) => Err(RomError::IoError(path.to_owned(), e)),
        }
    }

    pub fn read_byte(&self, addr: u16) -> u8 {
        match addr.checked_sub(ROM_BASE) {
            Some(o) => self.data.get(usize::from(o)).copied().unwrap_or(0xff),
            None => 0xff,
        }
    }

    pub fn read_word(&self, addr: u16) -> u16 {
        u16::from_le_bytes([self.read_byte(addr), self.read_byte(addr.wrapping_add(1))])
    }

    pub fn contains(&self, addr: u16) -> bool {
        addr >= ROM_BASE
    }

    // Dispatch tables
    // ===============

    pub fn handler_type(&self, cmd: u8) -> u8 {
        if usize::from(cmd) < MAX_COMMANDS {
            self.read_byte(addresses::DISPATCH_TYPE_TABLE + u16::from(cmd))
        } else {
            HANDLER_TYPE_INVALID
        }
    }

    pub fn command_param(&self, cmd: u8) -> u8 {
        self.read_byte(addresses::DISPATCH_PARAM_TABLE + u16::from(cmd))
    }

    /// 0xff = enqueue normally, 0..=2 = handle immediately on ingress.
    pub fn nmi_class(&self, cmd: u8) -> u8 {
        if usize::from(cmd) < MAX_COMMANDS {
            self.read_byte(addresses::NMI_CLASS_TABLE + u16::from(cmd))
        } else {
            0xff
        }
    }

    // SFX metadata
    // ============

    pub fn sfx_offset(&self, param: u8) -> u8 {
        self.read_byte(addresses::SFX_OFFSET_TABLE + u16::from(param))
    }

    /// 0xff = play immediately, 0 = abort if the command is already playing.
    pub fn sfx_flags(&self, param: u8) -> u8 {
        self.read_byte(addresses::SFX_FLAGS_TABLE + u16::from(param))
    }

    pub fn sfx_priority(&self, offset: u8) -> u8 {
        self.read_byte(addresses::SFX_PRIORITY_TABLE + u16::from(offset))
    }

    pub fn sfx_hint(&self, offset: u8) -> u8 {
        self.read_byte(addresses::SFX_CHANNEL_TABLE + u16::from(offset))
    }

    pub fn sfx_seq_ptr(&self, offset: u8, alternate: bool) -> u16 {
        let a = addresses::SFX_SEQ_PTR_TABLE + u16::from(offset) * 2;
        match alternate {
            false => self.read_word(a),
            true => self.read_word(a + 2),
        }
    }

    pub fn sfx_next(&self, offset: u8) -> u8 {
        self.read_byte(addresses::SFX_NEXT_TABLE + u16::from(offset))
    }

    // Music/speech metadata
    // =====================

    pub fn music_index(&self, param: u8) -> u8 {
        self.read_byte(addresses::MUSIC_INDEX_TABLE + u16::from(param))
    }

    pub fn music_flags(&self, param: u8) -> u8 {
        self.read_byte(addresses::MUSIC_FLAGS_TABLE + u16::from(param))
    }

    pub fn music_tempo(&self, param: u8) -> u8 {
        self.read_byte(addresses::MUSIC_TEMPO_TABLE + u16::from(param))
    }

    pub fn music_seq_ptr(&self, index: u8) -> u16 {
        self.read_word(addresses::MUSIC_SEQ_PTR_TABLE + u16::from(index) * 2)
    }

    pub fn music_seq_len(&self, index: u8) -> u16 {
        self.read_word(addresses::MUSIC_SEQ_LEN_TABLE + u16::from(index) * 2)
    }

    // Shared tables
    // =============

    pub fn duration(&self, index: u8) -> u16 {
        self.read_word(addresses::DURATION_TABLE + u16::from(index & 0x0f) * 2)
    }

    pub fn psg_frequency(&self, note: u8) -> u8 {
        self.read_byte(addresses::PSG_FREQ_TABLE + u16::from(note & 0x7f))
    }

    pub fn fm_frequency(&self, note: u8) -> u16 {
        self.read_word(addresses::FM_FREQ_TABLE + u16::from(note & 0x7f) * 2)
    }

    pub fn freq_shape(&self, index: u8) -> u8 {
        self.read_byte(addresses::FREQ_SHAPE_TABLE + u16::from(index))
    }

    pub fn dist_shape(&self, index: u8) -> u8 {
        self.read_byte(addresses::DIST_SHAPE_TABLE + u16::from(index & 0x0f))
    }

    // Validation
    // ==========

    /// Rejects images whose reachable table entries point outside the ROM.
    /// Invalid commands (handler type 0xff) are not an error.
    fn validate(&self) -> Result<(), RomError> {
        for cmd in 0..MAX_COMMANDS as u8 {
            let param = self.command_param(cmd);

            match self.handler_type(cmd) {
                HANDLER_TYPE_SFX => self.validate_sfx_chain(cmd, param)?,
                HANDLER_TYPE_MUSIC => self.validate_speech_entry(cmd, param)?,
                _ => (),
            }
        }
        Ok(())
    }

    fn validate_sfx_chain(&self, cmd: u8, param: u8) -> Result<(), RomError> {
        if usize::from(param) >= N_SFX_PARAMS {
            return Err(RomError::PointerOutOfRange(
                "sfx offset table",
                cmd.into(),
                param.into(),
            ));
        }

        let mut offset = self.sfx_offset(param);
        let mut walked = 0;

        while offset != 0 && walked < N_SFX_OFFSETS {
            if usize::from(offset) >= N_SFX_OFFSETS {
                return Err(RomError::ChainOffsetOutOfRange(cmd.into(), offset));
            }

            let seq = self.sfx_seq_ptr(offset, false);
            if !self.contains(seq) {
                return Err(RomError::PointerOutOfRange(
                    "sfx sequence table",
                    offset.into(),
                    seq,
                ));
            }

            let hint = self.sfx_hint(offset);
            if !(4..=11).contains(&hint) {
                return Err(RomError::InvalidChannelHint(offset.into(), hint));
            }

            offset = self.sfx_next(offset);
            walked += 1;
        }

        Ok(())
    }

    fn validate_speech_entry(&self, cmd: u8, param: u8) -> Result<(), RomError> {
        let index = self.music_index(param);
        if usize::from(index) >= N_MUSIC_SEQUENCES {
            return Err(RomError::PointerOutOfRange(
                "music index table",
                cmd.into(),
                index.into(),
            ));
        }

        let ptr = self.music_seq_ptr(index);
        let len = self.music_seq_len(index);

        if !self.contains(ptr) {
            return Err(RomError::PointerOutOfRange(
                "music sequence table",
                index.into(),
                ptr,
            ));
        }
        if usize::from(ptr - ROM_BASE) + usize::from(len) > ROM_SIZE {
            return Err(RomError::SpeechDataOutOfRange(index.into(), ptr, len));
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_rom::RomBuilder;

    #[test]
    fn test_wrong_size_is_rejected() {
        assert!(matches!(
            SoundRom::new(vec![0; 0x1000]),
            Err(RomError::WrongSize(0x1000))
        ));
    }

    #[test]
    fn test_out_of_range_reads_return_end_marker() {
        let rom = RomBuilder::new().build();
        assert_eq!(rom.read_byte(0x0123), 0xff);
        assert_eq!(rom.read_word(0x3ffe), 0xffff);
        // The high byte of a word read at the last ROM byte wraps below the base.
        assert_eq!(rom.read_word(0xffff) & 0xff00, 0xff00);
    }

    #[test]
    fn test_sfx_pointer_outside_rom_is_fatal() {
        let mut b = RomBuilder::new();
        b.add_sfx_command(0x10, 0, 5, 8, 0x2000, &[0xbb]);
        assert!(matches!(
            SoundRom::new(b.into_data()),
            Err(RomError::PointerOutOfRange("sfx sequence table", _, 0x2000))
        ));
    }

    #[test]
    fn test_invalid_hint_is_fatal() {
        let mut b = RomBuilder::new();
        b.add_sfx_command(0x10, 0, 5, 15, 0x9000, &[0xbb]);
        assert!(matches!(
            SoundRom::new(b.into_data()),
            Err(RomError::InvalidChannelHint(_, 15))
        ));
    }

    #[test]
    fn test_fm_table_is_chromatic() {
        let rom = RomBuilder::new().build();

        // Note 0x46 is the A4 reference; adjacent entries differ by a
        // semitone ratio of 2^(-1/12) within fixed-point rounding.
        assert_eq!(rom.fm_frequency(0x46), 1024);
        assert_eq!(rom.fm_frequency(0), 0);

        let semitone = f64::powf(2.0, -1.0 / 12.0);
        for n in 1..127u8 {
            let a = f64::from(rom.fm_frequency(n));
            let b = f64::from(rom.fm_frequency(n + 1));
            // Both entries carry up to half a unit of rounding.
            assert!((b / a - semitone).abs() < 1.5 / a, "note {}", n);
        }
    }

    #[test]
    fn test_speech_length_overrun_is_fatal() {
        let mut b = RomBuilder::new();
        b.add_speech_command(0x5a, 0xbee9, 0x8000);
        assert!(matches!(
            SoundRom::new(b.into_data()),
            Err(RomError::SpeechDataOutOfRange(..))
        ));
    }
}
