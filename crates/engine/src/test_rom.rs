//! Synthetic ROM images for tests

// SPDX-FileCopyrightText: © 2025 Marcus Rowe <undisbeliever@gmail.com>
//
// SPDX-License-Identifier: MIT

use crate::driver_constants::{addresses, MAX_COMMANDS, ROM_BASE, ROM_SIZE};
use crate::rom::SoundRom;

/// Builds a 48 KiB ROM image with well-formed tables.
///
/// Sequence and envelope data are placed at a bump cursor starting at 0x9000.
/// SFX offsets are handed out from 1 (offset 0 terminates chains).
pub struct RomBuilder {
    data: Vec<u8>,
    cursor: u16,
    next_param: u8,
    next_offset: u8,
    next_music_index: u8,
}

impl RomBuilder {
    pub fn new() -> Self {
        let mut b = RomBuilder {
            data: vec![0; ROM_SIZE],
            cursor: 0x9000,
            next_param: 0,
            next_offset: 1,
            next_music_index: 0,
        };

        // All commands unrouted and queued by default.
        for cmd in 0..MAX_COMMANDS as u16 {
            b.poke(addresses::DISPATCH_TYPE_TABLE + cmd, 0xff);
            b.poke(addresses::NMI_CLASS_TABLE + cmd, 0xff);
        }

        // Identity-ish shape tables: volume shapes pass everything through,
        // frequency shapes scale by one.
        for i in 0..16u16 {
            b.poke(addresses::DIST_SHAPE_TABLE + i, 0xff);
        }
        for i in 0..128u16 {
            b.poke(addresses::FREQ_SHAPE_TABLE + i, 1);
        }
        b.poke(addresses::FREQ_SHAPE_TABLE + 128, 0xff);

        // PSG dividers descend with the note number.
        for n in 0..128u16 {
            b.poke(addresses::PSG_FREQ_TABLE + n, (0xff - n) as u8);
        }

        // Chromatic FM table: periods halve every octave, A4 (note 0x46) is
        // the 1024 reference.  Note 0 is a rest.
        for n in 1..128u16 {
            let period = 1024.0 * f64::powf(2.0, f64::from(70 - n as i32) / 12.0);
            b.poke_word(addresses::FM_FREQ_TABLE + n * 2, period.round() as u16);
        }

        b
    }

    fn poke(&mut self, addr: u16, value: u8) {
        self.data[usize::from(addr - ROM_BASE)] = value;
    }

    fn poke_word(&mut self, addr: u16, value: u16) {
        let [l, h] = value.to_le_bytes();
        self.poke(addr, l);
        self.poke(addr + 1, h);
    }

    pub fn write(&mut self, addr: u16, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.poke(addr + i as u16, *b);
        }
    }

    pub fn next_table_addr(&self) -> u16 {
        self.cursor
    }

    /// Places a blob at the bump cursor and returns its CPU address.
    pub fn add_table(&mut self, bytes: &[u8]) -> u16 {
        let addr = self.cursor;
        self.write(addr, bytes);
        self.cursor += bytes.len() as u16;
        addr
    }

    pub fn set_duration(&mut self, index: u8, value: u16) {
        self.poke_word(addresses::DURATION_TABLE + u16::from(index) * 2, value);
    }

    pub fn set_handler(&mut self, cmd: u8, handler_type: u8, param: u8) {
        self.poke(addresses::DISPATCH_TYPE_TABLE + u16::from(cmd), handler_type);
        self.poke(addresses::DISPATCH_PARAM_TABLE + u16::from(cmd), param);
    }

    pub fn set_nmi_class(&mut self, cmd: u8, class: u8) {
        self.poke(addresses::NMI_CLASS_TABLE + u16::from(cmd), class);
    }

    fn add_sfx_entry(&mut self, priority: u8, hint: u8, seq_ptr: u16) -> u8 {
        let offset = self.next_offset;
        self.next_offset += 1;

        self.poke(addresses::SFX_PRIORITY_TABLE + u16::from(offset), priority);
        self.poke(addresses::SFX_CHANNEL_TABLE + u16::from(offset), hint);
        self.poke_word(addresses::SFX_SEQ_PTR_TABLE + u16::from(offset) * 2, seq_ptr);
        self.poke(addresses::SFX_NEXT_TABLE + u16::from(offset), 0);

        offset
    }

    /// Routes `cmd` to the SFX allocator with a single-channel sequence.
    /// The sequence bytes are written at `seq_ptr` when one is supplied.
    pub fn add_sfx_command(
        &mut self,
        cmd: u8,
        flags: u8,
        priority: u8,
        hint: u8,
        seq_ptr: u16,
        seq: &[u8],
    ) -> u8 {
        if seq_ptr >= ROM_BASE && !seq.is_empty() {
            self.write(seq_ptr, seq);
        }

        let param = self.next_param;
        self.next_param += 1;

        let offset = self.add_sfx_entry(priority, hint, seq_ptr);

        self.poke(addresses::SFX_OFFSET_TABLE + u16::from(param), offset);
        self.poke(addresses::SFX_FLAGS_TABLE + u16::from(param), flags);
        self.set_handler(cmd, 7, param);

        offset
    }

    /// Routes `cmd` to a multi-channel chain: one entry per (priority, hint,
    /// sequence pointer) triple, linked through the next-offset table.
    pub fn add_sfx_chain(&mut self, cmd: u8, flags: u8, entries: &[(u8, u8, u16)]) -> Vec<u8> {
        let param = self.next_param;
        self.next_param += 1;

        let mut offsets = Vec::with_capacity(entries.len());
        for &(priority, hint, seq_ptr) in entries {
            offsets.push(self.add_sfx_entry(priority, hint, seq_ptr));
        }

        for pair in offsets.windows(2) {
            self.poke(addresses::SFX_NEXT_TABLE + u16::from(pair[0]), pair[1]);
        }

        self.poke(addresses::SFX_OFFSET_TABLE + u16::from(param), offsets[0]);
        self.poke(addresses::SFX_FLAGS_TABLE + u16::from(param), flags);
        self.set_handler(cmd, 7, param);

        offsets
    }

    /// Routes `cmd` to the music/speech handler.
    pub fn add_speech_command(&mut self, cmd: u8, seq_ptr: u16, len: u16) -> u8 {
        self.add_speech_command_with_flags(cmd, seq_ptr, len, 0x05)
    }

    pub fn add_speech_command_with_flags(
        &mut self,
        cmd: u8,
        seq_ptr: u16,
        len: u16,
        flags: u8,
    ) -> u8 {
        let param = self.next_param;
        self.next_param += 1;

        let index = self.next_music_index;
        self.next_music_index += 1;

        self.poke(addresses::MUSIC_INDEX_TABLE + u16::from(param), index);
        self.poke(addresses::MUSIC_FLAGS_TABLE + u16::from(param), flags);
        self.poke_word(addresses::MUSIC_SEQ_PTR_TABLE + u16::from(index) * 2, seq_ptr);
        self.poke_word(addresses::MUSIC_SEQ_LEN_TABLE + u16::from(index) * 2, len);
        self.set_handler(cmd, 11, param);

        param
    }

    /// Fills the LPC region for a speech command with a byte ramp.
    pub fn fill_speech_data(&mut self, seq_ptr: u16, len: u16) {
        for i in 0..len {
            self.poke(seq_ptr + i, (i & 0xff) as u8);
        }
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn build(self) -> SoundRom {
        SoundRom::new(self.data).expect("test ROM failed validation")
    }
}
