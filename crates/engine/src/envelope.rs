//! Frequency and volume envelope pipeline

// SPDX-FileCopyrightText: © 2025 Marcus Rowe <undisbeliever@gmail.com>
//
// SPDX-License-Identifier: MIT

use crate::channel::Channel;
use crate::driver_constants::{CMD_FADING, DEFAULT_ENVELOPE_PTR, ROM_BASE};
use crate::rom::SoundRom;

/// Decay applied per tick by the canonical fade-out envelope.
pub const FADE_RATE: u8 = 0x08;

/// Release decay used when a sequence never sets one.
pub const DEFAULT_RELEASE_RATE: u8 = 0x10;

/// Accumulator value of the built-in (flat) envelope at note-on.
const DEFAULT_ENVELOPE_LEVEL: u8 = 0xf0;

pub(crate) fn reset_defaults(ch: &mut Channel) {
    ch.vol_env_ptr = DEFAULT_ENVELOPE_PTR;
    ch.vol_env_pos = 0;
    ch.vol_env_frames = 0;
    ch.vol_env_loops = 0;
    ch.vol_env_done = false;

    ch.freq_env_ptr = 0;
    ch.freq_env_pos = 0;
    ch.freq_env_frames = 0;
    ch.freq_env_loops = 0;
    ch.freq_env_done = true;
    ch.freq_accumulator = 0;
    ch.freq_env_frac = 0;

    ch.release_rate = DEFAULT_RELEASE_RATE;
}

/// Rearms both envelopes for a freshly read note.  A fading channel must not
/// rearm: its decay runs to zero regardless of further notes.
pub(crate) fn note_on(ch: &mut Channel) {
    if ch.is_fading() {
        return;
    }

    ch.released = false;
    ch.update_pending = false;

    ch.vol_env_pos = 0;
    ch.vol_env_frames = 0;
    ch.vol_env_loops = 0;
    ch.vol_env_pos_shadow = 0;
    ch.vol_env_done = false;

    if ch.vol_env_ptr < ROM_BASE {
        // Built-in envelope: full level immediately, nothing to read.
        ch.vol_env_accumulator = DEFAULT_ENVELOPE_LEVEL;
        ch.vol_env_done = true;
    } else {
        ch.vol_env_accumulator = 0;
    }

    if ch.freq_env_ptr >= ROM_BASE {
        ch.freq_env_pos = 0;
        ch.freq_env_frames = 0;
        ch.freq_env_loops = 0;
        ch.freq_env_done = false;
        ch.freq_accumulator = 0;
    }
}

/// The secondary timer fired: re-read the envelope from the last trigger
/// position and, unless sustained, enter the release phase.
pub(crate) fn resample(ch: &mut Channel) {
    ch.vol_env_pos = ch.vol_env_pos_shadow;
    ch.released = true;
}

/// Marks a channel as fading: the special-marker blocks rearming and the
/// volume tick decays the accumulator until it reaches zero.
pub(crate) fn install_fade(ch: &mut Channel) {
    ch.active_command = CMD_FADING;
    ch.released = false;
    ch.vol_env_done = true;
}

pub(crate) fn tick_volume(ch: &mut Channel, rom: &SoundRom) {
    if ch.is_fading() {
        ch.vol_env_accumulator = ch.vol_env_accumulator.saturating_sub(FADE_RATE);
        return;
    }

    if ch.released {
        let rate = match ch.release_rate {
            0 => DEFAULT_RELEASE_RATE,
            r => r,
        };
        ch.vol_env_accumulator = ch.vol_env_accumulator.saturating_sub(rate);
        return;
    }

    if ch.vol_env_done || ch.vol_env_ptr < ROM_BASE {
        return;
    }

    let b = rom.read_byte(ch.vol_env_ptr.wrapping_add(u16::from(ch.vol_env_pos)));

    if b == 0xff {
        let count = rom.read_byte(
            ch.vol_env_ptr
                .wrapping_add(u16::from(ch.vol_env_pos) + 1),
        );
        let back = rom.read_byte(
            ch.vol_env_ptr
                .wrapping_add(u16::from(ch.vol_env_pos) + 2),
        );

        if count == 0 {
            ch.vol_env_done = true;
            return;
        }

        if ch.vol_env_loops == 0 {
            ch.vol_env_loops = count;
        }
        ch.vol_env_loops -= 1;
        if ch.vol_env_loops == 0 {
            ch.vol_env_done = true;
        } else {
            ch.vol_env_pos = ch.vol_env_pos.wrapping_sub(back);
        }
        return;
    }

    ch.vol_env_accumulator = ch.vol_env_accumulator.saturating_add(b);
    ch.vol_env_pos = ch.vol_env_pos.wrapping_add(1);
    ch.vol_env_pos_shadow = ch.vol_env_pos;
}

/// Current 4-bit output level: shaped accumulator scaled by the base volume.
pub(crate) fn output_level(ch: &Channel, rom: &SoundRom) -> u8 {
    let shape = rom.dist_shape(ch.dist_shape);
    let level = ((ch.vol_env_accumulator & shape) >> 4).min(15);

    (level * (ch.base_volume.min(15) + 1)) >> 4
}

pub(crate) fn tick_frequency(ch: &mut Channel, rom: &SoundRom) {
    if ch.freq_env_done || ch.freq_env_ptr < ROM_BASE {
        return;
    }

    if ch.freq_env_frames > 0 {
        ch.freq_env_frames -= 1;

        let scale = match rom.freq_shape(ch.freq_shape) {
            0xff => 1,
            s => s,
        };
        let delta = i32::from(ch.freq_env_rate as i16) * i32::from(scale);

        let acc = ch.freq_accumulator as i32 + (delta << 8);
        ch.freq_accumulator = (acc as u32) & 0x00ff_ffff;
        return;
    }

    // Read the next (duration, rate) pair.
    let duration = rom.read_byte(ch.freq_env_ptr.wrapping_add(u16::from(ch.freq_env_pos)));
    let rate = rom.read_byte(
        ch.freq_env_ptr
            .wrapping_add(u16::from(ch.freq_env_pos) + 1),
    );

    if rate == 0xff {
        let count = rom.read_byte(
            ch.freq_env_ptr
                .wrapping_add(u16::from(ch.freq_env_pos) + 2),
        );
        let back = rom.read_byte(
            ch.freq_env_ptr
                .wrapping_add(u16::from(ch.freq_env_pos) + 3),
        );

        if count == 0 {
            ch.freq_env_done = true;
            return;
        }

        if ch.freq_env_loops == 0 {
            ch.freq_env_loops = count;
        }
        ch.freq_env_loops -= 1;
        if ch.freq_env_loops == 0 {
            ch.freq_env_done = true;
        } else {
            ch.freq_env_pos = ch.freq_env_pos.wrapping_sub(back);
        }
        return;
    }

    ch.freq_env_frames = duration;
    ch.freq_env_rate = i16::from(rate as i8) as u16;
    ch.freq_env_pos = ch.freq_env_pos.wrapping_add(2);
}

/// `base + accumulator upper + portamento`, the frequency sent to the chip.
pub(crate) fn current_frequency(ch: &Channel) -> u16 {
    let env = (ch.freq_accumulator >> 16) as u16;

    ch.base_freq
        .wrapping_add(env)
        .wrapping_add(ch.portamento as u16)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_rom::RomBuilder;

    fn channel_with_vol_env(rom_builder: &mut RomBuilder, table: &[u8]) -> (Channel, u16) {
        let addr = rom_builder.add_table(table);
        let mut ch = Channel::new();
        ch.vol_env_ptr = addr;
        ch.base_volume = 15;
        (ch, addr)
    }

    #[test]
    fn test_volume_envelope_accumulates() {
        let mut b = RomBuilder::new();
        let (mut ch, _) = channel_with_vol_env(&mut b, &[0x40, 0x40, 0x40, 0xff, 0x00, 0x00]);
        let rom = b.build();

        tick_volume(&mut ch, &rom);
        assert_eq!(ch.vol_env_accumulator, 0x40);
        tick_volume(&mut ch, &rom);
        tick_volume(&mut ch, &rom);
        assert_eq!(ch.vol_env_accumulator, 0xc0);
        assert_eq!(output_level(&ch, &rom), 12);
    }

    #[test]
    fn test_volume_envelope_end_marker_finishes_in_one_tick() {
        let mut b = RomBuilder::new();
        let (mut ch, _) = channel_with_vol_env(&mut b, &[0xff, 0x00, 0x12]);
        let rom = b.build();

        tick_volume(&mut ch, &rom);
        assert!(ch.vol_env_done);
    }

    #[test]
    fn test_volume_envelope_loop_count() {
        // Two 0x20 steps, looped twice, then finished.
        let mut b = RomBuilder::new();
        let (mut ch, _) = channel_with_vol_env(&mut b, &[0x20, 0x20, 0xff, 0x02, 0x02]);
        let rom = b.build();

        for _ in 0..8 {
            tick_volume(&mut ch, &rom);
        }

        assert!(ch.vol_env_done);
        assert_eq!(ch.vol_env_accumulator, 0x80);
    }

    #[test]
    fn test_release_decays_to_zero() {
        let rom = RomBuilder::new().build();
        let mut ch = Channel::new();
        ch.vol_env_accumulator = 0x30;
        ch.released = true;
        ch.release_rate = 0x10;

        tick_volume(&mut ch, &rom);
        tick_volume(&mut ch, &rom);
        tick_volume(&mut ch, &rom);
        assert_eq!(ch.vol_env_accumulator, 0);
    }

    #[test]
    fn test_fade_overrides_table() {
        let mut b = RomBuilder::new();
        let (mut ch, _) = channel_with_vol_env(&mut b, &[0x40, 0x40]);
        let rom = b.build();

        ch.vol_env_accumulator = 0x20;
        install_fade(&mut ch);

        for _ in 0..4 {
            tick_volume(&mut ch, &rom);
        }
        assert_eq!(ch.vol_env_accumulator, 0);
    }

    #[test]
    fn test_frequency_envelope_sweep() {
        let mut b = RomBuilder::new();
        let env = b.add_table(&[0x04, 0x02, 0x00, 0xff, 0x00, 0x00]);
        let rom = b.build();

        let mut ch = Channel::new();
        ch.freq_env_ptr = env;
        ch.freq_env_done = false;
        ch.base_freq = 0x100;

        // First tick reads the pair, the next four apply it.
        for _ in 0..5 {
            tick_frequency(&mut ch, &rom);
        }

        // rate 2 for 4 frames, scaled <<8: accumulator upper is 0x08... >>16
        assert_eq!(ch.freq_accumulator, 2 << (8 + 2));
        assert_eq!(current_frequency(&ch), 0x100);
    }

    #[test]
    fn test_frequency_envelope_terminates() {
        let mut b = RomBuilder::new();
        let env = b.add_table(&[0x01, 0xff, 0x00, 0x00]);
        let rom = b.build();

        let mut ch = Channel::new();
        ch.freq_env_ptr = env;
        ch.freq_env_done = false;

        tick_frequency(&mut ch, &rom);
        assert!(ch.freq_env_done);
    }

    #[test]
    fn test_portamento_offsets_frequency() {
        let mut ch = Channel::new();
        ch.base_freq = 0x200;
        ch.portamento = -0x10;
        assert_eq!(current_frequency(&ch), 0x1f0);
    }
}
