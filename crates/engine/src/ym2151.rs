//! YM2151 writer: operator shadow, voice loading, busy-wait discipline

// SPDX-FileCopyrightText: © 2025 Marcus Rowe <undisbeliever@gmail.com>
//
// SPDX-License-Identifier: MIT

use crate::bytecode_interpreter::{advance_channel, StepResult, VmContext};
use crate::driver_constants::{
    error_bits, FIRST_FM_HINT, FIRST_PSG_HINT, FM_BUSY_POLL_LIMIT, ROM_BASE,
};
use crate::engine::SoundEngine;
use crate::envelope;
use crate::hardware::SoundHardware;
use crate::host_io::ErrorFlags;
use crate::rom::SoundRom;

/// Key-on/off register.
const KEY_REGISTER: u8 = 0x08;
/// All four operator-enable bits of the key-on register.
const KEY_ALL_OPERATORS: u8 = 0x78;

/// Carrier-operator bits per connection algorithm.
const CARRIER_MASKS: [u8; 8] = [0x08, 0x08, 0x08, 0x08, 0x0c, 0x0e, 0x0e, 0x0f];

/// Per-operator register banks loaded by a voice definition, in write order.
const OPERATOR_BANKS: [u8; 6] = [0x40, 0x60, 0x80, 0xa0, 0xc0, 0xe0];

/// Bytes in a voice definition: 6 per operator plus the connection byte.
pub const VOICE_SIZE: usize = 4 * OPERATOR_BANKS.len() + 1;

/// Polls the busy predicate up to the limit, then forces the write through
/// with the timeout bit set.
pub(crate) fn fm_write_polled<H: SoundHardware>(
    hw: &mut H,
    errors: &mut ErrorFlags,
    register: u8,
    value: u8,
) {
    let mut polls: u32 = 0;
    while !hw.fm_ready() {
        polls += 1;
        if polls >= FM_BUSY_POLL_LIMIT {
            errors.set(error_bits::FM_TIMEOUT);
            break;
        }
    }
    hw.fm_write(register, value);
}

/// Loads a 25-byte voice definition into the shadow and the chip.
/// A pointer below the ROM base loads the zero patch (silence).
/// Returns the connection byte.
fn load_voice<H: SoundHardware>(
    hw: &mut H,
    errors: &mut ErrorFlags,
    rom: &SoundRom,
    shadow: &mut [u8; 256],
    fm_channel: u8,
    voice_ptr: u16,
) -> u8 {
    let voice_byte = |i: usize| -> u8 {
        if voice_ptr >= ROM_BASE {
            rom.read_byte(voice_ptr.wrapping_add(i as u16))
        } else {
            0
        }
    };

    fm_write_polled(hw, errors, KEY_REGISTER, fm_channel);

    for op in 0..4u8 {
        for (bank_index, bank) in OPERATOR_BANKS.iter().enumerate() {
            let register = bank + op * 8 + fm_channel;
            let value = voice_byte(usize::from(op) * OPERATOR_BANKS.len() + bank_index);

            shadow[usize::from(register)] = value;
            fm_write_polled(hw, errors, register, value);
        }
    }

    let connection = voice_byte(VOICE_SIZE - 1);
    shadow[usize::from(0x20 + fm_channel)] = connection;
    fm_write_polled(hw, errors, 0x20 + fm_channel, connection);

    fm_write_polled(hw, errors, KEY_REGISTER, KEY_ALL_OPERATORS | fm_channel);

    connection
}

impl SoundEngine {
    /// Even-tick update: each FM active list drives the channel number equal
    /// to its hint, in descending order.
    pub(crate) fn fm_update<H: SoundHardware>(&mut self, hw: &mut H) {
        for hint in (FIRST_FM_HINT..FIRST_PSG_HINT).rev() {
            let members = self.channels.list_members(hint);
            let mut ended = Vec::new();

            for &i in &members {
                let Self {
                    rom,
                    channels,
                    scratch,
                    egress,
                    errors,
                    fm_shadow,
                    queued_commands,
                    poly_counter,
                    ..
                } = self;

                let mut ctx = VmContext {
                    rom,
                    scratch,
                    egress,
                    errors,
                    fm_shadow,
                    queued_commands,
                    psg_random: (*poly_counter & 0xff) as u8,
                };

                if advance_channel(&mut channels.channels[i], &mut ctx) == StepResult::Ended {
                    ended.push(i);
                }
            }

            let head = members.iter().copied().find(|i| !ended.contains(i));

            for i in ended {
                self.terminate_channel(i, hw);
            }

            if let Some(i) = head {
                self.commit_fm_channel(i, hint, hw);
            }
        }
    }

    fn commit_fm_channel<H: SoundHardware>(&mut self, index: usize, fm_channel: u8, hw: &mut H) {
        let Self {
            rom,
            channels,
            errors,
            fm_shadow,
            ..
        } = self;
        let ch = &mut channels.channels[index];

        if ch.fm_voice_pending {
            ch.fm_voice_pending = false;
            ch.fm_algorithm =
                load_voice(hw, errors, rom, fm_shadow, fm_channel, ch.fm_voice_ptr) & 7;
        }

        let frequency = envelope::current_frequency(ch);

        fm_write_polled(
            hw,
            errors,
            0x20 + fm_channel,
            fm_shadow[usize::from(0x20 + fm_channel)],
        );
        fm_write_polled(hw, errors, 0x30 + fm_channel, (frequency & 0xff) as u8);
        fm_write_polled(
            hw,
            errors,
            0x38 + fm_channel,
            fm_shadow[usize::from(0x38 + fm_channel)],
        );

        // Carrier total levels follow the volume envelope.
        let level = envelope::output_level(ch, rom);
        let carriers = CARRIER_MASKS[usize::from(ch.fm_algorithm & 7)];
        for op in 0..4u8 {
            if carriers & (1 << op) != 0 {
                let register = 0x60 + op * 8 + fm_channel;
                fm_write_polled(hw, errors, register, (15 - level) << 3);
            }
        }

        if ch.update_pending && ch.note != 0 {
            fm_write_polled(hw, errors, KEY_REGISTER, KEY_ALL_OPERATORS | fm_channel);
        }
        ch.update_pending = false;

        if ch.note != 0 {
            fm_write_polled(hw, errors, 0x28 + fm_channel, (frequency >> 8) as u8);

            // Detune is applied to the carrier operators, never the shadow.
            if ch.fm_detune != 0 {
                for op in 0..4u8 {
                    if carriers & (1 << op) != 0 {
                        let register = 0x40 + op * 8 + fm_channel;
                        let value =
                            fm_shadow[usize::from(register)].wrapping_add(ch.fm_detune);
                        fm_write_polled(hw, errors, register, value);
                    }
                }
            }
        }
    }

    /// Silences an FM channel by loading the zero patch.
    pub(crate) fn fm_silence_channel<H: SoundHardware>(&mut self, fm_channel: u8, hw: &mut H) {
        let Self {
            rom,
            errors,
            fm_shadow,
            ..
        } = self;

        load_voice(hw, errors, rom, fm_shadow, fm_channel, 0);
    }
}
