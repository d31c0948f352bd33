//! POKEY mixer and register writer

// SPDX-FileCopyrightText: © 2025 Marcus Rowe <undisbeliever@gmail.com>
//
// SPDX-License-Identifier: MIT

use crate::bytecode_interpreter::{advance_channel, StepResult, VmContext};
use crate::driver_constants::FIRST_PSG_HINT;
use crate::engine::SoundEngine;
use crate::envelope;
use crate::hardware::{psg_registers, SoundHardware};

/// One head-of-list contender for a physical voice pair.
#[derive(Clone, Copy)]
struct PsgOutput {
    frequency: u8,
    audc: u8,
    volume: u8,
    ctrl_and: u8,
    ctrl_or: u8,
}

impl SoundEngine {
    /// Odd-tick update: the four physical voices are driven as two pairs,
    /// each pair arbitrated between the heads of its two active lists.
    pub(crate) fn pokey_update<H: SoundHardware>(&mut self, hw: &mut H) {
        let mut audctl_and: u8 = 0xff;
        let mut audctl_or: u8 = 0;

        for pair in 0..2u8 {
            let primary_hint = FIRST_PSG_HINT + pair * 2;
            let secondary_hint = primary_hint + 1;

            self.scratch.fill(0);
            let primary = self.advance_psg_list(primary_hint, hw);

            self.scratch.fill(0);
            let secondary = self.advance_psg_list(secondary_hint, hw);

            // The filter threshold gates the primary out of the comparison.
            let gated = match primary {
                Some(p) if p.volume >= self.music_filter_threshold => Some(p),
                _ => None,
            };

            let (winner, loser) = match (gated.or(primary), secondary) {
                (Some(p), Some(s)) => {
                    let p_loud = match (gated, secondary) {
                        (Some(g), Some(s)) => g.volume >= s.volume,
                        (Some(_), None) => true,
                        (None, _) => false,
                    };
                    if p_loud {
                        (Some(p), Some(s))
                    } else {
                        (Some(s), Some(p))
                    }
                }
                (p, s) => (p.or(s), None),
            };

            if winner.is_none() && loser.is_none() {
                continue;
            }

            let even_voice = pair * 2;
            if let Some(w) = winner {
                hw.psg_write(psg_registers::audf(even_voice), w.frequency);
                hw.psg_write(psg_registers::audc(even_voice), w.audc);
                audctl_and &= w.ctrl_and;
                audctl_or |= w.ctrl_or;
            }
            if let Some(l) = loser {
                hw.psg_write(psg_registers::audf(even_voice + 1), l.frequency);
                hw.psg_write(psg_registers::audc(even_voice + 1), l.audc);
                audctl_and &= l.ctrl_and;
                audctl_or |= l.ctrl_or;
            }

            hw.psg_write(psg_registers::AUDCTL, audctl_or & audctl_and);
        }
    }

    /// Advances every channel of one PSG active list and returns the head's
    /// output.  Channels that end are torn down before returning.
    fn advance_psg_list<H: SoundHardware>(
        &mut self,
        hint: u8,
        hw: &mut H,
    ) -> Option<PsgOutput> {
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

        head.map(|i| {
            let ch = &self.channels.channels[i];
            let volume = envelope::output_level(ch, &self.rom);

            PsgOutput {
                frequency: (envelope::current_frequency(ch) & 0xff) as u8,
                audc: volume | ch.distortion,
                volume,
                ctrl_and: ch.ctrl_and_mask,
                ctrl_or: ch.ctrl_or_bits,
            }
        })
    }
}

#[cfg(test)]
mod test {
    use crate::engine::SoundEngine;
    use crate::hardware::{psg_registers, TraceHardware};
    use crate::test_rom::RomBuilder;

    fn volume_sequence(note: u8, volume: u8) -> [u8; 9] {
        [0x80, 0x40, 0x82, volume, 0x90, 0x00, note, 0x81, 0xbb]
    }

    /// Last value written to one PSG register.
    fn last_write(hw: &TraceHardware, register: u8) -> Option<u8> {
        hw.psg_writes()
            .filter(|(r, _)| *r == register)
            .map(|(_, v)| v)
            .last()
    }

    fn paired_engine(primary_volume: u8, secondary_volume: u8) -> (SoundEngine, TraceHardware) {
        let mut b = RomBuilder::new();
        b.set_duration(1, 0x4000);
        let p = b.add_table(&volume_sequence(0x40, primary_volume));
        let s = b.add_table(&volume_sequence(0x50, secondary_volume));
        b.add_sfx_command(0x10, 0xff, 8, 8, p, &[]);
        b.add_sfx_command(0x11, 0xff, 8, 9, s, &[]);

        let mut engine = SoundEngine::new(b.build());
        let mut hw = TraceHardware::new();

        engine.push_command(0x10, &mut hw);
        engine.tick(&mut hw);
        engine.push_command(0x11, &mut hw);
        engine.tick(&mut hw);

        (engine, hw)
    }

    #[test]
    fn test_louder_channel_takes_the_even_voice() {
        let (mut engine, mut hw) = paired_engine(0x04, 0x0f);

        hw.writes.clear();
        engine.tick(&mut hw); // even tick: FM only
        engine.tick(&mut hw); // odd tick: POKEY update

        let secondary_freq = engine.rom().psg_frequency(0x50);
        let primary_freq = engine.rom().psg_frequency(0x40);

        assert_eq!(last_write(&hw, psg_registers::audf(0)), Some(secondary_freq));
        assert_eq!(last_write(&hw, psg_registers::audf(1)), Some(primary_freq));
        assert_eq!(last_write(&hw, psg_registers::audc(0)), Some(0xaf));
    }

    #[test]
    fn test_primary_wins_ties_and_louder() {
        let (mut engine, mut hw) = paired_engine(0x0f, 0x04);

        hw.writes.clear();
        engine.tick(&mut hw);
        engine.tick(&mut hw);

        let primary_freq = engine.rom().psg_frequency(0x40);
        assert_eq!(last_write(&hw, psg_registers::audf(0)), Some(primary_freq));
    }

    #[test]
    fn test_filter_threshold_gates_the_primary() {
        let (mut engine, mut hw) = paired_engine(0x08, 0x04);
        engine.set_music_filter_threshold(9);

        hw.writes.clear();
        engine.tick(&mut hw);
        engine.tick(&mut hw);

        // The primary is louder (8 > 4) but below the gate: secondary wins.
        let secondary_freq = engine.rom().psg_frequency(0x50);
        assert_eq!(last_write(&hw, psg_registers::audf(0)), Some(secondary_freq));
    }

    #[test]
    fn test_audctl_merges_or_bits() {
        let mut b = RomBuilder::new();
        b.set_duration(1, 0x4000);
        // SET_CTRL_BITS 0x51 before the note.
        let seq = b.add_table(&[0x80, 0x40, 0x82, 0x0f, 0x90, 0x00, 0x8b, 0x51, 0x40, 0x81, 0xbb]);
        b.add_sfx_command(0x10, 0xff, 8, 8, seq, &[]);

        let mut engine = SoundEngine::new(b.build());
        let mut hw = TraceHardware::new();

        engine.push_command(0x10, &mut hw);
        engine.tick(&mut hw);
        engine.tick(&mut hw);

        assert_eq!(last_write(&hw, psg_registers::AUDCTL), Some(0x51));
    }
}
