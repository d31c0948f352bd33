//! Two-level command router

// SPDX-FileCopyrightText: © 2025 Marcus Rowe <undisbeliever@gmail.com>
//
// SPDX-License-Identifier: MIT

use crate::driver_constants::{FIRST_FM_HINT, MAX_COMMANDS};
use crate::engine::SoundEngine;
use crate::hardware::SoundHardware;

impl SoundEngine {
    /// Routes one command byte: `cmd -> handler type -> handler`, with the
    /// parameter loaded from the parameter table.  Unknown commands and
    /// handler type 0xff are silently ignored.
    pub(crate) fn dispatch_command<H: SoundHardware>(&mut self, cmd: u8, hw: &mut H) {
        if usize::from(cmd) >= MAX_COMMANDS {
            return;
        }

        let handler = self.rom.handler_type(cmd);
        let param = self.rom.command_param(cmd);

        self.run_handler(handler, cmd, param, hw);
    }

    fn run_handler<H: SoundHardware>(&mut self, handler: u8, cmd: u8, param: u8, hw: &mut H) {
        match handler {
            // Parameter pre-shift, falling through to the allocator entry.
            0 => self.run_handler(7, cmd, param << 2, hw),

            // Set/add shared variable (unrouted by the default tables).
            1 => self.scratch[0] = param,
            2 => self.scratch[0] = self.scratch[0].wrapping_add(param),

            // Indirect dispatch through the small secondary jump table.
            3 => match param {
                0 => self.stop_everything(hw),
                1 => self.stop_group(true, hw),
                2 => self.stop_group(false, hw),
                _ => (),
            },

            4 => self.kill_by_status(param),
            5 => self.stop_by_command(param),
            6 => self.stop_by_command(param),

            7 => self.allocate_sfx(cmd, param),

            8 => {
                let Self { egress, errors, .. } = self;
                egress.push(param, errors);
            }

            9 => self.fade_by_command(param),
            10 => self.fade_by_status(param),

            11 => {
                if self.playback.active {
                    let priority = self.rom.music_flags(param) & 0x0f;
                    self.speech_queue.enqueue(param, priority);
                } else {
                    self.start_playback(param, hw);
                }
            }

            // Channel control: OR control bits into the head of one list.
            12 => {
                let hint = param >> 4;
                let bits = param & 0x0f;
                if (4..=11).contains(&hint) {
                    if let Some(i) = self.channels.head_of(hint) {
                        self.channels.channels[i].ctrl_or_bits |= bits;
                    }
                }
            }

            13 => self.mixer_update(param, hw),

            // Null handler.
            14 => (),

            _ => (),
        }
    }

    /// Type 13: recompose the three mixer fields and write the coarse mixer,
    /// unless a fade is quieting the board.
    pub(crate) fn mixer_update<H: SoundHardware>(&mut self, param: u8, hw: &mut H) {
        if self.any_channel_fading() {
            return;
        }

        let speech = (param >> 5) & 0x07;
        let effects = (param >> 3) & 0x03;
        let music = param & 0x07;

        hw.mixer_write((speech << 5) | (effects << 3) | music);
    }

    /// Command 0x00: silence everything and flush every queue.
    pub(crate) fn stop_everything<H: SoundHardware>(&mut self, hw: &mut H) {
        let live: Vec<usize> = self.channels.live_indices().collect();
        for i in live {
            self.terminate_channel(i, hw);
        }

        self.ingress.clear();
        self.speech_queue.clear();
        self.playback.active = false;

        for voice in 0..4 {
            hw.psg_write(crate::hardware::psg_registers::audc(voice), 0);
        }
        hw.psg_write(crate::hardware::psg_registers::AUDCTL, 0);
        hw.fm_reset();
        hw.speech_reset();
    }

    fn stop_group<H: SoundHardware>(&mut self, psg: bool, hw: &mut H) {
        let matching: Vec<usize> = self
            .channels
            .live_indices()
            .filter(|&i| self.channels.channels[i].is_psg() == psg)
            .collect();

        for i in matching {
            self.terminate_channel(i, hw);
        }

        if !psg {
            for fm_channel in FIRST_FM_HINT..8 {
                self.fm_silence_channel(fm_channel, hw);
            }
        }
    }
}
