//! Channel allocator for the PSG SFX path

// SPDX-FileCopyrightText: © 2025 Marcus Rowe <undisbeliever@gmail.com>
//
// SPDX-License-Identifier: MIT

use crate::channel::Channel;
use crate::driver_constants::{
    encode_priority, CMD_FADING, INITIAL_CTRL_MASK, INITIAL_DISTORTION, MAX_CHAIN_CHANNELS,
};
use crate::engine::SoundEngine;
use crate::envelope;

impl SoundEngine {
    /// Allocates channels for an SFX command, walking the next-offset chain
    /// (one command can claim up to eight channels).
    ///
    /// A free slot is taken by descending index; with none free, the lowest
    /// priority member of the hint's active list is preempted when the new
    /// sound's encoded priority is at least as high.  Failure to find a slot
    /// silently drops the remainder of the chain.
    pub(crate) fn allocate_sfx(&mut self, cmd: u8, param: u8) {
        let flags = self.rom.sfx_flags(param);

        if flags != 0xff {
            let playing = self
                .channels
                .channels
                .iter()
                .any(|c| c.status != 0 && c.active_command == cmd);
            if playing {
                return;
            }
        }

        let mut offset = self.rom.sfx_offset(param);
        let mut allocated = 0;

        while offset != 0 && allocated < MAX_CHAIN_CHANNELS {
            let priority_byte = self.rom.sfx_priority(offset);
            let alternate = priority_byte & 0x80 != 0;
            let priority = priority_byte & 0x0f;
            let hint = self.rom.sfx_hint(offset);
            let seq_ptr = self.rom.sfx_seq_ptr(offset, alternate);
            let encoded = encode_priority(priority);

            let slot = match self.channels.take_free() {
                Some(i) => Some(i),
                None => match self.channels.tail_of(hint) {
                    Some(tail) if encoded >= self.channels.channels[tail].status => {
                        self.channels.unlink_active(tail);
                        Some(tail)
                    }
                    _ => None,
                },
            };

            let index = match slot {
                Some(i) => i,
                None => {
                    log::debug!("sfx {:#04x}: no channel for offset {:#04x}", cmd, offset);
                    return;
                }
            };

            let ch = &mut self.channels.channels[index];
            *ch = Channel::new();
            ch.active_command = cmd;
            ch.status = encoded;
            ch.hint = hint;
            ch.seq_ptr = seq_ptr;
            ch.distortion = INITIAL_DISTORTION;
            ch.ctrl_and_mask = INITIAL_CTRL_MASK;
            envelope::reset_defaults(ch);

            self.channels.link_active(index);

            allocated += 1;
            offset = self.rom.sfx_next(offset);
        }
    }

    /// Type 5/6: marks every channel allocated by `target_cmd` finished.
    /// The interpreter tears them down on their next group tick.
    pub(crate) fn stop_by_command(&mut self, target_cmd: u8) {
        for ch in self.channels.channels.iter_mut() {
            if ch.status != 0 && ch.active_command == target_cmd {
                ch.active_command = crate::driver_constants::CMD_FINISHED;
            }
        }
    }

    /// Type 9: installs the canonical decay envelope instead of killing.
    pub(crate) fn fade_by_command(&mut self, target_cmd: u8) {
        for ch in self.channels.channels.iter_mut() {
            if ch.status != 0 && ch.active_command == target_cmd {
                envelope::install_fade(ch);
            }
        }
    }

    /// Type 4: kill every channel whose status pattern matches.
    pub(crate) fn kill_by_status(&mut self, pattern: u8) {
        for ch in self.channels.channels.iter_mut() {
            if ch.status != 0 && ch.status >> 2 == pattern {
                ch.active_command = crate::driver_constants::CMD_FINISHED;
            }
        }
    }

    /// Type 10: fade every channel whose status pattern matches.
    pub(crate) fn fade_by_status(&mut self, pattern: u8) {
        for ch in self.channels.channels.iter_mut() {
            if ch.status != 0 && ch.status >> 2 == pattern {
                envelope::install_fade(ch);
            }
        }
    }

    pub(crate) fn any_channel_fading(&self) -> bool {
        self.channels
            .channels
            .iter()
            .any(|c| c.status != 0 && c.active_command == CMD_FADING)
    }
}
