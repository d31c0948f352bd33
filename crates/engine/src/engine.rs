//! The sound engine: tick pipeline and host entry points

// SPDX-FileCopyrightText: © 2025 Marcus Rowe <undisbeliever@gmail.com>
//
// SPDX-License-Identifier: MIT

use crate::channel::ChannelSet;
use crate::driver_constants::{status_bits, FIRST_FM_HINT, FIRST_PSG_HINT};
use crate::hardware::{psg_registers, SoundHardware};
use crate::host_io::{CommandQueue, ErrorFlags, OutputQueue};
use crate::rom::SoundRom;
use crate::speech::{Playback, SpeechQueue};

/// Commands submitted by the interpreter (opcode 0x9a) re-enter the router
/// at the end of the tick: the handlers mutate the channel lists the update
/// loops iterate, so the dispatch cannot happen mid-walk.  The budget bounds
/// self-sustaining command loops.
const QUEUED_COMMAND_BUDGET: u32 = 8;

/// The engine is single threaded: the host calls `push_command` between
/// ticks (the ingress context) and `tick` at the interrupt rate.  All
/// channel-state mutation happens inside `tick`, which makes the allocator,
/// the stop/fade scans and the queue operations atomic with respect to it.
pub struct SoundEngine {
    pub(crate) rom: SoundRom,
    pub(crate) channels: ChannelSet,
    pub(crate) scratch: [u8; 16],
    pub(crate) ingress: CommandQueue,
    pub(crate) egress: OutputQueue,
    pub(crate) speech_queue: SpeechQueue,
    pub(crate) playback: Playback,
    pub(crate) fm_shadow: [u8; 256],
    pub(crate) errors: ErrorFlags,
    pub(crate) queued_commands: Vec<u8>,
    pub(crate) poly_counter: u32,
    pub(crate) music_filter_threshold: u8,
    tick_count: u32,
}

impl SoundEngine {
    pub fn new(rom: SoundRom) -> SoundEngine {
        SoundEngine {
            rom,
            channels: ChannelSet::new(),
            scratch: [0; 16],
            ingress: CommandQueue::new(),
            egress: OutputQueue::new(),
            speech_queue: SpeechQueue::new(),
            playback: Playback::new(),
            fm_shadow: [0; 256],
            errors: ErrorFlags::new(),
            queued_commands: Vec::new(),
            poly_counter: 0x1ffff,
            music_filter_threshold: 0,
            tick_count: 0,
        }
    }

    pub fn rom(&self) -> &SoundRom {
        &self.rom
    }

    /// Ingress entry point.  Immediate-dispatch classes bypass the queue;
    /// everything else is stored (oldest-dropped when full).  The host is
    /// expected to check the buffer-full status bit before calling.
    pub fn push_command<H: SoundHardware>(&mut self, cmd: u8, hw: &mut H) {
        match self.rom.nmi_class(cmd) {
            0 => self.stop_everything(hw),
            1 => {
                let param = self.rom.command_param(cmd);
                self.mixer_update(param, hw);
            }
            2 => {
                hw.irq_ack();
                self.ingress.mode = self.rom.command_param(cmd);
            }
            _ => self.ingress.push(cmd),
        }
    }

    /// One scheduler tick: one command pop, three speech services, the
    /// alternating POKEY (odd) or FM (even) update, a fourth speech service.
    pub fn tick<H: SoundHardware>(&mut self, hw: &mut H) {
        if let Some(cmd) = self.ingress.pop() {
            self.dispatch_command(cmd, hw);
        }

        self.speech_update(hw);
        self.speech_update(hw);
        self.speech_update(hw);

        if self.tick_count & 1 == 1 {
            self.pokey_update(hw);
        } else {
            self.fm_update(hw);
        }

        self.speech_update(hw);

        self.step_poly_counter();
        self.tick_count = self.tick_count.wrapping_add(1);

        self.drain_queued_commands(hw);
    }

    /// Read-only host status byte (coin bits 0..=3 are external).
    pub fn status_byte(&self) -> u8 {
        let mut status = status_bits::SELF_TEST;

        if !self.playback.active {
            status |= status_bits::SPEECH_READY;
        }
        if self.ingress.is_full() {
            status |= status_bits::SOUND_BUFFER_FULL;
        }
        if !self.egress.is_empty() {
            status |= status_bits::OUTPUT_BUFFER_FULL;
        }

        status
    }

    pub fn error_flags(&self) -> u8 {
        self.errors.as_u8()
    }

    /// Reads one byte from the engine-to-host latch.
    pub fn take_host_output(&mut self) -> Option<u8> {
        self.egress.pop()
    }

    pub fn live_channel_count(&self) -> usize {
        self.channels.live_indices().count()
    }

    pub fn set_music_filter_threshold(&mut self, threshold: u8) {
        self.music_filter_threshold = threshold;
    }

    /// Tears one channel down: unlink, silence its hardware slot, free it.
    pub(crate) fn terminate_channel<H: SoundHardware>(&mut self, index: usize, hw: &mut H) {
        if self.channels.channels[index].status == 0 {
            return;
        }

        let hint = self.channels.channels[index].hint;

        self.channels.unlink_active(index);
        self.channels.release(index);

        if (FIRST_PSG_HINT..FIRST_PSG_HINT + 4).contains(&hint) {
            hw.psg_write(psg_registers::audc(hint - FIRST_PSG_HINT), 0);
        } else if (FIRST_FM_HINT..FIRST_PSG_HINT).contains(&hint) {
            self.fm_silence_channel(hint, hw);
        }
    }

    fn drain_queued_commands<H: SoundHardware>(&mut self, hw: &mut H) {
        let mut budget = QUEUED_COMMAND_BUDGET;

        while budget > 0 && !self.queued_commands.is_empty() {
            let cmd = self.queued_commands.remove(0);
            self.dispatch_command(cmd, hw);
            budget -= 1;
        }

        self.queued_commands.clear();
    }

    /// 17-bit polynomial counter standing in for the PSG random register.
    fn step_poly_counter(&mut self) {
        let p = self.poly_counter;
        let bit = ((p >> 16) ^ (p >> 11) ^ 1) & 1;
        self.poly_counter = ((p << 1) | bit) & 0x1ffff;
    }

    #[cfg(test)]
    pub(crate) fn check_partition(&self) -> bool {
        self.channels.check_partition()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::driver_constants::{encode_priority, CMD_FADING, CMD_FINISHED};
    use crate::hardware::{RegisterWrite, TraceHardware};
    use crate::test_rom::RomBuilder;

    /// Simple PSG sequence: tempo, volume, one long sustained note.
    const PSG_SEQ: [u8; 9] = [0x80, 0x40, 0x82, 0x0f, 0x90, 0x00, 0x46, 0x81, 0xbb];
    /// FM flavour: switches hardware type first.
    const FM_SEQ: [u8; 9] = [0x80, 0x40, 0x82, 0x0f, 0x91, 0x00, 0x46, 0x81, 0xbb];

    fn engine_with(b: RomBuilder) -> SoundEngine {
        SoundEngine::new(b.build())
    }

    fn run_ticks(engine: &mut SoundEngine, hw: &mut TraceHardware, n: u32) {
        for _ in 0..n {
            engine.tick(hw);
        }
    }

    fn builder_with_durations() -> RomBuilder {
        let mut b = RomBuilder::new();
        b.set_duration(1, 0x4000);
        b
    }

    #[test]
    fn test_chain_expansion_allocates_two_channels() {
        let mut b = builder_with_durations();
        let seq = b.add_table(&PSG_SEQ);
        b.add_sfx_chain(0x0d, 0xff, &[(8, 8, seq), (8, 9, seq)]);

        let mut engine = engine_with(b);
        let mut hw = TraceHardware::new();

        engine.push_command(0x0d, &mut hw);
        run_ticks(&mut engine, &mut hw, 2);

        assert_eq!(engine.live_channel_count(), 2);
        for i in engine.channels.live_indices().collect::<Vec<_>>() {
            assert_eq!(engine.channels.channels[i].status, encode_priority(8));
        }
        assert!(engine.check_partition());
    }

    #[test]
    fn test_play_then_stop_returns_channels_to_free_list() {
        let mut b = builder_with_durations();
        let seq = b.add_table(&PSG_SEQ);
        b.add_sfx_command(0x10, 0x00, 8, 8, seq, &[]);
        b.set_handler(0x20, 5, 0x10);

        let mut engine = engine_with(b);
        let mut hw = TraceHardware::new();

        engine.push_command(0x10, &mut hw);
        run_ticks(&mut engine, &mut hw, 2);
        assert_eq!(engine.live_channel_count(), 1);

        engine.push_command(0x20, &mut hw);
        run_ticks(&mut engine, &mut hw, 4);
        assert_eq!(engine.live_channel_count(), 0);
        assert_eq!(engine.channels.free_count(), 30);

        // Repeated stop is a no-op.
        engine.push_command(0x20, &mut hw);
        run_ticks(&mut engine, &mut hw, 2);
        assert!(engine.check_partition());
    }

    #[test]
    fn test_duplicate_check_blocks_second_allocation() {
        let mut b = builder_with_durations();
        let seq = b.add_table(&PSG_SEQ);
        b.add_sfx_command(0x11, 0x00, 8, 8, seq, &[]);

        let mut engine = engine_with(b);
        let mut hw = TraceHardware::new();

        engine.push_command(0x11, &mut hw);
        run_ticks(&mut engine, &mut hw, 2);
        engine.push_command(0x11, &mut hw);
        run_ticks(&mut engine, &mut hw, 2);

        assert_eq!(engine.live_channel_count(), 1);
    }

    #[test]
    fn test_theme_song_fade_and_rearm() {
        let mut b = builder_with_durations();
        let psg = b.add_table(&PSG_SEQ);
        let fm = b.add_table(&FM_SEQ);

        let chain: Vec<(u8, u8, u16)> = (0..8)
            .map(|i| {
                let hint = 4 + i;
                (8, hint, if hint < 8 { fm } else { psg })
            })
            .collect();
        b.add_sfx_chain(0x3b, 0xff, &chain);
        b.set_handler(0x3c, 9, 0x3b);

        let mut engine = engine_with(b);
        let mut hw = TraceHardware::new();

        engine.push_command(0x3b, &mut hw);
        run_ticks(&mut engine, &mut hw, 4);
        assert_eq!(engine.live_channel_count(), 8);

        engine.push_command(0x3c, &mut hw);
        run_ticks(&mut engine, &mut hw, 2);
        let fading = engine
            .channels
            .live_indices()
            .filter(|&i| engine.channels.channels[i].active_command == CMD_FADING)
            .count();
        assert_eq!(fading, 8);

        // The decay envelopes run the channels down to silence.
        run_ticks(&mut engine, &mut hw, 120);
        assert_eq!(engine.live_channel_count(), 0);
        assert_eq!(engine.channels.free_count(), 30);

        // A fresh allocation succeeds afterwards.
        engine.push_command(0x3b, &mut hw);
        run_ticks(&mut engine, &mut hw, 4);
        assert_eq!(engine.live_channel_count(), 8);
    }

    #[test]
    fn test_preemption_by_priority() {
        let mut b = builder_with_durations();
        let seq = b.add_table(&PSG_SEQ);
        b.add_sfx_command(0x30, 0xff, 15, 8, seq, &[]);
        b.add_sfx_command(0x31, 0xff, 8, 8, seq, &[]);

        let mut engine = engine_with(b);
        let mut hw = TraceHardware::new();

        // Saturate all 30 channels at the maximum encoded priority.
        for _ in 0..30 {
            engine.push_command(0x30, &mut hw);
            engine.tick(&mut hw);
        }
        assert_eq!(engine.live_channel_count(), 30);
        assert_eq!(engine.channels.free_count(), 0);

        // A lower-priority allocation is silently dropped.
        engine.push_command(0x31, &mut hw);
        run_ticks(&mut engine, &mut hw, 2);
        assert_eq!(engine.live_channel_count(), 30);
        assert!(engine
            .channels
            .live_indices()
            .all(|i| engine.channels.channels[i].status == encode_priority(15)));

        assert!(engine.check_partition());
    }

    #[test]
    fn test_preemption_replaces_lowest_priority() {
        let mut b = builder_with_durations();
        let seq = b.add_table(&PSG_SEQ);
        b.add_sfx_command(0x30, 0xff, 8, 8, seq, &[]);
        b.add_sfx_command(0x31, 0xff, 15, 8, seq, &[]);

        let mut engine = engine_with(b);
        let mut hw = TraceHardware::new();

        for _ in 0..30 {
            engine.push_command(0x30, &mut hw);
            engine.tick(&mut hw);
        }
        assert_eq!(engine.channels.free_count(), 0);

        engine.push_command(0x31, &mut hw);
        run_ticks(&mut engine, &mut hw, 2);

        assert_eq!(engine.live_channel_count(), 30);
        let preempted = engine
            .channels
            .live_indices()
            .filter(|&i| engine.channels.channels[i].active_command == 0x31)
            .count();
        assert_eq!(preempted, 1);
        assert!(engine.check_partition());
    }

    #[test]
    fn test_speech_streams_exact_length() {
        let mut b = RomBuilder::new();
        b.add_speech_command(0x5a, 0xbee9, 0x012b);
        b.fill_speech_data(0xbee9, 0x012b);

        let mut engine = engine_with(b);
        let mut hw = TraceHardware::new();

        engine.push_command(0x5a, &mut hw);

        // 4 bytes per tick once active; 299 bytes need ~75 ticks.
        run_ticks(&mut engine, &mut hw, 80);

        assert_eq!(hw.speech_bytes().count(), 0x012b);
        assert!(!engine.playback.active);
        assert!(engine.status_byte() & status_bits::SPEECH_READY != 0);
    }

    #[test]
    fn test_speech_gated_by_ready_predicate() {
        let mut b = RomBuilder::new();
        b.add_speech_command(0x5a, 0x9000, 16);
        b.fill_speech_data(0x9000, 16);

        let mut engine = engine_with(b);
        let mut hw = TraceHardware::new();
        hw.speech_ready = false;

        engine.push_command(0x5a, &mut hw);
        run_ticks(&mut engine, &mut hw, 10);
        assert_eq!(hw.speech_bytes().count(), 0);
        assert!(engine.playback.active);

        hw.speech_ready = true;
        run_ticks(&mut engine, &mut hw, 10);
        assert_eq!(hw.speech_bytes().count(), 16);
    }

    #[test]
    fn test_second_music_command_is_queued_then_played() {
        let mut b = RomBuilder::new();
        b.add_speech_command(0x04, 0x9000, 8);
        b.fill_speech_data(0x9000, 8);

        let mut engine = engine_with(b);
        let mut hw = TraceHardware::new();

        engine.push_command(0x04, &mut hw);
        engine.tick(&mut hw);
        assert!(engine.playback.active);

        engine.push_command(0x04, &mut hw);
        engine.tick(&mut hw);
        assert_eq!(engine.speech_queue.len(), 1);

        run_ticks(&mut engine, &mut hw, 10);
        assert_eq!(hw.speech_bytes().count(), 16);
        assert!(!engine.playback.active);
    }

    #[test]
    fn test_submitted_command_dispatches_at_tick_end() {
        let mut b = builder_with_durations();
        let target = b.add_table(&PSG_SEQ);
        // Submits command 0x11 from the sequence, then plays its own note.
        let seq = b.add_table(&[0x80, 0x40, 0x82, 0x0f, 0x90, 0x00, 0x9a, 0x11, 0x46, 0x81, 0xbb]);
        b.add_sfx_command(0x10, 0xff, 8, 8, seq, &[]);
        b.add_sfx_command(0x11, 0xff, 8, 9, target, &[]);

        let mut engine = engine_with(b);
        let mut hw = TraceHardware::new();

        engine.push_command(0x10, &mut hw);
        engine.tick(&mut hw);
        assert_eq!(engine.live_channel_count(), 1);

        // The PSG update runs 0x9a; the submitted command is routed at the
        // tail of the same tick, after the hardware update.
        engine.tick(&mut hw);
        assert_eq!(engine.live_channel_count(), 2);

        let i = engine
            .channels
            .live_indices()
            .find(|&i| engine.channels.channels[i].active_command == 0x11)
            .unwrap();

        // Freshly allocated: this tick's update did not advance it.
        assert_eq!(engine.channels.channels[i].note, 0);
        assert_eq!(engine.channels.channels[i].tempo, 0);

        // Its group's next tick reads the sequence.
        engine.tick(&mut hw);
        engine.tick(&mut hw);
        assert_eq!(engine.channels.channels[i].note, 0x46);
        assert!(engine.check_partition());
    }

    #[test]
    fn test_mixer_command_recomposes_fields() {
        let mut b = RomBuilder::new();
        b.set_handler(0xd7, 13, 0b101_10_011);

        let mut engine = engine_with(b);
        let mut hw = TraceHardware::new();

        engine.push_command(0xd7, &mut hw);
        engine.tick(&mut hw);

        let mixer: Vec<u8> = hw
            .writes
            .iter()
            .filter_map(|w| match w {
                RegisterWrite::Mixer { value } => Some(*value),
                _ => None,
            })
            .collect();
        assert_eq!(mixer, vec![0b101_10_011]);
    }

    #[test]
    fn test_invalid_commands_are_ignored() {
        let b = RomBuilder::new();
        let mut engine = engine_with(b);
        let mut hw = TraceHardware::new();

        // Out of range and handler-type 0xff commands.
        engine.push_command(0xdb, &mut hw);
        engine.push_command(0x03, &mut hw);
        run_ticks(&mut engine, &mut hw, 4);

        assert_eq!(engine.live_channel_count(), 0);
        assert_eq!(engine.error_flags(), 0);
        assert!(hw.writes.is_empty());
    }

    #[test]
    fn test_stop_all_flushes_everything() {
        let mut b = builder_with_durations();
        let seq = b.add_table(&PSG_SEQ);
        b.add_sfx_command(0x10, 0xff, 8, 8, seq, &[]);
        b.set_handler(0x00, 3, 0);
        b.add_speech_command(0x04, 0x9100, 64);
        b.fill_speech_data(0x9100, 64);

        let mut engine = engine_with(b);
        let mut hw = TraceHardware::new();

        engine.push_command(0x10, &mut hw);
        engine.push_command(0x04, &mut hw);
        run_ticks(&mut engine, &mut hw, 4);
        assert_eq!(engine.live_channel_count(), 1);
        assert!(engine.playback.active);

        engine.push_command(0x00, &mut hw);
        run_ticks(&mut engine, &mut hw, 1);

        assert_eq!(engine.live_channel_count(), 0);
        assert!(!engine.playback.active);
        assert!(hw
            .writes
            .iter()
            .any(|w| matches!(w, RegisterWrite::SpeechReset)));
        assert!(engine.check_partition());
    }

    #[test]
    fn test_immediate_class_bypasses_queue() {
        let mut b = RomBuilder::new();
        b.set_handler(0xd0, 13, 0x07);
        b.set_nmi_class(0xd0, 1);

        let mut engine = engine_with(b);
        let mut hw = TraceHardware::new();

        // No tick needed: the mixer write happens on ingress.
        engine.push_command(0xd0, &mut hw);
        assert!(hw
            .writes
            .iter()
            .any(|w| matches!(w, RegisterWrite::Mixer { value: 0x07 })));
    }

    #[test]
    fn test_psg_note_reaches_the_chip() {
        let mut b = builder_with_durations();
        let seq = b.add_table(&PSG_SEQ);
        b.add_sfx_command(0x10, 0xff, 8, 8, seq, &[]);

        let mut engine = engine_with(b);
        let mut hw = TraceHardware::new();

        engine.push_command(0x10, &mut hw);
        run_ticks(&mut engine, &mut hw, 4);

        let expected_freq = engine.rom.psg_frequency(0x46);
        assert!(hw
            .psg_writes()
            .any(|(r, v)| r == psg_registers::audf(0) && v == expected_freq));

        // The sustained note holds full volume with the initial distortion.
        assert!(hw
            .psg_writes()
            .any(|(r, v)| r == psg_registers::audc(0) && v == 0xa0 | 0x0f));
    }

    #[test]
    fn test_fm_note_emits_key_on() {
        let mut b = builder_with_durations();
        let seq = b.add_table(&FM_SEQ);
        b.add_sfx_command(0x12, 0xff, 8, 5, seq, &[]);

        let mut engine = engine_with(b);
        let mut hw = TraceHardware::new();

        engine.push_command(0x12, &mut hw);
        run_ticks(&mut engine, &mut hw, 3);

        assert!(hw.writes.iter().any(|w| matches!(
            w,
            RegisterWrite::Fm {
                register: 0x08,
                value: v
            } if *v == 0x78 | 5
        )));

        // Key code register carries the FM frequency of the note.
        let expected = engine.rom.fm_frequency(0x46);
        assert!(hw.writes.iter().any(|w| matches!(
            w,
            RegisterWrite::Fm {
                register: 0x2d, // 0x28 + channel 5
                value: v
            } if *v == (expected >> 8) as u8
        )));
    }

    #[test]
    fn test_egress_output_and_status_bit() {
        let mut b = RomBuilder::new();
        b.set_handler(0x40, 8, 0x99);

        let mut engine = engine_with(b);
        let mut hw = TraceHardware::new();

        assert_eq!(engine.status_byte() & status_bits::OUTPUT_BUFFER_FULL, 0);

        engine.push_command(0x40, &mut hw);
        engine.tick(&mut hw);

        assert_ne!(engine.status_byte() & status_bits::OUTPUT_BUFFER_FULL, 0);
        assert_eq!(engine.take_host_output(), Some(0x99));
        assert_eq!(engine.take_host_output(), None);
    }

    #[test]
    fn test_ingress_full_bit() {
        let b = RomBuilder::new();
        let mut engine = engine_with(b);
        let mut hw = TraceHardware::new();

        for _ in 0..15 {
            engine.push_command(0x03, &mut hw);
        }
        assert_ne!(engine.status_byte() & status_bits::SOUND_BUFFER_FULL, 0);

        engine.tick(&mut hw);
        assert_eq!(engine.status_byte() & status_bits::SOUND_BUFFER_FULL, 0);
    }

    #[test]
    fn test_parameter_preshift_falls_through_to_allocator() {
        let mut b = builder_with_durations();
        let seq = b.add_table(&PSG_SEQ);
        // Claims sfx param slot 0, so a pre-shifted 0 routes to it too.
        b.add_sfx_command(0x50, 0xff, 8, 8, seq, &[]);
        b.set_handler(0x51, 0, 0x00);

        let mut engine = engine_with(b);
        let mut hw = TraceHardware::new();

        engine.push_command(0x51, &mut hw);
        run_ticks(&mut engine, &mut hw, 2);

        assert_eq!(engine.live_channel_count(), 1);
        let i = engine.channels.live_indices().next().unwrap();
        assert_eq!(engine.channels.channels[i].active_command, 0x51);
    }

    #[test]
    fn test_fm_busy_timeout_is_recorded() {
        let mut b = builder_with_durations();
        let seq = b.add_table(&FM_SEQ);
        b.add_sfx_command(0x12, 0xff, 8, 5, seq, &[]);

        let mut engine = engine_with(b);
        let mut hw = TraceHardware::new();
        hw.fm_ready = false;

        engine.push_command(0x12, &mut hw);
        run_ticks(&mut engine, &mut hw, 2);

        use crate::driver_constants::error_bits;
        assert_ne!(engine.error_flags() & error_bits::FM_TIMEOUT, 0);
        // The writes still went through.
        assert!(hw
            .writes
            .iter()
            .any(|w| matches!(w, RegisterWrite::Fm { .. })));
    }

    #[test]
    fn test_lower_priority_speech_is_dropped() {
        let mut b = RomBuilder::new();
        b.add_speech_command_with_flags(0x60, 0x9000, 64, 0x05);
        b.add_speech_command_with_flags(0x61, 0x9100, 64, 0x02);
        b.add_speech_command_with_flags(0x62, 0x9200, 64, 0x09);
        b.fill_speech_data(0x9000, 64);
        b.fill_speech_data(0x9100, 64);
        b.fill_speech_data(0x9200, 64);

        let mut engine = engine_with(b);
        let mut hw = TraceHardware::new();

        engine.push_command(0x60, &mut hw);
        engine.tick(&mut hw);
        assert!(engine.playback.active);

        // Lower priority: dropped.
        engine.push_command(0x61, &mut hw);
        engine.tick(&mut hw);
        assert_eq!(engine.speech_queue.len(), 0);

        // Equal priority appends.
        engine.push_command(0x60, &mut hw);
        engine.tick(&mut hw);
        assert_eq!(engine.speech_queue.len(), 1);

        // Higher priority flushes the queued entry; playback continues.
        engine.push_command(0x62, &mut hw);
        engine.tick(&mut hw);
        assert_eq!(engine.speech_queue.len(), 1);
        assert_eq!(engine.speech_queue.current_priority(), 9);
        assert!(engine.playback.active);
    }

    #[test]
    fn test_squeak_flag_writes_pitch_port() {
        let mut b = RomBuilder::new();
        let param = b.add_speech_command_with_flags(0x63, 0x9000, 16, 0x85);
        b.fill_speech_data(0x9000, 16);
        b.write(
            crate::driver_constants::addresses::MUSIC_TEMPO_TABLE + u16::from(param),
            &[0x2c],
        );

        let mut engine = engine_with(b);
        let mut hw = TraceHardware::new();

        engine.push_command(0x63, &mut hw);
        engine.tick(&mut hw);

        assert!(hw
            .writes
            .iter()
            .any(|w| matches!(w, RegisterWrite::SpeechPitch { value: 0x2c })));
    }

    #[test]
    fn test_live_sequence_pointers_stay_in_rom() {
        let mut b = builder_with_durations();
        let psg = b.add_table(&PSG_SEQ);
        let fm = b.add_table(&FM_SEQ);
        b.add_sfx_chain(0x3b, 0xff, &[(8, 4, fm), (8, 8, psg), (8, 11, psg)]);

        let mut engine = engine_with(b);
        let mut hw = TraceHardware::new();

        engine.push_command(0x3b, &mut hw);
        for _ in 0..50 {
            engine.tick(&mut hw);
            for i in engine.channels.live_indices().collect::<Vec<_>>() {
                assert!(engine.rom.contains(engine.channels.channels[i].seq_ptr));
            }
            assert!(engine.check_partition());
        }
    }

    #[test]
    fn test_natural_end_frees_channel() {
        let mut b = RomBuilder::new();
        b.set_duration(1, 0x0008);
        // Short note, then end of sequence.
        let seq = b.add_table(&[0x80, 0x20, 0x90, 0x00, 0x46, 0x01, 0xbb]);
        b.add_sfx_command(0x10, 0xff, 8, 8, seq, &[]);

        let mut engine = engine_with(b);
        let mut hw = TraceHardware::new();

        engine.push_command(0x10, &mut hw);
        run_ticks(&mut engine, &mut hw, 12);

        assert_eq!(engine.live_channel_count(), 0);
        assert_eq!(
            engine.channels.channels.iter().filter(|c| c.active_command == CMD_FINISHED).count(),
            30
        );

        // The dying channel wrote silence to its voice.
        assert!(hw
            .psg_writes()
            .any(|(r, v)| r == psg_registers::audc(0) && v == 0));
    }
}
