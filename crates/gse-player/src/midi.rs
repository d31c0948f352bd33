//! Standard MIDI File export of sequence commands

// SPDX-FileCopyrightText: © 2025 Marcus Rowe <undisbeliever@gmail.com>
//
// SPDX-License-Identifier: MIT

use engine::bytecode::{note_flags, opcodes};
use engine::disasm::{Frame, Instruction, Note};
use engine::time;
use engine::SoundRom;

const TICKS_PER_BEAT: u32 = 480;
/// 120 BPM = 500000 us per beat = 2 beats per second.
const BEATS_PER_SECOND: f64 = 2.0;

/// A note or rest with absolute timing.
pub struct TimedEvent {
    pub time: f64,
    pub duration: f64,
    /// Raw note byte (0 = rest).
    pub note: u8,
    /// Index into the duration table.
    pub duration_index: u8,
    pub midi_note: Option<u8>,
    pub sustain: bool,
}

/// Walks a disassembled channel, tracking tempo changes, and produces the
/// channel's absolute-time note list.
pub fn build_timeline(rom: &SoundRom, instructions: &[Instruction]) -> Vec<TimedEvent> {
    let mut tempo: u8 = 0;
    let mut cursor = 0.0;
    let mut events = Vec::new();

    for inst in instructions {
        match &inst.frame {
            Frame::Opcode { opcode, args } if *opcode == opcodes::SET_TEMPO => {
                tempo = args.first().copied().unwrap_or(0) >> 2;
            }
            Frame::Opcode { opcode, args } if *opcode == opcodes::ADD_TEMPO => {
                tempo = tempo.wrapping_add(args.first().copied().unwrap_or(0));
            }
            Frame::Note { note, duration } => {
                let index = duration & note_flags::DURATION_MASK;
                let dotted = duration & note_flags::DOTTED != 0;
                let sustain = duration & note_flags::SUSTAIN != 0;

                let base = if index == 0 { 0 } else { rom.duration(index) };
                let seconds = time::note_seconds(base, dotted, tempo);

                events.push(TimedEvent {
                    time: cursor,
                    duration: seconds,
                    note: *note,
                    duration_index: index,
                    midi_note: Note::try_from(*note).ok().and_then(|n| n.midi_note()),
                    sustain,
                });

                cursor += seconds;
            }
            _ => (),
        }
    }

    events
}

fn varlen(value: u32) -> Vec<u8> {
    let mut out = vec![(value & 0x7f) as u8];
    let mut value = value >> 7;
    while value > 0 {
        out.push(((value & 0x7f) | 0x80) as u8);
        value >>= 7;
    }
    out.reverse();
    out
}

/// One MTrk chunk from (absolute tick, event bytes) pairs.
fn track_chunk(mut events: Vec<(u32, Vec<u8>)>) -> Vec<u8> {
    events.sort_by_key(|e| e.0);

    let mut data = Vec::new();
    let mut prev = 0;
    for (tick, bytes) in events {
        data.extend(varlen(tick.saturating_sub(prev)));
        data.extend(bytes);
        prev = tick;
    }
    // End of track
    data.extend(varlen(0));
    data.extend([0xff, 0x2f, 0x00]);

    let mut chunk = b"MTrk".to_vec();
    chunk.extend((data.len() as u32).to_be_bytes());
    chunk.extend(data);
    chunk
}

fn to_tick(seconds: f64) -> u32 {
    (seconds * f64::from(TICKS_PER_BEAT) * BEATS_PER_SECOND) as u32
}

/// Builds a Type 1 SMF: a tempo track plus one track per channel.  Sustained
/// notes extend to the start of the channel's next note, or to the end of the
/// longest channel.
pub fn write_midi(timelines: &[Vec<TimedEvent>]) -> Vec<u8> {
    let song_end = timelines
        .iter()
        .flatten()
        .map(|e| e.time + e.duration)
        .fold(0.0, f64::max);

    let mut out = b"MThd".to_vec();
    out.extend(6u32.to_be_bytes());
    out.extend(1u16.to_be_bytes());
    out.extend((timelines.len() as u16 + 1).to_be_bytes());
    out.extend((TICKS_PER_BEAT as u16).to_be_bytes());

    // Track 0: tempo meta event, 120 BPM.
    out.extend(track_chunk(vec![(
        0,
        vec![0xff, 0x51, 0x03, 0x07, 0xa1, 0x20],
    )]));

    for (channel_index, timeline) in timelines.iter().enumerate() {
        // MIDI channel 9 is percussion; skip over it.
        let midi_channel = match channel_index {
            c if c < 9 => c as u8,
            c if c < 15 => c as u8 + 1,
            _ => 15,
        };

        let notes: Vec<&TimedEvent> = timeline.iter().filter(|e| e.midi_note.is_some()).collect();

        let mut events = Vec::new();
        for (i, event) in notes.iter().enumerate() {
            let note = event.midi_note.unwrap_or(0).min(127);
            let start = to_tick(event.time);

            let end_time = if event.sustain {
                match notes.get(i + 1) {
                    Some(next) => next.time,
                    None => song_end,
                }
            } else {
                event.time + event.duration
            };
            let end = to_tick(end_time).max(start + 1);

            events.push((start, vec![0x90 | midi_channel, note, 100]));
            events.push((end, vec![0x80 | midi_channel, note, 0]));
        }

        out.extend(track_chunk(events));
    }

    out
}
