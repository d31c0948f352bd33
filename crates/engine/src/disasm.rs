//! Sequence disassembler

// SPDX-FileCopyrightText: © 2025 Marcus Rowe <undisbeliever@gmail.com>
//
// SPDX-License-Identifier: MIT

use crate::bytecode::{self, note_flags, opcodes, FIRST_END_BYTE, FIRST_OPCODE};
use crate::driver_constants::{MAX_CHAIN_CHANNELS, N_CHANNELS};
use crate::errors::ValueError;
use crate::rom::{SoundRom, HANDLER_TYPE_MUSIC, HANDLER_TYPE_SFX};
use crate::value_newtypes::u8_value_newtype;

use std::collections::HashSet;

u8_value_newtype!(Note, NoteOutOfRange, 0, 0x7f);

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

pub const DURATION_NAMES: [&str; 16] = [
    "rest",
    "whole",
    "half",
    "quarter",
    "eighth",
    "dotted-half",
    "dotted-quarter",
    "dotted-eighth",
    "triplet",
    "sixteenth",
    "32nd",
    "64th",
    "128th",
    "dotted-16th",
    "dotted-32nd",
    "triplet-quarter",
];

impl Note {
    /// Musical name; note 0 is a rest.  The chromatic mapping puts A4 (440 Hz)
    /// at note value 0x46 (MIDI note = value - 1).
    pub fn name(&self) -> Option<String> {
        if self.as_u8() == 0 {
            return None;
        }
        let midi = u32::from(self.as_u8()) - 1;
        let octave = (midi / 12) as i32 - 1;

        Some(format!("{}{}", NOTE_NAMES[(midi % 12) as usize], octave))
    }

    pub fn midi_note(&self) -> Option<u8> {
        match self.as_u8() {
            0 => None,
            n => Some(n - 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Note { note: u8, duration: u8 },
    /// byte1 = 0: pop the pushed segment (or end the sequence).
    Chain,
    Opcode { opcode: u8, args: Vec<u8> },
    End { byte: u8 },
    /// Segment boundary or disassembly guard annotation.
    Marker(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub addr: u16,
    pub frame: Frame,
}

/// One channel of a resolved command.
#[derive(Debug, Clone)]
pub struct ChannelEntry {
    pub offset: u8,
    pub priority: u8,
    pub hint: u8,
    pub seq_ptr: u16,
}

/// A command resolved against the dispatch and metadata tables.
#[derive(Debug, Clone)]
pub struct CommandInfo {
    pub cmd: u8,
    pub handler_type: u8,
    pub param: u8,
    pub channels: Vec<ChannelEntry>,
    /// (pointer, length) of the LPC stream for music/speech commands.
    pub speech: Option<(u16, u16)>,
}

pub fn handler_type_name(handler_type: u8) -> &'static str {
    match handler_type {
        0 => "Parameter Shift",
        1 => "Set Variable",
        2 => "Add to Variable",
        3 => "Jump Table Dispatch",
        4 => "Kill by Status",
        5 => "Stop Sound",
        6 => "Stop Chain",
        7 => "PSG SFX",
        8 => "Output Buffer Queue",
        9 => "Fade Out Sound",
        10 => "Fade Out by Status",
        11 => "Music/Speech",
        12 => "Channel Control",
        13 => "Control Register",
        14 => "Null Handler",
        0xff => "Invalid/Unused",
        _ => "Unknown",
    }
}

/// Resolves a command byte to its handler and sequence data.
pub fn resolve_command(rom: &SoundRom, cmd: u8) -> Option<CommandInfo> {
    if cmd > 0xda {
        return None;
    }

    let handler_type = rom.handler_type(cmd);
    let param = rom.command_param(cmd);

    let mut info = CommandInfo {
        cmd,
        handler_type,
        param,
        channels: Vec::new(),
        speech: None,
    };

    match handler_type {
        HANDLER_TYPE_SFX => {
            let mut offset = rom.sfx_offset(param);
            let mut seen = HashSet::new();

            while offset != 0 && seen.insert(offset) && info.channels.len() < N_CHANNELS {
                info.channels.push(ChannelEntry {
                    offset,
                    priority: rom.sfx_priority(offset),
                    hint: rom.sfx_hint(offset),
                    seq_ptr: rom.sfx_seq_ptr(offset, rom.sfx_priority(offset) & 0x80 != 0),
                });
                offset = rom.sfx_next(offset);
            }
        }
        HANDLER_TYPE_MUSIC => {
            let index = rom.music_index(param);
            info.speech = Some((rom.music_seq_ptr(index), rom.music_seq_len(index)));
        }
        _ => (),
    }

    Some(info)
}

const MAX_INSTRUCTIONS: usize = 1024;

/// Disassembles a sequence, following segment calls (PUSH_SEQ) and jumps
/// (SET_SEQ_PTR).  Stops at end markers, on an empty return stack at a chain
/// frame, or when a segment is reached a second time.
pub fn disassemble_sequence(rom: &SoundRom, start: u16) -> Vec<Instruction> {
    let mut instructions = Vec::new();
    let mut return_stack: Vec<u16> = Vec::new();
    let mut visited_segments = HashSet::from([start]);
    let mut visited_addrs = HashSet::new();
    let mut addr = start;

    let marker = |addr: u16, text: String| Instruction {
        addr,
        frame: Frame::Marker(text),
    };

    while instructions.len() < MAX_INSTRUCTIONS {
        if !rom.contains(addr) {
            instructions.push(marker(addr, "out of ROM range".to_owned()));
            break;
        }
        if !visited_addrs.insert(addr) {
            instructions.push(marker(addr, format!("loop to ${:04x}", addr)));
            break;
        }

        let byte0 = rom.read_byte(addr);

        if byte0 >= FIRST_END_BYTE {
            instructions.push(Instruction {
                addr,
                frame: Frame::End { byte: byte0 },
            });
            break;
        }

        if byte0 < FIRST_OPCODE {
            let byte1 = rom.read_byte(addr.wrapping_add(1));

            if byte1 == 0 {
                instructions.push(Instruction {
                    addr,
                    frame: Frame::Chain,
                });
                match return_stack.pop() {
                    Some(ret) => {
                        instructions.push(marker(ret, format!("returning to ${:04x}", ret)));
                        addr = ret;
                        continue;
                    }
                    None => break,
                }
            }

            instructions.push(Instruction {
                addr,
                frame: Frame::Note {
                    note: byte0,
                    duration: byte1,
                },
            });
            addr = addr.wrapping_add(2);
            continue;
        }

        let arg_bytes = bytecode::opcode_arg_bytes(byte0);
        let args: Vec<u8> = (0..arg_bytes)
            .map(|i| rom.read_byte(addr.wrapping_add(1 + u16::from(i))))
            .collect();

        instructions.push(Instruction {
            addr,
            frame: Frame::Opcode {
                opcode: byte0,
                args: args.clone(),
            },
        });

        match byte0 {
            opcodes::PUSH_SEQ => {
                let target = u16::from_le_bytes([args[0], args[1]]);
                let after = addr.wrapping_add(3);

                if !rom.contains(target) {
                    instructions.push(marker(target, "segment outside ROM".to_owned()));
                    addr = after;
                } else if !visited_segments.insert(target) {
                    instructions.push(marker(target, "segment already shown".to_owned()));
                    addr = after;
                } else {
                    return_stack.push(after);
                    instructions.push(marker(target, format!("segment ${:04x}", target)));
                    addr = target;
                }
            }
            opcodes::SET_SEQ_PTR => {
                let target = u16::from_le_bytes([args[0], args[1]]);

                if !rom.contains(target) {
                    instructions.push(marker(target, "jump outside ROM".to_owned()));
                    break;
                }
                if !visited_segments.insert(target) {
                    instructions.push(marker(target, format!("loop to ${:04x}", target)));
                    break;
                }
                addr = target;
            }
            _ => addr = addr.wrapping_add(1 + u16::from(arg_bytes)),
        }
    }

    instructions
}

/// Every channel of an SFX command disassembled, capped at the chain limit.
pub fn disassemble_command(rom: &SoundRom, info: &CommandInfo) -> Vec<Vec<Instruction>> {
    info.channels
        .iter()
        .take(MAX_CHAIN_CHANNELS)
        .map(|ch| disassemble_sequence(rom, ch.seq_ptr))
        .collect()
}

/// Text rendering of one instruction, `$addr: bytes  MNEMONIC operands`.
pub fn format_instruction(inst: &Instruction) -> String {
    match &inst.frame {
        Frame::Marker(text) => format!("  --- {} ---", text),
        Frame::End { byte } => format!("  ${:04x}:  {:02x}     END", inst.addr, byte),
        Frame::Chain => format!("  ${:04x}:  00 00  CHAIN", inst.addr),
        Frame::Note { note, duration } => {
            let name = match Note::try_from(*note).ok().and_then(|n| n.name()) {
                Some(n) => n,
                None => "---".to_owned(),
            };
            let mut flags = String::new();
            if duration & note_flags::DOTTED != 0 {
                flags.push_str(" dotted");
            }
            if duration & note_flags::SUSTAIN != 0 {
                flags.push_str(" sustain");
            }
            format!(
                "  ${:04x}:  {:02x} {:02x}  {} {}, {}{}",
                inst.addr,
                note,
                duration,
                if *note == 0 { "REST" } else { "NOTE" },
                name,
                DURATION_NAMES[usize::from(duration & note_flags::DURATION_MASK)],
                flags,
            )
        }
        Frame::Opcode { opcode, args } => {
            let bytes: Vec<String> = std::iter::once(*opcode)
                .chain(args.iter().copied())
                .map(|b| format!("{:02x}", b))
                .collect();
            let operands: Vec<String> = args.iter().map(|a| format!("${:02x}", a)).collect();
            format!(
                "  ${:04x}:  {:<11}  {} {}",
                inst.addr,
                bytes.join(" "),
                bytecode::opcode_name(*opcode),
                operands.join(", "),
            )
        }
    }
}
