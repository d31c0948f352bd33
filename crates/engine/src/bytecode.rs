//! Sequence bytecode definitions

// SPDX-FileCopyrightText: © 2025 Marcus Rowe <undisbeliever@gmail.com>
//
// SPDX-License-Identifier: MIT

/// First opcode byte.  Bytes below it are note/rest frames.
pub const FIRST_OPCODE: u8 = 0x80;
/// Last opcode byte.  Bytes above it end the sequence.
pub const LAST_OPCODE: u8 = 0xba;
/// First end-of-sequence byte.
pub const FIRST_END_BYTE: u8 = 0xbb;

pub const N_OPCODES: usize = (LAST_OPCODE - FIRST_OPCODE + 1) as usize;

// Using lower case to match the sound ROM's internal labels.
pub mod opcodes {
    pub const SET_TEMPO: u8 = 0x80;
    pub const ADD_TEMPO: u8 = 0x81;
    pub const SET_VOLUME: u8 = 0x82;
    pub const SET_DETUNE_CHECKED: u8 = 0x83;
    pub const ADD_TRANSPOSE: u8 = 0x84;
    pub const NOP_FADE_CHECK: u8 = 0x85;
    pub const SET_FREQ_ENVELOPE: u8 = 0x86;
    pub const SET_VOL_ENVELOPE: u8 = 0x87;
    pub const RESET_TIMERS: u8 = 0x88;
    pub const SET_REPEAT: u8 = 0x89;
    pub const SET_DISTORTION: u8 = 0x8a;
    pub const SET_CTRL_BITS: u8 = 0x8b;
    pub const MASK_CTRL_BITS: u8 = 0x8c;
    pub const PUSH_SEQ: u8 = 0x8d;
    pub const PUSH_SEQ_EXT: u8 = 0x8e;
    pub const POP_SEQ: u8 = 0x8f;
    pub const SWITCH_PSG: u8 = 0x90;
    pub const SWITCH_FM: u8 = 0x91;
    pub const NOP_92: u8 = 0x92;
    pub const NOP_93: u8 = 0x93;
    pub const NOP_94: u8 = 0x94;
    pub const NOP_95: u8 = 0x95;
    pub const QUEUE_OUTPUT: u8 = 0x96;
    pub const RESET_ENVELOPES: u8 = 0x97;
    pub const NOP_98: u8 = 0x98;
    pub const SET_SEQ_PTR: u8 = 0x99;
    pub const SUBMIT_COMMAND: u8 = 0x9a;
    pub const SET_VAR: u8 = 0x9b;
    pub const FORCE_PSG: u8 = 0x9c;
    pub const SET_VOICE: u8 = 0x9d;
    pub const SET_ENV_RATE: u8 = 0x9e;
    pub const STAGE_FM_REG: u8 = 0x9f;
    pub const REG_ADD: u8 = 0xa0;
    pub const REG_NEG_DETUNE: u8 = 0xa1;
    pub const REG_OR: u8 = 0xa2;
    pub const REG_XOR: u8 = 0xa3;
    pub const VAR_PAIR_LOAD: u8 = 0xa4;
    pub const NOP_A5: u8 = 0xa5;
    pub const REG_SHIFT_LEFT: u8 = 0xa6;
    pub const FREQ_ADD: u8 = 0xa7;
    pub const SET_RELEASE: u8 = 0xa8;
    pub const VAR_ADD: u8 = 0xa9;
    pub const VAR_SUB: u8 = 0xaa;
    pub const VAR_AND: u8 = 0xab;
    pub const VAR_OR: u8 = 0xac;
    pub const VAR_XOR: u8 = 0xad;
    pub const TABLE_JUMP: u8 = 0xae;
    pub const TABLE_JUMP_INC: u8 = 0xaf;
    pub const VAR_TO_REG: u8 = 0xb0;
    pub const VAR_APPLY: u8 = 0xb1;
    pub const VAR_SELECT: u8 = 0xb2;
    pub const VAR_SHIFT_RIGHT: u8 = 0xb3;
    pub const VAR_SHIFT_LEFT: u8 = 0xb4;
    pub const BRANCH_EQ: u8 = 0xb5;
    pub const BRANCH_NE: u8 = 0xb6;
    pub const BRANCH_PL: u8 = 0xb7;
    pub const BRANCH_MI: u8 = 0xb8;
    pub const VAR_SELECT_DEC: u8 = 0xb9;
    pub const VAR_SUB_STORE: u8 = 0xba;
}

/// Fixed immediate-byte count for an opcode.
///
/// `TABLE_JUMP`/`TABLE_JUMP_INC` consume `2 + 2 * classified_var` bytes at
/// runtime; the value here is the table-entry size used by the disassembler.
pub fn opcode_arg_bytes(opcode: u8) -> u8 {
    use opcodes::*;

    match opcode {
        SET_FREQ_ENVELOPE | SET_VOL_ENVELOPE | PUSH_SEQ | SET_SEQ_PTR | SET_VOICE => 2,
        SET_ENV_RATE | STAGE_FM_REG | VAR_PAIR_LOAD => 2,
        TABLE_JUMP | TABLE_JUMP_INC => 2,
        BRANCH_EQ | BRANCH_NE | BRANCH_PL | BRANCH_MI => 3,
        _ => 1,
    }
}

/// True if the single operand of the opcode is a 16-bit sequence pointer.
pub fn opcode_has_pointer_arg(opcode: u8) -> bool {
    use opcodes::*;

    matches!(
        opcode,
        SET_FREQ_ENVELOPE
            | SET_VOL_ENVELOPE
            | PUSH_SEQ
            | SET_SEQ_PTR
            | SET_VOICE
            | TABLE_JUMP
            | TABLE_JUMP_INC
    )
}

pub fn opcode_name(opcode: u8) -> &'static str {
    use opcodes::*;

    match opcode {
        SET_TEMPO => "SET_TEMPO",
        ADD_TEMPO => "ADD_TEMPO",
        SET_VOLUME => "SET_VOLUME",
        SET_DETUNE_CHECKED => "SET_DETUNE_CHECKED",
        ADD_TRANSPOSE => "ADD_TRANSPOSE",
        NOP_FADE_CHECK => "NOP_FADE_CHECK",
        SET_FREQ_ENVELOPE => "SET_FREQ_ENVELOPE",
        SET_VOL_ENVELOPE => "SET_VOL_ENVELOPE",
        RESET_TIMERS => "RESET_TIMERS",
        SET_REPEAT => "SET_REPEAT",
        SET_DISTORTION => "SET_DISTORTION",
        SET_CTRL_BITS => "SET_CTRL_BITS",
        MASK_CTRL_BITS => "MASK_CTRL_BITS",
        PUSH_SEQ => "PUSH_SEQ",
        PUSH_SEQ_EXT => "PUSH_SEQ_EXT",
        POP_SEQ => "POP_SEQ",
        SWITCH_PSG => "SWITCH_PSG",
        SWITCH_FM => "SWITCH_FM",
        NOP_92 => "NOP_92",
        NOP_93 => "NOP_93",
        NOP_94 => "NOP_94",
        NOP_95 => "NOP_95",
        QUEUE_OUTPUT => "QUEUE_OUTPUT",
        RESET_ENVELOPES => "RESET_ENVELOPES",
        NOP_98 => "NOP_98",
        SET_SEQ_PTR => "SET_SEQ_PTR",
        SUBMIT_COMMAND => "SUBMIT_COMMAND",
        SET_VAR => "SET_VAR",
        FORCE_PSG => "FORCE_PSG",
        SET_VOICE => "SET_VOICE",
        SET_ENV_RATE => "SET_ENV_RATE",
        STAGE_FM_REG => "STAGE_FM_REG",
        REG_ADD => "REG_ADD",
        REG_NEG_DETUNE => "REG_NEG_DETUNE",
        REG_OR => "REG_OR",
        REG_XOR => "REG_XOR",
        VAR_PAIR_LOAD => "VAR_PAIR_LOAD",
        NOP_A5 => "NOP_A5",
        REG_SHIFT_LEFT => "REG_SHIFT_LEFT",
        FREQ_ADD => "FREQ_ADD",
        SET_RELEASE => "SET_RELEASE",
        VAR_ADD => "VAR_ADD",
        VAR_SUB => "VAR_SUB",
        VAR_AND => "VAR_AND",
        VAR_OR => "VAR_OR",
        VAR_XOR => "VAR_XOR",
        TABLE_JUMP => "TABLE_JUMP",
        TABLE_JUMP_INC => "TABLE_JUMP_INC",
        VAR_TO_REG => "VAR_TO_REG",
        VAR_APPLY => "VAR_APPLY",
        VAR_SELECT => "VAR_SELECT",
        VAR_SHIFT_RIGHT => "VAR_SHIFT_RIGHT",
        VAR_SHIFT_LEFT => "VAR_SHIFT_LEFT",
        BRANCH_EQ => "BRANCH_EQ",
        BRANCH_NE => "BRANCH_NE",
        BRANCH_PL => "BRANCH_PL",
        BRANCH_MI => "BRANCH_MI",
        VAR_SELECT_DEC => "VAR_SELECT_DEC",
        VAR_SUB_STORE => "VAR_SUB_STORE",
        _ => "???",
    }
}

/// The 6-bit selector space of the variable classifier.
pub mod var_select {
    pub const BASE_VOLUME: u8 = 0;
    pub const TEMPO: u8 = 1;
    pub const TRANSPOSE: u8 = 2;
    pub const VOL_ENV_POS: u8 = 3;
    pub const FM_VOLUME: u8 = 4;
    pub const PSG_RANDOM: u8 = 5;
    pub const FIRST_SCRATCH: u8 = 6;
    pub const LAST_SCRATCH: u8 = 21;
    // Selectors above LAST_SCRATCH address the channel register shadow.

    pub const SELECTOR_MASK: u8 = 0x3f;
}

/// Duration-byte fields of a note frame.
pub mod note_flags {
    pub const DURATION_MASK: u8 = 0x0f;
    pub const DIVISION_SHIFT: u8 = 4;
    pub const DIVISION_MASK: u8 = 0x03;
    pub const DOTTED: u8 = 0x40;
    pub const SUSTAIN: u8 = 0x80;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_opcode_coverage() {
        // Every opcode byte has a name and a non-zero argument count.
        for op in FIRST_OPCODE..=LAST_OPCODE {
            assert_ne!(opcode_name(op), "???", "opcode {:#04x}", op);
            assert!(opcode_arg_bytes(op) >= 1, "opcode {:#04x}", op);
        }
        assert_eq!(N_OPCODES, 59);
    }

    #[test]
    fn test_pointer_opcodes_take_words() {
        for op in FIRST_OPCODE..=LAST_OPCODE {
            if opcode_has_pointer_arg(op) {
                assert!(opcode_arg_bytes(op) >= 2, "opcode {:#04x}", op);
            }
        }
    }
}
