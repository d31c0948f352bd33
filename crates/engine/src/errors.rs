//! A single location for all of the errors in the engine

// SPDX-FileCopyrightText: © 2025 Marcus Rowe <undisbeliever@gmail.com>
//
// SPDX-License-Identifier: MIT

use std::fmt::Display;
use std::io;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ValueError {
    PriorityOutOfRange(u8),
    HintOutOfRange(u8),
    NoteOutOfRange(u8),
}

#[derive(Debug)]
pub enum RomError {
    IoError(PathBuf, io::Error),
    WrongSize(usize),

    // table name, element index, pointer value
    PointerOutOfRange(&'static str, usize, u16),
    InvalidChannelHint(usize, u8),
    ChainOffsetOutOfRange(usize, u8),
    SpeechDataOutOfRange(usize, u16, u16),
}

impl Display for ValueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PriorityOutOfRange(v) => write!(f, "priority out of range: {}", v),
            Self::HintOutOfRange(v) => write!(f, "channel hint out of range: {}", v),
            Self::NoteOutOfRange(v) => write!(f, "note out of range: {}", v),
        }
    }
}

impl Display for RomError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IoError(p, e) => write!(f, "cannot read {}: {}", p.display(), e),
            Self::WrongSize(s) => {
                write!(f, "ROM image is {} bytes, expected {}", s, crate::driver_constants::ROM_SIZE)
            }
            Self::PointerOutOfRange(table, i, v) => {
                write!(f, "{}[{}]: pointer ${:04x} outside ROM", table, i, v)
            }
            Self::InvalidChannelHint(i, v) => {
                write!(f, "sfx channel table[{}]: invalid hint {}", i, v)
            }
            Self::ChainOffsetOutOfRange(i, v) => {
                write!(f, "sfx chain table[{}]: offset {} out of range", i, v)
            }
            Self::SpeechDataOutOfRange(i, ptr, len) => {
                write!(
                    f,
                    "speech sequence {}: ${:04x}+{} extends beyond ROM",
                    i, ptr, len
                )
            }
        }
    }
}

impl std::error::Error for RomError {}
