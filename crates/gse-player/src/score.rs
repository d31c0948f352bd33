//! Merged multi-channel score view

// SPDX-FileCopyrightText: © 2025 Marcus Rowe <undisbeliever@gmail.com>
//
// SPDX-License-Identifier: MIT

use engine::disasm::Note;

use crate::midi::TimedEvent;

use std::collections::BTreeSet;

const COLUMN_WIDTH: usize = 12;

/// Column abbreviations for the sixteen duration-table entries.
const DURATION_ABBREVS: [&str; 16] = [
    "rest", "W", "H", "Q", "8th", "H.", "Q.", "8.", "trip", "16th", "32nd", "64th", "128", "16.",
    "32.", "Qtr",
];

/// Start times are merged on a 0.1 ms grid.
fn round_time(t: f64) -> i64 {
    (t * 10_000.0).round() as i64
}

fn cell_text(event: &TimedEvent) -> String {
    let mut abbrev = DURATION_ABBREVS[usize::from(event.duration_index & 0x0f)].to_owned();
    if event.sustain {
        abbrev.push_str("sus");
    }

    match Note::try_from(event.note).ok().and_then(|n| n.name()) {
        Some(pitch) => format!("{:<4}{}", pitch, abbrev),
        None => format!("--- {}", abbrev),
    }
}

/// Effective audible end of every event.  Sustained notes ring to the start
/// of the channel's next note, or to the end of the longest channel.
fn effective_ends(timeline: &[TimedEvent], song_end: f64) -> Vec<f64> {
    let mut ends: Vec<f64> = timeline.iter().map(|e| e.time + e.duration).collect();

    let note_positions: Vec<usize> = timeline
        .iter()
        .enumerate()
        .filter(|(_, e)| e.midi_note.is_some())
        .map(|(i, _)| i)
        .collect();

    for (k, &i) in note_positions.iter().enumerate() {
        if timeline[i].sustain {
            ends[i] = match note_positions.get(k + 1) {
                Some(&next) => timeline[next].time,
                None => song_end,
            };
        }
    }

    ends
}

/// Renders merged channel timelines as a fixed-width columnar display.
///
/// Each channel column shows a new note ("A4  Q"), a new rest ("--- 8th"),
/// a still-sounding event ("  |") or silence ("  .") per merged start time.
pub fn format_score(timelines: &[Vec<TimedEvent>], labels: &[String]) -> String {
    let song_end = timelines
        .iter()
        .flatten()
        .map(|e| e.time + e.duration)
        .fold(0.0, f64::max);

    let ends: Vec<Vec<f64>> = timelines
        .iter()
        .map(|tl| effective_ends(tl, song_end))
        .collect();

    let mut times = BTreeSet::new();
    for tl in timelines {
        for e in tl {
            times.insert(round_time(e.time));
        }
    }

    let mut lines = Vec::new();

    let mut header = format!("{:>8} |", "Time");
    let mut separator = "---------+".to_owned();
    for label in labels {
        header.push_str(&format!(" {:<width$}|", label, width = COLUMN_WIDTH));
        separator.push_str(&"-".repeat(COLUMN_WIDTH + 1));
        separator.push('+');
    }
    lines.push(header);
    lines.push(separator);

    for &t in &times {
        let mut line = format!("{:7.2}s |", t as f64 / 10_000.0);

        for (tl, tl_ends) in timelines.iter().zip(&ends) {
            let mut cell = "  .".to_owned();

            for (e, &end) in tl.iter().zip(tl_ends) {
                let start = round_time(e.time);
                if start == t {
                    cell = cell_text(e);
                    break;
                }
                if start < t && t < round_time(end) {
                    cell = "  |".to_owned();
                    break;
                }
            }

            line.push_str(&format!(" {:<width$}|", cell, width = COLUMN_WIDTH));
        }

        lines.push(line);
    }

    lines.join("\n")
}

#[cfg(test)]
mod test {
    use super::*;

    fn ev(time: f64, duration: f64, note: u8, duration_index: u8, sustain: bool) -> TimedEvent {
        TimedEvent {
            time,
            duration,
            note,
            duration_index,
            midi_note: match note {
                0 => None,
                n => Some(n - 1),
            },
            sustain,
        }
    }

    #[test]
    fn test_columns_and_cells() {
        let a = vec![ev(0.0, 1.0, 0x46, 3, false), ev(1.0, 1.0, 0, 4, false)];
        let b = vec![ev(0.0, 2.0, 0x3a, 2, true)];

        let out = format_score(&[a, b], &["Ch1 (PK)".to_owned(), "Ch2 (YM)".to_owned()]);
        let lines: Vec<&str> = out.lines().collect();

        assert!(lines[0].contains("Ch1 (PK)"));
        assert_eq!(lines[2], "   0.00s | A4  Q       | A3  Hsus    |");
        assert_eq!(lines[3], "   1.00s | --- 8th     |   |         |");
    }

    #[test]
    fn test_silent_channel_shows_dots() {
        let a = vec![ev(0.0, 1.0, 0x40, 3, false)];
        let b = vec![ev(2.0, 1.0, 0x41, 3, false)];

        let out = format_score(&[a, b], &["Ch1".to_owned(), "Ch2".to_owned()]);
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines[3], "   2.00s |   .         | E4  Q       |");
    }

    #[test]
    fn test_sustain_extends_to_next_note() {
        let tl = vec![ev(0.0, 0.5, 0x40, 9, true), ev(2.0, 1.0, 0x41, 3, false)];

        let ends = effective_ends(&tl, 5.0);
        assert_eq!(ends[0], 2.0);
        assert_eq!(ends[1], 3.0);

        // The last sustained note rings to the end of the piece.
        let ends = effective_ends(&tl[..1], 5.0);
        assert_eq!(ends[0], 5.0);
    }
}
