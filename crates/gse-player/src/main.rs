//! Sound engine player binary

// SPDX-FileCopyrightText: © 2025 Marcus Rowe <undisbeliever@gmail.com>
//
// SPDX-License-Identifier: MIT

#![forbid(unsafe_code)]

use clap::{Args, Parser, Subcommand, ValueEnum};

use engine::disasm::{
    disassemble_command, disassemble_sequence, format_instruction, handler_type_name,
    resolve_command,
};
use engine::{RegisterWrite, SoundEngine, SoundRom, TraceHardware};

use std::io::Write as _;
use std::path::{Path, PathBuf};

mod midi;
mod score;

macro_rules! error {
    ($($arg:tt)*) => {{
        eprintln!($($arg)*);
        std::process::exit(1);
    }};
}

#[derive(Parser)]
#[command(author, version)]
#[command(about = "Gauntlet sound engine player")]
#[command(arg_required_else_help = true)]
struct ArgParser {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a sound ROM image
    Check(RomArg),

    /// List all 219 commands with handler and sequence info
    List(RomArg),

    /// Disassemble the sequence data of a command or address
    Disasm(DisasmArgs),

    /// Merged tracker-style score view of a sequence command
    Score(ScoreArgs),

    /// Run commands through the engine and emit the register-write stream
    Trace(TraceArgs),

    /// Export a sequence command as a Standard MIDI File
    Midi(MidiArgs),
}

#[derive(Args)]
struct RomArg {
    #[arg(value_name = "ROM", help = "48 KiB sound ROM image")]
    rom: PathBuf,
}

#[derive(Args)]
struct DisasmArgs {
    #[command(flatten)]
    rom: RomArg,

    #[arg(long, value_name = "N", value_parser = parse_number, help = "command number (hex or decimal)")]
    cmd: Option<u16>,

    #[arg(long, value_name = "ADDR", value_parser = parse_number, help = "raw sequence address")]
    addr: Option<u16>,
}

#[derive(Args)]
struct ScoreArgs {
    #[command(flatten)]
    rom: RomArg,

    #[arg(long, value_name = "N", value_parser = parse_number, required = true)]
    cmd: u16,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum TraceFormat {
    Text,
    Json,
}

#[derive(Args)]
struct TraceArgs {
    #[command(flatten)]
    rom: RomArg,

    #[arg(long, value_name = "N", value_parser = parse_number, required = true,
          help = "command to push (repeatable)")]
    cmd: Vec<u16>,

    #[arg(long, value_name = "T", default_value = "240", help = "ticks to run")]
    ticks: u32,

    #[arg(long, value_enum, default_value = "text")]
    format: TraceFormat,

    #[arg(short = 'o', long = "output", value_name = "FILE", help = "output file (stdout if omitted)")]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct MidiArgs {
    #[command(flatten)]
    rom: RomArg,

    #[arg(long, value_name = "N", value_parser = parse_number, required = true)]
    cmd: u16,

    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: PathBuf,
}

fn parse_number(s: &str) -> Result<u16, String> {
    let r = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    r.map_err(|_| format!("invalid number: {}", s))
}

fn load_rom(path: &Path) -> SoundRom {
    match SoundRom::from_file(path) {
        Ok(rom) => rom,
        Err(e) => error!("{}", e),
    }
}

fn command_byte(n: u16) -> u8 {
    if n > 0xda {
        error!("invalid command number: {:#04x}", n);
    }
    n as u8
}

// check
// =====

fn check_rom(args: RomArg) {
    let _ = load_rom(&args.rom);
    println!("{}: OK", args.rom.display());
}

// list
// ====

fn list_commands(args: RomArg) {
    let rom = load_rom(&args.rom);

    println!(
        "{:>5}  {:<24}  {:>5}  {:>7}  {:>3}",
        "Cmd", "Handler", "Param", "SeqPtr", "Ch"
    );

    for cmd in 0..=0xda {
        let info = match resolve_command(&rom, cmd) {
            Some(i) => i,
            None => continue,
        };

        let seq_ptr = match (&info.speech, info.channels.first()) {
            (Some((ptr, _)), _) => format!("${:04x}", ptr),
            (None, Some(ch)) => format!("${:04x}", ch.seq_ptr),
            _ => "-".to_owned(),
        };
        let n_channels = match info.channels.len() {
            0 if info.speech.is_some() => 1,
            n => n,
        };

        println!(
            "0x{:02x}  {:<24}  0x{:02x}  {:>7}  {:>3}",
            cmd,
            handler_type_name(info.handler_type),
            info.param,
            seq_ptr,
            n_channels,
        );
    }
}

// disasm
// ======

fn disasm(args: DisasmArgs) {
    let rom = load_rom(&args.rom.rom);

    if let Some(addr) = args.addr {
        println!("Sequence @ ${:04x}:", addr);
        for inst in disassemble_sequence(&rom, addr) {
            println!("{}", format_instruction(&inst));
        }
        return;
    }

    let cmd = match args.cmd {
        Some(n) => command_byte(n),
        None => error!("disasm requires --cmd or --addr"),
    };

    let info = match resolve_command(&rom, cmd) {
        Some(i) => i,
        None => error!("invalid command number: {:#04x}", cmd),
    };

    println!(
        "=== Command 0x{:02x}: type {} ({}), param 0x{:02x} ===",
        info.cmd,
        info.handler_type,
        handler_type_name(info.handler_type),
        info.param,
    );

    if let Some((ptr, len)) = info.speech {
        println!("Speech/LPC data @ ${:04x} ({} bytes)", ptr, len);
        return;
    }
    if info.channels.is_empty() {
        println!("  (no sequence data for this handler type)");
        return;
    }

    for (i, (entry, instructions)) in info
        .channels
        .iter()
        .zip(disassemble_command(&rom, &info))
        .enumerate()
    {
        println!(
            "\n--- Channel {}/{}: hint={}, priority={}, offset=0x{:02x} ---",
            i + 1,
            info.channels.len(),
            entry.hint,
            entry.priority & 0x0f,
            entry.offset,
        );
        println!("Sequence @ ${:04x}:", entry.seq_ptr);
        for inst in instructions {
            println!("{}", format_instruction(&inst));
        }
    }
}

// score
// =====

fn score_view(args: ScoreArgs) {
    let rom = load_rom(&args.rom.rom);
    let cmd = command_byte(args.cmd);

    let info = match resolve_command(&rom, cmd) {
        Some(i) => i,
        None => error!("invalid command number: {:#04x}", cmd),
    };
    if info.speech.is_some() {
        error!("command {:#04x} is a speech command; score view not applicable", cmd);
    }
    if info.channels.is_empty() {
        error!("command {:#04x} has no sequence data", cmd);
    }

    let channel_instructions = disassemble_command(&rom, &info);
    let timelines: Vec<Vec<midi::TimedEvent>> = channel_instructions
        .iter()
        .map(|insts| midi::build_timeline(&rom, insts))
        .collect();

    let labels: Vec<String> = info
        .channels
        .iter()
        .take(timelines.len())
        .enumerate()
        .map(|(i, ch)| {
            let hardware = if ch.hint <= 7 { "YM" } else { "PK" };
            format!("Ch{} ({})", i + 1, hardware)
        })
        .collect();

    println!(
        "=== Command 0x{:02x}: type {} ({}), param 0x{:02x} ===",
        info.cmd,
        info.handler_type,
        handler_type_name(info.handler_type),
        info.param,
    );

    let total_notes: usize = timelines
        .iter()
        .map(|tl| tl.iter().filter(|e| e.midi_note.is_some()).count())
        .sum();
    let max_seconds = timelines
        .iter()
        .flatten()
        .map(|e| e.time + e.duration)
        .fold(0.0, f64::max);

    if total_notes == 0 {
        println!("  (no timed events found)");
        return;
    }

    let rounded = max_seconds.round() as u64;
    println!(
        "Notes: {} | Est. play time: {:.1}s ({}:{:02}) | Channels: {}",
        total_notes,
        max_seconds,
        rounded / 60,
        rounded % 60,
        timelines.len(),
    );

    println!();
    println!("{}", score::format_score(&timelines, &labels));

    // A single channel also gets the plain disassembly.
    if channel_instructions.len() == 1 {
        println!();
        println!("Sequence @ ${:04x}:", info.channels[0].seq_ptr);
        for inst in &channel_instructions[0] {
            println!("{}", format_instruction(inst));
        }
    }
}

// trace
// =====

fn format_write(w: &RegisterWrite) -> String {
    match w {
        RegisterWrite::Psg { register, value } => {
            format!("psg    ${:02x} = ${:02x}", register, value)
        }
        RegisterWrite::Fm { register, value } => {
            format!("fm     ${:02x} = ${:02x}", register, value)
        }
        RegisterWrite::Speech { value } => format!("speech ${:02x}", value),
        RegisterWrite::SpeechPitch { value } => format!("squeak ${:02x}", value),
        RegisterWrite::Mixer { value } => format!("mixer  ${:02x}", value),
        RegisterWrite::FmReset => "fm     reset".to_owned(),
        RegisterWrite::SpeechReset => "speech reset".to_owned(),
    }
}

fn trace(args: TraceArgs) {
    let rom = load_rom(&args.rom.rom);
    let mut engine = SoundEngine::new(rom);
    let mut hw = TraceHardware::new();

    for &cmd in &args.cmd {
        engine.push_command(command_byte(cmd), &mut hw);
        engine.tick(&mut hw);
    }
    for _ in args.cmd.len() as u32..args.ticks {
        engine.tick(&mut hw);
    }

    if engine.error_flags() != 0 {
        log::warn!("engine error flags: {:#04x}", engine.error_flags());
    }

    let text = match args.format {
        TraceFormat::Json => match serde_json::to_string_pretty(&hw.writes) {
            Ok(j) => j,
            Err(e) => error!("cannot serialize trace: {}", e),
        },
        TraceFormat::Text => {
            let lines: Vec<String> = hw.writes.iter().map(format_write).collect();
            lines.join("\n")
        }
    };

    write_output(args.output.as_deref(), text.as_bytes());
}

fn write_output(path: Option<&Path>, data: &[u8]) {
    match path {
        Some(path) => {
            if let Err(e) = std::fs::write(path, data) {
                error!("error writing {}: {}", path.display(), e);
            }
        }
        None => {
            let mut out = std::io::stdout().lock();
            if out.write_all(data).is_err() || out.write_all(b"\n").is_err() {
                std::process::exit(1);
            }
        }
    }
}

// midi
// ====

fn export_midi(args: MidiArgs) {
    let rom = load_rom(&args.rom.rom);
    let cmd = command_byte(args.cmd);

    let info = match resolve_command(&rom, cmd) {
        Some(i) => i,
        None => error!("invalid command number: {:#04x}", cmd),
    };
    if info.speech.is_some() {
        error!("command {:#04x} is a speech command, not a sequence", cmd);
    }
    if info.channels.is_empty() {
        error!("command {:#04x} has no sequence data", cmd);
    }

    let timelines: Vec<Vec<midi::TimedEvent>> = disassemble_command(&rom, &info)
        .iter()
        .map(|insts| midi::build_timeline(&rom, insts))
        .collect();

    let data = midi::write_midi(&timelines);
    if let Err(e) = std::fs::write(&args.output, data) {
        error!("error writing {}: {}", args.output.display(), e);
    }

    let notes: usize = timelines
        .iter()
        .map(|tl| tl.iter().filter(|e| e.midi_note.is_some()).count())
        .sum();
    println!(
        "Exported command 0x{:02x}: {} channels, {} notes -> {}",
        cmd,
        timelines.len(),
        notes,
        args.output.display(),
    );
}

fn main() {
    env_logger::init();

    let args = ArgParser::parse();

    match args.command {
        Command::Check(a) => check_rom(a),
        Command::List(a) => list_commands(a),
        Command::Disasm(a) => disasm(a),
        Command::Score(a) => score_view(a),
        Command::Trace(a) => trace(a),
        Command::Midi(a) => export_midi(a),
    }
}
