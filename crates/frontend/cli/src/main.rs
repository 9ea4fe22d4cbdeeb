use anyhow::{bail, Context, Result};
use clap::Parser;
use emu_core::logging::{LogCategory, LogConfig, LogLevel};
use emu_core::timing::TimingMode;
use emu_core::System;
use emu_sms::{SmsConfig, SmsSystem};
use log::{info, warn};
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(about = "Headless Sega Master System runner")]
struct Args {
    /// Path to a ROM image (.sms or .bin)
    rom: PathBuf,

    /// Number of frames to run
    #[arg(long, default_value_t = 5)]
    frames: u32,

    /// Use PAL timing (313 lines, 3.55 MHz)
    #[arg(long, default_value_t = false)]
    pal: bool,

    /// Audio sample rate in Hz
    #[arg(long)]
    sample_rate: Option<u32>,

    /// JSON machine configuration; --pal and --sample-rate override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Dump save-state to this file as JSON
    #[arg(long, default_value = "state.json")]
    save: PathBuf,

    /// Print per-frame pixels and audio statistics
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// Suppress all per-frame output (still writes --save)
    #[arg(long, default_value_t = false)]
    quiet: bool,

    /// Disassemble the first N executed instructions
    #[arg(long, default_value_t = 0)]
    trace: usize,

    /// Core log level, either global ("debug") or per category ("cpu=trace,video=debug")
    #[arg(long)]
    log_level: Option<String>,

    /// Write core logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn configure_logging(args: &Args) -> Result<()> {
    let config = LogConfig::global();

    if let Some(levels) = args.log_level.as_deref() {
        for part in levels.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.split_once('=') {
                Some((category, level)) => {
                    let Some(category) = LogCategory::from_str(category) else {
                        bail!("Unknown log category: {}", category);
                    };
                    let Some(level) = LogLevel::from_str(level) else {
                        bail!("Unknown log level: {}", level);
                    };
                    config.set_level(category, level);
                }
                None => {
                    let Some(level) = LogLevel::from_str(part) else {
                        bail!("Unknown log level: {}", part);
                    };
                    config.set_global_level(level);
                }
            }
        }
    }

    if let Some(path) = args.log_file.as_ref() {
        config
            .set_log_file(path.clone())
            .with_context(|| format!("opening log file {}", path.display()))?;
    }

    Ok(())
}

fn load_config(args: &Args) -> Result<SmsConfig> {
    let mut config = match args.config.as_ref() {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            SmsConfig::from_json(&text)?
        }
        None => SmsConfig::default(),
    };
    if args.pal {
        config.timing = TimingMode::Pal;
    }
    if let Some(rate) = args.sample_rate {
        if rate == 0 {
            bail!("Sample rate must be positive");
        }
        config.sample_rate = rate;
    }
    Ok(config)
}

/// Step `count` instructions, printing each one as it executes
fn trace(sys: &mut SmsSystem, count: usize) -> Result<()> {
    for _ in 0..count {
        let cycles = sys.step()?;
        let cpu = sys.cpu().context("no cartridge loaded")?;
        let pc = cpu.last_pc();
        let decoded = cpu.disassemble(pc);
        let bytes: Vec<String> = decoded.bytes.iter().map(|b| format!("{:02X}", b)).collect();
        println!(
            "{:04X}  {:<12} {:<20} {:>3}",
            pc,
            bytes.join(" "),
            decoded.to_string(),
            cycles
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    configure_logging(&args)?;

    let config = load_config(&args)?;
    let image =
        fs::read(&args.rom).with_context(|| format!("reading ROM {}", args.rom.display()))?;

    let mut sys = SmsSystem::with_config(config.clone());
    sys.load_rom(&image)?;
    info!(
        "Loaded {} ({} bytes, {:?}, {} Hz)",
        args.rom.display(),
        image.len(),
        config.timing,
        config.sample_rate
    );

    if args.trace > 0 {
        trace(&mut sys, args.trace)?;
    }

    for fnum in 1..=args.frames {
        let frame = sys.step_frame()?;
        let samples = sys.take_audio_samples();
        if args.quiet {
            continue;
        }

        if args.debug {
            println!("Frame {}: {}x{}", fnum, frame.width, frame.height);
            let dump_len = std::cmp::min(16, frame.pixels.len());
            let out: Vec<String> = frame.pixels[..dump_len]
                .iter()
                .map(|p| format!("{:08X}", p))
                .collect();
            println!("First {} pixels: {}", dump_len, out.join(" "));
            let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
            println!("Audio: {} samples, peak {:.3}", samples.len(), peak);
        } else {
            println!("Frame {}: {} audio samples", fnum, samples.len());
        }
    }

    if sys.vdp().frame_count() == 0 {
        warn!("No frame completed");
    }

    let state = sys.save_state();
    let mut f =
        File::create(&args.save).with_context(|| format!("creating {}", args.save.display()))?;
    write!(f, "{}", serde_json::to_string_pretty(&state)?)?;
    info!("Saved state to {}", args.save.display());

    Ok(())
}
