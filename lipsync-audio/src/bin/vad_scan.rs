//! Print the voice activity of a WAVE file as JSON.
//!
//! ```text
//! vad_scan <input.wav> [--aggressiveness quality|low-bitrate|aggressive|very-aggressive]
//!          [--segments N] [--config file.json] [--output file.json] [--dump-wav out.wav]
//! ```
//!
//! Logging goes to stderr and honours `RUST_LOG`.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context};
use serde::Serialize;
use tracing::info;

use lipsync_audio::audio::resample::resample_source;
use lipsync_audio::audio::wave::{WaveFileInfo, WaveFileReader};
use lipsync_audio::audio::writer::write_wave_file;
use lipsync_audio::vad::{self, Aggressiveness};
use lipsync_audio::{detect_voice_activity, ActivityConfig, ActivitySegment, AudioSource};

const USAGE: &str = "Usage: vad_scan <input.wav> \
[--aggressiveness quality|low-bitrate|aggressive|very-aggressive] \
[--segments N] [--config file.json] [--output file.json] [--dump-wav out.wav]";

#[derive(Debug)]
struct Args {
    input: PathBuf,
    aggressiveness: Option<Aggressiveness>,
    segments: Option<usize>,
    config: Option<PathBuf>,
    output: Option<PathBuf>,
    dump_wav: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report<'a> {
    file: String,
    info: &'a WaveFileInfo,
    duration_cs: usize,
    config: &'a ActivityConfig,
    elapsed_ms: f64,
    segments: Vec<ActivitySegment>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut input: Option<PathBuf> = None;
    let mut aggressiveness = None;
    let mut segments = None;
    let mut config = None;
    let mut output = None;
    let mut dump_wav = None;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--aggressiveness" | "-a" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --aggressiveness");
                };
                aggressiveness = Some(v.parse::<Aggressiveness>().map_err(anyhow::Error::msg)?);
            }
            "--segments" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --segments");
                };
                let n = v
                    .parse::<usize>()
                    .with_context(|| format!("invalid value for --segments: {v}"))?;
                segments = Some(n.clamp(1, 64));
            }
            "--config" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --config");
                };
                config = Some(PathBuf::from(v));
            }
            "--output" | "-o" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --output");
                };
                output = Some(PathBuf::from(v));
            }
            "--dump-wav" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --dump-wav");
                };
                dump_wav = Some(PathBuf::from(v));
            }
            "--help" | "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other if other.starts_with('-') => bail!("unknown argument: {other}"),
            other => {
                if input.is_some() {
                    bail!("more than one input file given");
                }
                input = Some(PathBuf::from(other));
            }
        }
    }

    let Some(input) = input else {
        bail!("no input file\n{USAGE}");
    };
    Ok(Args {
        input,
        aggressiveness,
        segments,
        config,
        output,
        dump_wav,
    })
}

fn run() -> anyhow::Result<()> {
    let args = parse_args()?;

    let mut config = match &args.config {
        Some(path) => ActivityConfig::from_json_file(path)?,
        None => ActivityConfig::default(),
    };
    if let Some(level) = args.aggressiveness {
        config.aggressiveness = level;
    }
    if let Some(n) = args.segments {
        config.segment_count = n;
    }

    let reader = WaveFileReader::open(&args.input)?;

    if let Some(path) = &args.dump_wav {
        let resampled = resample_source(&reader, vad::SAMPLE_RATE)?;
        write_wave_file(path, &resampled)?;
        info!(path = %path.display(), "wrote detector input");
    }

    let started = Instant::now();
    let segments = detect_voice_activity(&reader, &config)?;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    let report = Report {
        file: args.input.display().to_string(),
        info: reader.info(),
        duration_cs: reader.duration_cs(),
        config: &config,
        elapsed_ms,
        segments,
    };
    let json = serde_json::to_string_pretty(&report)?;
    reader.close();

    match &args.output {
        Some(path) => {
            std::fs::write(path, &json).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), sections = report.segments.len(), "wrote report");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lipsync_audio=info,vad_scan=info")),
        )
        .init();

    if let Err(e) = run() {
        eprintln!("vad_scan failed: {e:#}");
        std::process::exit(1);
    }
}
