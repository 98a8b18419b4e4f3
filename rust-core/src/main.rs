//! Command-line front end for the capture pipeline

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use std::io;
use std::path::{Path, PathBuf};

use pcm_spectrum::audio::{
    list_input_devices, ByteSink, CaptureSession, CpalDevice, FileSink, NullSink, PcmDevice,
    RawFileSource, WavSource,
};
use pcm_spectrum::pipeline::{
    BinTableReporter, CaptureLoop, LevelReporter, PeakReporter, ReporterSet,
};
use pcm_spectrum::{CaptureConfig, RunSummary, StopToken, TransformStrategy};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "pcm-spectrum")]
#[command(about = "Capture 16 bit PCM audio and print its spectrum frame by frame", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record from an input device until Ctrl+C, saving raw S16LE samples
    Record {
        /// Input device name, or "default"
        device: String,

        /// Raw output file
        #[arg(default_value = "audio.raw")]
        output: PathBuf,

        #[command(flatten)]
        capture: CaptureArgs,
    },
    /// Analyze a recorded raw S16LE or WAV file
    Analyze {
        file: PathBuf,

        #[command(flatten)]
        capture: CaptureArgs,
    },
    /// List available input devices
    Devices,
}

#[derive(Args, Debug)]
struct CaptureArgs {
    /// Requested sample rate in Hz
    #[arg(long, value_name = "HZ", default_value = "44100")]
    rate: u32,

    /// Interleaved channel count
    #[arg(long, default_value = "2")]
    channels: u16,

    /// Samples per analysis frame
    #[arg(long, value_name = "N", default_value = "1024")]
    frame_size: usize,

    /// Channel to analyze (0 = first)
    #[arg(long, default_value = "0")]
    channel: usize,

    /// Transform: accelerated (default) or reference
    #[arg(long, default_value = "accelerated")]
    strategy: TransformStrategy,

    /// Bins printed per frame (0 = none)
    #[arg(long, default_value = "20")]
    bins: usize,

    /// Consecutive overruns tolerated before giving up
    #[arg(long, default_value = "8")]
    max_overruns: u32,

    /// Stop after this many frames
    #[arg(long, value_name = "N")]
    frames: Option<u64>,

    /// Log the dominant frequency every N frames
    #[arg(long, value_name = "N")]
    peak: Option<u64>,

    /// Log the input level every N frames
    #[arg(long, value_name = "N")]
    level: Option<u64>,
}

/// Optional per-frame log lines
#[derive(Debug, Clone, Copy)]
struct Extras {
    peak: Option<u64>,
    level: Option<u64>,
}

impl CaptureArgs {
    fn extras(&self) -> Extras {
        Extras {
            peak: self.peak,
            level: self.level,
        }
    }

    fn into_config(self, device: String) -> CaptureConfig {
        CaptureConfig {
            device,
            sample_rate: self.rate,
            channels: self.channels,
            frame_size: self.frame_size,
            channel: self.channel,
            strategy: self.strategy,
            max_consecutive_overruns: self.max_overruns,
            max_frames: self.frames,
            report_bins: self.bins,
            ..Default::default()
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Command::Record {
            device,
            output,
            capture,
        } => {
            let extras = capture.extras();
            let config = capture.into_config(device);
            record(&config, &output, extras)
        }
        Command::Analyze { file, capture } => {
            let extras = capture.extras();
            let config = capture.into_config(file.display().to_string());
            analyze(&config, &file, extras)
        }
        Command::Devices => devices(),
    }
}

fn record(config: &CaptureConfig, output: &Path, extras: Extras) -> Result<()> {
    config.validate()?;

    let stop = StopToken::new();
    let handler = stop.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nReceived interrupt, finishing current frame...");
        handler.stop();
    })
    .context("cannot install interrupt handler")?;

    let device = CpalDevice::open(&config.device, config.ring_frames())?;
    let session = CaptureSession::open(device, &config.device_config())?;

    let mut sink = FileSink::create(output)
        .with_context(|| format!("cannot open output file {}", output.display()))?;
    info!("Recording to {}. Press Ctrl+C to stop.", output.display());

    // Whatever was captured is on disk even if the run failed
    let outcome = run(config, session, &mut sink, extras, &stop);
    println!("Audio saved to {} ({} bytes)", sink.path().display(), sink.bytes_written());
    outcome.map(|_| ())
}

fn analyze(config: &CaptureConfig, file: &Path, extras: Extras) -> Result<()> {
    let stop = StopToken::new();
    let is_wav = file
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));

    if is_wav {
        let source = WavSource::open(file)?;
        let header = source.spec();
        // The header is authoritative for recorded files
        let config = CaptureConfig {
            sample_rate: header.sample_rate,
            channels: header.channels,
            ..config.clone()
        };
        config.validate()?;
        let session = CaptureSession::open(source, &config.device_config())?;
        run(&config, session, &mut NullSink, extras, &stop)?;
    } else {
        config.validate()?;
        let source = RawFileSource::open(file)?;
        let session = CaptureSession::open(source, &config.device_config())?;
        run(config, session, &mut NullSink, extras, &stop)?;
    }
    Ok(())
}

fn run<D: PcmDevice, S: ByteSink>(
    config: &CaptureConfig,
    session: CaptureSession<D>,
    sink: &mut S,
    extras: Extras,
    stop: &StopToken,
) -> Result<RunSummary> {
    let mut capture = CaptureLoop::new(config, &session)?;

    let outcome = {
        let mut reporters = ReporterSet::new();
        reporters.push(BinTableReporter::new(io::stdout().lock(), config.report_bins));
        if let Some(every) = extras.peak {
            reporters.push(PeakReporter::new(every));
        }
        if let Some(every) = extras.level {
            reporters.push(LevelReporter::new(every));
        }
        capture.run(session, sink, &mut reporters, stop)
    };

    // The summary is printed on every stop path, failures included
    match outcome {
        Ok(summary) => {
            println!("{}", summary);
            Ok(summary)
        }
        Err(failure) => {
            println!("{}", failure.summary);
            Err(failure.into())
        }
    }
}

fn devices() -> Result<()> {
    let devices = list_input_devices()?;
    if devices.is_empty() {
        println!("No input devices found");
        return Ok(());
    }
    println!("Input devices:");
    for device in devices {
        println!(
            "  {} ({} Hz, {} channels)",
            device.name, device.sample_rate, device.channels
        );
    }
    Ok(())
}
