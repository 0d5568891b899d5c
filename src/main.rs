//! alsapcm - play, record and inspect ALSA PCM devices
//!
//! # Commands
//!
//! - `alsapcm list` - PCM endpoints known to ALSA
//! - `alsapcm info` - negotiated parameters and capability space of a device
//! - `alsapcm play FILE` - raw interleaved PCM file to playback
//! - `alsapcm record FILE` - capture to a raw interleaved PCM file
//! - `alsapcm loopback` - capture straight back to playback
//!
//! Device options left unset fall back to config.toml.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::AsyncWriteExt;
use tokio::signal;

use alsapcm::config::Config;
use alsapcm::{
    list_endpoints, AlsaDriver, AlsaPcm, Direction, Mode, PcmConfig, PcmWorker, SampleFormat,
};

/// Back-off while a non-blocking stream has nothing to transfer.
const IDLE_WAIT: Duration = Duration::from_millis(5);

#[derive(Parser)]
#[command(name = "alsapcm")]
#[command(about = "PCM playback and capture on ALSA")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List PCM endpoints
    List {
        /// Only endpoints usable for playback or capture
        #[arg(long)]
        direction: Option<Direction>,
    },

    /// Show the parameters a device grants and what it supports
    Info {
        #[command(flatten)]
        device: DeviceArgs,

        /// Open the capture side instead of playback
        #[arg(long)]
        capture: bool,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Play a raw interleaved PCM file
    Play {
        file: PathBuf,

        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Record raw interleaved PCM to a file
    Record {
        file: PathBuf,

        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(long)]
        seconds: Option<u64>,

        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Route capture straight back to playback
    Loopback {
        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(long)]
        seconds: Option<u64>,

        /// Capture device (default: same as --device)
        #[arg(long)]
        capture_device: Option<String>,

        #[command(flatten)]
        device: DeviceArgs,
    },
}

#[derive(Args, Clone)]
struct DeviceArgs {
    /// PCM device name, e.g. default or hw:0,0
    #[arg(short = 'D', long)]
    device: Option<String>,

    /// normal, nonblock or async
    #[arg(long)]
    mode: Option<Mode>,

    #[arg(short, long)]
    channels: Option<u32>,

    /// Sample rate in Hz
    #[arg(short, long)]
    rate: Option<u32>,

    /// Sample format, e.g. S16_LE
    #[arg(short, long)]
    format: Option<SampleFormat>,

    /// Frames per period
    #[arg(short, long)]
    period_size: Option<usize>,

    /// Periods per buffer
    #[arg(long)]
    periods: Option<u32>,
}

impl DeviceArgs {
    fn request(&self, config: &Config) -> PcmConfig {
        PcmConfig {
            format: self.format.unwrap_or(config.format),
            channels: self.channels.unwrap_or(config.channels),
            rate: self.rate.unwrap_or(config.rate),
            period_size: self.period_size.unwrap_or(config.period_size),
            periods: self.periods.unwrap_or(config.periods),
        }
    }

    fn open(&self, config: &Config, direction: Direction) -> Result<AlsaPcm> {
        let device = self.device.as_deref().unwrap_or(config.device);
        let mode = self.mode.unwrap_or(config.mode);
        AlsaPcm::open(&AlsaDriver, direction, mode, Some(device), self.request(config))
            .with_context(|| format!("Failed to open {} device {}", direction, device))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = Config::new().unwrap_or_default();
    log::debug!("{} v{}", config.app_name, config.app_version);

    let cli = Cli::parse();
    match cli.command {
        Commands::List { direction } => list(direction),
        Commands::Info {
            device,
            capture,
            json,
        } => {
            let direction = if capture {
                Direction::Capture
            } else {
                Direction::Playback
            };
            info(&config, &device, direction, json)
        }
        Commands::Play { file, device } => play(&config, &device, file).await,
        Commands::Record {
            file,
            seconds,
            device,
        } => record(&config, &device, file, seconds).await,
        Commands::Loopback {
            seconds,
            capture_device,
            device,
        } => loopback(&config, &device, capture_device, seconds).await,
    }
}

fn list(direction: Option<Direction>) -> Result<()> {
    let endpoints = list_endpoints(&AlsaDriver, direction).context("Failed to list PCM devices")?;
    for endpoint in endpoints {
        match endpoint.direction {
            Some(d) => println!("{} ({})", endpoint.name, d),
            None => println!("{}", endpoint.name),
        }
        if let Some(desc) = endpoint.description {
            for line in desc.lines() {
                println!("    {}", line);
            }
        }
    }
    Ok(())
}

fn info(config: &Config, args: &DeviceArgs, direction: Direction, json: bool) -> Result<()> {
    let pcm = args.open(config, direction)?;
    let info = pcm.info()?;
    let caps = pcm.capabilities()?;

    if json {
        let value = serde_json::json!({
            "stream": info,
            "capabilities": caps,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", info);
    let formats: Vec<_> = caps.formats.iter().map(|f| f.name()).collect();
    println!("supported formats = {}", formats.join(" "));
    println!(
        "supported channels = {}..{}",
        caps.channels.start(),
        caps.channels.end()
    );
    println!("supported rates = {}..{} Hz", caps.rates.start(), caps.rates.end());
    println!(
        "supported period sizes = {}..{} frames",
        caps.period_sizes.start(),
        caps.period_sizes.end()
    );
    Ok(())
}

/// Write all of `data`, retrying while a non-blocking stream is full.
async fn write_all(worker: &PcmWorker, data: &[u8]) -> Result<()> {
    let frame_size = worker.frame_size();
    let mut offset = 0;
    while offset < data.len() {
        let frames = worker.write(data[offset..].to_vec()).await?;
        if frames == 0 {
            tokio::time::sleep(IDLE_WAIT).await;
        }
        offset += frames * frame_size;
    }
    Ok(())
}

async fn play(config: &Config, args: &DeviceArgs, file: PathBuf) -> Result<()> {
    let data = tokio::fs::read(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let mut worker = PcmWorker::spawn(args.open(config, Direction::Playback)?)?;
    let frame_size = worker.frame_size();
    let usable = data.len() - data.len() % frame_size;
    if usable != data.len() {
        log::warn!(
            "Ignoring {} trailing bytes (frame size {})",
            data.len() - usable,
            frame_size
        );
    }

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let period_bytes = worker.period_bytes();
    let mut interrupted = false;
    for chunk in data[..usable].chunks(period_bytes) {
        tokio::select! {
            _ = &mut ctrl_c => {
                interrupted = true;
                break;
            }
            result = write_all(&worker, chunk) => result?,
        }
    }

    if interrupted {
        log::info!("Interrupted, discarding buffered audio");
        worker.drop_buffer().await?;
    }
    // Close drains whatever is still queued
    worker.close().await?;
    log::info!("Played {} frames from {}", usable / frame_size, file.display());
    Ok(())
}

async fn record(
    config: &Config,
    args: &DeviceArgs,
    file: PathBuf,
    seconds: Option<u64>,
) -> Result<()> {
    let mut worker = PcmWorker::spawn(args.open(config, Direction::Capture)?)?;
    let mut out = tokio::fs::File::create(&file)
        .await
        .with_context(|| format!("Failed to create {}", file.display()))?;

    let limit = seconds.map(|s| s * worker.config().rate as u64);
    let mut total: u64 = 0;

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    while limit.is_none_or(|l| total < l) {
        tokio::select! {
            _ = &mut ctrl_c => {
                log::info!("Interrupted");
                break;
            }
            result = worker.read() => {
                let chunk = result?;
                if chunk.is_empty() {
                    tokio::time::sleep(IDLE_WAIT).await;
                    continue;
                }
                out.write_all(&chunk.data).await?;
                total += chunk.frames as u64;
            }
        }
    }

    out.flush().await?;
    worker.close().await?;
    log::info!("Recorded {} frames to {}", total, file.display());
    Ok(())
}

async fn loopback(
    config: &Config,
    args: &DeviceArgs,
    capture_device: Option<String>,
    seconds: Option<u64>,
) -> Result<()> {
    let capture_args = DeviceArgs {
        device: capture_device.or_else(|| args.device.clone()),
        ..args.clone()
    };
    let mut capture = PcmWorker::spawn(capture_args.open(config, Direction::Capture)?)?;
    let mut playback = PcmWorker::spawn(args.open(config, Direction::Playback)?)?;

    if capture.config() != playback.config() {
        anyhow::bail!(
            "Capture and playback negotiated different parameters: {:?} vs {:?}",
            capture.config(),
            playback.config()
        );
    }

    let limit = seconds.map(|s| s * capture.config().rate as u64);
    let mut total: u64 = 0;

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    while limit.is_none_or(|l| total < l) {
        tokio::select! {
            _ = &mut ctrl_c => {
                log::info!("Interrupted");
                break;
            }
            result = capture.read() => {
                let chunk = result?;
                if chunk.is_empty() {
                    tokio::time::sleep(IDLE_WAIT).await;
                    continue;
                }
                write_all(&playback, &chunk.data).await?;
                total += chunk.frames as u64;
            }
        }
    }

    capture.close().await?;
    playback.drop_buffer().await?;
    playback.close().await?;
    log::info!("Looped back {} frames", total);
    Ok(())
}
