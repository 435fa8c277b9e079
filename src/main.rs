mod config;
mod core;
mod error;
mod input;
mod output;
mod playback;
mod store;
mod ui;

use anyhow::Context;
use clap::Parser;
use config::{LiveFeedConfig, PlayerConfig};
use output::OutputTarget;
use playback::{ConnectParams, LocalConnector, PlaybackSettings, Scheduler, TimeFormat};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use store::{run_feed, MemoryStore, SyntheticFeed};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use ui::console::{ConsoleCommand, ConsoleFeedback, HELP};

/// Play time-indexed channel data back at a controlled rate
#[derive(Parser, Debug)]
#[command(name = "rbnb-player", version, about)]
struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Name of the store to play back from
    #[arg(long)]
    store: Option<String>,

    /// CSV or JSON-lines recording loaded into the store at startup
    #[arg(long)]
    recording: Option<PathBuf>,

    /// Output target: store:<name>, csv:<path|->, raw:<path|->, or null
    #[arg(long)]
    output: Option<String>,

    /// Channels to select, comma separated; all visible channels if omitted
    #[arg(long, value_delimiter = ',')]
    channels: Vec<String>,

    /// Window width in seconds, 0 for single-point mode
    #[arg(long)]
    duration: Option<f64>,

    /// Playback rate as a multiple of real time
    #[arg(long)]
    rate: Option<f64>,

    /// Step size as a fraction of the window
    #[arg(long)]
    increment: Option<f64>,

    /// Output cache size in frames
    #[arg(long)]
    cache_size: Option<usize>,

    /// Publish full channel names instead of the last path component
    #[arg(long)]
    long_names: bool,

    /// How positions are shown: unspecified, seconds or milliseconds
    #[arg(long, default_value = "unspecified")]
    time_format: TimeFormat,

    /// Append a synthetic sine channel to the store while running
    #[arg(long)]
    live: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "rbnb_player=info")]
    log_level: String,
}

impl Args {
    /// Command-line values take precedence over the config file
    fn apply(&self, config: &mut PlayerConfig) {
        if let Some(store) = &self.store {
            config.store_address = store.clone();
        }
        if let Some(recording) = &self.recording {
            config.recording = Some(recording.clone());
        }
        if let Some(output) = &self.output {
            config.output = output.clone();
        }
        if !self.channels.is_empty() {
            config.channels = self.channels.clone();
        }
        if let Some(duration) = self.duration {
            config.playback.duration = duration;
        }
        if let Some(rate) = self.rate {
            config.playback.rate = rate;
        }
        if let Some(increment) = self.increment {
            config.playback.increment_fraction = increment;
        }
        if let Some(cache_size) = self.cache_size {
            config.cache_size = cache_size;
        }
        if self.long_names {
            config.use_short_names = false;
        }
        if self.live && config.live.is_none() {
            config.live = Some(LiveFeedConfig::default());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout may carry csv or raw output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = PlayerConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.playback.validate().context("Invalid playback settings")?;

    let output: OutputTarget = config
        .output
        .parse()
        .with_context(|| format!("Invalid output '{}'", config.output))?;

    let source = MemoryStore::new(&config.store_address);
    if let Some(recording) = &config.recording {
        let count = input::load_file(&recording.to_string_lossy(), &source)?;
        info!("Loaded {} samples from {}", count, recording.display());
    }

    let connector = LocalConnector::new();
    connector.register(source.clone());

    let stop = Arc::new(AtomicBool::new(false));
    let feed = config.live.as_ref().map(|live| {
        let feed = SyntheticFeed::new(&live.channel, Duration::from_millis(live.interval_ms));
        tokio::spawn(run_feed(feed, source.clone(), stop.clone()))
    });

    let settings = PlaybackSettings {
        duration: config.playback.duration,
        increment_fraction: config.playback.increment_fraction,
        rate: config.playback.rate,
        ..Default::default()
    };
    let feedback = Arc::new(ConsoleFeedback::new(args.time_format));
    let scheduler = Scheduler::spawn(settings, feedback, Box::new(connector))
        .context("Failed to start playback worker")?;

    let session = ConnectParams {
        store_address: config.store_address.clone(),
        output,
        cache_size: config.cache_size,
        channels: config.channels.clone(),
        use_short_names: config.use_short_names,
    };
    scheduler.connect(session.clone());
    eprintln!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<ConsoleCommand>() {
                    Ok(command) => {
                        if !command.execute(&scheduler, &session) {
                            break;
                        }
                    }
                    Err(e) => eprintln!("{}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    stop.store(true, Ordering::SeqCst);
    tokio::task::spawn_blocking(move || scheduler.terminate()).await?;
    if let Some(feed) = feed {
        if let Err(e) = feed.await {
            warn!("Live feed task failed: {}", e);
        }
    }
    Ok(())
}
