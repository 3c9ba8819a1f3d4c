use anyhow::{bail, Context, Result};
use clap::Parser;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use seiswatch::api::{read_alerts, AlertSink, FileSink, LogSink, SeisConfig};
use seiswatch::args::{Cli, Commands};
use seiswatch::detector::{CheckOutcome, Detector};
use seiswatch::synth::{Synthesizer, TriangularPulse};
use seiswatch::{filter, trace};

#[tokio::main]
async fn main() {
    env_logger::init();
    if let Err(e) = run().await {
        log::error!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Replay { traces, chunk, record } => replay(&config, &traces, chunk, record.as_deref()).await,
        Commands::Simulate {
            out,
            channels,
            rate,
            length,
            pulse_at,
            height,
            half_width,
            noise,
            shift,
            seed,
        } => {
            let mut synth = Synthesizer::new(seed, noise);
            for ch in 0..channels {
                let offset = shift.iter().filter(|(c, _)| *c == ch).map(|(_, o)| *o).sum::<i64>();
                let center = (pulse_at as i64 + offset).max(0) as usize;
                let samples = synth.channel(length, &[TriangularPulse::new(center, height, half_width)]);
                let path = channel_path(&out, ch);
                trace::save_trace(&path, &samples, rate)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("Channel {}: pulse at sample {} -> {}", ch, center, path.display());
            }
            Ok(())
        }
        Commands::Events { file } => {
            let alerts = read_alerts(&file)?;
            if alerts.is_empty() {
                println!("No events recorded.");
            }
            for a in alerts {
                println!(
                    "sample {} (t={:.2}s): triggered by channel {}, corroborated by {:?}, discovered at sample {}",
                    a.absolute_sample_index,
                    a.timestamp_seconds,
                    a.triggering_channel_id,
                    a.corroborating_channel_ids,
                    a.discovery_sample_index
                );
            }
            Ok(())
        }
    }
}

fn load_config(explicit: Option<&Path>) -> Result<SeisConfig> {
    if let Some(path) = explicit {
        return SeisConfig::load(path).with_context(|| format!("Failed to load config {}", path.display()));
    }
    let default = ProjectDirs::from("org", "seiswatch", "seiswatch").map(|d| d.config_dir().join("config.kdl"));
    match default {
        Some(path) if path.exists() => {
            log::info!("Using config {}", path.display());
            SeisConfig::load(&path).with_context(|| format!("Failed to load config {}", path.display()))
        }
        _ => Ok(SeisConfig::default()),
    }
}

fn channel_path(prefix: &Path, channel: usize) -> PathBuf {
    let mut name = prefix.file_name().unwrap_or_default().to_os_string();
    name.push(format!("-{}.wav", channel));
    prefix.with_file_name(name)
}

async fn replay(config: &SeisConfig, paths: &[PathBuf], chunk: usize, record: Option<&Path>) -> Result<()> {
    if chunk == 0 {
        bail!("--chunk must be at least 1");
    }

    let mut channels: Vec<Vec<f64>> = Vec::new();
    let mut rate = None;
    for path in paths {
        let t = trace::load_trace(path).with_context(|| format!("Failed to load trace {}", path.display()))?;
        if let Some(r) = rate {
            if r != t.sample_rate {
                bail!("{} is {}Hz but earlier traces are {}Hz", path.display(), t.sample_rate, r);
            }
        }
        rate = Some(t.sample_rate);
        channels.extend(t.channels);
    }
    let rate = rate.context("No traces given")? as f64;

    if let Some(cutoff) = config.highpass() {
        for samples in channels.iter_mut() {
            filter::highpass(samples, rate, cutoff)?;
        }
    }

    let settings = config.settings(channels.len(), rate);
    if settings.channel_count != channels.len() {
        bail!(
            "Config expects {} channels but the traces provide {}",
            settings.channel_count,
            channels.len()
        );
    }
    let sink: Arc<dyn AlertSink> = match record {
        Some(path) => Arc::new(RecordingSink {
            file: FileSink::create(path)?,
        }),
        None => Arc::new(LogSink),
    };
    let detector = Arc::new(Detector::new(settings, sink)?);

    let mut tasks = tokio::task::JoinSet::new();
    for (id, samples) in channels.into_iter().enumerate() {
        let detector = detector.clone();
        tasks.spawn_blocking(move || -> Result<usize> {
            let mut rejected = 0;
            for batch in samples.chunks(chunk) {
                if let CheckOutcome::Rejected { .. } = detector.new_samples(id, batch)? {
                    rejected += 1;
                }
            }
            Ok(rejected)
        });
    }
    while let Some(joined) = tasks.join_next().await {
        let rejected = joined.context("Channel producer panicked")??;
        log::debug!("Producer finished with {} rejected candidates", rejected);
    }

    let events = detector.events();
    println!("{} event(s) confirmed", events.len());
    for e in events {
        println!(
            "  sample {} (t={:.2}s) channels {:?}",
            e.absolute_sample_index,
            detector.settings().timestamp_seconds(e.absolute_sample_index),
            e.corroborating_channel_ids
        );
    }
    Ok(())
}

/// Logs and records each alert.
struct RecordingSink {
    file: FileSink,
}

impl AlertSink for RecordingSink {
    fn name(&self) -> &str {
        "record"
    }

    fn notify(&self, alert: &seiswatch::api::Alert) -> Result<()> {
        LogSink.notify(alert)?;
        self.file.notify(alert)
    }
}
