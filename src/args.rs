use crate::util::{shift_parser, wav_rate_parser};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multi-sensor earthquake detector with cross-channel consensus.")]
#[command(allow_negative_numbers = true)]
pub struct Cli {
    /// KDL configuration file; defaults to the platform config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Feed recorded traces through the detector, one producer per channel.
    Replay {
        /// Trace files; every channel of every file becomes one sensor, in order.
        #[arg(required = true)]
        traces: Vec<PathBuf>,
        /// Samples per ingestion call.
        #[arg(long, default_value_t = 100)]
        chunk: usize,
        /// Append confirmed alerts to this file.
        #[arg(long)]
        record: Option<PathBuf>,
    },
    /// Write synthetic single-sensor traces sharing one pulse.
    Simulate {
        /// Output prefix; channel N is written to <OUT>-N.wav.
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 3)]
        channels: usize,
        /// Sample rate in whole Hz.
        #[arg(long, default_value = "1", value_parser = wav_rate_parser)]
        rate: u32,
        #[arg(long, default_value_t = 600)]
        length: usize,
        #[arg(long, default_value_t = 300)]
        pulse_at: usize,
        #[arg(long, default_value_t = 10.0)]
        height: f64,
        #[arg(long, default_value_t = 3.0)]
        half_width: f64,
        #[arg(long, default_value_t = 1.0)]
        noise: f64,
        /// Move one channel's pulse, as CHANNEL:OFFSET samples.
        #[arg(long, value_parser = shift_parser)]
        shift: Vec<(usize, i64)>,
        #[arg(long, default_value_t = 7)]
        seed: u64,
    },
    /// Print alerts stored by `replay --record`.
    Events { file: PathBuf },
}
