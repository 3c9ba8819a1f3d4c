use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::detector::ConfirmedEvent;

/// What a sink receives for each confirmed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub absolute_sample_index: u64,
    pub corroborating_channel_ids: BTreeSet<usize>,
    pub triggering_channel_id: usize,
    pub discovery_sample_index: u64,
    /// Seconds since the first sample of the stream.
    pub timestamp_seconds: f64,
}

impl Alert {
    pub fn from_event(event: &ConfirmedEvent, sample_rate_hz: f64) -> Self {
        Self {
            absolute_sample_index: event.absolute_sample_index,
            corroborating_channel_ids: event.corroborating_channel_ids.clone(),
            triggering_channel_id: event.triggering_channel_id,
            discovery_sample_index: event.discovery_sample_index,
            timestamp_seconds: event.absolute_sample_index as f64 / sample_rate_hz,
        }
    }
}

pub trait AlertSink: Send + Sync {
    fn name(&self) -> &str {
        "anonymous"
    }

    fn notify(&self, alert: &Alert) -> Result<()>;
}

impl<F> AlertSink for F
where
    F: Fn(&Alert) -> Result<()> + Send + Sync,
{
    fn notify(&self, alert: &Alert) -> Result<()> {
        self(alert)
    }
}

pub struct LogSink;

impl AlertSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn notify(&self, alert: &Alert) -> Result<()> {
        log::warn!(
            "EARTHQUAKE at sample {} (t={:.2}s), triggered by channel {}, corroborated by {:?}",
            alert.absolute_sample_index,
            alert.timestamp_seconds,
            alert.triggering_channel_id,
            alert.corroborating_channel_ids
        );
        Ok(())
    }
}

/// Appends bincode-encoded alerts to a file.
pub struct FileSink {
    writer: Mutex<BufWriter<File>>,
}

impl FileSink {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open alert log: {}", path.display()))?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl AlertSink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    fn notify(&self, alert: &Alert) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow::anyhow!("Alert log writer poisoned"))?;
        bincode::serialize_into(&mut *writer, alert)?;
        writer.flush()?;
        Ok(())
    }
}

pub fn read_alerts<P: AsRef<Path>>(path: P) -> Result<Vec<Alert>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open alert log: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut alerts = Vec::new();
    loop {
        match bincode::deserialize_from::<_, Alert>(&mut reader) {
            Ok(alert) => alerts.push(alert),
            Err(e) => match *e {
                bincode::ErrorKind::Io(ref io) if io.kind() == ErrorKind::UnexpectedEof => break,
                _ => return Err(anyhow::anyhow!("Corrupt alert log {}: {}", path.display(), e)),
            },
        }
    }
    Ok(alerts)
}
