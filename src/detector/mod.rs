pub mod buffer;
pub mod consensus;
pub mod ledger;
pub mod peak;
pub mod settings;

pub use buffer::{ChannelBuffer, Window};
pub use consensus::{ChannelSnapshot, Consensus, ConsensusChecker, DissentReason};
pub use ledger::{ConfirmedEvent, EventLedger};
pub use peak::{Peak, PeakCandidate, PeakExtractor};
pub use settings::DetectorSettings;

use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::api::sink::{Alert, AlertSink};
use crate::error::{DetectorError, Result};

/// How a single check of one channel ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    Insufficient { available: usize, required: usize },
    NoPeak,
    Duplicate(PeakCandidate),
    Rejected { candidate: PeakCandidate, dissenting_channel: usize },
    Confirmed(ConfirmedEvent),
}

/// Multi-channel earthquake detector.
///
/// Every ingestion call checks the updated channel's trailing window for its
/// strongest transient and confirms it only when all other channels show a
/// peak at the same absolute sample index. Shareable across producer threads.
pub struct Detector {
    settings: DetectorSettings,
    channels: Vec<Mutex<ChannelBuffer>>,
    ledger: Mutex<EventLedger>,
    extractor: PeakExtractor,
    consensus: ConsensusChecker,
    sink: Arc<dyn AlertSink>,
}

// Buffers and the ledger are append-only, so a panic elsewhere never leaves them torn.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Detector {
    pub fn new(settings: DetectorSettings, sink: Arc<dyn AlertSink>) -> Result<Self> {
        settings.validate()?;

        let retention = settings.retention_samples();
        let channels = (0..settings.channel_count)
            .map(|id| Mutex::new(ChannelBuffer::new(id, settings.sample_rate_hz, retention)))
            .collect();
        let tolerance = settings.alignment_tolerance_samples();
        if settings.channel_count == 1 {
            info!("Single-channel detector: every peak counts as corroborated");
        }
        info!(
            "Detector ready: {} channels at {}Hz, window {} samples, tolerance {} samples, sink '{}'",
            settings.channel_count,
            settings.sample_rate_hz,
            settings.window_samples(),
            tolerance,
            sink.name()
        );

        Ok(Self {
            channels,
            ledger: Mutex::new(EventLedger::new(tolerance as u64)),
            extractor: PeakExtractor::new(settings.max_scales),
            consensus: ConsensusChecker::new(tolerance, settings.max_peak_width_samples()),
            sink,
            settings,
        })
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    pub fn new_samples(&self, channel_id: usize, samples: &[f64]) -> Result<CheckOutcome> {
        let buffer = self.channel(channel_id)?;
        if let Err(e) = lock(buffer).append(samples) {
            warn!("Rejected batch for channel {}: {}", channel_id, e);
            return Err(e);
        }
        self.check(channel_id)
    }

    pub fn check(&self, channel_id: usize) -> Result<CheckOutcome> {
        let (window, discovery) = {
            let buffer = lock(self.channel(channel_id)?);
            (buffer.window_samples(self.settings.window_samples()), buffer.total())
        };

        let required = self.settings.min_window_samples;
        if window.len() < required {
            debug!("Channel {}: {} of {} samples, waiting", channel_id, window.len(), required);
            return Ok(CheckOutcome::Insufficient {
                available: window.len(),
                required,
            });
        }

        let peak = self.extractor.find_best_peak(
            &window.samples,
            self.settings.max_peak_width_samples(),
            self.settings.threshold_for(channel_id),
        );
        let Some(peak) = peak else {
            return Ok(CheckOutcome::NoPeak);
        };
        let candidate = PeakCandidate::new(channel_id, window.start, peak);
        debug!(
            "Channel {}: candidate at sample {} (score {:.2}, width {})",
            channel_id, candidate.absolute_sample_index, candidate.score, candidate.width
        );

        let is_known = {
            let ledger = lock(&self.ledger);
            ledger.is_duplicate(candidate.absolute_sample_index, ledger.radius(candidate.width))
        };
        if is_known {
            debug!("Sample {} already confirmed", candidate.absolute_sample_index);
            return Ok(CheckOutcome::Duplicate(candidate));
        }

        let others = (0..self.channels.len())
            .filter(|&id| id != channel_id)
            .map(|id| self.snapshot(id, candidate.absolute_sample_index));
        let ids = match self.consensus.is_corroborated(&self.extractor, &candidate, others) {
            Consensus::Unanimous(ids) => ids,
            Consensus::Dissent { channel_id: dissenting_channel, .. } => {
                return Ok(CheckOutcome::Rejected {
                    candidate,
                    dissenting_channel,
                });
            }
        };

        let recorded = lock(&self.ledger).record(
            candidate.absolute_sample_index,
            candidate.width,
            ids,
            channel_id,
            discovery,
        );
        let event = match recorded {
            Ok(event) => event,
            Err(DetectorError::DuplicateEvent(index)) => {
                debug!("Sample {} confirmed concurrently by another channel", index);
                return Ok(CheckOutcome::Duplicate(candidate));
            }
            Err(e) => return Err(e),
        };

        info!(
            "Confirmed event at sample {} (t={:.2}s) triggered by channel {}",
            event.absolute_sample_index,
            self.settings.timestamp_seconds(event.absolute_sample_index),
            channel_id
        );
        let alert = Alert::from_event(&event, self.settings.sample_rate_hz);
        if let Err(e) = self.sink.notify(&alert) {
            warn!("Alert sink '{}' failed for sample {}: {:#}", self.sink.name(), event.absolute_sample_index, e);
        }
        Ok(CheckOutcome::Confirmed(event))
    }

    pub fn events(&self) -> Vec<ConfirmedEvent> {
        lock(&self.ledger).events().cloned().collect()
    }

    /// Total samples ever received on a channel.
    pub fn channel_len(&self, channel_id: usize) -> Result<u64> {
        Ok(lock(self.channel(channel_id)?).total())
    }

    fn channel(&self, channel_id: usize) -> Result<&Mutex<ChannelBuffer>> {
        self.channels.get(channel_id).ok_or(DetectorError::InvalidChannelId {
            id: channel_id,
            count: self.channels.len(),
        })
    }

    fn snapshot(&self, channel_id: usize, absolute_index: u64) -> ChannelSnapshot {
        let (slice, window) = {
            let buffer = lock(&self.channels[channel_id]);
            (
                buffer.read_at(absolute_index, self.consensus.read_radius()),
                buffer.window_samples(self.settings.window_samples()),
            )
        };
        ChannelSnapshot {
            channel_id,
            slice,
            noise_floor: peak::noise_floor(&window.samples),
            threshold: self.settings.threshold_for(channel_id),
        }
    }
}
