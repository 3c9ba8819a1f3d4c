use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{DetectorError, Result};

pub const DEFAULT_WINDOW_SECONDS: f64 = 30.0 * 24.0 * 60.0 * 60.0;
pub const DEFAULT_MAX_PEAK_WIDTH_SECONDS: f64 = 60.0 * 60.0;
pub const DEFAULT_ALIGNMENT_TOLERANCE_SECONDS: f64 = 2.0;
pub const DEFAULT_THRESHOLD: f64 = 5.0;
pub const DEFAULT_MIN_WINDOW_SAMPLES: usize = 5;
pub const DEFAULT_MAX_SCALES: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorSettings {
    pub channel_count: usize,
    pub sample_rate_hz: f64,
    pub window_duration_seconds: f64,
    pub max_peak_width_seconds: f64,
    pub alignment_tolerance_seconds: f64,
    /// Minimum peak score (magnitude over noise floor).
    pub threshold: f64,
    /// Per-channel overrides of `threshold`.
    pub channel_thresholds: BTreeMap<usize, f64>,
    pub min_window_samples: usize,
    pub max_scales: usize,
}

impl DetectorSettings {
    pub fn new(channel_count: usize, sample_rate_hz: f64) -> Self {
        Self {
            channel_count,
            sample_rate_hz,
            window_duration_seconds: DEFAULT_WINDOW_SECONDS,
            max_peak_width_seconds: DEFAULT_MAX_PEAK_WIDTH_SECONDS,
            alignment_tolerance_seconds: DEFAULT_ALIGNMENT_TOLERANCE_SECONDS,
            threshold: DEFAULT_THRESHOLD,
            channel_thresholds: BTreeMap::new(),
            min_window_samples: DEFAULT_MIN_WINDOW_SAMPLES,
            max_scales: DEFAULT_MAX_SCALES,
        }
    }

    pub fn with_window(mut self, seconds: f64) -> Self {
        self.window_duration_seconds = seconds;
        self
    }

    pub fn with_max_peak_width(mut self, seconds: f64) -> Self {
        self.max_peak_width_seconds = seconds;
        self
    }

    pub fn with_alignment_tolerance(mut self, seconds: f64) -> Self {
        self.alignment_tolerance_seconds = seconds;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_channel_threshold(mut self, channel_id: usize, threshold: f64) -> Self {
        self.channel_thresholds.insert(channel_id, threshold);
        self
    }

    pub fn with_min_window_samples(mut self, samples: usize) -> Self {
        self.min_window_samples = samples;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(DetectorError::InvalidConfig(format!("{} must be positive, got {}", name, v)))
            }
        };

        if self.channel_count == 0 {
            return Err(DetectorError::InvalidConfig("channel_count must be at least 1".to_string()));
        }
        positive("sample_rate_hz", self.sample_rate_hz)?;
        positive("window_duration_seconds", self.window_duration_seconds)?;
        positive("max_peak_width_seconds", self.max_peak_width_seconds)?;
        positive("threshold", self.threshold)?;
        if !self.alignment_tolerance_seconds.is_finite() || self.alignment_tolerance_seconds < 0.0 {
            return Err(DetectorError::InvalidConfig(format!(
                "alignment_tolerance_seconds must be non-negative, got {}",
                self.alignment_tolerance_seconds
            )));
        }
        if self.alignment_tolerance_seconds > self.window_duration_seconds {
            return Err(DetectorError::InvalidConfig(format!(
                "alignment_tolerance_seconds ({}) exceeds window_duration_seconds ({})",
                self.alignment_tolerance_seconds, self.window_duration_seconds
            )));
        }
        for (&id, &t) in &self.channel_thresholds {
            if id >= self.channel_count {
                return Err(DetectorError::InvalidConfig(format!(
                    "threshold override for channel {} but only {} channels",
                    id, self.channel_count
                )));
            }
            positive("channel threshold", t)?;
        }
        if self.max_scales == 0 {
            return Err(DetectorError::InvalidConfig("max_scales must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn window_samples(&self) -> usize {
        seconds_to_samples(self.window_duration_seconds, self.sample_rate_hz).max(1)
    }

    pub fn max_peak_width_samples(&self) -> usize {
        (self.max_peak_width_seconds * self.sample_rate_hz).ceil().max(1.0) as usize
    }

    pub fn alignment_tolerance_samples(&self) -> usize {
        seconds_to_samples(self.alignment_tolerance_seconds, self.sample_rate_hz)
    }

    /// Samples each channel keeps: the window plus one wavelet width of older history.
    pub fn retention_samples(&self) -> usize {
        self.window_samples().saturating_add(self.max_peak_width_samples())
    }

    pub fn threshold_for(&self, channel_id: usize) -> f64 {
        self.channel_thresholds.get(&channel_id).copied().unwrap_or(self.threshold)
    }

    pub fn timestamp_seconds(&self, absolute_index: u64) -> f64 {
        absolute_index as f64 / self.sample_rate_hz
    }
}

fn seconds_to_samples(seconds: f64, rate: f64) -> usize {
    (seconds * rate).round().max(0.0) as usize
}
