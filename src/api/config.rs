use knuffel::Decode;
use serde::{Deserialize, Serialize};

use crate::detector::DetectorSettings;

#[derive(Decode, Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeisConfig {
    #[knuffel(child)]
    pub detector: Option<DetectorConfig>,
    #[knuffel(children(name = "channel"))]
    pub channels: Vec<ChannelConfig>,
    #[knuffel(child)]
    pub preprocess: Option<PreprocessConfig>,
}

#[derive(Decode, Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectorConfig {
    #[knuffel(property)]
    pub channels: Option<usize>,
    #[knuffel(property(name = "sample-rate"))]
    pub sample_rate: Option<f64>,
    #[knuffel(property)]
    pub window: Option<f64>,
    #[knuffel(property(name = "max-peak-width"))]
    pub max_peak_width: Option<f64>,
    #[knuffel(property(name = "alignment-tolerance"))]
    pub alignment_tolerance: Option<f64>,
    #[knuffel(property)]
    pub threshold: Option<f64>,
    #[knuffel(property(name = "min-samples"))]
    pub min_samples: Option<usize>,
    #[knuffel(property(name = "max-scales"))]
    pub max_scales: Option<usize>,
}

#[derive(Decode, Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[knuffel(argument)]
    pub id: usize,
    #[knuffel(property)]
    pub threshold: Option<f64>,
}

#[derive(Decode, Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// High-pass cutoff in Hz applied to replayed traces.
    #[knuffel(property)]
    pub highpass: Option<f64>,
}

impl SeisConfig {
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config = knuffel::parse("config.kdl", content)?;
        Ok(config)
    }

    /// Settings from this file, filling channel count and sample rate from the
    /// data source when the file leaves them out.
    pub fn settings(&self, channel_count: usize, sample_rate_hz: f64) -> DetectorSettings {
        let d = self.detector.clone().unwrap_or_default();
        let mut s = DetectorSettings::new(
            d.channels.unwrap_or(channel_count),
            d.sample_rate.unwrap_or(sample_rate_hz),
        );
        if let Some(v) = d.window {
            s.window_duration_seconds = v;
        }
        if let Some(v) = d.max_peak_width {
            s.max_peak_width_seconds = v;
        }
        if let Some(v) = d.alignment_tolerance {
            s.alignment_tolerance_seconds = v;
        }
        if let Some(v) = d.threshold {
            s.threshold = v;
        }
        if let Some(v) = d.min_samples {
            s.min_window_samples = v;
        }
        if let Some(v) = d.max_scales {
            s.max_scales = v;
        }
        for ch in &self.channels {
            if let Some(t) = ch.threshold {
                s.channel_thresholds.insert(ch.id, t);
            }
        }
        s
    }

    pub fn highpass(&self) -> Option<f64> {
        self.preprocess.as_ref().and_then(|p| p.highpass)
    }
}
