use std::collections::VecDeque;

use crate::error::{DetectorError, Result};

/// A copied-out run of consecutive samples and the absolute index of the first one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Window {
    pub start: u64,
    pub samples: Vec<f64>,
}

impl Window {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// One past the absolute index of the last sample.
    pub fn end(&self) -> u64 {
        self.start + self.samples.len() as u64
    }
}

/// Rolling sample history of one channel.
///
/// Samples older than `capacity` are evicted; `offset` keeps the absolute index
/// of the oldest retained sample so indices stay comparable across channels.
#[derive(Debug)]
pub struct ChannelBuffer {
    id: usize,
    sample_rate: f64,
    capacity: usize,
    offset: u64,
    samples: VecDeque<f64>,
}

impl ChannelBuffer {
    pub fn new(id: usize, sample_rate: f64, capacity: usize) -> Self {
        Self {
            id,
            sample_rate,
            capacity: capacity.max(1),
            offset: 0,
            samples: VecDeque::new(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Total number of samples ever appended.
    pub fn total(&self) -> u64 {
        self.offset + self.samples.len() as u64
    }

    /// Absolute index range still held in memory.
    pub fn retained(&self) -> std::ops::Range<u64> {
        self.offset..self.total()
    }

    pub fn append(&mut self, samples: &[f64]) -> Result<()> {
        if samples.is_empty() {
            return Err(DetectorError::InvalidInput(format!(
                "empty sample batch for channel {}",
                self.id
            )));
        }
        if let Some(pos) = samples.iter().position(|x| !x.is_finite()) {
            return Err(DetectorError::InvalidInput(format!(
                "non-finite sample {} at batch position {} for channel {}",
                samples[pos], pos, self.id
            )));
        }

        self.samples.extend(samples.iter().copied());
        let excess = self.samples.len().saturating_sub(self.capacity);
        if excess > 0 {
            self.samples.drain(..excess);
            self.offset += excess as u64;
        }
        Ok(())
    }

    pub fn window(&self, duration_seconds: f64) -> Window {
        let size = (duration_seconds * self.sample_rate).round().max(0.0) as usize;
        self.window_samples(size)
    }

    /// The most recent `size` samples, or everything retained if there are fewer.
    pub fn window_samples(&self, size: usize) -> Window {
        let len = self.samples.len();
        let skip = len.saturating_sub(size);
        Window {
            start: self.offset + skip as u64,
            samples: self.samples.range(skip..).copied().collect(),
        }
    }

    pub fn read_at(&self, absolute_index: u64, radius: usize) -> Result<Window> {
        let retained = self.retained();
        if !retained.contains(&absolute_index) {
            return Err(DetectorError::OutOfRange {
                index: absolute_index,
                retained,
            });
        }

        let first = absolute_index.saturating_sub(radius as u64).max(self.offset);
        let last = absolute_index
            .saturating_add(radius as u64)
            .saturating_add(1)
            .min(retained.end);
        let from = (first - self.offset) as usize;
        let to = (last - self.offset) as usize;
        Ok(Window {
            start: first,
            samples: self.samples.range(from..to).copied().collect(),
        })
    }
}
