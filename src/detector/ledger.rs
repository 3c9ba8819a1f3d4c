use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{DetectorError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedEvent {
    pub absolute_sample_index: u64,
    pub corroborating_channel_ids: BTreeSet<usize>,
    pub triggering_channel_id: usize,
    /// Samples the triggering channel had received when the event was confirmed.
    pub discovery_sample_index: u64,
}

/// Every confirmed event, keyed by absolute sample index.
///
/// A peak counts as already known when it lies within the alignment tolerance
/// plus its own wavelet width of a recorded event; a broad pulse's apex can
/// shift by that much as the samples after it arrive.
#[derive(Debug, Default)]
pub struct EventLedger {
    events: BTreeMap<u64, ConfirmedEvent>,
    tolerance: u64,
}

impl EventLedger {
    pub fn new(tolerance: u64) -> Self {
        Self {
            events: BTreeMap::new(),
            tolerance,
        }
    }

    pub fn is_duplicate(&self, absolute_index: u64, tolerance: u64) -> bool {
        let lo = absolute_index.saturating_sub(tolerance);
        let hi = absolute_index.saturating_add(tolerance);
        self.events.range(lo..=hi).next().is_some()
    }

    pub fn radius(&self, width: usize) -> u64 {
        self.tolerance.saturating_add(width as u64)
    }

    pub fn record(
        &mut self,
        absolute_index: u64,
        width: usize,
        corroborating_ids: BTreeSet<usize>,
        triggering_channel_id: usize,
        discovery_sample_index: u64,
    ) -> Result<ConfirmedEvent> {
        if self.is_duplicate(absolute_index, self.radius(width)) {
            return Err(DetectorError::DuplicateEvent(absolute_index));
        }
        let event = ConfirmedEvent {
            absolute_sample_index: absolute_index,
            corroborating_channel_ids: corroborating_ids,
            triggering_channel_id,
            discovery_sample_index,
        };
        self.events.insert(absolute_index, event.clone());
        Ok(event)
    }

    pub fn events(&self) -> impl Iterator<Item = &ConfirmedEvent> {
        self.events.values()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
