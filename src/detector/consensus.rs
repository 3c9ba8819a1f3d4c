use log::debug;
use std::collections::BTreeSet;

use crate::detector::buffer::Window;
use crate::detector::peak::{Peak, PeakCandidate, PeakExtractor, SETTLE_WIDTHS};
use crate::error::Result;

/// What consensus needs from one other channel, copied out under its lock.
#[derive(Debug, Clone)]
pub struct ChannelSnapshot {
    pub channel_id: usize,
    /// Samples around the candidate index, or why there are none.
    pub slice: Result<Window>,
    pub noise_floor: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DissentReason {
    NoHistory,
    NoPeak,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Consensus {
    Unanimous(BTreeSet<usize>),
    Dissent { channel_id: usize, reason: DissentReason },
}

/// Checks that a candidate shows up on every other channel at the same instant.
#[derive(Debug, Clone, Copy)]
pub struct ConsensusChecker {
    tolerance: usize,
    max_width: usize,
}

impl ConsensusChecker {
    pub fn new(tolerance: usize, max_width: usize) -> Self {
        Self { tolerance, max_width }
    }

    pub fn tolerance(&self) -> usize {
        self.tolerance
    }

    /// Radius of the slice to read so a peak of the widest wavelet can settle.
    pub fn read_radius(&self) -> usize {
        self.tolerance
            .saturating_add(SETTLE_WIDTHS.saturating_mul(self.max_width))
            .saturating_add(1)
    }

    /// Stops at the first channel that fails to corroborate. With no other
    /// channels the candidate is trivially unanimous.
    pub fn is_corroborated<I>(&self, extractor: &PeakExtractor, candidate: &PeakCandidate, others: I) -> Consensus
    where
        I: IntoIterator<Item = ChannelSnapshot>,
    {
        let mut ids = BTreeSet::from([candidate.channel_id]);
        for snapshot in others {
            if snapshot.channel_id == candidate.channel_id {
                continue;
            }
            match self.corroborates(extractor, candidate.absolute_sample_index, &snapshot) {
                Ok(peak) => {
                    debug!(
                        "Channel {} corroborates sample {} (score {:.2}, width {})",
                        snapshot.channel_id, candidate.absolute_sample_index, peak.score, peak.width
                    );
                    ids.insert(snapshot.channel_id);
                }
                Err(reason) => {
                    debug!(
                        "Channel {} dissents on sample {}: {:?}",
                        snapshot.channel_id, candidate.absolute_sample_index, reason
                    );
                    return Consensus::Dissent {
                        channel_id: snapshot.channel_id,
                        reason,
                    };
                }
            }
        }
        Consensus::Unanimous(ids)
    }

    pub fn corroborates(
        &self,
        extractor: &PeakExtractor,
        absolute_index: u64,
        snapshot: &ChannelSnapshot,
    ) -> std::result::Result<Peak, DissentReason> {
        let slice = match &snapshot.slice {
            Ok(slice) if !slice.is_empty() => slice,
            _ => return Err(DissentReason::NoHistory),
        };
        if absolute_index < slice.start || absolute_index >= slice.end() {
            return Err(DissentReason::NoHistory);
        }

        let center = (absolute_index - slice.start) as usize;
        let allowed = center.saturating_sub(self.tolerance)
            ..center.saturating_add(self.tolerance).saturating_add(1).min(slice.len());
        extractor
            .find_best_peak_within(
                &slice.samples,
                self.max_width,
                allowed,
                snapshot.noise_floor,
                snapshot.threshold,
            )
            .ok_or(DissentReason::NoPeak)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::peak::noise_floor;
    use crate::error::DetectorError;

    const NOISE: [f64; 10] = [-0.5, 0.3, -0.7, 0.6, -0.4, 0.5, -0.3, 0.7, -0.6, 0.2];

    fn pulse_at(center: usize) -> Vec<f64> {
        NOISE
            .iter()
            .enumerate()
            .map(|(i, &n)| n + (10.0 * (1.0 - (i as f64 - center as f64).abs() / 2.0)).max(0.0))
            .collect()
    }

    fn snapshot(channel_id: usize, samples: Vec<f64>) -> ChannelSnapshot {
        let floor = noise_floor(&samples);
        ChannelSnapshot {
            channel_id,
            slice: Ok(Window { start: 0, samples }),
            noise_floor: floor,
            threshold: 5.0,
        }
    }

    fn candidate(channel_id: usize, index: u64) -> PeakCandidate {
        PeakCandidate {
            channel_id,
            absolute_sample_index: index,
            magnitude: 10.0,
            score: 20.0,
            width: 2,
        }
    }

    #[test]
    fn test_aligned_channels_agree() {
        let ex = PeakExtractor::new(32);
        let checker = ConsensusChecker::new(1, 3600);
        let others = vec![snapshot(1, pulse_at(5)), snapshot(2, pulse_at(4))];
        let result = checker.is_corroborated(&ex, &candidate(0, 5), others);
        assert_eq!(result, Consensus::Unanimous(BTreeSet::from([0, 1, 2])));
    }

    #[test]
    fn test_misaligned_channel_dissents() {
        let ex = PeakExtractor::new(32);
        let checker = ConsensusChecker::new(1, 3600);
        let others = vec![snapshot(1, pulse_at(5)), snapshot(2, pulse_at(8))];
        let result = checker.is_corroborated(&ex, &candidate(0, 5), others);
        assert_eq!(
            result,
            Consensus::Dissent {
                channel_id: 2,
                reason: DissentReason::NoPeak
            }
        );
    }

    #[test]
    fn test_missing_history_dissents() {
        let ex = PeakExtractor::new(32);
        let checker = ConsensusChecker::new(1, 3600);
        let missing = ChannelSnapshot {
            channel_id: 1,
            slice: Err(DetectorError::OutOfRange { index: 5, retained: 0..0 }),
            noise_floor: 0.0,
            threshold: 5.0,
        };
        let result = checker.is_corroborated(&ex, &candidate(0, 5), vec![missing]);
        assert_eq!(
            result,
            Consensus::Dissent {
                channel_id: 1,
                reason: DissentReason::NoHistory
            }
        );
    }

    #[test]
    fn test_single_channel_is_unanimous() {
        let ex = PeakExtractor::new(32);
        let checker = ConsensusChecker::new(1, 3600);
        let result = checker.is_corroborated(&ex, &candidate(0, 5), Vec::new());
        assert_eq!(result, Consensus::Unanimous(BTreeSet::from([0])));
    }

    #[test]
    fn test_short_circuits_on_first_dissent() {
        let ex = PeakExtractor::new(32);
        let checker = ConsensusChecker::new(1, 3600);
        let mut visited = Vec::new();
        let snapshots = [snapshot(1, NOISE.to_vec()), snapshot(2, pulse_at(5))];
        let result = checker.is_corroborated(
            &ex,
            &candidate(0, 5),
            snapshots.into_iter().inspect(|s| visited.push(s.channel_id)),
        );
        assert!(matches!(result, Consensus::Dissent { channel_id: 1, .. }));
        assert_eq!(visited, vec![1], "Later channels should not be evaluated");
    }

    #[test]
    fn test_unsettled_channel_dissents() {
        let ex = PeakExtractor::new(32);
        let checker = ConsensusChecker::new(1, 3600);
        let cut = pulse_at(5)[..7].to_vec();
        assert_eq!(checker.corroborates(&ex, 5, &snapshot(1, cut)), Err(DissentReason::NoPeak));
    }

    #[test]
    fn test_extreme_tolerance_does_not_overflow() {
        let checker = ConsensusChecker::new(usize::MAX, usize::MAX);
        assert_eq!(checker.read_radius(), usize::MAX);
        let ex = PeakExtractor::new(32);
        let wide = ConsensusChecker::new(usize::MAX, 3600);
        assert!(wide.corroborates(&ex, 5, &snapshot(1, pulse_at(5))).is_ok());
    }

    #[test]
    fn test_threshold_is_per_channel() {
        let ex = PeakExtractor::new(32);
        let checker = ConsensusChecker::new(1, 3600);
        let mut strict = snapshot(1, pulse_at(5));
        strict.threshold = 1_000.0;
        assert_eq!(checker.corroborates(&ex, 5, &strict), Err(DissentReason::NoPeak));
    }
}
