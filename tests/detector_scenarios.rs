use std::collections::BTreeSet;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use seiswatch::detector::{CheckOutcome, Detector, DetectorSettings};
use seiswatch::synth::{Synthesizer, TriangularPulse};
use seiswatch::{Alert, AlertSink};

const NOISE: [[f64; 10]; 3] = [
    [0.4, -0.6, 0.5, -0.3, 0.7, -0.2, 0.6, -0.5, 0.3, -0.7],
    [-0.5, 0.3, -0.7, 0.6, -0.4, 0.5, -0.3, 0.7, -0.6, 0.2],
    [0.6, -0.4, 0.3, -0.6, 0.5, -0.7, 0.2, -0.3, 0.7, -0.5],
];

struct Collector {
    alerts: Mutex<Vec<Alert>>,
}

impl Collector {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            alerts: Mutex::new(Vec::new()),
        })
    }

    fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }
}

impl AlertSink for Collector {
    fn notify(&self, alert: &Alert) -> anyhow::Result<()> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

/// 3 channels, 1 Hz, 10 sample window, 1 sample tolerance.
fn small_detector() -> (Detector, Arc<Collector>) {
    let collector = Collector::new();
    let settings = DetectorSettings::new(3, 1.0)
        .with_window(10.0)
        .with_alignment_tolerance(1.0);
    let detector = Detector::new(settings, collector.clone()).unwrap();
    (detector, collector)
}

fn channel(id: usize, pulse_at: Option<usize>) -> Vec<f64> {
    let mut samples = NOISE[id].to_vec();
    if let Some(center) = pulse_at {
        TriangularPulse::new(center, 10.0, 2.0).add_to(&mut samples);
    }
    samples
}

fn feed(detector: &Detector, data: &[Vec<f64>], order: &[usize]) -> Vec<CheckOutcome> {
    order
        .iter()
        .map(|&id| detector.new_samples(id, &data[id]).unwrap())
        .collect()
}

#[test]
fn test_shared_pulse_confirms_once() {
    let (det, sink) = small_detector();
    let data: Vec<Vec<f64>> = (0..3).map(|id| channel(id, Some(5))).collect();
    let outcomes = feed(&det, &data, &[0, 1, 2]);

    assert!(matches!(outcomes[0], CheckOutcome::Rejected { dissenting_channel: 1, .. }));
    assert!(matches!(outcomes[1], CheckOutcome::Rejected { dissenting_channel: 2, .. }));
    let event = match &outcomes[2] {
        CheckOutcome::Confirmed(event) => event.clone(),
        other => panic!("expected confirmation, got {:?}", other),
    };
    assert_eq!(event.absolute_sample_index, 5);
    assert_eq!(event.corroborating_channel_ids, BTreeSet::from([0, 1, 2]));
    assert_eq!(event.triggering_channel_id, 2);
    assert_eq!(event.discovery_sample_index, 10);

    let alerts = sink.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].absolute_sample_index, 5);
    assert_eq!(alerts[0].timestamp_seconds, 5.0);
    assert_eq!(det.events(), vec![event]);
}

#[test]
fn test_misaligned_pulse_is_not_confirmed() {
    for order in [[0, 1, 2], [2, 1, 0]] {
        let (det, sink) = small_detector();
        let data = vec![channel(0, Some(5)), channel(1, Some(5)), channel(2, Some(8))];
        let outcomes = feed(&det, &data, &order);
        assert!(
            outcomes.iter().all(|o| !matches!(o, CheckOutcome::Confirmed(_))),
            "order {:?} confirmed: {:?}",
            order,
            outcomes
        );
        assert!(sink.alerts().is_empty());
        assert!(det.events().is_empty());
    }
}

#[test]
fn test_single_channel_pulse_is_local_noise() {
    let (det, sink) = small_detector();
    let data = vec![channel(0, Some(5)), channel(1, None), channel(2, None)];
    let outcomes = feed(&det, &data, &[1, 2, 0]);
    assert!(matches!(outcomes[2], CheckOutcome::Rejected { dissenting_channel: 1, .. }));
    assert!(sink.alerts().is_empty());
}

#[test]
fn test_replayed_peak_is_not_realerted() {
    let (det, sink) = small_detector();
    let data: Vec<Vec<f64>> = (0..3).map(|id| channel(id, Some(5))).collect();
    feed(&det, &data, &[0, 1, 2]);
    assert_eq!(sink.alerts().len(), 1);

    for id in 0..3 {
        assert!(
            matches!(det.check(id).unwrap(), CheckOutcome::Duplicate(_)),
            "channel {} should see a known event",
            id
        );
    }
    for id in 0..3 {
        let outcome = det.new_samples(id, &[0.2, -0.3]).unwrap();
        assert!(!matches!(outcome, CheckOutcome::Confirmed(_)), "channel {}: {:?}", id, outcome);
    }
    assert_eq!(sink.alerts().len(), 1);
    assert_eq!(det.events().len(), 1);
}

#[test]
fn test_ingestion_order_does_not_matter() {
    let data: Vec<Vec<f64>> = (0..3).map(|id| channel(id, Some(5))).collect();
    let mut confirmed = Vec::new();
    for order in [[0, 1, 2], [2, 1, 0], [1, 2, 0]] {
        let (det, sink) = small_detector();
        feed(&det, &data, &order);
        let events = det.events();
        assert_eq!(events.len(), 1, "order {:?}", order);
        assert_eq!(sink.alerts().len(), 1);
        confirmed.push(events[0].absolute_sample_index);
    }
    assert_eq!(confirmed, vec![5, 5, 5]);
}

#[test]
fn test_calibration_does_not_matter() {
    let (det, sink) = small_detector();
    let gains = [1.0, 1000.0, 0.001];
    let data: Vec<Vec<f64>> = (0..3)
        .map(|id| channel(id, Some(5)).into_iter().map(|x| x * gains[id]).collect())
        .collect();
    feed(&det, &data, &[0, 1, 2]);
    assert_eq!(sink.alerts().len(), 1);
    assert_eq!(sink.alerts()[0].corroborating_channel_ids, BTreeSet::from([0, 1, 2]));
}

#[test]
fn test_empty_and_short_channels_never_alert() {
    let (det, sink) = small_detector();
    assert_eq!(
        det.check(1).unwrap(),
        CheckOutcome::Insufficient { available: 0, required: 5 }
    );
    for id in 0..3 {
        let outcome = det.new_samples(id, &[0.0, 0.5, 40.0, 0.5]).unwrap();
        assert_eq!(outcome, CheckOutcome::Insufficient { available: 4, required: 5 });
    }
    assert!(sink.alerts().is_empty());
}

#[test]
fn test_concurrent_producers_alert_once() {
    for _ in 0..20 {
        let collector = Collector::new();
        let settings = DetectorSettings::new(3, 1.0)
            .with_window(10.0)
            .with_alignment_tolerance(1.0);
        let det = Arc::new(Detector::new(settings, collector.clone()).unwrap());
        let barrier = Arc::new(Barrier::new(3));

        let handles: Vec<_> = (0..3)
            .map(|id| {
                let det = det.clone();
                let barrier = barrier.clone();
                let samples = channel(id, Some(5));
                thread::spawn(move || {
                    barrier.wait();
                    for batch in samples.chunks(5) {
                        det.new_samples(id, batch).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let alerts = collector.alerts();
        assert_eq!(alerts.len(), 1, "exactly one alert expected, got {:?}", alerts);
        assert!(alerts[0].absolute_sample_index.abs_diff(5) <= 1);
        assert_eq!(det.events().len(), 1);
    }
}

#[test]
fn test_long_stream_with_eviction() {
    let collector = Collector::new();
    let settings = DetectorSettings::new(3, 1.0)
        .with_window(200.0)
        .with_max_peak_width(20.0)
        .with_threshold(8.0);
    let det = Detector::new(settings, collector.clone()).unwrap();

    let mut synth = Synthesizer::new(42, 1.0);
    let pulse = [TriangularPulse::new(250, 20.0, 3.0)];
    let data: Vec<Vec<f64>> = (0..3).map(|_| synth.channel(400, &pulse)).collect();

    // 10-sample batches split the pulse across two calls.
    for start in (0..400).step_by(10) {
        for (id, samples) in data.iter().enumerate() {
            det.new_samples(id, &samples[start..start + 10]).unwrap();
        }
    }

    let alerts = collector.alerts();
    assert_eq!(alerts.len(), 1, "alerts: {:?}", alerts);
    assert!(alerts[0].absolute_sample_index.abs_diff(250) <= 2);
    assert_eq!(det.channel_len(0).unwrap(), 400);
}

/// Streams one shared pulse at sample 100 through a 3-channel detector in
/// batches of `chunk`, round-robin across channels.
fn streamed_alerts(half_width: f64, chunk: usize, seed: u64) -> Vec<Alert> {
    let collector = Collector::new();
    let settings = DetectorSettings::new(3, 1.0)
        .with_window(300.0)
        .with_max_peak_width(20.0)
        .with_alignment_tolerance(2.0);
    let det = Detector::new(settings, collector.clone()).unwrap();

    let mut synth = Synthesizer::new(seed, 1.0);
    let pulse = [TriangularPulse::new(100, 10.0, half_width)];
    let data: Vec<Vec<f64>> = (0..3).map(|_| synth.channel(200, &pulse)).collect();

    for start in (0..200).step_by(chunk) {
        let end = (start + chunk).min(200);
        for (id, samples) in data.iter().enumerate() {
            det.new_samples(id, &samples[start..end]).unwrap();
        }
    }
    assert_eq!(det.events().len(), collector.alerts().len());
    collector.alerts()
}

#[test]
fn test_broad_pulse_in_single_samples_alerts_once() {
    for half_width in [8.0, 15.0] {
        let alerts = streamed_alerts(half_width, 1, 7);
        assert_eq!(alerts.len(), 1, "half width {}: {:?}", half_width, alerts);
        assert!(alerts[0].absolute_sample_index.abs_diff(100) <= 3, "{:?}", alerts);
        assert_eq!(alerts[0].corroborating_channel_ids, BTreeSet::from([0, 1, 2]));
    }
}

#[test]
fn test_broad_pulse_across_batches_alerts_once() {
    for (half_width, chunk, seed) in [(15.0, 3, 7), (8.0, 7, 7), (15.0, 25, 3), (5.0, 4, 11), (8.0, 13, 5)] {
        let alerts = streamed_alerts(half_width, chunk, seed);
        assert_eq!(
            alerts.len(),
            1,
            "half width {}, chunk {}, seed {}: {:?}",
            half_width,
            chunk,
            seed,
            alerts
        );
        assert!(alerts[0].absolute_sample_index.abs_diff(100) <= 3, "{:?}", alerts);
    }
}
