use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Symmetric triangle centred on `center`, zero outside `± half_width`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangularPulse {
    pub center: usize,
    pub height: f64,
    pub half_width: f64,
}

impl TriangularPulse {
    pub fn new(center: usize, height: f64, half_width: f64) -> Self {
        Self { center, height, half_width }
    }

    pub fn value_at(&self, index: usize) -> f64 {
        let d = (index as f64 - self.center as f64).abs();
        (self.height * (1.0 - d / self.half_width)).max(0.0)
    }

    pub fn add_to(&self, samples: &mut [f64]) {
        for (i, s) in samples.iter_mut().enumerate() {
            *s += self.value_at(i);
        }
    }
}

/// Deterministic generator of sensor recordings.
pub struct Synthesizer {
    rng: StdRng,
    noise_amplitude: f64,
}

impl Synthesizer {
    pub fn new(seed: u64, noise_amplitude: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            noise_amplitude,
        }
    }

    pub fn noise(&mut self, len: usize) -> Vec<f64> {
        let a = self.noise_amplitude;
        if a <= 0.0 {
            return vec![0.0; len];
        }
        (0..len).map(|_| self.rng.gen_range(-a..=a)).collect()
    }

    /// Noise plus pulses, multiplied by a random sensor gain in `[0.5, 2.0)`.
    pub fn channel(&mut self, len: usize, pulses: &[TriangularPulse]) -> Vec<f64> {
        let mut samples = self.noise(len);
        for pulse in pulses {
            pulse.add_to(&mut samples);
        }
        let gain: f64 = self.rng.gen_range(0.5..2.0);
        samples.iter_mut().for_each(|x| *x *= gain);
        samples
    }
}
