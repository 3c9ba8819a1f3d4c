use rustfft::{num_complex::Complex, FftPlanner};
use std::ops::Range;
use std::sync::{Mutex, PoisonError};

use crate::util::median_abs;

/// Above this many multiply-adds per width the response is computed through the FFT.
const DIRECT_CONVOLUTION_LIMIT: usize = 1 << 16;
/// Rows a ridge may skip before it is closed.
const RIDGE_GAP_THRESHOLD: usize = 1;
/// Widths of data a peak needs on each side before it is reported. Closer to
/// either end of the slice the response is shaped by the zero padding, and a
/// rising edge looks like a peak that moves as samples arrive.
pub const SETTLE_WIDTHS: usize = 2;

/// A transient located by the wavelet search, relative to the searched slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Ridge position at the width of its strongest response.
    pub index: usize,
    /// Strongest wavelet response along the ridge, in channel units.
    pub magnitude: f64,
    /// `magnitude` divided by the noise floor.
    pub score: f64,
    /// Wavelet width (samples) where `magnitude` occurred.
    pub width: usize,
}

/// A peak found in one channel's window, placed on the absolute sample axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakCandidate {
    pub channel_id: usize,
    pub absolute_sample_index: u64,
    pub magnitude: f64,
    pub score: f64,
    pub width: usize,
}

impl PeakCandidate {
    pub fn new(channel_id: usize, window_start: u64, peak: Peak) -> Self {
        Self {
            channel_id,
            absolute_sample_index: window_start + peak.index as u64,
            magnitude: peak.magnitude,
            score: peak.score,
            width: peak.width,
        }
    }
}

#[derive(Debug, Clone)]
struct Ridge {
    column: usize,
    /// Column at the width where `magnitude` occurred.
    peak_column: usize,
    magnitude: f64,
    width: usize,
    length: usize,
    gap: usize,
}

/// Ricker wavelet with `points` taps, centred, in the scipy normalisation.
pub fn ricker(points: usize, width: f64) -> Vec<f64> {
    let amplitude = 2.0 / ((3.0 * width).sqrt() * std::f64::consts::PI.powf(0.25));
    let wsq = width * width;
    let center = (points as f64 - 1.0) / 2.0;
    (0..points)
        .map(|i| {
            let x = i as f64 - center;
            let xsq = x * x;
            amplitude * (1.0 - xsq / wsq) * (-xsq / (2.0 * wsq)).exp()
        })
        .collect()
}

/// Median absolute amplitude, falling back to the mean when most samples are zero.
pub fn noise_floor(samples: &[f64]) -> f64 {
    let median = median_abs(samples);
    if median > 0.0 || samples.is_empty() {
        return median;
    }
    samples.iter().map(|x| x.abs()).sum::<f64>() / samples.len() as f64
}

/// Scale-space peak search over a continuous wavelet transform.
///
/// Only settled ridges are reported: the strongest response must have
/// `SETTLE_WIDTHS` of its width in samples on both sides inside the slice.
pub struct PeakExtractor {
    max_scales: usize,
    planner: Mutex<FftPlanner<f64>>,
}

impl PeakExtractor {
    pub fn new(max_scales: usize) -> Self {
        Self {
            max_scales: max_scales.max(1),
            planner: Mutex::new(FftPlanner::new()),
        }
    }

    pub fn find_best_peak(&self, samples: &[f64], max_width: usize, threshold: f64) -> Option<Peak> {
        self.find_best_peak_within(samples, max_width, 0..samples.len(), noise_floor(samples), threshold)
    }

    /// Best peak whose position lies in `allowed`, scored against `noise_floor`.
    pub fn find_best_peak_within(
        &self,
        samples: &[f64],
        max_width: usize,
        allowed: Range<usize>,
        noise_floor: f64,
        threshold: f64,
    ) -> Option<Peak> {
        if samples.len() < 3 || allowed.is_empty() || noise_floor.is_nan() || noise_floor <= 0.0 {
            return None;
        }

        let widths = self.widths(samples.len(), max_width);
        let rows: Vec<Vec<f64>> = widths.iter().map(|&w| self.cwt_row(samples, w)).collect();
        let min_length = widths.len().div_ceil(4).max(1);

        identify_ridges(&rows, &widths)
            .into_iter()
            .filter(|r| r.length >= min_length && r.is_settled(samples.len()))
            .filter(|r| allowed.contains(&r.peak_column))
            .map(|r| Peak {
                index: r.peak_column,
                magnitude: r.magnitude,
                score: r.magnitude / noise_floor,
                width: r.width,
            })
            .filter(|p| p.score >= threshold)
            .max_by(|a, b| a.magnitude.total_cmp(&b.magnitude).then(a.index.cmp(&b.index)))
    }

    /// Widths 1..=cap, or a geometric subset when that exceeds the scale budget.
    pub fn widths(&self, len: usize, max_width: usize) -> Vec<usize> {
        let cap = max_width.min(len / 2).max(1);
        if cap <= self.max_scales {
            return (1..=cap).collect();
        }
        let steps = (self.max_scales - 1).max(1) as f64;
        let mut widths: Vec<usize> = (0..self.max_scales)
            .map(|k| (cap as f64).powf(k as f64 / steps).round() as usize)
            .collect();
        widths.dedup();
        widths
    }

    /// Ricker response for one width, same length as `samples`.
    pub fn cwt_row(&self, samples: &[f64], width: usize) -> Vec<f64> {
        let half = ((5 * width).min(samples.len().saturating_sub(1))).max(1);
        let kernel = ricker(2 * half + 1, width as f64);
        if samples.len() * kernel.len() <= DIRECT_CONVOLUTION_LIMIT {
            convolve_direct(samples, &kernel)
        } else {
            self.convolve_fft(samples, &kernel)
        }
    }

    fn convolve_fft(&self, signal: &[f64], kernel: &[f64]) -> Vec<f64> {
        let n = signal.len();
        let len = n + kernel.len() - 1;
        let (forward, inverse) = {
            let mut planner = self.planner.lock().unwrap_or_else(PoisonError::into_inner);
            (planner.plan_fft_forward(len), planner.plan_fft_inverse(len))
        };

        let pad = |xs: &[f64]| -> Vec<Complex<f64>> {
            let mut buf: Vec<Complex<f64>> = xs.iter().map(|&x| Complex::new(x, 0.0)).collect();
            buf.resize(len, Complex::new(0.0, 0.0));
            buf
        };
        let mut a = pad(signal);
        let mut b = pad(kernel);
        forward.process(&mut a);
        forward.process(&mut b);
        for (x, y) in a.iter_mut().zip(b.iter()) {
            *x *= *y;
        }
        inverse.process(&mut a);

        let half = kernel.len() / 2;
        let scale = 1.0 / len as f64;
        a[half..half + n].iter().map(|c| c.re * scale).collect()
    }
}

impl Ridge {
    fn is_settled(&self, len: usize) -> bool {
        let margin = SETTLE_WIDTHS.saturating_mul(self.width);
        self.peak_column >= margin && len - 1 - self.peak_column >= margin
    }
}

fn convolve_direct(signal: &[f64], kernel: &[f64]) -> Vec<f64> {
    let n = signal.len() as isize;
    let half = (kernel.len() / 2) as isize;
    (0..n)
        .map(|k| {
            kernel
                .iter()
                .enumerate()
                .filter_map(|(j, &w)| {
                    let idx = k + half - j as isize;
                    (0..n).contains(&idx).then(|| w * signal[idx as usize])
                })
                .sum()
        })
        .collect()
}

/// Interior columns strictly above their left neighbour, not below their right, and positive.
fn relative_maxima(row: &[f64]) -> Vec<usize> {
    (1..row.len().saturating_sub(1))
        .filter(|&i| row[i] > 0.0 && row[i] > row[i - 1] && row[i] >= row[i + 1])
        .collect()
}

/// Links per-width maxima into ridges, walking from the widest scale down.
fn identify_ridges(rows: &[Vec<f64>], widths: &[usize]) -> Vec<Ridge> {
    let mut active: Vec<Ridge> = Vec::new();
    let mut finished: Vec<Ridge> = Vec::new();

    for (row, &width) in rows.iter().zip(widths.iter()).rev() {
        let maxima = relative_maxima(row);
        let max_distance = width.div_ceil(4).max(1);
        let mut taken = vec![false; maxima.len()];

        for ridge in active.iter_mut() {
            let nearest = maxima
                .iter()
                .enumerate()
                .filter(|(k, _)| !taken[*k])
                .map(|(k, &col)| (k, col.abs_diff(ridge.column)))
                .filter(|&(_, dist)| dist <= max_distance)
                .min_by_key(|&(_, dist)| dist);

            match nearest {
                Some((k, _)) => {
                    taken[k] = true;
                    let col = maxima[k];
                    ridge.column = col;
                    ridge.length += 1;
                    ridge.gap = 0;
                    if row[col] > ridge.magnitude {
                        ridge.magnitude = row[col];
                        ridge.peak_column = col;
                        ridge.width = width;
                    }
                }
                None => ridge.gap += 1,
            }
        }

        let (alive, closed): (Vec<Ridge>, Vec<Ridge>) =
            active.drain(..).partition(|r| r.gap <= RIDGE_GAP_THRESHOLD);
        active = alive;
        finished.extend(closed);

        for (k, &col) in maxima.iter().enumerate() {
            if !taken[k] {
                active.push(Ridge {
                    column: col,
                    peak_column: col,
                    magnitude: row[col],
                    width,
                    length: 1,
                    gap: 0,
                });
            }
        }
    }

    finished.extend(active);
    finished
}
