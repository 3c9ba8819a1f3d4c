use anyhow::{anyhow, bail, Result};
use biquad::{Biquad, Coefficients, DirectForm1, ToHertz, Type};
use std::f64::consts::FRAC_1_SQRT_2;

pub fn forward_backward_filter<F: Biquad<f64>>(signal: &mut [f64], filter: &mut F) {
    signal.iter_mut().for_each(|x| *x = filter.run(*x));
    filter.reset_state();
    signal.reverse();
    signal.iter_mut().for_each(|x| *x = filter.run(*x));
    filter.reset_state();
    signal.reverse();
}

pub fn make_coefficients(f_type: Type<f64>, fs: f64, freq: f64, q: f64) -> Result<Coefficients<f64>> {
    Coefficients::<f64>::from_params(f_type, fs.hz(), freq.hz(), q)
        .map_err(|_| anyhow!("Failed to create filter coefficients for {}Hz at fs={}Hz", freq, fs))
}

/// Zero-phase high-pass that strips DC offset and slow drift from a trace.
pub fn highpass(samples: &mut [f64], sample_rate: f64, cutoff_hz: f64) -> Result<()> {
    if !(cutoff_hz > 0.0 && cutoff_hz < sample_rate / 2.0) {
        bail!("High-pass cutoff {}Hz must lie between 0 and Nyquist ({}Hz)", cutoff_hz, sample_rate / 2.0);
    }
    let coeffs = make_coefficients(Type::HighPass, sample_rate, cutoff_hz, FRAC_1_SQRT_2)?;
    let mut hpf = DirectForm1::<f64>::new(coeffs);
    forward_backward_filter(samples, &mut hpf);
    Ok(())
}
