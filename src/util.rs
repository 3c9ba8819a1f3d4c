pub fn median_abs(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut abs: Vec<f64> = samples.iter().map(|x| x.abs()).collect();
    let mid = abs.len() / 2;
    let (lower, upper, _) = abs.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    let upper = *upper;
    if samples.len() % 2 == 1 {
        upper
    } else {
        let lower_max = lower.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (lower_max + upper) / 2.0
    }
}

/// Parses `CHANNEL:OFFSET`, e.g. `2:3` or `1:-4`.
pub fn shift_parser(s: &str) -> Result<(usize, i64), String> {
    let s = s.trim();
    let (ch, off) = s
        .split_once(':')
        .ok_or_else(|| format!("Expected CHANNEL:OFFSET, got '{}'", s))?;
    let ch = ch
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("Invalid channel '{}': {}", ch, e))?;
    let off = off
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("Invalid offset '{}': {}", off, e))?;
    Ok((ch, off))
}

pub fn rate_parser(s: &str) -> Result<f64, String> {
    let s = s.trim();
    let s = s.strip_suffix("Hz").or_else(|| s.strip_suffix("hz")).unwrap_or(s);
    s.trim()
        .parse::<f64>()
        .map_err(|e| format!("Invalid sample rate '{}': {}", s, e))
        .and_then(|v| {
            if v > 0.0 && v.is_finite() {
                Ok(v)
            } else {
                Err(format!("Sample rate must be positive, got {}", v))
            }
        })
}

/// Like `rate_parser`, but WAV headers only carry whole hertz.
pub fn wav_rate_parser(s: &str) -> Result<u32, String> {
    let rate = rate_parser(s)?;
    if rate.fract() != 0.0 || rate > u32::MAX as f64 {
        return Err(format!("WAV traces need a whole number of Hz, got {}", rate));
    }
    Ok(rate as u32)
}
