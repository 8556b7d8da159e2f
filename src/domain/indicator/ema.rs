//! Exponential Moving Average.
//!
//! k = 2/(n+1), seed with the SMA of the first n defined values, then
//! EMA[i] = x[i]*k + EMA[i-1]*(1-k).
//! Warmup: leading undefined inputs are skipped, then (n-1) more values are
//! undefined. An undefined input after warmup yields an undefined output and
//! leaves the running average untouched.

use super::{first_defined, Series};

pub fn calculate_ema(values: &[Option<f64>], period: usize) -> Series {
    let mut out = vec![None; values.len()];
    let Some(start) = first_defined(values) else {
        return out;
    };
    if period == 0 {
        return out;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut seen = 0usize;
    let mut sum = 0.0;
    let mut ema = 0.0;

    for (i, value) in values.iter().enumerate().skip(start) {
        let Some(x) = *value else {
            continue;
        };
        seen += 1;
        if seen < period {
            sum += x;
        } else if seen == period {
            sum += x;
            ema = sum / period as f64;
            out[i] = Some(ema);
        } else {
            ema = x * k + ema * (1.0 - k);
            out[i] = Some(ema);
        }
    }

    out
}
