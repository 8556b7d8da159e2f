//! Double Exponential Moving Average.
//!
//! DEMA = 2 * EMA(x) - EMA(EMA(x)), both legs with the same period.
//! Warmup: 2 * (n-1) values.

use super::ema::calculate_ema;
use super::Series;

pub fn calculate_dema(values: &[Option<f64>], period: usize) -> Series {
    let ema1 = calculate_ema(values, period);
    let ema2 = calculate_ema(&ema1, period);

    ema1.iter()
        .zip(&ema2)
        .map(|(a, b)| match (a, b) {
            (Some(a), Some(b)) => Some(2.0 * a - b),
            _ => None,
        })
        .collect()
}
