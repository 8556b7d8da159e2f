//! Wilder running moving average (RMA).
//!
//! Exponential smoothing with alpha = 1/n, seeded by the first defined value:
//! RMA[first] = x[first], RMA[i] = RMA[i-1] + (x[i] - RMA[i-1]) / n.
//! Output is withheld until n defined values have been absorbed, so the
//! first defined output sits at the n-th defined input.

use super::{first_defined, Series};

pub fn calculate_rma(values: &[Option<f64>], period: usize) -> Series {
    let mut out = vec![None; values.len()];
    let Some(start) = first_defined(values) else {
        return out;
    };
    if period == 0 {
        return out;
    }

    let alpha = 1.0 / period as f64;
    let mut seen = 0usize;
    let mut rma = 0.0;

    for (i, value) in values.iter().enumerate().skip(start) {
        let Some(x) = *value else {
            continue;
        };
        rma = if seen == 0 { x } else { rma + (x - rma) * alpha };
        seen += 1;
        if seen >= period {
            out[i] = Some(rma);
        }
    }

    out
}
