//! Discrete trend signals.
//!
//! Two signal engines share the [`TrendState`] vocabulary:
//!
//! - [`rsi_ema_trend`]: RSI(14) smoothed by EMA(3), compared to the 50
//!   midline. Used raw (no forward-fill) on every pairwise price ratio by the
//!   ranking engine.
//! - [`directional_trend`]: DEMA-smoothed directional movement (DMI) with an
//!   ADX-style strength filter. Forward-filled through [`ForwardFill`] and
//!   read one bar lagged by the rotation engine.
//!
//! Both are pure functions of their input: identical input, identical output.

use std::fmt;

use super::indicator::dema::calculate_dema;
use super::indicator::ema::calculate_ema;
use super::indicator::rma::calculate_rma;
use super::indicator::rsi::calculate_rsi;
use super::indicator::{defined, Series};
use super::price::PricePoint;

pub const RSI_PERIOD: usize = 14;
pub const RSI_SMOOTHING: usize = 3;
const MIDLINE: f64 = 50.0;

/// Bars needed before [`rsi_ema_trend`] can produce its first defined state.
pub const MOMENTUM_WARMUP: usize = RSI_PERIOD + RSI_SMOOTHING;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TrendState {
    Up,
    Down,
    #[default]
    Undefined,
}

impl TrendState {
    pub fn is_defined(self) -> bool {
        self != TrendState::Undefined
    }

    /// Above the midline is up, below is down, exactly on it (or missing) is
    /// undefined.
    fn from_midline(value: Option<f64>) -> Self {
        match value {
            Some(v) if v > MIDLINE => TrendState::Up,
            Some(v) if v < MIDLINE => TrendState::Down,
            _ => TrendState::Undefined,
        }
    }
}

impl fmt::Display for TrendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendState::Up => write!(f, "UP"),
            TrendState::Down => write!(f, "DOWN"),
            TrendState::Undefined => write!(f, "UNDEFINED"),
        }
    }
}

/// Carries the last defined state forward through undefined steps.
///
/// Updated once per index so the live cycle and the backtest share one code
/// path.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardFill {
    last: TrendState,
}

impl ForwardFill {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, raw: TrendState) -> TrendState {
        if raw.is_defined() {
            self.last = raw;
        }
        self.last
    }

    pub fn current(&self) -> TrendState {
        self.last
    }
}

/// RSI(14) → EMA(3) → midline classification, one state per input value.
pub fn rsi_ema_trend(closes: &[f64]) -> Vec<TrendState> {
    let rsi = calculate_rsi(closes, RSI_PERIOD);
    let smoothed = calculate_ema(&rsi, RSI_SMOOTHING);
    smoothed.into_iter().map(TrendState::from_midline).collect()
}

/// Lengths for the directional-movement signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalParams {
    pub dema_len: usize,
    pub di_len: usize,
    pub adx_len: usize,
}

impl Default for DirectionalParams {
    fn default() -> Self {
        DirectionalParams {
            dema_len: 5,
            di_len: 5,
            adx_len: 3,
        }
    }
}

/// Intermediate directional lines, exposed for reporting and tests.
#[derive(Debug, Clone)]
pub struct DirectionalLines {
    pub plus: Vec<f64>,
    pub minus: Vec<f64>,
    pub adx: Series,
}

pub fn directional_lines(bars: &[PricePoint], params: &DirectionalParams) -> DirectionalLines {
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let dema_high = calculate_dema(&defined(&highs), params.dema_len);
    let dema_low = calculate_dema(&defined(&lows), params.dema_len);

    let n = bars.len();
    let mut plus_dm = vec![Some(0.0); n];
    let mut minus_dm = vec![Some(0.0); n];
    for i in 1..n {
        let up = diff(dema_high[i], dema_high[i - 1]);
        let down = diff(dema_low[i], dema_low[i - 1]).map(|d| -d);
        if let (Some(u), Some(d)) = (up, down) {
            if u > d && u > 0.0 {
                plus_dm[i] = Some(u);
            }
            if d > u && d > 0.0 {
                minus_dm[i] = Some(d);
            }
        }
    }

    let true_range: Series = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| (i > 0).then(|| bar.true_range(bars[i - 1].close)))
        .collect();

    let tr_avg = calculate_rma(&true_range, params.di_len);
    let plus_avg = calculate_rma(&plus_dm, params.di_len);
    let minus_avg = calculate_rma(&minus_dm, params.di_len);

    let plus: Vec<f64> = plus_avg
        .iter()
        .zip(&tr_avg)
        .map(|(dm, tr)| normalized(*dm, *tr))
        .collect();
    let minus: Vec<f64> = minus_avg
        .iter()
        .zip(&tr_avg)
        .map(|(dm, tr)| normalized(*dm, *tr))
        .collect();

    let spread: Series = plus
        .iter()
        .zip(&minus)
        .map(|(p, m)| {
            let sum = p + m;
            let denominator = if sum == 0.0 { 1.0 } else { sum };
            Some((p - m).abs() / denominator)
        })
        .collect();
    let adx = calculate_rma(&spread, params.adx_len)
        .into_iter()
        .map(|v| v.map(|x| 100.0 * x))
        .collect();

    DirectionalLines { plus, minus, adx }
}

/// Raw per-index directional state: UP when +DI leads and ADX is rising,
/// DOWN when -DI leads, otherwise undefined.
pub fn directional_trend(bars: &[PricePoint], params: &DirectionalParams) -> Vec<TrendState> {
    let lines = directional_lines(bars, params);
    (0..bars.len())
        .map(|i| {
            let rising = i > 0
                && matches!((lines.adx[i], lines.adx[i - 1]), (Some(now), Some(prev)) if now > prev);
            if lines.minus[i] > lines.plus[i] {
                TrendState::Down
            } else if lines.plus[i] > lines.minus[i] && rising {
                TrendState::Up
            } else {
                TrendState::Undefined
            }
        })
        .collect()
}

/// [`directional_trend`] forward-filled.
pub fn directional_trend_filled(bars: &[PricePoint], params: &DirectionalParams) -> Vec<TrendState> {
    let mut fill = ForwardFill::new();
    directional_trend(bars, params)
        .into_iter()
        .map(|raw| fill.push(raw))
        .collect()
}

/// Forward-filled directional state of the last completed bar before the
/// most recent one. Undefined with fewer than two bars.
pub fn lagged_trend(bars: &[PricePoint], params: &DirectionalParams) -> TrendState {
    if bars.len() < 2 {
        return TrendState::Undefined;
    }
    directional_trend_filled(bars, params)[bars.len() - 2]
}

fn diff(now: Option<f64>, prev: Option<f64>) -> Option<f64> {
    Some(now? - prev?)
}

fn normalized(dm: Option<f64>, tr: Option<f64>) -> f64 {
    match (dm, tr) {
        (Some(dm), Some(tr)) if tr != 0.0 => 100.0 * dm / tr,
        _ => 0.0,
    }
}
