//! Daily OHLC price bar for one asset.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub asset_id: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl PricePoint {
    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }
}

/// Bars of `history` dated on or before `as_of`. `history` must be sorted.
pub fn history_up_to(history: &[PricePoint], as_of: NaiveDate) -> &[PricePoint] {
    let end = history.partition_point(|bar| bar.date <= as_of);
    &history[..end]
}

/// Sort by date and drop repeated dates, keeping the first bar seen.
pub fn normalize_history(mut bars: Vec<PricePoint>) -> Vec<PricePoint> {
    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);
    bars
}

pub fn closes(history: &[PricePoint]) -> Vec<f64> {
    history.iter().map(|b| b.close).collect()
}
