//! Per-asset trading signals over a whole history.
//!
//! Every indicator here is causal, so the value at index `i` computed over
//! the full history equals the value computed over `history[..=i]`. The
//! backtest uses this to evaluate each asset once instead of once per day.

use chrono::NaiveDate;

use super::error::RsTraderError;
use super::price::PricePoint;
use super::rotation::{AssetSnapshot, Recommendation};
use super::structure::{detect_structure, StructureEvent};
use super::trend::{directional_trend_filled, DirectionalParams, TrendState};

#[derive(Debug, Clone)]
pub struct SignalSeries {
    pub asset_id: String,
    pub bars: Vec<PricePoint>,
    /// Forward-filled directional state per bar.
    pub trend: Vec<TrendState>,
    pub structure: Vec<Option<StructureEvent>>,
}

impl SignalSeries {
    pub fn compute(asset_id: &str, bars: &[PricePoint], params: &DirectionalParams) -> Self {
        SignalSeries {
            asset_id: asset_id.to_string(),
            bars: bars.to_vec(),
            trend: directional_trend_filled(bars, params),
            structure: detect_structure(bars),
        }
    }

    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        self.bars.binary_search_by_key(&date, |b| b.date).ok()
    }

    /// Same result as [`AssetSnapshot::from_history`] on the history cut at
    /// `date`.
    pub fn snapshot_at(&self, date: NaiveDate) -> Result<AssetSnapshot, RsTraderError> {
        if self.bars.first().is_none_or(|b| b.date > date) {
            return Err(RsTraderError::NoData {
                asset: self.asset_id.clone(),
            });
        }
        let Some(i) = self.index_of(date) else {
            return Err(RsTraderError::MissingPriceForCycle {
                asset: self.asset_id.clone(),
                date,
            });
        };
        if i == 0 {
            return Err(RsTraderError::InsufficientHistory {
                asset: self.asset_id.clone(),
                bars: 1,
                minimum: 2,
            });
        }

        Ok(AssetSnapshot {
            asset_id: self.asset_id.clone(),
            bar: self.bars[i].clone(),
            lagged_trend: self.trend[i - 1],
            structure: self.structure[i],
        })
    }

    /// Latest snapshot, for reports.
    pub fn latest(&self) -> Result<AssetSnapshot, RsTraderError> {
        match self.bars.last() {
            Some(bar) => self.snapshot_at(bar.date),
            None => Err(RsTraderError::NoData {
                asset: self.asset_id.clone(),
            }),
        }
    }
}

/// One line of the per-asset signal report.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalReport {
    pub asset_id: String,
    pub name: Option<String>,
    pub date: NaiveDate,
    pub close: f64,
    pub lagged_trend: TrendState,
    pub structure: Option<StructureEvent>,
    pub recommendation: Recommendation,
}

impl SignalReport {
    pub fn from_snapshot(snapshot: &AssetSnapshot, name: Option<String>) -> Self {
        SignalReport {
            asset_id: snapshot.asset_id.clone(),
            name,
            date: snapshot.bar.date,
            close: snapshot.bar.close,
            lagged_trend: snapshot.lagged_trend,
            structure: snapshot.structure,
            recommendation: snapshot.recommendation(),
        }
    }

    pub fn render(&self) -> String {
        let title = match &self.name {
            Some(name) if name != &self.asset_id => format!("{name} ({})", self.asset_id),
            _ => self.asset_id.clone(),
        };
        let structure = match &self.structure {
            Some(event) => format!("{} (level {:.8})", event.kind, event.reference_level),
            None => "none".to_string(),
        };
        format!(
            "Asset: {title}\n  Date: {}\n  Latest close: {:.8}\n  Trend (previous bar): {}\n  Structure (today): {structure}\n  Recommendation: {}",
            self.date, self.close, self.lagged_trend, self.recommendation
        )
    }
}
