//! Day-by-day historical replay of the rotation strategy.
//!
//! Each trading date in the window is processed like a live cycle: rank the
//! eligible assets on history up to that date, take the top N, build asset
//! snapshots, and run the same [`RotationEngine`]. Nothing dated after the
//! cycle date is visible to that cycle.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

use super::error::RsTraderError;
use super::portfolio::{EquityPoint, PositionBook};
use super::position::Position;
use super::price::{history_up_to, PricePoint};
use super::ranking::{eligible_histories, relative_strength, PriceMatrix, ScoreMatrix, MIN_RANK_HISTORY};
use super::rotation::{CycleInput, RotationEngine, MAX_POSITIONS};
use super::signals::SignalSeries;
use super::trend::DirectionalParams;

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_cash: f64,
    pub max_positions: usize,
    pub min_history: usize,
    pub benchmark: Option<String>,
    pub params: DirectionalParams,
}

impl BacktestConfig {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        BacktestConfig {
            start_date,
            end_date,
            initial_cash: 1000.0,
            max_positions: MAX_POSITIONS,
            min_history: MIN_RANK_HISTORY,
            benchmark: None,
            params: DirectionalParams::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub equity_curve: Vec<EquityPoint>,
    pub benchmark_curve: Vec<EquityPoint>,
    pub closed_trades: Vec<Position>,
    /// Positions still open after the last date.
    pub open_positions: Vec<Position>,
    pub final_cash: f64,
    /// Cash plus open positions marked to their last close.
    pub final_equity: f64,
}

/// Score matrix reused while the eligible set stays the same. Ranking is
/// causal, so a row computed over a longer timeline equals a recomputation
/// on history cut at that row's date.
struct RankingCache {
    assets: Vec<String>,
    scores: Option<ScoreMatrix>,
}

impl RankingCache {
    fn top_assets(
        &mut self,
        histories: &BTreeMap<String, Vec<PricePoint>>,
        date: NaiveDate,
        min_history: usize,
        n: usize,
    ) -> Vec<String> {
        let (eligible, _) = eligible_histories(histories, date, min_history);
        let assets: Vec<String> = eligible.keys().cloned().collect();
        if self.scores.is_none() || assets != self.assets {
            let full: BTreeMap<String, &[PricePoint]> = assets
                .iter()
                .map(|a| (a.clone(), histories[a].as_slice()))
                .collect();
            self.scores = Some(relative_strength(&PriceMatrix::align(&full)));
            self.assets = assets;
        }

        let Some(scores) = &self.scores else {
            return Vec::new();
        };
        match scores.row_as_of(date) {
            Some(row) if !scores.assets.is_empty() => scores
                .ranking_at(row)
                .into_iter()
                .take(n)
                .map(|r| r.asset_id)
                .collect(),
            _ => Vec::new(),
        }
    }
}

pub fn run_backtest(
    histories: &BTreeMap<String, Vec<PricePoint>>,
    config: &BacktestConfig,
) -> Result<BacktestResult, RsTraderError> {
    let dates: Vec<NaiveDate> = histories
        .values()
        .flat_map(|h| h.iter().map(|b| b.date))
        .filter(|d| *d >= config.start_date && *d <= config.end_date)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if dates.is_empty() {
        return Err(RsTraderError::NoData {
            asset: format!("any asset between {} and {}", config.start_date, config.end_date),
        });
    }

    let signals: BTreeMap<&String, SignalSeries> = histories
        .iter()
        .map(|(id, bars)| (id, SignalSeries::compute(id, bars, &config.params)))
        .collect();

    let engine = RotationEngine::new(config.max_positions);
    let mut book = PositionBook::new(config.initial_cash);
    let mut cache = RankingCache {
        assets: Vec::new(),
        scores: None,
    };
    let mut equity_curve = Vec::with_capacity(dates.len());
    let mut closed_trades = Vec::new();

    for &date in &dates {
        let top = cache.top_assets(histories, date, config.min_history, config.max_positions);

        let mut market = BTreeMap::new();
        let wanted: BTreeSet<&String> = top.iter().chain(book.positions.keys()).collect();
        for asset in wanted {
            let Some(series) = signals.get(asset) else {
                continue;
            };
            match series.snapshot_at(date) {
                Ok(snapshot) => {
                    market.insert(asset.clone(), snapshot);
                }
                Err(e) => tracing::debug!(asset = %asset, %date, "not tradable: {e}"),
            }
        }

        if top.is_empty() {
            let closes = last_closes(histories, date);
            equity_curve.push(EquityPoint {
                date,
                equity: book.equity(&closes),
            });
            continue;
        }

        let outcome = engine.evaluate_cycle(
            &mut book,
            &CycleInput {
                date,
                top_assets: &top,
                market: &market,
            },
        );
        tracing::debug!(
            %date,
            opens = outcome.opens.len(),
            closes = outcome.closes.len(),
            equity = outcome.snapshot.equity,
            "backtest cycle"
        );
        closed_trades.extend(outcome.closes.into_iter().map(|c| c.position));

        // held assets without a bar today are valued at their last close
        let prices = last_closes(histories, date);
        equity_curve.push(EquityPoint {
            date,
            equity: book.equity(&prices),
        });
    }

    let end = dates[dates.len() - 1];
    let final_prices = last_closes(histories, end);
    let final_equity = book.equity(&final_prices);

    Ok(BacktestResult {
        equity_curve,
        benchmark_curve: config
            .benchmark
            .as_ref()
            .map(|b| benchmark_curve(histories, b, config))
            .unwrap_or_default(),
        closed_trades,
        open_positions: book.positions.into_values().collect(),
        final_cash: book.cash,
        final_equity,
    })
}

/// Last close on or before `date` for every asset that has one.
fn last_closes(histories: &BTreeMap<String, Vec<PricePoint>>, date: NaiveDate) -> BTreeMap<String, f64> {
    histories
        .iter()
        .filter_map(|(id, h)| history_up_to(h, date).last().map(|b| (id.clone(), b.close)))
        .collect()
}

/// Buy-and-hold of `asset` with the whole starting cash at the first close
/// inside the window.
pub fn benchmark_curve(
    histories: &BTreeMap<String, Vec<PricePoint>>,
    asset: &str,
    config: &BacktestConfig,
) -> Vec<EquityPoint> {
    let Some(history) = histories.get(asset) else {
        tracing::warn!(asset = %asset, "benchmark asset has no history");
        return Vec::new();
    };
    let window: Vec<&PricePoint> = history
        .iter()
        .filter(|b| b.date >= config.start_date && b.date <= config.end_date)
        .collect();
    let Some(first) = window.first() else {
        return Vec::new();
    };
    if first.close <= 0.0 {
        return Vec::new();
    }

    let units = config.initial_cash / first.close;
    window
        .iter()
        .map(|b| EquityPoint {
            date: b.date,
            equity: units * b.close,
        })
        .collect()
}
