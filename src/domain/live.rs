//! The daily live cycle.
//!
//! Ranks the universe, persists the new top list, rebuilds the position book
//! from the trade store, runs one rotation cycle, persists its trades and
//! snapshot, and notifies. Persisted OPEN trades are the ground truth on
//! every start; a write failure aborts the cycle without rolling back
//! writes already made.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

use super::error::RsTraderError;
use super::portfolio::PositionBook;
use super::price::history_up_to;
use super::ranking::{rank_assets, RankingResult, MIN_RANK_HISTORY};
use super::rotation::{AssetSnapshot, CycleInput, CycleOutcome, RotationEngine, MAX_POSITIONS};
use super::signals::SignalReport;
use super::top_list::TopListChange;
use super::trend::DirectionalParams;
use super::universe::load_universe;
use crate::ports::notify_port::NotifierPort;
use crate::ports::price_port::PriceHistoryPort;
use crate::ports::top_list_port::TopListPort;
use crate::ports::trade_port::TradeStorePort;

#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub initial_cash: f64,
    pub max_positions: usize,
    pub min_history: usize,
    pub params: DirectionalParams,
}

impl Default for LiveConfig {
    fn default() -> Self {
        LiveConfig {
            initial_cash: 1000.0,
            max_positions: MAX_POSITIONS,
            min_history: MIN_RANK_HISTORY,
            params: DirectionalParams::default(),
        }
    }
}

pub struct LivePorts<'a> {
    pub prices: &'a dyn PriceHistoryPort,
    pub trades: &'a dyn TradeStorePort,
    pub top_list: &'a dyn TopListPort,
    pub notifier: &'a dyn NotifierPort,
}

#[derive(Debug)]
pub struct DailyReport {
    pub date: NaiveDate,
    pub ranking: RankingResult,
    pub top_assets: Vec<String>,
    /// `None` on the first run, when no previous list existed.
    pub change: Option<TopListChange>,
    pub outcome: CycleOutcome,
    pub signals: Vec<SignalReport>,
}

/// Send and log; delivery failures never stop the cycle.
pub fn notify(notifier: &dyn NotifierPort, message: &str) {
    if let Err(e) = notifier.send(message) {
        tracing::warn!("notification not delivered: {e}");
    }
}

/// Run one daily cycle as of `date`, or as of the latest bar in the
/// universe when `date` is `None`.
pub fn run_daily_cycle(
    ports: &LivePorts<'_>,
    assets: &[String],
    config: &LiveConfig,
    date: Option<NaiveDate>,
) -> Result<DailyReport, RsTraderError> {
    let previous = ports.top_list.read_top_list()?;
    if previous.is_none() {
        notify(ports.notifier, "No previous top list found, starting fresh.");
    }

    let data = load_universe(ports.prices, assets)?;
    let date = match date.or_else(|| data.latest_date()) {
        Some(d) => d,
        None => {
            return Err(RsTraderError::NoData {
                asset: "all".to_string(),
            })
        }
    };
    tracing::info!(%date, assets = data.histories.len(), "running daily cycle");

    let ranking = rank_assets(&data.histories, date, config.min_history);
    let top_assets = ranking.top_assets(config.max_positions);
    ports.top_list.write_top_list(&top_assets)?;
    tracing::info!(top = ?top_assets, "top list written");

    let change = previous.map(|prev| TopListChange::between(&prev, &top_assets));
    if let Some(change) = &change {
        notify(ports.notifier, &change.summary());
    }

    let open = ports.trades.get_open_positions()?;
    let closed = ports.trades.get_closed_positions()?;
    let mut book = PositionBook::from_trades(config.initial_cash, open, &closed)?;

    let wanted: BTreeSet<String> = top_assets
        .iter()
        .chain(book.positions.keys())
        .cloned()
        .collect();
    let mut market = BTreeMap::new();
    for asset in wanted {
        let Some(history) = data.histories.get(&asset) else {
            tracing::warn!(asset = %asset, "no price history loaded");
            continue;
        };
        match AssetSnapshot::from_history(&asset, history_up_to(history, date), date, &config.params) {
            Ok(snapshot) => {
                market.insert(asset, snapshot);
            }
            Err(e) if e.is_asset_skip() => {
                tracing::warn!(asset = %asset, "skipping this cycle: {e}");
                notify(ports.notifier, &format!("No data available for {asset}. Skipping."));
            }
            Err(e) => return Err(e),
        }
    }

    let engine = RotationEngine::new(config.max_positions);
    let outcome = engine.evaluate_cycle(
        &mut book,
        &CycleInput {
            date,
            top_assets: &top_assets,
            market: &market,
        },
    );

    persist_outcome(ports.trades, &mut book, &outcome)?;

    let mut signals = Vec::new();
    for decision in &outcome.decisions {
        let Some(snapshot) = market.get(&decision.asset_id) else {
            continue;
        };
        let name = ports.prices.asset_name(&decision.asset_id).unwrap_or_else(|e| {
            tracing::debug!(asset = %decision.asset_id, "name lookup failed: {e}");
            None
        });
        let report = SignalReport::from_snapshot(snapshot, name);
        let message = format!(
            "{}\n  Trade action: {}",
            report.render(),
            trade_action(&decision.asset_id, &outcome)
        );
        notify(ports.notifier, &message);
        signals.push(report);
    }

    notify(
        ports.notifier,
        &format!("Portfolio equity at {date}: ${:.2}", outcome.snapshot.equity),
    );

    Ok(DailyReport {
        date,
        ranking,
        top_assets,
        change,
        outcome,
        signals,
    })
}

/// Write closes, then opens, then the snapshot.
fn persist_outcome(
    trades: &dyn TradeStorePort,
    book: &mut PositionBook,
    outcome: &CycleOutcome,
) -> Result<(), RsTraderError> {
    for closed in &outcome.closes {
        let position = &closed.position;
        let (Some(trade_id), Some(exit)) = (position.trade_id, position.exit_fields()) else {
            return Err(RsTraderError::DataIntegrity {
                reason: format!("closed position for {} has no stored trade", position.asset_id),
            });
        };
        trades.update_trade_record(trade_id, &exit)?;
    }

    for opened in &outcome.opens {
        let trade_id = trades.append_trade_record(opened)?;
        if let Some(held) = book.get_mut(&opened.asset_id) {
            held.trade_id = Some(trade_id);
        }
    }

    trades.append_portfolio_snapshot(&outcome.snapshot)
}

fn trade_action(asset_id: &str, outcome: &CycleOutcome) -> String {
    if let Some(closed) = outcome.closes.iter().find(|c| c.position.asset_id == asset_id) {
        let pnl = closed.position.realized_pnl.unwrap_or(0.0);
        return format!("Closed LONG ({}): P&L = ${pnl:.2}", closed.reason);
    }
    if let Some(opened) = outcome.opens.iter().find(|p| p.asset_id == asset_id) {
        return format!(
            "Opened LONG at ${:.8} with {:.2} units",
            opened.entry_price, opened.units
        );
    }
    "No trade action taken".to_string()
}
