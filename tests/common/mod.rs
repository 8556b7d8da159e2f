#![allow(dead_code)]

use chrono::NaiveDate;
use rstrader::domain::error::RsTraderError;
use rstrader::domain::portfolio::PortfolioSnapshot;
use rstrader::domain::position::{ExitFields, Position, PositionStatus};
pub use rstrader::domain::price::PricePoint;
use rstrader::ports::notify_port::NotifierPort;
use rstrader::ports::price_port::PriceHistoryPort;
use rstrader::ports::top_list_port::TopListPort;
use rstrader::ports::trade_port::TradeStorePort;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

pub struct MockPrices {
    pub data: BTreeMap<String, Vec<PricePoint>>,
    pub names: BTreeMap<String, String>,
    pub errors: BTreeMap<String, String>,
}

impl MockPrices {
    pub fn new() -> Self {
        Self {
            data: BTreeMap::new(),
            names: BTreeMap::new(),
            errors: BTreeMap::new(),
        }
    }

    pub fn with_bars(mut self, asset: &str, bars: Vec<PricePoint>) -> Self {
        self.data.insert(asset.to_string(), bars);
        self
    }

    pub fn with_name(mut self, asset: &str, name: &str) -> Self {
        self.names.insert(asset.to_string(), name.to_string());
        self
    }

    pub fn with_error(mut self, asset: &str, reason: &str) -> Self {
        self.errors.insert(asset.to_string(), reason.to_string());
        self
    }
}

impl PriceHistoryPort for MockPrices {
    fn get_price_history(&self, asset_id: &str) -> Result<Vec<PricePoint>, RsTraderError> {
        if let Some(reason) = self.errors.get(asset_id) {
            return Err(RsTraderError::Database {
                reason: reason.clone(),
            });
        }
        self.data
            .get(asset_id)
            .cloned()
            .ok_or_else(|| RsTraderError::NoData {
                asset: asset_id.to_string(),
            })
    }

    fn get_asset_universe(&self) -> Result<Vec<String>, RsTraderError> {
        Ok(self.data.keys().cloned().collect())
    }

    fn asset_name(&self, asset_id: &str) -> Result<Option<String>, RsTraderError> {
        Ok(self.names.get(asset_id).cloned())
    }
}

/// In-memory trade store; `fail_writes` makes every write a persistence failure.
pub struct MemoryTradeStore {
    pub trades: RefCell<Vec<Position>>,
    pub snapshots: RefCell<Vec<PortfolioSnapshot>>,
    pub fail_writes: Cell<bool>,
    next_id: Cell<i64>,
}

impl MemoryTradeStore {
    pub fn new() -> Self {
        Self {
            trades: RefCell::new(Vec::new()),
            snapshots: RefCell::new(Vec::new()),
            fail_writes: Cell::new(false),
            next_id: Cell::new(1),
        }
    }

    pub fn with_trade(self, position: Position) -> Self {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.trades.borrow_mut().push(Position {
            trade_id: Some(id),
            ..position
        });
        self
    }

    fn check_writable(&self) -> Result<(), RsTraderError> {
        if self.fail_writes.get() {
            return Err(RsTraderError::PersistenceFailure {
                reason: "store is read-only".to_string(),
            });
        }
        Ok(())
    }

    pub fn open_count(&self) -> usize {
        self.trades.borrow().iter().filter(|p| p.is_open()).count()
    }
}

impl TradeStorePort for MemoryTradeStore {
    fn get_open_positions(&self) -> Result<Vec<Position>, RsTraderError> {
        Ok(self.trades.borrow().iter().filter(|p| p.is_open()).cloned().collect())
    }

    fn get_closed_positions(&self) -> Result<Vec<Position>, RsTraderError> {
        Ok(self
            .trades
            .borrow()
            .iter()
            .filter(|p| p.status == PositionStatus::Closed)
            .cloned()
            .collect())
    }

    fn append_trade_record(&self, position: &Position) -> Result<i64, RsTraderError> {
        self.check_writable()?;
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.trades.borrow_mut().push(Position {
            trade_id: Some(id),
            ..position.clone()
        });
        Ok(id)
    }

    fn update_trade_record(&self, trade_id: i64, exit: &ExitFields) -> Result<(), RsTraderError> {
        self.check_writable()?;
        let mut trades = self.trades.borrow_mut();
        let trade = trades
            .iter_mut()
            .find(|p| p.trade_id == Some(trade_id))
            .ok_or_else(|| RsTraderError::PersistenceFailure {
                reason: format!("no trade {trade_id}"),
            })?;
        trade.apply_exit(exit);
        Ok(())
    }

    fn append_portfolio_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<(), RsTraderError> {
        self.check_writable()?;
        self.snapshots.borrow_mut().push(snapshot.clone());
        Ok(())
    }
}

pub struct MemoryTopList {
    pub list: RefCell<Option<Vec<String>>>,
}

impl MemoryTopList {
    pub fn empty() -> Self {
        Self {
            list: RefCell::new(None),
        }
    }

    pub fn with(assets: &[&str]) -> Self {
        Self {
            list: RefCell::new(Some(assets.iter().map(|s| s.to_string()).collect())),
        }
    }
}

impl TopListPort for MemoryTopList {
    fn read_top_list(&self) -> Result<Option<Vec<String>>, RsTraderError> {
        Ok(self.list.borrow().clone())
    }

    fn write_top_list(&self, assets: &[String]) -> Result<(), RsTraderError> {
        *self.list.borrow_mut() = Some(assets.to_vec());
        Ok(())
    }
}

/// Captures every message; `fail` makes delivery error after recording.
pub struct RecordingNotifier {
    pub messages: RefCell<Vec<String>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            messages: RefCell::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            messages: RefCell::new(Vec::new()),
            fail: true,
        }
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages.borrow().iter().any(|m| m.contains(needle))
    }
}

impl NotifierPort for RecordingNotifier {
    fn send(&self, message: &str) -> Result<(), RsTraderError> {
        self.messages.borrow_mut().push(message.to_string());
        if self.fail {
            return Err(RsTraderError::Notification {
                reason: "channel down".to_string(),
            });
        }
        Ok(())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn day(offset: usize) -> NaiveDate {
    date(2025, 1, 1) + chrono::Duration::days(offset as i64)
}

pub fn bar(asset: &str, date: NaiveDate, open: f64, high: f64, low: f64, close: f64) -> PricePoint {
    PricePoint {
        asset_id: asset.to_string(),
        date,
        open,
        high,
        low,
        close,
    }
}

/// Daily bars from `closes`; each bar opens at the previous close.
pub fn bars_from_closes(asset: &str, closes: &[f64]) -> Vec<PricePoint> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            bar(
                asset,
                day(i),
                open,
                open.max(close) * 1.01,
                open.min(close) * 0.99,
                close,
            )
        })
        .collect()
}

/// Steady geometric climb with a small wobble so swings and ranges exist.
pub fn rising(asset: &str, count: usize, start: f64, rate: f64) -> Vec<PricePoint> {
    let closes: Vec<f64> = (0..count)
        .map(|i| start * (1.0 + rate).powi(i as i32) * (1.0 + 0.002 * ((i % 3) as f64 - 1.0)))
        .collect();
    bars_from_closes(asset, &closes)
}

pub fn flat(asset: &str, count: usize, price: f64) -> Vec<PricePoint> {
    (0..count)
        .map(|i| bar(asset, day(i), price, price, price, price))
        .collect()
}
