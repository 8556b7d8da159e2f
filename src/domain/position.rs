//! Long positions and their exit records.

use chrono::NaiveDate;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionStatus {
    Open,
    Closed,
}

impl PositionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PositionStatus::Open => "OPEN",
            PositionStatus::Closed => "CLOSED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Some(PositionStatus::Open),
            "CLOSED" => Some(PositionStatus::Closed),
            _ => None,
        }
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields written once when a position is closed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitFields {
    pub exit_price: f64,
    pub exit_date: NaiveDate,
    pub realized_pnl: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    /// Store-assigned id; `None` until the trade has been persisted.
    pub trade_id: Option<i64>,
    pub asset_id: String,
    pub entry_price: f64,
    pub entry_date: NaiveDate,
    pub units: f64,
    pub status: PositionStatus,
    pub exit_price: Option<f64>,
    pub exit_date: Option<NaiveDate>,
    pub realized_pnl: Option<f64>,
}

impl Position {
    pub fn open(asset_id: &str, entry_price: f64, entry_date: NaiveDate, units: f64) -> Self {
        Position {
            trade_id: None,
            asset_id: asset_id.to_string(),
            entry_price,
            entry_date,
            units,
            status: PositionStatus::Open,
            exit_price: None,
            exit_date: None,
            realized_pnl: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Cash paid at entry.
    pub fn cost(&self) -> f64 {
        self.entry_price * self.units
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.units * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.units * (price - self.entry_price)
    }

    /// Finalize the exit fields. The record is immutable afterwards.
    pub fn close(&mut self, exit_price: f64, exit_date: NaiveDate) -> ExitFields {
        let exit = ExitFields {
            exit_price,
            exit_date,
            realized_pnl: self.unrealized_pnl(exit_price),
        };
        self.apply_exit(&exit);
        exit
    }

    pub fn apply_exit(&mut self, exit: &ExitFields) {
        self.status = PositionStatus::Closed;
        self.exit_price = Some(exit.exit_price);
        self.exit_date = Some(exit.exit_date);
        self.realized_pnl = Some(exit.realized_pnl);
    }

    pub fn exit_fields(&self) -> Option<ExitFields> {
        Some(ExitFields {
            exit_price: self.exit_price?,
            exit_date: self.exit_date?,
            realized_pnl: self.realized_pnl?,
        })
    }

    pub fn holding_days(&self) -> Option<i64> {
        self.exit_date.map(|d| (d - self.entry_date).num_days())
    }
}
