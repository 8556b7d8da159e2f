//! Open-position book, cash, and equity snapshots.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use super::error::RsTraderError;
use super::position::Position;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortfolioSnapshot {
    pub date: NaiveDate,
    pub cash: f64,
    pub positions_value: f64,
    pub equity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

/// Cash plus the OPEN positions, keyed by asset id.
///
/// Owned by the caller and lent mutably to the rotation engine for the
/// duration of one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionBook {
    pub cash: f64,
    pub positions: BTreeMap<String, Position>,
}

impl PositionBook {
    pub fn new(cash: f64) -> Self {
        PositionBook {
            cash,
            positions: BTreeMap::new(),
        }
    }

    /// Rebuild from persisted trades: cash is the starting capital plus
    /// realized P&L of closed trades minus the entry cost of open ones.
    pub fn from_trades(
        initial_cash: f64,
        open: Vec<Position>,
        closed: &[Position],
    ) -> Result<Self, RsTraderError> {
        let realized: f64 = closed.iter().filter_map(|p| p.realized_pnl).sum();
        let mut book = PositionBook::new(initial_cash + realized);

        for pos in open {
            if !pos.is_open() {
                return Err(RsTraderError::DataIntegrity {
                    reason: format!("trade for {} is not OPEN", pos.asset_id),
                });
            }
            if !(pos.units.is_finite() && pos.units > 0.0) {
                return Err(RsTraderError::DataIntegrity {
                    reason: format!("open trade for {} has invalid units {}", pos.asset_id, pos.units),
                });
            }
            if book.positions.contains_key(&pos.asset_id) {
                return Err(RsTraderError::DataIntegrity {
                    reason: format!("more than one open trade for {}", pos.asset_id),
                });
            }
            book.cash -= pos.cost();
            book.positions.insert(pos.asset_id.clone(), pos);
        }
        Ok(book)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn holds(&self, asset_id: &str) -> bool {
        self.positions.contains_key(asset_id)
    }

    pub fn get(&self, asset_id: &str) -> Option<&Position> {
        self.positions.get(asset_id)
    }

    pub fn insert(&mut self, position: Position) {
        self.positions.insert(position.asset_id.clone(), position);
    }

    pub fn remove(&mut self, asset_id: &str) -> Option<Position> {
        self.positions.remove(asset_id)
    }

    pub fn get_mut(&mut self, asset_id: &str) -> Option<&mut Position> {
        self.positions.get_mut(asset_id)
    }

    /// Market value of all positions; assets without a price are valued at
    /// their entry price.
    pub fn positions_value(&self, prices: &BTreeMap<String, f64>) -> f64 {
        self.positions
            .values()
            .map(|pos| {
                let price = prices.get(&pos.asset_id).copied().unwrap_or(pos.entry_price);
                pos.market_value(price)
            })
            .sum()
    }

    pub fn equity(&self, prices: &BTreeMap<String, f64>) -> f64 {
        self.cash + self.positions_value(prices)
    }

    pub fn snapshot(&self, date: NaiveDate, prices: &BTreeMap<String, f64>) -> PortfolioSnapshot {
        let positions_value = self.positions_value(prices);
        PortfolioSnapshot {
            date,
            cash: self.cash,
            positions_value,
            equity: self.cash + positions_value,
        }
    }
}
