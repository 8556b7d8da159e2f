//! Trade and portfolio persistence port.
//!
//! Writes are not retried here; a failure is returned to the caller as-is.

use crate::domain::error::RsTraderError;
use crate::domain::portfolio::PortfolioSnapshot;
use crate::domain::position::{ExitFields, Position};

pub trait TradeStorePort {
    /// OPEN trades, one per asset.
    fn get_open_positions(&self) -> Result<Vec<Position>, RsTraderError>;

    fn get_closed_positions(&self) -> Result<Vec<Position>, RsTraderError>;

    /// Store a newly opened trade and return its id.
    fn append_trade_record(&self, position: &Position) -> Result<i64, RsTraderError>;

    /// Mark a trade CLOSED with its exit fields.
    fn update_trade_record(&self, trade_id: i64, exit: &ExitFields) -> Result<(), RsTraderError>;

    fn append_portfolio_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<(), RsTraderError>;
}
