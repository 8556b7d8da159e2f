//! Price history and asset catalog port.

use crate::domain::error::RsTraderError;
use crate::domain::price::PricePoint;

pub trait PriceHistoryPort {
    /// Bars for one asset in ascending date order. May be empty or short.
    fn get_price_history(&self, asset_id: &str) -> Result<Vec<PricePoint>, RsTraderError>;

    /// Every asset id in the catalog, sorted.
    fn get_asset_universe(&self) -> Result<Vec<String>, RsTraderError>;

    /// Display name from the catalog, if known.
    fn asset_name(&self, asset_id: &str) -> Result<Option<String>, RsTraderError>;
}
