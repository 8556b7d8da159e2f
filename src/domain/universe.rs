//! Asset universe selection and history loading.
//!
//! The universe is either an explicit comma list from configuration or the
//! whole catalog. Loading pulls each asset's history once; assets with no
//! bars are reported and left out, short histories are kept (eligibility
//! is decided per date by the ranking engine).

use std::collections::{BTreeMap, HashSet};

use crate::domain::error::RsTraderError;
use crate::domain::price::{normalize_history, PricePoint};
use crate::ports::price_port::PriceHistoryPort;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in asset list")]
    EmptyToken,

    #[error("duplicate asset: {0}")]
    DuplicateAsset(String),
}

pub fn parse_assets(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut assets = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let asset = token.trim();
        if asset.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        if !seen.insert(asset.to_string()) {
            return Err(UniverseError::DuplicateAsset(asset.to_string()));
        }
        assets.push(asset.to_string());
    }

    Ok(assets)
}

/// Histories keyed by asset id, each sorted and free of duplicate dates.
#[derive(Debug, Clone, Default)]
pub struct UniverseData {
    pub histories: BTreeMap<String, Vec<PricePoint>>,
    pub skipped: Vec<String>,
}

impl UniverseData {
    pub fn latest_date(&self) -> Option<chrono::NaiveDate> {
        self.histories
            .values()
            .filter_map(|h| h.last().map(|b| b.date))
            .max()
    }
}

/// Explicit list if given, otherwise the catalog.
pub fn resolve_assets(
    prices: &dyn PriceHistoryPort,
    configured: Option<&str>,
) -> Result<Vec<String>, RsTraderError> {
    match configured.map(str::trim).filter(|s| !s.is_empty()) {
        Some(list) => parse_assets(list).map_err(|e| RsTraderError::ConfigInvalid {
            section: "universe".into(),
            key: "assets".into(),
            reason: e.to_string(),
        }),
        None => prices.get_asset_universe(),
    }
}

pub fn load_universe(
    prices: &dyn PriceHistoryPort,
    assets: &[String],
) -> Result<UniverseData, RsTraderError> {
    let mut data = UniverseData::default();

    for asset in assets {
        let history = match prices.get_price_history(asset) {
            Ok(bars) => normalize_history(bars),
            Err(e) if e.is_asset_skip() => {
                tracing::warn!(asset = %asset, "skipping: {e}");
                data.skipped.push(asset.clone());
                continue;
            }
            Err(e) => return Err(e),
        };

        if history.is_empty() {
            tracing::warn!(asset = %asset, "skipping: no price history");
            data.skipped.push(asset.clone());
            continue;
        }

        tracing::debug!(asset = %asset, bars = history.len(), "loaded history");
        data.histories.insert(asset.clone(), history);
    }

    if data.histories.is_empty() {
        return Err(RsTraderError::NoData {
            asset: "all".to_string(),
        });
    }

    Ok(data)
}
