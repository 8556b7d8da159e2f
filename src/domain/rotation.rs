//! Position rotation engine.
//!
//! One cycle, in order:
//!
//! 1. Close every held position whose asset is no longer in the top-N set,
//!    at that asset's open price today.
//! 2. Walk the top-N set in rank order. Each asset gets one
//!    [`Recommendation`] from its lagged directional trend and today's
//!    structure event; held assets close on an exit, unheld assets open on a
//!    long while fewer than `max_positions` are held and cash covers the
//!    allocation.
//! 3. Value the book at today's close.
//!
//! Every asset is acted on at most once per cycle.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::error::RsTraderError;
use super::portfolio::{PortfolioSnapshot, PositionBook};
use super::position::Position;
use super::price::PricePoint;
use super::structure::{latest_structure, StructureEvent, StructureKind};
use super::trend::{lagged_trend, DirectionalParams, TrendState};

pub const MAX_POSITIONS: usize = 3;

/// Relative slack on the cash-cover check so an allocation computed from
/// the same cash does not fail on rounding.
const CASH_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recommendation {
    Long,
    LongReentry,
    ExitBearish,
    Exit,
    NoPosition,
}

impl Recommendation {
    /// First matching rule wins:
    /// trend UP with no event, bearish change, bullish change with trend UP,
    /// trend DOWN, otherwise nothing.
    pub fn decide(trend: TrendState, structure: Option<StructureKind>) -> Self {
        match (trend, structure) {
            (TrendState::Up, None) => Recommendation::Long,
            (_, Some(StructureKind::BearishChange)) => Recommendation::ExitBearish,
            (TrendState::Up, Some(StructureKind::BullishChange)) => Recommendation::LongReentry,
            (TrendState::Down, _) => Recommendation::Exit,
            _ => Recommendation::NoPosition,
        }
    }

    pub fn is_long(self) -> bool {
        matches!(self, Recommendation::Long | Recommendation::LongReentry)
    }

    pub fn is_exit(self) -> bool {
        matches!(self, Recommendation::ExitBearish | Recommendation::Exit)
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Recommendation::Long => "LONG",
            Recommendation::LongReentry => "LONG (bullish change re-entry)",
            Recommendation::ExitBearish => "EXIT (bearish change)",
            Recommendation::Exit => "EXIT",
            Recommendation::NoPosition => "NO POSITION",
        };
        f.write_str(text)
    }
}

/// Everything the engine needs to know about one asset on the cycle date.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetSnapshot {
    pub asset_id: String,
    pub bar: PricePoint,
    pub lagged_trend: TrendState,
    pub structure: Option<StructureEvent>,
}

impl AssetSnapshot {
    /// Build from the asset's history up to and including `date`. The last
    /// bar must fall on `date`.
    pub fn from_history(
        asset_id: &str,
        history: &[PricePoint],
        date: NaiveDate,
        params: &DirectionalParams,
    ) -> Result<Self, RsTraderError> {
        let Some(bar) = history.last() else {
            return Err(RsTraderError::NoData {
                asset: asset_id.to_string(),
            });
        };
        if bar.date != date {
            return Err(RsTraderError::MissingPriceForCycle {
                asset: asset_id.to_string(),
                date,
            });
        }
        if history.len() < 2 {
            return Err(RsTraderError::InsufficientHistory {
                asset: asset_id.to_string(),
                bars: history.len(),
                minimum: 2,
            });
        }

        Ok(AssetSnapshot {
            asset_id: asset_id.to_string(),
            bar: bar.clone(),
            lagged_trend: lagged_trend(history, params),
            structure: latest_structure(history),
        })
    }

    pub fn recommendation(&self) -> Recommendation {
        Recommendation::decide(self.lagged_trend, self.structure.map(|e| e.kind))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    RotatedOut,
    BearishChange,
    TrendDown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::RotatedOut => write!(f, "rotated out of top set"),
            CloseReason::BearishChange => write!(f, "bearish change"),
            CloseReason::TrendDown => write!(f, "trend down"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedPosition {
    pub position: Position,
    pub reason: CloseReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetDecision {
    pub asset_id: String,
    pub recommendation: Recommendation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingPrice,
    InvalidPrice,
    CapReached,
    InsufficientCash,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedAsset {
    pub asset_id: String,
    pub reason: SkipReason,
}

pub struct CycleInput<'a> {
    pub date: NaiveDate,
    /// Top-ranked asset ids, best first.
    pub top_assets: &'a [String],
    pub market: &'a BTreeMap<String, AssetSnapshot>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub date: NaiveDate,
    pub closes: Vec<ClosedPosition>,
    pub opens: Vec<Position>,
    pub holds: Vec<String>,
    pub decisions: Vec<AssetDecision>,
    pub skipped: Vec<SkippedAsset>,
    /// Equity at today's open, before any trade; the sizing base.
    pub starting_equity: f64,
    pub snapshot: PortfolioSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationEngine {
    pub max_positions: usize,
}

impl Default for RotationEngine {
    fn default() -> Self {
        RotationEngine {
            max_positions: MAX_POSITIONS,
        }
    }
}

impl RotationEngine {
    pub fn new(max_positions: usize) -> Self {
        RotationEngine { max_positions }
    }

    pub fn evaluate_cycle(&self, book: &mut PositionBook, input: &CycleInput<'_>) -> CycleOutcome {
        let opens_today: BTreeMap<String, f64> = input
            .market
            .iter()
            .map(|(id, snap)| (id.clone(), snap.bar.open))
            .collect();
        let starting_equity = book.equity(&opens_today);
        let allocation = if self.max_positions == 0 {
            0.0
        } else {
            starting_equity / self.max_positions as f64
        };

        let mut top = Vec::new();
        let mut seen = BTreeSet::new();
        for asset in input.top_assets {
            if seen.insert(asset.as_str()) {
                top.push(asset.as_str());
            }
        }

        let mut outcome = CycleOutcome {
            date: input.date,
            closes: Vec::new(),
            opens: Vec::new(),
            holds: Vec::new(),
            decisions: Vec::new(),
            skipped: Vec::new(),
            starting_equity,
            snapshot: book.snapshot(input.date, &opens_today),
        };

        let rotated_out: Vec<String> = book
            .positions
            .keys()
            .filter(|id| !seen.contains(id.as_str()))
            .cloned()
            .collect();
        for asset_id in rotated_out {
            match input.market.get(&asset_id) {
                Some(snap) => {
                    self.close(book, &asset_id, snap.bar.open, input.date, CloseReason::RotatedOut, &mut outcome);
                }
                None => {
                    tracing::warn!(asset = %asset_id, date = %input.date, "no bar for rotated-out position, keeping it");
                    outcome.holds.push(asset_id.clone());
                    outcome.skipped.push(SkippedAsset {
                        asset_id,
                        reason: SkipReason::MissingPrice,
                    });
                }
            }
        }

        for asset_id in top {
            let Some(snap) = input.market.get(asset_id) else {
                tracing::info!(asset = %asset_id, date = %input.date, "no bar for top asset, skipping");
                if book.holds(asset_id) {
                    outcome.holds.push(asset_id.to_string());
                }
                outcome.skipped.push(SkippedAsset {
                    asset_id: asset_id.to_string(),
                    reason: SkipReason::MissingPrice,
                });
                continue;
            };

            let recommendation = snap.recommendation();
            outcome.decisions.push(AssetDecision {
                asset_id: asset_id.to_string(),
                recommendation,
            });

            if book.holds(asset_id) {
                match recommendation {
                    Recommendation::ExitBearish => {
                        self.close(book, asset_id, snap.bar.open, input.date, CloseReason::BearishChange, &mut outcome)
                    }
                    Recommendation::Exit => {
                        self.close(book, asset_id, snap.bar.open, input.date, CloseReason::TrendDown, &mut outcome)
                    }
                    _ => outcome.holds.push(asset_id.to_string()),
                }
                continue;
            }

            if !recommendation.is_long() {
                continue;
            }
            if book.len() >= self.max_positions {
                outcome.skipped.push(SkippedAsset {
                    asset_id: asset_id.to_string(),
                    reason: SkipReason::CapReached,
                });
                continue;
            }

            let entry_price = snap.bar.open;
            if !(entry_price.is_finite() && entry_price > 0.0) || allocation <= 0.0 {
                tracing::warn!(asset = %asset_id, entry_price, allocation, "cannot size entry");
                outcome.skipped.push(SkippedAsset {
                    asset_id: asset_id.to_string(),
                    reason: SkipReason::InvalidPrice,
                });
                continue;
            }

            let units = allocation / entry_price;
            let cost = units * entry_price;
            if book.cash < cost - cost.abs() * CASH_TOLERANCE {
                tracing::info!(asset = %asset_id, cash = book.cash, cost, "insufficient cash for entry");
                outcome.skipped.push(SkippedAsset {
                    asset_id: asset_id.to_string(),
                    reason: SkipReason::InsufficientCash,
                });
                continue;
            }

            let position = Position::open(asset_id, entry_price, input.date, units);
            book.cash -= cost;
            tracing::info!(asset = %asset_id, entry_price, units, "opened long");
            outcome.opens.push(position.clone());
            book.insert(position);
        }

        let closes_today: BTreeMap<String, f64> = input
            .market
            .iter()
            .map(|(id, snap)| (id.clone(), snap.bar.close))
            .collect();
        outcome.snapshot = book.snapshot(input.date, &closes_today);
        outcome
    }

    fn close(
        &self,
        book: &mut PositionBook,
        asset_id: &str,
        exit_price: f64,
        date: NaiveDate,
        reason: CloseReason,
        outcome: &mut CycleOutcome,
    ) {
        let Some(mut position) = book.remove(asset_id) else {
            return;
        };
        let exit = position.close(exit_price, date);
        book.cash += position.market_value(exit_price);
        tracing::info!(asset = %asset_id, exit_price, pnl = exit.realized_pnl, %reason, "closed long");
        outcome.closes.push(ClosedPosition { position, reason });
    }
}
