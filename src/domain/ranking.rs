//! Relative strength ranking via pairwise price-ratio trends.
//!
//! For every unordered pair (a, b) of eligible assets the ratio a/b is run
//! through [`rsi_ema_trend`]. At each date an UP ratio gives `a` one win, a
//! DOWN ratio gives `b` one win, an undefined ratio gives nobody anything.
//! An asset's score is `wins * 100 / (K - 1)` (integer, truncated) where K is
//! the number of eligible assets.
//!
//! Assets are ordered by id everywhere, which makes pair orientation and
//! tie-breaks deterministic.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

use super::error::RsTraderError;
use super::price::{history_up_to, PricePoint};
use super::trend::{rsi_ema_trend, TrendState};

/// Fewest bars an asset needs as of the ranking date to be eligible.
pub const MIN_RANK_HISTORY: usize = 14;

/// Close prices of several assets on one union timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceMatrix {
    pub dates: Vec<NaiveDate>,
    pub assets: Vec<String>,
    /// `closes[asset][date]`, `None` where the asset has no bar that day.
    pub closes: Vec<Vec<Option<f64>>>,
}

impl PriceMatrix {
    pub fn align(histories: &BTreeMap<String, &[PricePoint]>) -> Self {
        let dates: Vec<NaiveDate> = histories
            .values()
            .flat_map(|bars| bars.iter().map(|b| b.date))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let position: BTreeMap<NaiveDate, usize> =
            dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();

        let mut assets = Vec::with_capacity(histories.len());
        let mut closes = Vec::with_capacity(histories.len());
        for (asset, bars) in histories {
            let mut column = vec![None; dates.len()];
            for bar in bars.iter() {
                column[position[&bar.date]] = Some(bar.close);
            }
            assets.push(asset.clone());
            closes.push(column);
        }

        PriceMatrix {
            dates,
            assets,
            closes,
        }
    }

    /// Ratio `assets[a] / assets[b]` per date; undefined where either side is
    /// missing or the denominator is not a positive price.
    pub fn ratio(&self, a: usize, b: usize) -> Vec<Option<f64>> {
        self.closes[a]
            .iter()
            .zip(&self.closes[b])
            .map(|(num, den)| match (num, den) {
                (Some(n), Some(d)) if *d > 0.0 && n.is_finite() => Some(n / d),
                _ => None,
            })
            .collect()
    }
}

/// Momentum state of a ratio series with gaps: the defined values are run
/// as one contiguous series and the states mapped back to their dates.
pub fn ratio_trend(ratio: &[Option<f64>]) -> Vec<TrendState> {
    let (positions, values): (Vec<usize>, Vec<f64>) = ratio
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i, v)))
        .unzip();
    let states = rsi_ema_trend(&values);

    let mut out = vec![TrendState::Undefined; ratio.len()];
    for (pos, state) in positions.into_iter().zip(states) {
        out[pos] = state;
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetRankScore {
    pub index: usize,
    pub date: NaiveDate,
    pub asset_id: String,
    pub score: u8,
}

/// Per-date, per-asset pairwise wins and scores.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreMatrix {
    pub dates: Vec<NaiveDate>,
    pub assets: Vec<String>,
    /// `wins[date][asset]`
    pub wins: Vec<Vec<u32>>,
    /// `scores[date][asset]`, 0..=100
    pub scores: Vec<Vec<u8>>,
}

impl ScoreMatrix {
    /// Scores at row `index`, sorted by score descending then asset id.
    pub fn ranking_at(&self, index: usize) -> Vec<AssetRankScore> {
        let Some(row) = self.scores.get(index) else {
            return Vec::new();
        };
        let mut ranking: Vec<AssetRankScore> = self
            .assets
            .iter()
            .zip(row)
            .map(|(asset, &score)| AssetRankScore {
                index,
                date: self.dates[index],
                asset_id: asset.clone(),
                score,
            })
            .collect();
        ranking.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.asset_id.cmp(&b.asset_id)));
        ranking
    }

    pub fn latest_ranking(&self) -> Vec<AssetRankScore> {
        match self.dates.len() {
            0 => Vec::new(),
            n => self.ranking_at(n - 1),
        }
    }

    /// Row of the latest date on or before `as_of`.
    pub fn row_as_of(&self, as_of: NaiveDate) -> Option<usize> {
        self.dates.partition_point(|d| *d <= as_of).checked_sub(1)
    }
}

pub fn relative_strength(matrix: &PriceMatrix) -> ScoreMatrix {
    let k = matrix.assets.len();
    let n = matrix.dates.len();
    let mut wins = vec![vec![0u32; k]; n];

    for a in 0..k {
        for b in (a + 1)..k {
            let states = ratio_trend(&matrix.ratio(a, b));
            for (t, state) in states.into_iter().enumerate() {
                match state {
                    TrendState::Up => wins[t][a] += 1,
                    TrendState::Down => wins[t][b] += 1,
                    TrendState::Undefined => {}
                }
            }
        }
    }

    let scores = wins
        .iter()
        .map(|row| row.iter().map(|&w| score_from_wins(w, k)).collect())
        .collect();

    ScoreMatrix {
        dates: matrix.dates.clone(),
        assets: matrix.assets.clone(),
        wins,
        scores,
    }
}

/// `wins * 100 / (k - 1)`, truncated. A universe of one has no pairs and
/// scores zero.
pub fn score_from_wins(wins: u32, universe_size: usize) -> u8 {
    if universe_size < 2 {
        return 0;
    }
    let opponents = (universe_size - 1) as u64;
    (u64::from(wins) * 100 / opponents).min(100) as u8
}

/// Outcome of ranking one universe as of a date.
#[derive(Debug)]
pub struct RankingResult {
    pub as_of: NaiveDate,
    pub ranking: Vec<AssetRankScore>,
    pub excluded: Vec<(String, RsTraderError)>,
}

impl RankingResult {
    pub fn top_assets(&self, n: usize) -> Vec<String> {
        self.ranking
            .iter()
            .take(n)
            .map(|r| r.asset_id.clone())
            .collect()
    }
}

/// Split a universe into assets with enough history as of `as_of` (history
/// truncated to that date) and exclusions.
pub fn eligible_histories<'a>(
    histories: &'a BTreeMap<String, Vec<PricePoint>>,
    as_of: NaiveDate,
    min_history: usize,
) -> (BTreeMap<String, &'a [PricePoint]>, Vec<(String, RsTraderError)>) {
    let mut eligible = BTreeMap::new();
    let mut excluded = Vec::new();
    for (asset, history) in histories {
        let visible = history_up_to(history, as_of);
        if visible.len() < min_history {
            excluded.push((
                asset.clone(),
                RsTraderError::InsufficientHistory {
                    asset: asset.clone(),
                    bars: visible.len(),
                    minimum: min_history,
                },
            ));
        } else {
            eligible.insert(asset.clone(), visible);
        }
    }
    (eligible, excluded)
}

/// Rank every asset with enough history using only bars up to `as_of`.
pub fn rank_assets(
    histories: &BTreeMap<String, Vec<PricePoint>>,
    as_of: NaiveDate,
    min_history: usize,
) -> RankingResult {
    let (eligible, excluded) = eligible_histories(histories, as_of, min_history);
    for (asset, reason) in &excluded {
        tracing::debug!(asset = %asset, "excluded from ranking: {reason}");
    }

    let scores = relative_strength(&PriceMatrix::align(&eligible));
    RankingResult {
        as_of,
        ranking: scores.latest_ranking(),
        excluded,
    }
}
