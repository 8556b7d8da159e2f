//! Performance metrics over an equity curve and closed trades.

use super::portfolio::EquityPoint;
use super::position::Position;

/// Crypto markets trade every calendar day.
const PERIODS_PER_YEAR: f64 = 365.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration: i64,
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub avg_holding_days: f64,
}

impl Metrics {
    pub fn compute(initial_capital: f64, equity_curve: &[EquityPoint], trades: &[Position]) -> Self {
        let final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_capital);

        let total_return = if initial_capital > 0.0 {
            (final_equity - initial_capital) / initial_capital
        } else {
            0.0
        };

        let years = equity_curve.len() as f64 / PERIODS_PER_YEAR;
        let annualized_return = if years > 0.0 && total_return > -1.0 && total_return.is_finite() {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity_curve);
        let sharpe_ratio = compute_sharpe(equity_curve);

        let pnls: Vec<f64> = trades.iter().filter_map(|t| t.realized_pnl).collect();
        let wins: Vec<f64> = pnls.iter().copied().filter(|p| *p > 0.0).collect();
        let losses: Vec<f64> = pnls.iter().copied().filter(|p| *p < 0.0).map(f64::abs).collect();
        let total_wins: f64 = wins.iter().sum();
        let total_losses: f64 = losses.iter().sum();

        let total_trades = pnls.len();
        let win_rate = if total_trades > 0 {
            wins.len() as f64 / total_trades as f64
        } else {
            0.0
        };

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let avg = |sum: f64, n: usize| if n > 0 { sum / n as f64 } else { 0.0 };
        let held: Vec<i64> = trades.iter().filter_map(Position::holding_days).collect();

        Metrics {
            total_return,
            annualized_return,
            sharpe_ratio,
            max_drawdown,
            max_drawdown_duration,
            total_trades,
            trades_won: wins.len(),
            trades_lost: losses.len(),
            win_rate,
            profit_factor,
            avg_win: avg(total_wins, wins.len()),
            avg_loss: avg(total_losses, losses.len()),
            avg_holding_days: avg(held.iter().sum::<i64>() as f64, held.len()),
        }
    }
}

/// Largest peak-to-trough fraction and the longest run of periods spent
/// below a prior peak.
fn compute_drawdown(equity_curve: &[EquityPoint]) -> (f64, i64) {
    let Some(first) = equity_curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;
    let mut max_duration = 0i64;
    let mut duration = 0i64;

    for point in equity_curve {
        if point.equity >= peak {
            peak = point.equity;
            duration = 0;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - point.equity) / peak);
            duration += 1;
            max_duration = max_duration.max(duration);
        }
    }

    (max_dd, max_duration)
}

fn compute_sharpe(equity_curve: &[EquityPoint]) -> f64 {
    let returns: Vec<f64> = equity_curve
        .windows(2)
        .map(|w| {
            if w[0].equity > 0.0 {
                (w[1].equity - w[0].equity) / w[0].equity
            } else {
                0.0
            }
        })
        .collect();
    if returns.is_empty() {
        return 0.0;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let stddev = (returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n).sqrt();
    if stddev > 0.0 {
        mean / stddev * PERIODS_PER_YEAR.sqrt()
    } else {
        0.0
    }
}
