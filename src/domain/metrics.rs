//! Performance summary of a finished backtest.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use super::backtest::BacktestResult;
use super::portfolio::{EquitySnapshot, TradeRecord};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Realized results for one symbol.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SymbolStats {
    pub trades: usize,
    pub closing_trades: usize,
    pub realized_pnl: f64,
    pub costs: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub final_equity: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    /// Longest run of trading days spent below a previous equity peak.
    pub max_drawdown_duration: i64,
    pub total_trades: usize,
    pub closing_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub total_costs: f64,
    pub risk_exits: usize,
    pub per_symbol: BTreeMap<String, SymbolStats>,
}

impl Metrics {
    pub fn compute(result: &BacktestResult, risk_free_rate: f64) -> Self {
        let initial = result.initial_cash;
        let final_equity = result.final_equity;
        let total_return = if initial > 0.0 {
            (final_equity - initial) / initial
        } else {
            0.0
        };

        let daily = daily_equity(&result.equity_history);
        let years = daily.len() as f64 / TRADING_DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(&daily);
        let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
        let (sharpe_ratio, sortino_ratio) = compute_risk_adjusted(&daily, daily_rf);

        let trades = &result.trades;
        let closing_trades = trades.iter().filter(|t| t.is_closing()).count();
        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        for pnl in trades.iter().filter_map(|t| t.realized_pnl) {
            if pnl > 0.0 {
                trades_won += 1;
                total_wins += pnl;
                largest_win = largest_win.max(pnl);
            } else if pnl < 0.0 {
                trades_lost += 1;
                total_losses += pnl.abs();
                largest_loss = largest_loss.max(pnl.abs());
            }
        }

        let win_rate = if closing_trades > 0 {
            trades_won as f64 / closing_trades as f64
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

        Metrics {
            final_equity,
            total_return,
            annualized_return,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            total_trades: trades.len(),
            closing_trades,
            trades_won,
            trades_lost,
            win_rate,
            profit_factor,
            largest_win,
            largest_loss,
            total_costs: trades.iter().map(|t| t.cost).sum(),
            risk_exits: trades.iter().filter(|t| t.exit_rule.is_some()).count(),
            per_symbol: per_symbol_stats(trades),
        }
    }
}

fn per_symbol_stats(trades: &[TradeRecord]) -> BTreeMap<String, SymbolStats> {
    let mut stats: BTreeMap<String, SymbolStats> = BTreeMap::new();
    for trade in trades {
        let entry = stats.entry(trade.symbol.clone()).or_default();
        entry.trades += 1;
        entry.costs += trade.cost;
        if trade.is_closing() {
            entry.closing_trades += 1;
            entry.realized_pnl += trade.realized_pnl.unwrap_or_default();
        }
    }
    stats
}

/// Last equity snapshot of every trading day.
fn daily_equity(history: &[EquitySnapshot]) -> Vec<(NaiveDate, f64)> {
    let mut daily: Vec<(NaiveDate, f64)> = Vec::new();
    for snapshot in history {
        let day = snapshot.timestamp.date();
        match daily.last_mut() {
            Some(last) if last.0 == day => last.1 = snapshot.total_equity,
            _ => daily.push((day, snapshot.total_equity)),
        }
    }
    daily
}

fn compute_drawdown(curve: &[(NaiveDate, f64)]) -> (f64, i64) {
    let Some(&(_, first)) = curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0i64;
    let mut current_dd_duration = 0i64;

    for &(_, equity) in curve {
        if equity >= peak {
            peak = equity;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - equity) / peak);
            current_dd_duration += 1;
            max_dd_duration = max_dd_duration.max(current_dd_duration);
        }
    }

    (max_dd, max_dd_duration)
}

fn compute_risk_adjusted(curve: &[(NaiveDate, f64)], daily_rf: f64) -> (f64, f64) {
    if curve.len() < 2 {
        return (0.0, 0.0);
    }

    let returns: Vec<f64> = curve
        .windows(2)
        .map(|w| {
            let prev = w[0].1;
            if prev > 0.0 { (w[1].1 - prev) / prev } else { 0.0 }
        })
        .collect();

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    let excess_return = mean - daily_rf;

    let sharpe = if stddev > 0.0 {
        excess_return / stddev * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    let downside_sq: f64 = returns
        .iter()
        .filter(|&&r| r < daily_rf)
        .map(|&r| (r - daily_rf).powi(2))
        .sum();
    let downside_stddev = (downside_sq / n).sqrt();
    let sortino = if downside_stddev > 0.0 {
        excess_return / downside_stddev * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    (sharpe, sortino)
}
