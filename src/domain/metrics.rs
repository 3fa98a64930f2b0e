//! Run-level performance statistics derived from the recorded ledger.

use super::ledger::RunLedger;
use crate::domain::error::IncrementalError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Summary document upserted per strategy by the document recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub strategy_id: String,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub settled_days: usize,
    pub total_trades: usize,
    pub total_return: f64,
    pub annualized_return: f64,
    pub benchmark_total_return: Option<f64>,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration: i64,
}

impl PerformanceSummary {
    pub fn compute(
        strategy_id: &str,
        ledger: &RunLedger,
        risk_free_rate: f64,
    ) -> Result<Self, IncrementalError> {
        let values: Vec<f64> = ledger
            .portfolio
            .iter()
            .map(|(_, s)| s.total_value())
            .collect();

        if let Some(bad) = values.iter().find(|v| !v.is_finite() || **v <= 0.0) {
            return Err(IncrementalError::Analytics {
                reason: format!("portfolio value {bad} cannot be used for returns"),
            });
        }

        let total_return = series_return(&values);
        let years = values.len() as f64 / TRADING_DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(&values);
        let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
        let (sharpe_ratio, sortino_ratio) = compute_risk_adjusted(&ledger.daily_returns(), daily_rf);

        let benchmark_total_return = if ledger.benchmark.is_empty() {
            None
        } else {
            let bench: Vec<f64> = ledger
                .benchmark
                .iter()
                .map(|(_, s)| s.total_value())
                .collect();
            Some(series_return(&bench))
        };

        let summary = PerformanceSummary {
            strategy_id: strategy_id.to_string(),
            first_date: ledger.portfolio.first().map(|(d, _)| *d),
            last_date: ledger.portfolio.last().map(|(d, _)| *d),
            settled_days: values.len(),
            total_trades: ledger.trades.len(),
            total_return,
            annualized_return,
            benchmark_total_return,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
        };

        if !summary.annualized_return.is_finite() {
            return Err(IncrementalError::Analytics {
                reason: "annualized return overflowed".into(),
            });
        }
        Ok(summary)
    }
}

fn series_return(values: &[f64]) -> f64 {
    match (values.first(), values.last()) {
        (Some(first), Some(last)) if *first > 0.0 => (last - first) / first,
        _ => 0.0,
    }
}

fn compute_drawdown(values: &[f64]) -> (f64, i64) {
    let Some(&first) = values.first() else {
        return (0.0, 0);
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0i64;
    let mut current_dd_duration = 0i64;

    for &value in values {
        if value > peak {
            peak = value;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            let dd = (peak - value) / peak;
            max_dd = max_dd.max(dd);
            if value < peak {
                current_dd_duration += 1;
                max_dd_duration = max_dd_duration.max(current_dd_duration);
            }
        }
    }

    (max_dd, max_dd_duration)
}

fn compute_risk_adjusted(returns: &[f64], daily_rf: f64) -> (f64, f64) {
    if returns.is_empty() {
        return (0.0, 0.0);
    }

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;
    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    let excess_return = mean - daily_rf;

    let sharpe = if stddev > 0.0 {
        (excess_return / stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    // Downside deviation over all periods, counting only shortfalls.
    let ds_variance: f64 = returns
        .iter()
        .filter(|&&r| r < daily_rf)
        .map(|&r| (r - daily_rf).powi(2))
        .sum::<f64>()
        / n;
    let downside_stddev = ds_variance.sqrt();

    let sortino = if downside_stddev > 0.0 {
        (excess_return / downside_stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    (sharpe, sortino)
}
