use crate::strategy::{BarAction, DecisionRow, ExitThresholds};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How a simulated trade ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeOutcome {
    StopLoss,
    TakeProfit,
    /// Still in position on the last bar
    Open,
}

/// Record of a single trade for analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub entry_time: DateTime<Utc>,
    pub entry_price: Decimal,
    pub exit_time: Option<DateTime<Utc>>,
    pub outcome: TradeOutcome,
    pub holding_bars: usize,
}

/// Portfolio value after one bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformancePoint {
    pub close_time: DateTime<Utc>,
    pub value: Decimal,
    /// value / investment
    pub performance: Decimal,
}

/// Mark the portfolio bar by bar
///
/// Exits settle at the threshold: a stop multiplies the portfolio by `1 - stop_loss`,
/// a take profit by `1 + take_profit`. While in position the value is marked at
/// `portfolio * close / entry`.
pub fn performance_curve(
    decisions: &[DecisionRow],
    investment: Decimal,
    exits: &ExitThresholds,
) -> Vec<PerformancePoint> {
    let mut portfolio = investment;
    let mut entry: Option<Decimal> = None;

    decisions
        .iter()
        .map(|d| {
            match d.action {
                BarAction::Buy if entry.is_none() => entry = Some(d.row.close),
                BarAction::StopLoss if entry.is_some() => {
                    entry = None;
                    portfolio *= Decimal::ONE - exits.stop_loss;
                }
                BarAction::TakeProfit if entry.is_some() => {
                    entry = None;
                    portfolio *= Decimal::ONE + exits.take_profit;
                }
                _ => {}
            }

            let value = match entry {
                Some(entry_price) if !entry_price.is_zero() => {
                    portfolio * d.row.close / entry_price
                }
                _ => portfolio,
            };

            PerformancePoint {
                close_time: d.row.close_time,
                value,
                performance: if investment.is_zero() {
                    Decimal::ZERO
                } else {
                    value / investment
                },
            }
        })
        .collect()
}

/// Pair up entries and exits from a walk
pub fn extract_trades(decisions: &[DecisionRow]) -> Vec<TradeRecord> {
    let mut trades = Vec::new();
    let mut open: Option<(usize, &DecisionRow)> = None;

    for (i, d) in decisions.iter().enumerate() {
        match d.action {
            BarAction::Buy => open = Some((i, d)),
            BarAction::StopLoss | BarAction::TakeProfit => {
                if let Some((start, entry)) = open.take() {
                    trades.push(TradeRecord {
                        entry_time: entry.row.close_time,
                        entry_price: entry.row.close,
                        exit_time: Some(d.row.close_time),
                        outcome: if d.action == BarAction::StopLoss {
                            TradeOutcome::StopLoss
                        } else {
                            TradeOutcome::TakeProfit
                        },
                        holding_bars: i - start,
                    });
                }
            }
            BarAction::None => {}
        }
    }

    if let Some((start, entry)) = open {
        trades.push(TradeRecord {
            entry_time: entry.row.close_time,
            entry_price: entry.row.close,
            exit_time: None,
            outcome: TradeOutcome::Open,
            holding_bars: decisions.len() - 1 - start,
        });
    }

    trades
}

/// Complete backtest performance metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub investment: Decimal,
    pub final_value: Decimal,
    /// Last point of the performance curve, 1.0 when nothing happened
    pub final_performance: f64,

    // Trade Statistics
    pub total_trades: usize,
    pub take_profits: usize,
    pub stop_losses: usize,
    pub open_at_end: bool,
    pub win_rate: f64,
    pub avg_holding_bars: f64,

    // Risk Metrics
    pub max_drawdown_pct: f64,

    pub trades: Vec<TradeRecord>,
}

impl BacktestMetrics {
    pub fn from_walk(decisions: &[DecisionRow], investment: Decimal, exits: &ExitThresholds) -> Self {
        let curve = performance_curve(decisions, investment, exits);
        Self::from_curve(&curve, extract_trades(decisions), investment)
    }

    pub fn from_curve(
        curve: &[PerformancePoint],
        trades: Vec<TradeRecord>,
        investment: Decimal,
    ) -> Self {
        let closed: Vec<&TradeRecord> = trades
            .iter()
            .filter(|t| t.outcome != TradeOutcome::Open)
            .collect();
        let take_profits = closed
            .iter()
            .filter(|t| t.outcome == TradeOutcome::TakeProfit)
            .count();
        let stop_losses = closed.len() - take_profits;

        let win_rate = if closed.is_empty() {
            0.0
        } else {
            (take_profits as f64 / closed.len() as f64) * 100.0
        };

        let avg_holding_bars = if closed.is_empty() {
            0.0
        } else {
            closed.iter().map(|t| t.holding_bars).sum::<usize>() as f64 / closed.len() as f64
        };

        let final_value = curve.last().map(|p| p.value).unwrap_or(investment);
        let final_performance = curve
            .last()
            .map(|p| p.performance)
            .unwrap_or(Decimal::ONE)
            .to_f64()
            .unwrap_or(1.0);

        Self {
            investment,
            final_value,
            final_performance,
            total_trades: closed.len(),
            take_profits,
            stop_losses,
            open_at_end: trades.iter().any(|t| t.outcome == TradeOutcome::Open),
            win_rate,
            avg_holding_bars,
            max_drawdown_pct: Self::calculate_drawdown(curve),
            trades,
        }
    }

    /// Largest peak-to-trough fall of the curve, in percent of the peak
    fn calculate_drawdown(curve: &[PerformancePoint]) -> f64 {
        let mut peak = Decimal::ZERO;
        let mut max_dd = 0.0;

        for point in curve {
            if point.value > peak {
                peak = point.value;
            }
            if peak > Decimal::ZERO {
                let dd = ((peak - point.value) / peak).to_f64().unwrap_or(0.0) * 100.0;
                if dd > max_dd {
                    max_dd = dd;
                }
            }
        }

        max_dd
    }

    /// Print a formatted report to stdout
    pub fn print_report(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║              BACKTEST PERFORMANCE REPORT              ║");
        println!("╚═══════════════════════════════════════════════════════╝\n");

        println!("📊 PERFORMANCE");
        println!("  Investment:            {:.2}", self.investment);
        println!("  Final Value:           {:.2}", self.final_value);
        println!("  Performance:           {:.4}", self.final_performance);
        println!("  Max Drawdown:          {:.2}%", self.max_drawdown_pct);

        println!("\n📈 TRADES");
        println!("  Closed Trades:         {}", self.total_trades);
        println!("  Take Profits:          {}", self.take_profits);
        println!("  Stop Losses:           {}", self.stop_losses);
        println!("  Win Rate:              {:.1}%", self.win_rate);
        println!("  Avg Holding:           {:.1} bars", self.avg_holding_bars);
        if self.open_at_end {
            println!("  ⚠️  Position still open on the last bar");
        }
    }
}
