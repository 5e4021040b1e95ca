use crate::backtest::metrics::{extract_trades, performance_curve, BacktestMetrics, PerformancePoint};
use crate::indicators::macd::{MACD_SIGNAL_PERIOD, MACD_SLOW_PERIOD};
use crate::models::{Bar, Timeframe};
use crate::strategy::{DecisionRow, ExitThresholds, Strategy};
use crate::{Error, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Short bars needed before every indicator is defined
pub const MIN_SHORT_BARS: usize = MACD_SLOW_PERIOD + MACD_SIGNAL_PERIOD - 1;

/// Everything a replay produced
#[derive(Debug, Clone)]
pub struct BacktestReport {
    pub strategy: String,
    pub decisions: Vec<DecisionRow>,
    pub curve: Vec<PerformancePoint>,
    pub metrics: BacktestMetrics,
}

/// Replays recorded history through a strategy. No clock, no exchange.
pub struct BacktestRunner {
    investment: Decimal,
    exits: ExitThresholds,
}

impl BacktestRunner {
    /// Create a new backtest runner
    ///
    /// # Arguments
    /// * `investment` - Starting portfolio value
    /// * `exits` - Stop loss / take profit fractions used to settle exits
    pub fn new(investment: Decimal, exits: ExitThresholds) -> Self {
        Self { investment, exits }
    }

    /// Run a backtest with given strategy and per-timeframe history
    pub fn run<S: Strategy>(
        &self,
        strategy: &S,
        histories: &HashMap<Timeframe, Vec<Bar>>,
    ) -> Result<BacktestReport> {
        let timeframes = strategy.timeframes();
        let short = timeframes
            .first()
            .copied()
            .ok_or_else(|| Error::Config(format!("{} reads no timeframe", strategy.name())))?;
        let short_bars = histories.get(&short).map(Vec::len).unwrap_or(0);

        if short_bars < MIN_SHORT_BARS {
            return Err(Error::Config(format!(
                "Not enough {} bars for backtest. Need {}, got {}",
                short, MIN_SHORT_BARS, short_bars
            )));
        }

        tracing::info!(
            strategy = strategy.name(),
            bars = short_bars,
            "starting backtest"
        );

        let decisions = strategy.evaluate(histories)?;
        let curve = performance_curve(&decisions, self.investment, &self.exits);
        let metrics =
            BacktestMetrics::from_curve(&curve, extract_trades(&decisions), self.investment);

        tracing::info!(
            strategy = strategy.name(),
            trades = metrics.total_trades,
            performance = metrics.final_performance,
            "backtest complete"
        );

        Ok(BacktestReport {
            strategy: strategy.name().to_string(),
            decisions,
            curve,
            metrics,
        })
    }

    /// Run backtest and print report
    pub fn run_and_report<S: Strategy>(
        &self,
        strategy: &S,
        histories: &HashMap<Timeframe, Vec<Bar>>,
        scenario_name: &str,
    ) -> Result<BacktestReport> {
        println!("\n🔬 Running backtest: {}", scenario_name);
        println!("   Strategy: {}", strategy.name());
        for tf in strategy.timeframes() {
            let count = histories.get(&tf).map(Vec::len).unwrap_or(0);
            println!("   {:>4} bars: {}", tf.to_string(), count);
        }
        println!("   Investment: {:.2}", self.investment);

        let report = self.run(strategy, histories)?;
        report.metrics.print_report();

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::synthetic::{resample, MarketScenario, SyntheticDataGenerator};
    use crate::config::StrategyConfig;
    use crate::strategy::MultiTimeframeStrategy;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn histories(scenario: MarketScenario, n: usize) -> HashMap<Timeframe, Vec<Bar>> {
        let mut gen = SyntheticDataGenerator::new(42);
        let short = gen.generate(
            "BTCEUR",
            scenario,
            Timeframe::FIFTEEN_MINUTES,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            n,
            dec!(100),
        );
        let mut map = HashMap::new();
        map.insert(Timeframe::ONE_HOUR, resample(&short, Timeframe::ONE_HOUR).unwrap());
        map.insert(Timeframe::ONE_DAY, resample(&short, Timeframe::ONE_DAY).unwrap());
        map.insert(Timeframe::FIFTEEN_MINUTES, short);
        map
    }

    fn runner_and_strategy() -> (BacktestRunner, MultiTimeframeStrategy) {
        let config = StrategyConfig::default();
        let strategy = MultiTimeframeStrategy::from_config(&config).unwrap();
        let runner = BacktestRunner::new(config.investment, *strategy.exits());
        (runner, strategy)
    }

    #[test]
    fn test_backtest_uptrend() {
        tracing_subscriber::fmt()
            .with_env_filter("ocobot=debug")
            .try_init()
            .ok();

        let (runner, strategy) = runner_and_strategy();
        let report = runner
            .run(&strategy, &histories(MarketScenario::Uptrend, 4000))
            .unwrap();

        assert_eq!(report.decisions.len(), 4000);
        assert_eq!(report.curve.len(), 4000);
        assert!(report.metrics.final_value > Decimal::ZERO);
        assert_eq!(
            report.metrics.total_trades,
            report.metrics.take_profits + report.metrics.stop_losses
        );
    }

    #[test]
    fn test_backtest_insufficient_data() {
        let (runner, strategy) = runner_and_strategy();
        let result = runner.run(&strategy, &histories(MarketScenario::Uptrend, 20));

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Not enough"));
    }

    #[test]
    fn test_backtest_is_deterministic() {
        let (runner, strategy) = runner_and_strategy();
        let data = histories(MarketScenario::Volatile, 3000);

        let a = runner.run(&strategy, &data).unwrap();
        let b = runner.run(&strategy, &data).unwrap();
        assert_eq!(a.curve, b.curve);
        assert_eq!(a.metrics.total_trades, b.metrics.total_trades);
    }
}
