use chrono::{TimeZone, Utc};
use ocobot::backtest::{BacktestMetrics, BacktestRunner, MarketScenario, SyntheticDataGenerator};
use ocobot::config::StrategyConfig;
use ocobot::strategy::{MultiTimeframeStrategy, Strategy};
use ocobot::Result;

const SEED: u64 = 42;
// 30 days of 15 minute bars
const NUM_BARS: usize = 2880;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ocobot=info")),
        )
        .init();

    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║            OCOBOT BACKTESTING SUITE                   ║");
    println!("╚═══════════════════════════════════════════════════════╝");

    let config = StrategyConfig::default();
    let strategy = MultiTimeframeStrategy::from_config(&config)?;
    let runner = BacktestRunner::new(config.investment, *strategy.exits());
    let start = Utc
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| ocobot::Error::Invariant("invalid start date".to_string()))?;

    let scenarios = [
        (MarketScenario::Uptrend, "📈 Uptrend (+2% daily)"),
        (MarketScenario::Downtrend, "📉 Downtrend (-2% daily)"),
        (MarketScenario::Ranging, "↔️  Ranging (mean-reverting)"),
        (MarketScenario::Volatile, "⚡ Volatile (±2% per bar)"),
        (MarketScenario::Crash, "💥 Crash (25% slide)"),
    ];

    let mut all_metrics = Vec::new();

    for (scenario, name) in scenarios {
        let histories = SyntheticDataGenerator::new(SEED).histories(
            &config.symbol,
            scenario,
            &strategy.timeframes(),
            start,
            NUM_BARS,
            rust_decimal::Decimal::from(100),
        )?;

        match runner.run_and_report(&strategy, &histories, name) {
            Ok(report) => all_metrics.push((name.to_string(), report.metrics)),
            Err(e) => eprintln!("❌ Backtest failed for {}: {}", name, e),
        }
    }

    print_summary_comparison(&all_metrics);

    Ok(())
}

fn print_summary_comparison(results: &[(String, BacktestMetrics)]) {
    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║              SCENARIO COMPARISON                      ║");
    println!("╚═══════════════════════════════════════════════════════╝\n");

    println!(
        "{:<30} {:>8} {:>8} {:>6} {:>6} {:>8}",
        "Scenario", "Perf", "MaxDD%", "TP", "SL", "Win%"
    );
    println!("{}", "─".repeat(72));

    for (name, metrics) in results {
        println!(
            "{:<30} {:>8.4} {:>8.2} {:>6} {:>6} {:>8.1}",
            name,
            metrics.final_performance,
            metrics.max_drawdown_pct,
            metrics.take_profits,
            metrics.stop_losses,
            metrics.win_rate
        );
    }

    println!();

    if let Some((best_name, best)) = results
        .iter()
        .max_by(|a, b| a.1.final_performance.total_cmp(&b.1.final_performance))
    {
        println!(
            "🏆 Best Scenario: {} ({:+.2}%)",
            best_name,
            (best.final_performance - 1.0) * 100.0
        );
    }

    if let Some((worst_name, worst)) = results
        .iter()
        .min_by(|a, b| a.1.final_performance.total_cmp(&b.1.final_performance))
    {
        println!(
            "⚠️  Worst Scenario: {} ({:+.2}%)",
            worst_name,
            (worst.final_performance - 1.0) * 100.0
        );
    }

    let total_trades: usize = results.iter().map(|(_, m)| m.total_trades).sum();
    println!("\n📊 Overall Statistics:");
    println!("   Total Trades Across All Scenarios: {}", total_trades);

    println!("\n═══════════════════════════════════════════════════════\n");
}
