use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use ocobot::backtest::synthetic::{bucket_start, window_start};
use ocobot::backtest::{BacktestRunner, MarketScenario, SyntheticDataGenerator};
use ocobot::config::{load_config, AppConfig, Mode, StrategyConfig};
use ocobot::execution::{
    BracketExecutor, ExecutorSettings, LiveScheduler, OrderIdLog, PaperExchange,
    RateLimitedExchange, SchedulerSettings,
};
use ocobot::strategy::{MultiTimeframeStrategy, Strategy};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tokio::task::JoinSet;

#[derive(Parser)]
#[command(name = "ocobot", version, about = "Multi-timeframe bracket order trading bot")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every live strategy against the paper exchange until Ctrl+C
    Live {
        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Replay synthetic history through every configured strategy
    Backtest {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Number of short timeframe bars to generate
        #[arg(long, default_value_t = 2880)]
        bars: usize,
        /// uptrend, downtrend, ranging, volatile or crash
        #[arg(long, default_value = "ranging")]
        scenario: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    match cli.command {
        Command::Live { config } => run_live(config.as_deref()).await,
        Command::Backtest {
            config,
            seed,
            bars,
            scenario,
        } => run_backtest(config.as_deref(), seed, bars, &scenario),
    }
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ocobot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = load_config(path).with_context(|| match path {
        Some(path) => format!("failed to load configuration from {}", path.display()),
        None => "failed to load configuration from the environment".to_string(),
    })?;
    Ok(config)
}

async fn run_live(path: Option<&Path>) -> anyhow::Result<()> {
    let app = load(path)?;
    tracing::info!("🚀 ocobot starting in live mode (paper exchange)");

    let live: Vec<&StrategyConfig> = app
        .strategies
        .iter()
        .filter(|s| s.mode == Mode::Live)
        .collect();
    if live.is_empty() {
        anyhow::bail!("no strategy is configured with mode = \"live\"");
    }

    let paper = PaperExchange::new(app.paper.clone());
    for strategy in &live {
        paper.add_market(&strategy.symbol, strategy.short_timeframe).await;
    }
    let exchange = RateLimitedExchange::new(paper, app.exchange.requests_per_minute)?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut tasks = JoinSet::new();

    for config in live {
        let strategy = MultiTimeframeStrategy::from_config(config)
            .with_context(|| format!("invalid strategy {}", config.name))?;
        let log = OrderIdLog::open(&config.order_log_dir, &config.name)
            .with_context(|| format!("cannot open order log for {}", config.name))?;
        let executor = BracketExecutor::new(
            exchange.clone(),
            config.name.clone(),
            config.pair()?,
            ExecutorSettings::from_config(config)?,
            log,
        )?;
        let mut scheduler =
            LiveScheduler::new(strategy, executor, SchedulerSettings::from_config(config)?)?;

        tracing::info!(
            strategy = %config.name,
            symbol = %config.symbol,
            timeframes = %format!(
                "{}/{}/{}",
                config.long_timeframe, config.medium_timeframe, config.short_timeframe
            ),
            investment = %config.investment,
            "strategy configured"
        );

        let name = config.name.clone();
        let stop = stop_rx.clone();
        tasks.spawn(async move { (name, scheduler.run(stop).await) });
    }

    tracing::info!("✅ {} strategies spawned, press Ctrl+C to stop", tasks.len());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("⚠️  Received Ctrl+C, shutting down...");
        }
        Some(result) = tasks.join_next() => {
            tracing::error!("A strategy task exited early: {:?}", result);
        }
    }

    // schedulers notice the flag during their sleeps
    let _ = stop_tx.send(true);
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok((name, Ok(()))) => tracing::info!(strategy = %name, "stopped"),
            Ok((name, Err(e))) => tracing::error!(strategy = %name, error = %e, "scheduler failed"),
            Err(e) => tracing::error!("strategy task panicked: {}", e),
        }
    }

    tracing::info!("👋 ocobot stopped");
    Ok(())
}

fn run_backtest(path: Option<&Path>, seed: u64, bars: usize, scenario: &str) -> anyhow::Result<()> {
    let app = load(path)?;
    let scenario: MarketScenario = scenario.parse()?;

    for config in &app.strategies {
        let strategy = MultiTimeframeStrategy::from_config(config)
            .with_context(|| format!("invalid strategy {}", config.name))?;
        let short = strategy.short_timeframe();

        let end = bucket_start(Utc::now(), short)?;
        let start = window_start(end, short, bars)?;
        let histories = SyntheticDataGenerator::new(seed).histories(
            &config.symbol,
            scenario,
            &strategy.timeframes(),
            start,
            bars,
            app.paper.start_price,
        )?;

        let runner = BacktestRunner::new(config.investment, *strategy.exits());
        runner.run_and_report(
            &strategy,
            &histories,
            &format!("{} ({}, seed {})", config.name, scenario.name(), seed),
        )?;
    }

    Ok(())
}
