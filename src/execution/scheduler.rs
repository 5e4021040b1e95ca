use super::exchange::Exchange;
use super::executor::{BracketExecutor, TradeReport};
use super::Clock;
use crate::config::StrategyConfig;
use crate::models::{Bar, Timeframe};
use crate::strategy::{BarAction, Strategy};
use crate::{Error, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Timing knobs of the live loop
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Offset from the bar boundary, negative wakes before the close
    pub wake_offset: Duration,
    pub freshness_tolerance: Duration,
    pub recovery_delay: std::time::Duration,
    pub timezone: Tz,
    /// Days of history per timeframe, `None` meaning year to date
    pub lookback_days: HashMap<Timeframe, Option<u32>>,
}

impl SchedulerSettings {
    pub fn from_config(config: &StrategyConfig) -> Result<Self> {
        let lookback_days = [
            config.short_timeframe,
            config.medium_timeframe,
            config.long_timeframe,
        ]
        .into_iter()
        .map(|tf| (tf, config.lookback_days(tf)))
        .collect();

        Ok(Self {
            wake_offset: Duration::seconds(config.wake_offset_secs),
            freshness_tolerance: Duration::seconds(config.freshness_tolerance_secs),
            recovery_delay: std::time::Duration::from_secs(config.recovery_delay_secs),
            timezone: config.timezone()?,
            lookback_days,
        })
    }
}

/// Result of one evaluation
#[derive(Debug)]
pub enum CycleOutcome {
    /// A filled market order is unprotected or unlogged; no new entries until restart
    EntriesHalted,
    /// Orders placed by this instance are still open
    AlreadyInPosition,
    /// The newest row is too far from now to act upon
    Stale {
        last_close: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    },
    NoSignal,
    Entered(Box<TradeReport>),
}

/// Next wake-up: the next epoch-aligned boundary of `timeframe` shifted by `offset`,
/// strictly after `now`
pub fn next_wake(now: DateTime<Utc>, timeframe: Timeframe, offset: Duration) -> Result<DateTime<Utc>> {
    if !timeframe.is_epoch_aligned() {
        return Err(Error::Config(format!(
            "cannot schedule on {} bars, use a minute, hour or day timeframe",
            timeframe
        )));
    }

    let width = timeframe.minutes() * 60;
    let secs = now.timestamp();
    let floor = DateTime::from_timestamp(secs - secs.rem_euclid(width), 0)
        .ok_or_else(|| Error::Invariant(format!("timestamp {} out of range", secs)))?;

    let step = Duration::seconds(width);
    let mut wake = floor + offset;
    while wake <= now {
        wake += step;
    }
    Ok(wake)
}

/// First instant of history to fetch
pub fn history_start(now: DateTime<Utc>, lookback_days: Option<u32>) -> Result<DateTime<Utc>> {
    match lookback_days {
        Some(days) => Duration::try_days(days as i64)
            .and_then(|lookback| now.checked_sub_signed(lookback))
            .ok_or_else(|| Error::Config(format!("lookback of {} days is out of range", days))),
        None => NaiveDate::from_ymd_opt(now.year(), 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
            .ok_or_else(|| Error::Invariant(format!("no January 1st for {}", now.year()))),
    }
}

/// Whether a close time is within `tolerance` of now, in either direction
pub fn is_fresh(last_close: DateTime<Utc>, now: DateTime<Utc>, tolerance: Duration) -> bool {
    (last_close - now).num_milliseconds().abs() <= tolerance.num_milliseconds()
}

/// Re-evaluates one strategy instance once per short bar and enters on fresh Buy signals
pub struct LiveScheduler<E, S> {
    strategy: S,
    executor: BracketExecutor<E>,
    settings: SchedulerSettings,
    clock: Clock,
    /// Market order left without a bracket or a durable log entry
    halted_by: Option<String>,
}

impl<E: Exchange, S: Strategy> LiveScheduler<E, S> {
    pub fn new(strategy: S, executor: BracketExecutor<E>, settings: SchedulerSettings) -> Result<Self> {
        let short = strategy
            .timeframes()
            .first()
            .copied()
            .ok_or_else(|| Error::Config(format!("{} reads no timeframe", strategy.name())))?;
        // fail at construction rather than on the first wake
        next_wake(Utc::now(), short, settings.wake_offset)?;

        Ok(Self {
            strategy,
            executor,
            settings,
            clock: Arc::new(Utc::now),
            halted_by: None,
        })
    }

    /// Replace the wall clock the supervised loop schedules against
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn is_halted(&self) -> bool {
        self.halted_by.is_some()
    }

    pub fn executor(&self) -> &BracketExecutor<E> {
        &self.executor
    }

    fn short_timeframe(&self) -> Timeframe {
        self.strategy
            .timeframes()
            .first()
            .copied()
            .unwrap_or(Timeframe::FIFTEEN_MINUTES)
    }

    async fn fetch_histories(&self, now: DateTime<Utc>) -> Result<HashMap<Timeframe, Vec<Bar>>> {
        let symbol = self.executor.symbol();
        let mut histories = HashMap::new();

        for timeframe in self.strategy.timeframes() {
            let lookback = self
                .settings
                .lookback_days
                .get(&timeframe)
                .copied()
                .flatten();
            let start = history_start(now, lookback)?;
            let bars = self
                .executor
                .exchange()
                .get_historical_bars(&symbol, timeframe, start, None)
                .await?;

            tracing::debug!(
                strategy = self.strategy.name(),
                timeframe = %timeframe,
                bars = bars.len(),
                since = %start,
                "history refreshed"
            );
            histories.insert(timeframe, bars);
        }

        Ok(histories)
    }

    /// One evaluation at `now`: guard, refresh, pipeline, freshness, entry
    pub async fn evaluate_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleOutcome> {
        if let Some(market_id) = &self.halted_by {
            tracing::warn!(
                strategy = self.strategy.name(),
                market_client_order_id = %market_id,
                "entries halted until the unprotected position is resolved"
            );
            return Ok(CycleOutcome::EntriesHalted);
        }

        if self.executor.is_in_position().await? {
            tracing::info!(strategy = self.strategy.name(), "already in position, skipping");
            return Ok(CycleOutcome::AlreadyInPosition);
        }

        let histories = self.fetch_histories(now).await?;
        let decisions = self.strategy.evaluate(&histories)?;

        let Some(last) = decisions.last() else {
            tracing::warn!(strategy = self.strategy.name(), "no bars returned, skipping");
            return Ok(CycleOutcome::Stale {
                last_close: None,
                now,
            });
        };

        let tz = self.settings.timezone;
        if !is_fresh(last.row.close_time, now, self.settings.freshness_tolerance) {
            tracing::warn!(
                strategy = self.strategy.name(),
                last_close = %last.row.close_time.with_timezone(&tz),
                now = %now.with_timezone(&tz),
                "stale data, skipping"
            );
            return Ok(CycleOutcome::Stale {
                last_close: Some(last.row.close_time),
                now,
            });
        }

        tracing::debug!(
            strategy = self.strategy.name(),
            close_time = %last.row.close_time.with_timezone(&tz),
            close = %last.row.close,
            signals = ?last.row.signal_columns(),
            "data are fresh"
        );

        if last.action != BarAction::Buy {
            return Ok(CycleOutcome::NoSignal);
        }

        tracing::info!(strategy = self.strategy.name(), "📈 buy signal, entering");
        match self.executor.execute_buy().await {
            Ok(report) => Ok(CycleOutcome::Entered(Box::new(report))),
            Err(e) => {
                if let Some(market_id) = e.unprotected_market_order() {
                    self.halted_by = Some(market_id.to_string());
                }
                Err(e)
            }
        }
    }

    /// Supervised loop: sleep to the next wake, evaluate, log, repeat until `stop` turns true
    pub async fn run(&mut self, mut stop: watch::Receiver<bool>) -> Result<()> {
        let name = self.strategy.name().to_string();
        tracing::info!(strategy = %name, "🔄 live scheduler started");

        loop {
            if *stop.borrow() {
                break;
            }

            let now = (self.clock)();
            let wake = next_wake(now, self.short_timeframe(), self.settings.wake_offset)?;
            tracing::info!(
                strategy = %name,
                next_wake = %wake.with_timezone(&self.settings.timezone),
                "sleeping until next evaluation"
            );

            let wait = (wake - now).to_std().unwrap_or_default();
            if sleep_or_stop(wait, &mut stop).await {
                break;
            }

            let now = (self.clock)();
            match self.evaluate_cycle(now).await {
                Ok(outcome) => log_outcome(&name, &outcome),
                Err(e) => {
                    tracing::error!(strategy = %name, error = %e, "cycle failed");
                    if sleep_or_stop(self.settings.recovery_delay, &mut stop).await {
                        break;
                    }
                }
            }
        }

        tracing::info!(strategy = %name, "👋 live scheduler stopped");
        Ok(())
    }
}

fn log_outcome(name: &str, outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Entered(report) => tracing::info!(
            strategy = name,
            market_client_order_id = %report.market_client_order_id,
            bracket_client_order_id = %report.bracket_client_order_id,
            quantity = %report.filled_quantity,
            "✅ entered position"
        ),
        other => tracing::debug!(strategy = name, outcome = ?other, "cycle done"),
    }
}

/// Sleep for `duration`; returns true if the stop flag was raised first
async fn sleep_or_stop(duration: std::time::Duration, stop: &mut watch::Receiver<bool>) -> bool {
    let stopped = tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = wait_for_stop(stop) => true,
    };
    stopped || *stop.borrow()
}

async fn wait_for_stop(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            // sender gone, nobody can ask us to stop any more
            std::future::pending::<()>().await;
        }
    }
}
