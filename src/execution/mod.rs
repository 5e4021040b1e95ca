// Order execution: exchange seam, bracket placement and the live loop
pub mod exchange;
pub mod executor;
pub mod order_log;
pub mod orders;
pub mod paper;
pub mod rate_limit;
pub mod scheduler;

use chrono::{DateTime, Utc};
use std::sync::Arc;

pub use exchange::{Exchange, ExchangeResult};
pub use executor::{BracketExecutor, ExecutorSettings, TradeReport};
pub use order_log::OrderIdLog;
pub use orders::{compute_bracket_prices, quantity_for, round_to_tick, sell_bracket, BracketPrices};
pub use paper::PaperExchange;
pub use rate_limit::RateLimitedExchange;
pub use scheduler::{CycleOutcome, LiveScheduler, SchedulerSettings};

/// Source of the current time, injectable for tests
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;
