pub mod metrics;
pub mod runner;
pub mod synthetic;

pub use metrics::{BacktestMetrics, PerformancePoint, TradeOutcome, TradeRecord};
pub use runner::{BacktestReport, BacktestRunner};
pub use synthetic::{resample, MarketScenario, SyntheticDataGenerator};
