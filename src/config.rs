use crate::models::{Pair, Timeframe};
use crate::strategy::signals::SignalThresholds;
use crate::strategy::state_machine::ExitThresholds;
use crate::{Error, Result};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix, e.g. `OCOBOT__EXCHANGE__REQUESTS_PER_MINUTE=1200`
pub const ENV_PREFIX: &str = "OCOBOT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Live,
    Backtest,
}

/// Settings of one strategy instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub name: String,
    pub symbol: String,
    pub token: String,
    pub base: String,
    pub long_timeframe: Timeframe,
    pub medium_timeframe: Timeframe,
    pub short_timeframe: Timeframe,
    pub take_profit_threshold: Decimal,
    pub stop_loss_ratio: Decimal,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub consecutive_hist_before_momentum: usize,
    /// Quote amount spent per entry
    pub investment: Decimal,
    pub mode: Mode,
    /// IANA zone used when logging bar times
    pub local_timezone: String,
    pub order_log_dir: PathBuf,
    /// History fetched per cycle; 0 means since January 1st of the current year
    pub long_lookback_days: u32,
    pub medium_lookback_days: u32,
    pub short_lookback_days: u32,
    /// Wake time relative to the bar boundary (negative wakes before the close)
    pub wake_offset_secs: i64,
    pub freshness_tolerance_secs: i64,
    pub recovery_delay_secs: u64,
    pub bracket_retry_attempts: u32,
    pub bracket_retry_delay_secs: u64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            name: "oco_petit_joueur".to_string(),
            symbol: "BTCEUR".to_string(),
            token: "BTC".to_string(),
            base: "EUR".to_string(),
            long_timeframe: Timeframe::ONE_DAY,
            medium_timeframe: Timeframe::ONE_HOUR,
            short_timeframe: Timeframe::FIFTEEN_MINUTES,
            take_profit_threshold: dec!(0.007),
            stop_loss_ratio: dec!(1.5),
            rsi_oversold: 50.0,
            rsi_overbought: 70.0,
            consecutive_hist_before_momentum: 3,
            investment: dec!(100),
            mode: Mode::Live,
            local_timezone: "Europe/Paris".to_string(),
            order_log_dir: PathBuf::from("state"),
            long_lookback_days: 0,
            medium_lookback_days: 2,
            short_lookback_days: 2,
            wake_offset_secs: -30,
            freshness_tolerance_secs: 30,
            recovery_delay_secs: 60,
            bracket_retry_attempts: 5,
            bracket_retry_delay_secs: 20,
        }
    }
}

impl StrategyConfig {
    /// Check every field that can only be wrong at configuration time
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("strategy name must not be empty".to_string()));
        }
        self.pair()?;

        let frames = [
            self.short_timeframe,
            self.medium_timeframe,
            self.long_timeframe,
        ];
        if frames[0] == frames[1] || frames[1] == frames[2] || frames[0] == frames[2] {
            return Err(Error::Config(format!(
                "{}: timeframes must be distinct, got {}/{}/{}",
                self.name, self.short_timeframe, self.medium_timeframe, self.long_timeframe
            )));
        }
        if self.short_timeframe >= self.medium_timeframe
            || self.medium_timeframe >= self.long_timeframe
        {
            return Err(Error::Config(format!(
                "{}: timeframes must be ordered short < medium < long, got {}/{}/{}",
                self.name, self.short_timeframe, self.medium_timeframe, self.long_timeframe
            )));
        }
        if self.mode == Mode::Live && !self.short_timeframe.is_epoch_aligned() {
            return Err(Error::Config(format!(
                "{}: live scheduling needs a minute, hour or day short timeframe, got {}",
                self.name, self.short_timeframe
            )));
        }

        self.exit_thresholds()?;
        self.signal_thresholds().validate()?;

        if self.consecutive_hist_before_momentum == 0 {
            return Err(Error::Config(format!(
                "{}: consecutive_hist_before_momentum must be at least 1",
                self.name
            )));
        }
        if self.investment <= Decimal::ZERO {
            return Err(Error::Config(format!(
                "{}: investment must be positive",
                self.name
            )));
        }
        self.timezone()?;

        if self.freshness_tolerance_secs < 0 {
            return Err(Error::Config(format!(
                "{}: freshness tolerance must not be negative",
                self.name
            )));
        }
        if self.bracket_retry_attempts == 0 {
            return Err(Error::Config(format!(
                "{}: bracket_retry_attempts must be at least 1",
                self.name
            )));
        }

        Ok(())
    }

    pub fn pair(&self) -> Result<Pair> {
        Pair::new(&self.symbol, &self.token, &self.base)
    }

    pub fn exit_thresholds(&self) -> Result<ExitThresholds> {
        ExitThresholds::from_ratio(self.take_profit_threshold, self.stop_loss_ratio)
    }

    pub fn signal_thresholds(&self) -> SignalThresholds {
        SignalThresholds {
            rsi_oversold: self.rsi_oversold,
            rsi_overbought: self.rsi_overbought,
        }
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.local_timezone.parse::<Tz>().map_err(|_| {
            Error::Config(format!("unknown time zone '{}'", self.local_timezone))
        })
    }

    /// Lookback for a timeframe, `None` meaning year to date
    pub fn lookback_days(&self, timeframe: Timeframe) -> Option<u32> {
        let days = if timeframe == self.long_timeframe {
            self.long_lookback_days
        } else if timeframe == self.medium_timeframe {
            self.medium_lookback_days
        } else {
            self.short_lookback_days
        };
        (days > 0).then_some(days)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub requests_per_minute: u32,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 600,
        }
    }
}

/// In-memory exchange used by `ocobot live`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    pub seed: u64,
    pub start_price: Decimal,
    /// Taker fee as a fraction of the traded quantity
    pub fee_rate: Decimal,
    /// Synthetic history generated before the first request
    pub history_days: u32,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            start_price: dec!(60000),
            fee_rate: dec!(0.001),
            history_days: 400,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub exchange: ExchangeConfig,
    pub paper: PaperConfig,
    pub strategies: Vec<StrategyConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            exchange: ExchangeConfig::default(),
            paper: PaperConfig::default(),
            strategies: vec![StrategyConfig::default()],
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.strategies.is_empty() {
            return Err(Error::Config("no strategies configured".to_string()));
        }
        if self.exchange.requests_per_minute == 0 {
            return Err(Error::Config(
                "exchange.requests_per_minute must be positive".to_string(),
            ));
        }

        let mut names = std::collections::HashSet::new();
        for strategy in &self.strategies {
            strategy.validate()?;
            if !names.insert(strategy.name.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate strategy name '{}'",
                    strategy.name
                )));
            }
        }
        Ok(())
    }
}

/// Load configuration from an optional TOML file, then `OCOBOT__*` environment variables
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path));
    }

    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    let app: AppConfig = settings.try_deserialize()?;
    app.validate()?;

    tracing::debug!(strategies = app.strategies.len(), "configuration loaded");
    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = StrategyConfig::default();
        assert!(config.validate().is_ok());

        let exits = config.exit_thresholds().unwrap();
        assert_eq!(exits.stop_loss, dec!(0.0105));
        assert_eq!(config.timezone().unwrap(), chrono_tz::Europe::Paris);
    }

    #[test]
    fn test_symbol_must_match_pair() {
        let config = StrategyConfig {
            symbol: "ETHEUR".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_short_timeframe_must_be_shortest() {
        let config = StrategyConfig {
            short_timeframe: "4h".parse().unwrap(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StrategyConfig {
            medium_timeframe: "15m".parse().unwrap(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_medium_must_be_shorter_than_long() {
        let config = StrategyConfig {
            medium_timeframe: "1d".parse().unwrap(),
            long_timeframe: "1h".parse().unwrap(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_thresholds_out_of_range() {
        let config = StrategyConfig {
            take_profit_threshold: dec!(0.5),
            stop_loss_ratio: dec!(3),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_timezone() {
        let config = StrategyConfig {
            local_timezone: "Mars/Olympus".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lookback_zero_means_year_to_date() {
        let config = StrategyConfig::default();
        assert_eq!(config.lookback_days(config.long_timeframe), None);
        assert_eq!(config.lookback_days(config.short_timeframe), Some(2));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let app = AppConfig {
            strategies: vec![StrategyConfig::default(), StrategyConfig::default()],
            ..Default::default()
        };
        assert!(app.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[exchange]
requests_per_minute = 120

[[strategies]]
name = "eth_dip"
symbol = "ETHUSDT"
token = "ETH"
base = "USDT"
short_timeframe = "5m"
medium_timeframe = "1h"
long_timeframe = "4h"
take_profit_threshold = 0.01
rsi_oversold = 35
"#
        )
        .unwrap();

        let app = load_config(Some(file.path())).unwrap();
        assert_eq!(app.exchange.requests_per_minute, 120);
        assert_eq!(app.strategies.len(), 1);

        let s = &app.strategies[0];
        assert_eq!(s.name, "eth_dip");
        assert_eq!(s.short_timeframe.to_string(), "5m");
        assert_eq!(s.take_profit_threshold, dec!(0.01));
        assert_eq!(s.rsi_oversold, 35.0);
        // unspecified fields fall back to defaults
        assert_eq!(s.stop_loss_ratio, dec!(1.5));
        assert_eq!(s.consecutive_hist_before_momentum, 3);
    }

    #[test]
    fn test_invalid_timeframe_in_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[[strategies]]
name = "bad"
short_timeframe = "15x"
"#
        )
        .unwrap();

        assert!(load_config(Some(file.path())).is_err());
    }
}
