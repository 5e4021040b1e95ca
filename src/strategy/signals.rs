use crate::indicators::{compute_indicators, IndicatorSet};
use crate::models::{Bar, Timeframe};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Suffix of every signal column
pub const SIGNAL_SUFFIX: &str = "SIGNAL";

/// RSI levels used to derive the oversold/overbought signals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalThresholds {
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
}

impl Default for SignalThresholds {
    fn default() -> Self {
        Self {
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
        }
    }
}

impl SignalThresholds {
    pub fn validate(&self) -> Result<()> {
        let in_range = |v: f64| (0.0..=100.0).contains(&v);
        if !in_range(self.rsi_oversold) || !in_range(self.rsi_overbought) {
            return Err(Error::Config(format!(
                "RSI thresholds must be within [0, 100], got oversold={} overbought={}",
                self.rsi_oversold, self.rsi_overbought
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalName {
    EmaShortAboveLong,
    Oversold,
    Overbought,
    MomentumUp,
    MomentumDown,
}

impl SignalName {
    pub const ALL: [SignalName; 5] = [
        SignalName::EmaShortAboveLong,
        SignalName::Oversold,
        SignalName::Overbought,
        SignalName::MomentumUp,
        SignalName::MomentumDown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalName::EmaShortAboveLong => "ema_short_above_long",
            SignalName::Oversold => "oversold",
            SignalName::Overbought => "overbought",
            SignalName::MomentumUp => "momentum_up",
            SignalName::MomentumDown => "momentum_down",
        }
    }

    /// Namespaced column name, e.g. `1d_ema_short_above_long_SIGNAL`
    pub fn column(&self, prefix: &Timeframe) -> String {
        format!("{}_{}_{}", prefix, self.as_str(), SIGNAL_SUFFIX)
    }
}

impl fmt::Display for SignalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boolean signals for one bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignalSet {
    pub ema_short_above_long: bool,
    pub oversold: bool,
    pub overbought: bool,
    pub momentum_up: bool,
    pub momentum_down: bool,
}

impl SignalSet {
    pub fn get(&self, name: SignalName) -> bool {
        match name {
            SignalName::EmaShortAboveLong => self.ema_short_above_long,
            SignalName::Oversold => self.oversold,
            SignalName::Overbought => self.overbought,
            SignalName::MomentumUp => self.momentum_up,
            SignalName::MomentumDown => self.momentum_down,
        }
    }

    /// (column name, value) pairs for this bar
    pub fn columns(&self, prefix: &Timeframe) -> Vec<(String, bool)> {
        SignalName::ALL
            .iter()
            .map(|name| (name.column(prefix), self.get(*name)))
            .collect()
    }
}

/// Derive the signal set of one bar. Unknown indicator values never produce a signal.
pub fn derive_signals(indicators: &IndicatorSet, thresholds: &SignalThresholds) -> SignalSet {
    let ema_short_above_long = match (indicators.short_ema, indicators.long_ema) {
        (Some(short), Some(long)) => short > long,
        _ => false,
    };

    SignalSet {
        ema_short_above_long,
        oversold: indicators
            .rsi
            .is_some_and(|rsi| rsi < thresholds.rsi_oversold),
        overbought: indicators
            .rsi
            .is_some_and(|rsi| rsi > thresholds.rsi_overbought),
        momentum_up: indicators.momentum_up,
        momentum_down: indicators.momentum_down,
    }
}

/// One timeframe's bars with their indicators and signals, position-aligned
#[derive(Debug, Clone)]
pub struct TimeframeSeries {
    pub timeframe: Timeframe,
    pub bars: Vec<Bar>,
    pub indicators: Vec<IndicatorSet>,
    pub signals: Vec<SignalSet>,
}

impl TimeframeSeries {
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn close_times(&self) -> Vec<DateTime<Utc>> {
        self.bars.iter().map(|b| b.close_time).collect()
    }

    /// Check the one-entry-per-bar invariant
    pub fn check_aligned(&self) -> Result<()> {
        if self.indicators.len() != self.bars.len() || self.signals.len() != self.bars.len() {
            return Err(Error::Invariant(format!(
                "{} series misaligned: {} bars, {} indicator rows, {} signal rows",
                self.timeframe,
                self.bars.len(),
                self.indicators.len(),
                self.signals.len()
            )));
        }
        Ok(())
    }
}

/// Compute indicators and signals over one timeframe's bars
///
/// # Arguments
/// * `timeframe` - Timeframe the bars belong to, used as column prefix
/// * `bars` - Bars in chronological order
/// * `thresholds` - RSI levels
/// * `consecutive_hist_before_momentum` - Histogram moves before a momentum flag
pub fn annotate(
    timeframe: Timeframe,
    bars: Vec<Bar>,
    thresholds: &SignalThresholds,
    consecutive_hist_before_momentum: usize,
) -> Result<TimeframeSeries> {
    if let Some(bar) = bars.iter().find(|b| b.timeframe != timeframe) {
        return Err(Error::Invariant(format!(
            "bar at {} is {} but series is {}",
            bar.open_time, bar.timeframe, timeframe
        )));
    }

    let indicators = compute_indicators(&bars, consecutive_hist_before_momentum)?;
    let signals = indicators
        .iter()
        .map(|set| derive_signals(set, thresholds))
        .collect();

    let series = TimeframeSeries {
        timeframe,
        bars,
        indicators,
        signals,
    };
    series.check_aligned()?;

    tracing::debug!(
        timeframe = %timeframe,
        bars = series.len(),
        "annotated timeframe series"
    );

    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indicators(short: Option<f64>, long: Option<f64>, rsi: Option<f64>) -> IndicatorSet {
        IndicatorSet {
            short_ema: short,
            long_ema: long,
            rsi,
            ..Default::default()
        }
    }

    #[test]
    fn test_column_names() {
        let tf: Timeframe = "1d".parse().unwrap();
        assert_eq!(
            SignalName::EmaShortAboveLong.column(&tf),
            "1d_ema_short_above_long_SIGNAL"
        );

        let tf: Timeframe = "15m".parse().unwrap();
        assert_eq!(SignalName::Oversold.column(&tf), "15m_oversold_SIGNAL");
    }

    #[test]
    fn test_derive_signals() {
        let thresholds = SignalThresholds {
            rsi_oversold: 50.0,
            rsi_overbought: 70.0,
        };

        let set = derive_signals(&indicators(Some(10.0), Some(9.0), Some(45.0)), &thresholds);
        assert!(set.ema_short_above_long);
        assert!(set.oversold);
        assert!(!set.overbought);

        let set = derive_signals(&indicators(Some(9.0), Some(9.0), Some(75.0)), &thresholds);
        assert!(!set.ema_short_above_long);
        assert!(!set.oversold);
        assert!(set.overbought);
    }

    #[test]
    fn test_unknown_values_are_false() {
        let set = derive_signals(&indicators(None, Some(1.0), None), &SignalThresholds::default());
        assert_eq!(set, SignalSet::default());
    }

    #[test]
    fn test_momentum_copied() {
        let mut ind = IndicatorSet::default();
        ind.momentum_down = true;
        let set = derive_signals(&ind, &SignalThresholds::default());
        assert!(set.momentum_down);
        assert!(!set.momentum_up);
    }

    #[test]
    fn test_misaligned_series_rejected() {
        let series = TimeframeSeries {
            timeframe: "1h".parse().unwrap(),
            bars: vec![],
            indicators: vec![IndicatorSet::default()],
            signals: vec![],
        };
        assert!(matches!(series.check_aligned(), Err(Error::Invariant(_))));
    }

    #[test]
    fn test_thresholds_validation() {
        assert!(SignalThresholds::default().validate().is_ok());
        let bad = SignalThresholds {
            rsi_oversold: -1.0,
            rsi_overbought: 70.0,
        };
        assert!(bad.validate().is_err());
    }
}
