use super::aggregation::aggregate;
use super::signals::{annotate, SignalThresholds};
use super::state_machine::{walk, DecisionRow, EntryRule, ExitThresholds, PositionState};
use super::Strategy;
use crate::config::StrategyConfig;
use crate::models::{Bar, Timeframe};
use crate::{Error, Result};
use std::collections::HashMap;

/// Three-timeframe dip buyer: long trend up, medium momentum up, short oversold
#[derive(Debug, Clone)]
pub struct MultiTimeframeStrategy {
    name: String,
    short: Timeframe,
    medium: Timeframe,
    long: Timeframe,
    thresholds: SignalThresholds,
    consecutive_hist_before_momentum: usize,
    rule: EntryRule,
    exits: ExitThresholds,
}

impl MultiTimeframeStrategy {
    pub fn new(
        name: impl Into<String>,
        short: Timeframe,
        medium: Timeframe,
        long: Timeframe,
        thresholds: SignalThresholds,
        consecutive_hist_before_momentum: usize,
        exits: ExitThresholds,
    ) -> Result<Self> {
        if short >= medium || medium >= long {
            return Err(Error::Config(format!(
                "timeframes {}/{}/{} must be ordered short < medium < long",
                short, medium, long
            )));
        }
        if consecutive_hist_before_momentum == 0 {
            return Err(Error::Config(
                "consecutive_hist_before_momentum must be at least 1".to_string(),
            ));
        }
        thresholds.validate()?;

        Ok(Self {
            name: name.into(),
            short,
            medium,
            long,
            thresholds,
            consecutive_hist_before_momentum,
            rule: EntryRule::trend_momentum_dip(long, medium, short),
            exits,
        })
    }

    pub fn from_config(config: &StrategyConfig) -> Result<Self> {
        Self::new(
            config.name.clone(),
            config.short_timeframe,
            config.medium_timeframe,
            config.long_timeframe,
            config.signal_thresholds(),
            config.consecutive_hist_before_momentum,
            config.exit_thresholds()?,
        )
    }

    /// Replace the default entry rule
    pub fn with_entry_rule(mut self, rule: EntryRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn exits(&self) -> &ExitThresholds {
        &self.exits
    }

    pub fn short_timeframe(&self) -> Timeframe {
        self.short
    }
}

impl Strategy for MultiTimeframeStrategy {
    fn evaluate(&self, histories: &HashMap<Timeframe, Vec<Bar>>) -> Result<Vec<DecisionRow>> {
        let history = |tf: Timeframe| {
            histories.get(&tf).cloned().ok_or_else(|| {
                Error::Invariant(format!("{}: no {} history supplied", self.name, tf))
            })
        };

        let k = self.consecutive_hist_before_momentum;
        let short = annotate(self.short, history(self.short)?, &self.thresholds, k)?;
        let medium = annotate(self.medium, history(self.medium)?, &self.thresholds, k)?;
        let long = annotate(self.long, history(self.long)?, &self.thresholds, k)?;

        let rows = aggregate(&short, &[medium, long])?;
        Ok(walk(rows, PositionState::Flat, &self.rule, &self.exits))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn timeframes(&self) -> Vec<Timeframe> {
        vec![self.short, self.medium, self.long]
    }
}
