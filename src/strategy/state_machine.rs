use super::aggregation::AggregatedRow;
use super::signals::SignalName;
use crate::models::Timeframe;
use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    Flat,
    InPosition { entry_price: Decimal },
}

impl PositionState {
    pub fn is_flat(&self) -> bool {
        matches!(self, PositionState::Flat)
    }
}

/// What the walk did on a bar. At most one per bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarAction {
    None,
    Buy,
    StopLoss,
    TakeProfit,
}

/// Conjunction of per-timeframe signal requirements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRule {
    pub requirements: Vec<(Timeframe, SignalName)>,
}

impl EntryRule {
    /// long trend up, medium momentum up, short oversold
    pub fn trend_momentum_dip(long: Timeframe, medium: Timeframe, short: Timeframe) -> Self {
        Self {
            requirements: vec![
                (long, SignalName::EmaShortAboveLong),
                (medium, SignalName::MomentumUp),
                (short, SignalName::Oversold),
            ],
        }
    }

    pub fn is_satisfied(&self, row: &AggregatedRow) -> bool {
        self.requirements
            .iter()
            .all(|(timeframe, signal)| row.signal(*timeframe, *signal))
    }
}

/// Exit levels as fractions of the entry price
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitThresholds {
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
}

impl ExitThresholds {
    /// Build thresholds with `stop_loss = stop_loss_ratio * take_profit`
    pub fn from_ratio(take_profit: Decimal, stop_loss_ratio: Decimal) -> Result<Self> {
        Self::new(take_profit * stop_loss_ratio, take_profit)
    }

    pub fn new(stop_loss: Decimal, take_profit: Decimal) -> Result<Self> {
        let in_unit = |v: Decimal| v > Decimal::ZERO && v < Decimal::ONE;
        if !in_unit(stop_loss) || !in_unit(take_profit) {
            return Err(Error::Config(format!(
                "stop loss ({}) and take profit ({}) must be within (0, 1)",
                stop_loss, take_profit
            )));
        }
        Ok(Self {
            stop_loss,
            take_profit,
        })
    }

    pub fn stop_level(&self, entry_price: Decimal) -> Decimal {
        entry_price * (Decimal::ONE - self.stop_loss)
    }

    pub fn take_profit_level(&self, entry_price: Decimal) -> Decimal {
        entry_price * (Decimal::ONE + self.take_profit)
    }
}

/// Aggregated row annotated with the walk's decision
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionRow {
    pub row: AggregatedRow,
    pub action: BarAction,
    /// State after this bar
    pub state: PositionState,
}

/// Advance the state machine by one bar
///
/// Stop loss is checked before take profit, so a bar that breaches both exits at the stop.
pub fn step(
    state: PositionState,
    row: &AggregatedRow,
    rule: &EntryRule,
    thresholds: &ExitThresholds,
) -> (PositionState, BarAction) {
    match state {
        PositionState::Flat if rule.is_satisfied(row) => (
            PositionState::InPosition {
                entry_price: row.close,
            },
            BarAction::Buy,
        ),
        PositionState::Flat => (state, BarAction::None),
        PositionState::InPosition { entry_price } => {
            if row.low <= thresholds.stop_level(entry_price) {
                (PositionState::Flat, BarAction::StopLoss)
            } else if row.high >= thresholds.take_profit_level(entry_price) {
                (PositionState::Flat, BarAction::TakeProfit)
            } else {
                (state, BarAction::None)
            }
        }
    }
}

/// Fold the state machine over rows in close-time order
pub fn walk(
    rows: Vec<AggregatedRow>,
    initial: PositionState,
    rule: &EntryRule,
    thresholds: &ExitThresholds,
) -> Vec<DecisionRow> {
    rows.into_iter()
        .scan(initial, |state, row| {
            let (next, action) = step(*state, &row, rule, thresholds);
            *state = next;

            if action != BarAction::None {
                tracing::debug!(
                    close_time = %row.close_time,
                    close = %row.close,
                    action = ?action,
                    "state machine transition"
                );
            }

            Some(DecisionRow {
                row,
                action,
                state: next,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::aggregation::AttachedSignals;
    use crate::strategy::signals::SignalSet;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn short_tf() -> Timeframe {
        "15m".parse().unwrap()
    }

    fn oversold_rule() -> EntryRule {
        EntryRule {
            requirements: vec![(short_tf(), SignalName::Oversold)],
        }
    }

    fn row(i: i64, close: Decimal, high: Decimal, low: Decimal, oversold: bool) -> AggregatedRow {
        let open_time = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(15 * i);
        AggregatedRow {
            open_time,
            close_time: open_time + Duration::minutes(15),
            open: close,
            high,
            low,
            close,
            attached: vec![AttachedSignals {
                timeframe: short_tf(),
                source_close_time: Some(open_time + Duration::minutes(15)),
                signals: Some(SignalSet {
                    oversold,
                    ..Default::default()
                }),
            }],
        }
    }

    fn actions(decisions: &[DecisionRow]) -> Vec<BarAction> {
        decisions.iter().map(|d| d.action).collect()
    }

    #[test]
    fn test_stop_loss_scenario() {
        let rows = vec![
            row(0, dec!(100), dec!(100), dec!(100), false),
            row(1, dec!(105), dec!(105), dec!(105), true),
            row(2, dec!(95), dec!(95), dec!(95), false),
            row(3, dec!(110), dec!(110), dec!(110), false),
        ];
        let thresholds = ExitThresholds::new(dec!(0.03), dec!(0.02)).unwrap();

        let decisions = walk(rows, PositionState::Flat, &oversold_rule(), &thresholds);
        assert_eq!(
            actions(&decisions),
            vec![BarAction::None, BarAction::Buy, BarAction::StopLoss, BarAction::None]
        );
        assert_eq!(
            decisions[1].state,
            PositionState::InPosition {
                entry_price: dec!(105)
            }
        );
        assert_eq!(thresholds.stop_level(dec!(105)), dec!(101.85));
        assert_eq!(thresholds.take_profit_level(dec!(105)), dec!(107.10));
    }

    #[test]
    fn test_take_profit() {
        let rows = vec![
            row(0, dec!(100), dec!(100), dec!(100), true),
            row(1, dec!(101), dec!(102.5), dec!(99), false),
        ];
        let thresholds = ExitThresholds::new(dec!(0.03), dec!(0.02)).unwrap();

        let decisions = walk(rows, PositionState::Flat, &oversold_rule(), &thresholds);
        assert_eq!(actions(&decisions), vec![BarAction::Buy, BarAction::TakeProfit]);
        assert!(decisions[1].state.is_flat());
    }

    #[test]
    fn test_stop_loss_wins_on_wide_bar() {
        let rows = vec![
            row(0, dec!(100), dec!(100), dec!(100), true),
            row(1, dec!(100), dec!(110), dec!(90), false),
        ];
        let thresholds = ExitThresholds::new(dec!(0.03), dec!(0.02)).unwrap();

        let decisions = walk(rows, PositionState::Flat, &oversold_rule(), &thresholds);
        assert_eq!(decisions[1].action, BarAction::StopLoss);
    }

    #[test]
    fn test_no_pyramiding() {
        let rows: Vec<AggregatedRow> = (0..5)
            .map(|i| row(i, dec!(100), dec!(100.5), dec!(99.5), true))
            .collect();
        let thresholds = ExitThresholds::new(dec!(0.03), dec!(0.02)).unwrap();

        let decisions = walk(rows, PositionState::Flat, &oversold_rule(), &thresholds);
        let buys = decisions.iter().filter(|d| d.action == BarAction::Buy).count();
        assert_eq!(buys, 1);
        assert!(decisions.iter().skip(1).all(|d| !d.state.is_flat()));
    }

    #[test]
    fn test_exit_bar_does_not_reenter() {
        let rows = vec![
            row(0, dec!(100), dec!(100), dec!(100), true),
            row(1, dec!(96), dec!(96), dec!(96), true),
            row(2, dec!(96), dec!(96), dec!(96), true),
        ];
        let thresholds = ExitThresholds::new(dec!(0.03), dec!(0.02)).unwrap();

        let decisions = walk(rows, PositionState::Flat, &oversold_rule(), &thresholds);
        assert_eq!(
            actions(&decisions),
            vec![BarAction::Buy, BarAction::StopLoss, BarAction::Buy]
        );
    }

    #[test]
    fn test_entry_rule_requires_all() {
        let long: Timeframe = "1d".parse().unwrap();
        let medium: Timeframe = "1h".parse().unwrap();
        let rule = EntryRule::trend_momentum_dip(long, medium, short_tf());

        // only the short timeframe is attached, longer signals read as false
        let r = row(0, dec!(100), dec!(100), dec!(100), true);
        assert!(!rule.is_satisfied(&r));
        assert!(oversold_rule().is_satisfied(&r));
    }

    #[test]
    fn test_thresholds_from_ratio() {
        let t = ExitThresholds::from_ratio(dec!(0.007), dec!(1.5)).unwrap();
        assert_eq!(t.stop_loss, dec!(0.0105));
        assert_eq!(t.take_profit, dec!(0.007));

        assert!(ExitThresholds::from_ratio(dec!(0.5), dec!(2)).is_err());
        assert!(ExitThresholds::new(dec!(0), dec!(0.1)).is_err());
        assert!(ExitThresholds::new(dec!(0.1), dec!(1)).is_err());
    }

    #[test]
    fn test_step_is_pure() {
        let r = row(0, dec!(100), dec!(100), dec!(100), true);
        let thresholds = ExitThresholds::new(dec!(0.03), dec!(0.02)).unwrap();
        let a = step(PositionState::Flat, &r, &oversold_rule(), &thresholds);
        let b = step(PositionState::Flat, &r, &oversold_rule(), &thresholds);
        assert_eq!(a, b);
    }
}
