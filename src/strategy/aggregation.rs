use super::signals::{SignalName, SignalSet, TimeframeSeries};
use crate::models::Timeframe;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Backward as-of join
///
/// For each left key, the index of the last right key that is `<=` it, or `None`
/// if every right key is later. Both slices must be sorted ascending. With equal
/// right keys the later one wins.
pub fn join_backward_asof<K: Ord + Copy>(left: &[K], right: &[K]) -> Vec<Option<usize>> {
    let mut matches = Vec::with_capacity(left.len());
    let mut cursor = 0usize;

    for key in left {
        while cursor < right.len() && right[cursor] <= *key {
            cursor += 1;
        }
        matches.push(cursor.checked_sub(1));
    }

    matches
}

/// Signals attached to an aggregated row for one timeframe
#[derive(Debug, Clone, PartialEq)]
pub struct AttachedSignals {
    pub timeframe: Timeframe,
    /// Close time of the source bar, `None` when no bar had closed yet
    pub source_close_time: Option<DateTime<Utc>>,
    pub signals: Option<SignalSet>,
}

/// One short-timeframe bar with the latest known signals of every timeframe
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedRow {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Short timeframe first, then the longer ones in input order
    pub attached: Vec<AttachedSignals>,
}

impl AggregatedRow {
    /// Value of one signal on one timeframe; unknown reads as false
    pub fn signal(&self, timeframe: Timeframe, name: SignalName) -> bool {
        self.attached
            .iter()
            .find(|a| a.timeframe == timeframe)
            .and_then(|a| a.signals)
            .is_some_and(|s| s.get(name))
    }

    /// Flattened `{timeframe}_{signal}_SIGNAL` columns for logging and reports
    pub fn signal_columns(&self) -> Vec<(String, bool)> {
        self.attached
            .iter()
            .flat_map(|a| a.signals.unwrap_or_default().columns(&a.timeframe))
            .collect()
    }
}

fn sorted_order(series: &TimeframeSeries) -> Vec<usize> {
    let mut order: Vec<usize> = (0..series.len()).collect();
    // stable: equal close times keep input order
    order.sort_by_key(|&i| series.bars[i].close_time);
    order
}

/// Merge longer-timeframe signals into the short timeframe
///
/// Every short bar gets, for each longer series, the signals of the last bar whose
/// close time is at or before its own close time. Inputs are left untouched.
pub fn aggregate(short: &TimeframeSeries, longer: &[TimeframeSeries]) -> Result<Vec<AggregatedRow>> {
    short.check_aligned()?;
    for series in longer {
        series.check_aligned()?;
        if series.timeframe == short.timeframe {
            return Err(Error::Invariant(format!(
                "longer timeframe {} duplicates the short timeframe",
                series.timeframe
            )));
        }
    }

    let short_order = sorted_order(short);
    let short_keys: Vec<DateTime<Utc>> = short_order
        .iter()
        .map(|&i| short.bars[i].close_time)
        .collect();

    let joins: Vec<(Vec<usize>, Vec<Option<usize>>)> = longer
        .iter()
        .map(|series| {
            let order = sorted_order(series);
            let keys: Vec<DateTime<Utc>> =
                order.iter().map(|&i| series.bars[i].close_time).collect();
            let matched = join_backward_asof(&short_keys, &keys);
            (order, matched)
        })
        .collect();

    let rows = short_order
        .iter()
        .enumerate()
        .map(|(pos, &i)| {
            let bar = &short.bars[i];
            let mut attached = Vec::with_capacity(longer.len() + 1);
            attached.push(AttachedSignals {
                timeframe: short.timeframe,
                source_close_time: Some(bar.close_time),
                signals: Some(short.signals[i]),
            });

            for (series, (order, matched)) in longer.iter().zip(joins.iter()) {
                let source = matched[pos].map(|m| order[m]);
                attached.push(AttachedSignals {
                    timeframe: series.timeframe,
                    source_close_time: source.map(|s| series.bars[s].close_time),
                    signals: source.map(|s| series.signals[s]),
                });
            }

            AggregatedRow {
                open_time: bar.open_time,
                close_time: bar.close_time,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                attached,
            }
        })
        .collect();

    Ok(rows)
}
