// Trading strategy module
pub mod aggregation;
pub mod multi_timeframe;
pub mod signals;
pub mod state_machine;

pub use aggregation::{aggregate, join_backward_asof, AggregatedRow, AttachedSignals};
pub use multi_timeframe::MultiTimeframeStrategy;
pub use signals::{annotate, derive_signals, SignalName, SignalSet, SignalThresholds, TimeframeSeries};
pub use state_machine::{
    step, walk, BarAction, DecisionRow, EntryRule, ExitThresholds, PositionState,
};

use crate::models::{Bar, Timeframe};
use crate::Result;
use std::collections::HashMap;

/// Base trait for multi-timeframe strategies
pub trait Strategy: Send + Sync {
    /// Run the full pipeline over per-timeframe histories, one decision per short bar
    fn evaluate(&self, histories: &HashMap<Timeframe, Vec<Bar>>) -> Result<Vec<DecisionRow>>;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Timeframes the strategy reads, shortest first
    fn timeframes(&self) -> Vec<Timeframe>;
}
