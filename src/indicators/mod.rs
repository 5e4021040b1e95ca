// Technical indicators module
// Implements EMA, RSI, MACD histogram and histogram momentum

pub mod macd;
pub mod moving_average;
pub mod rsi;

pub use macd::{macd_histogram_series, momentum_flags};
pub use moving_average::{calculate_ema, calculate_sma, ema_series};
pub use rsi::{calculate_rsi, rsi_series};

use crate::models::Bar;
use crate::{Error, Result};

pub const SHORT_EMA_PERIOD: usize = 12;
pub const LONG_EMA_PERIOD: usize = 26;
pub const RSI_PERIOD: usize = 14;

/// Indicator values for one bar. `None` means not yet defined.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IndicatorSet {
    pub short_ema: Option<f64>,
    pub long_ema: Option<f64>,
    pub rsi: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub momentum_up: bool,
    pub momentum_down: bool,
}

/// Compute every indicator over a bar series, one set per bar
///
/// # Arguments
/// * `bars` - Bars in chronological order
/// * `consecutive_hist_before_momentum` - Histogram moves needed before a momentum flag is set
pub fn compute_indicators(
    bars: &[Bar],
    consecutive_hist_before_momentum: usize,
) -> Result<Vec<IndicatorSet>> {
    if consecutive_hist_before_momentum == 0 {
        return Err(Error::Config(
            "consecutive_hist_before_momentum must be at least 1".to_string(),
        ));
    }

    let closes: Vec<f64> = bars.iter().map(Bar::close_f64).collect();

    let short_ema = ema_series(&closes, SHORT_EMA_PERIOD);
    let long_ema = ema_series(&closes, LONG_EMA_PERIOD);
    let rsi = rsi_series(&closes, RSI_PERIOD);
    let histogram = macd_histogram_series(&closes);
    let (momentum_up, momentum_down) =
        momentum_flags(&histogram, consecutive_hist_before_momentum);

    let sets = (0..closes.len())
        .map(|i| IndicatorSet {
            short_ema: short_ema[i],
            long_ema: long_ema[i],
            rsi: rsi[i],
            macd_histogram: histogram[i],
            momentum_up: momentum_up[i],
            momentum_down: momentum_down[i],
        })
        .collect();

    Ok(sets)
}
