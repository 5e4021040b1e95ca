/// Calculate the latest Relative Strength Index (RSI)
///
/// RSI measures the magnitude of recent price changes to evaluate
/// overbought or oversold conditions.
///
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
///
pub fn calculate_rsi(prices: &[f64], period: usize) -> Option<f64> {
    rsi_series(prices, period).last().copied().flatten()
}

/// RSI at every position, Wilder smoothed
///
/// The first average gain/loss is the plain mean of the first `period` changes,
/// then `avg = (prev * (period - 1) + current) / period`. Positions before
/// `period` are `None`.
pub fn rsi_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut series = vec![None; prices.len()];
    if period == 0 || prices.len() < period + 1 {
        return series;
    }

    let (gains, losses): (Vec<f64>, Vec<f64>) = prices
        .windows(2)
        .map(|w| {
            let change = w[1] - w[0];
            if change > 0.0 {
                (change, 0.0)
            } else {
                (0.0, change.abs())
            }
        })
        .unzip();

    let p = period as f64;
    let mut avg_gain = gains[..period].iter().sum::<f64>() / p;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / p;
    series[period] = Some(rsi_value(avg_gain, avg_loss));

    // change j sits between prices j and j + 1
    for j in period..gains.len() {
        avg_gain = (avg_gain * (p - 1.0) + gains[j]) / p;
        avg_loss = (avg_loss * (p - 1.0) + losses[j]) / p;
        series[j + 1] = Some(rsi_value(avg_gain, avg_loss));
    }

    series
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }

    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}
