use super::moving_average::ema_series;

pub const MACD_FAST_PERIOD: usize = 12;
pub const MACD_SLOW_PERIOD: usize = 26;
pub const MACD_SIGNAL_PERIOD: usize = 9;

/// MACD histogram (line minus signal) at every position
///
/// line = EMA12 - EMA26, signal = EMA9 of the defined part of the line.
/// With the default periods the first defined value is at index 33.
pub fn macd_histogram_series(prices: &[f64]) -> Vec<Option<f64>> {
    let fast = ema_series(prices, MACD_FAST_PERIOD);
    let slow = ema_series(prices, MACD_SLOW_PERIOD);

    let line: Vec<Option<f64>> = fast
        .iter()
        .zip(slow.iter())
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) => Some(f - s),
            _ => None,
        })
        .collect();

    let mut histogram = vec![None; prices.len()];
    let Some(first_defined) = line.iter().position(|v| v.is_some()) else {
        return histogram;
    };

    let defined: Vec<f64> = line[first_defined..].iter().flatten().copied().collect();
    let signal = ema_series(&defined, MACD_SIGNAL_PERIOD);

    for (offset, (value, sig)) in defined.iter().zip(signal.iter()).enumerate() {
        if let Some(sig) = sig {
            histogram[first_defined + offset] = Some(value - sig);
        }
    }

    histogram
}

/// Up/down momentum flags from consecutive histogram moves
///
/// A strict rise extends the up streak and resets the down streak, a strict fall
/// does the reverse, and a tie or unknown value on either side resets both.
/// A flag is set once its streak reaches `consecutive`.
pub fn momentum_flags(histogram: &[Option<f64>], consecutive: usize) -> (Vec<bool>, Vec<bool>) {
    let mut up = vec![false; histogram.len()];
    let mut down = vec![false; histogram.len()];
    let mut up_streak = 0usize;
    let mut down_streak = 0usize;

    for i in 1..histogram.len() {
        match (histogram[i], histogram[i - 1]) {
            (Some(current), Some(previous)) if current > previous => {
                up_streak += 1;
                down_streak = 0;
            }
            (Some(current), Some(previous)) if current < previous => {
                down_streak += 1;
                up_streak = 0;
            }
            _ => {
                up_streak = 0;
                down_streak = 0;
            }
        }

        up[i] = up_streak >= consecutive;
        down[i] = down_streak >= consecutive;
    }

    (up, down)
}
