use crate::models::{Bar, Timeframe};
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Market scenario types for synthetic data generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketScenario {
    /// Steady uptrend with noise (+2% daily average)
    Uptrend,
    /// Steady downtrend with noise (-2% daily average)
    Downtrend,
    /// Mean-reverting chop around the starting price
    Ranging,
    /// Large random swings
    Volatile,
    /// Slow climb, then a 25% slide over the second half
    Crash,
}

impl MarketScenario {
    pub const ALL: [MarketScenario; 5] = [
        MarketScenario::Uptrend,
        MarketScenario::Downtrend,
        MarketScenario::Ranging,
        MarketScenario::Volatile,
        MarketScenario::Crash,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MarketScenario::Uptrend => "uptrend",
            MarketScenario::Downtrend => "downtrend",
            MarketScenario::Ranging => "ranging",
            MarketScenario::Volatile => "volatile",
            MarketScenario::Crash => "crash",
        }
    }
}

impl std::str::FromStr for MarketScenario {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        MarketScenario::ALL
            .iter()
            .find(|scenario| scenario.name() == s)
            .copied()
            .ok_or_else(|| Error::Config(format!("unknown market scenario '{}'", s)))
    }
}

/// Generates synthetic price data for backtesting and paper trading
pub struct SyntheticDataGenerator {
    rng: StdRng,
    base_volume: f64,
}

impl SyntheticDataGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_volume: 10.0,
        }
    }

    /// Generate consecutive bars for a specific market scenario
    ///
    /// # Arguments
    /// * `symbol` - Symbol stamped on every bar
    /// * `scenario` - The market scenario to simulate
    /// * `timeframe` - Bar duration
    /// * `start` - Open time of the first bar
    /// * `num_bars` - Number of bars to generate
    /// * `start_price` - Price the walk starts from
    pub fn generate(
        &mut self,
        symbol: &str,
        scenario: MarketScenario,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        num_bars: usize,
        start_price: Decimal,
    ) -> Vec<Bar> {
        let base_price = start_price.to_f64().unwrap_or(100.0);
        let mut price = base_price;
        let mut bars = Vec::with_capacity(num_bars);

        let mut open_time = start;
        for i in 0..num_bars {
            // every bar must close inside the representable range
            let Some(next_open) = open_time.checked_add_signed(timeframe.duration()) else {
                break;
            };
            let previous = price;
            price = self.next_price(scenario, price, base_price, i, num_bars, timeframe);
            bars.push(self.create_bar(symbol, timeframe, open_time, previous, price));
            open_time = next_open;
        }

        bars
    }

    /// Continue a series with `num_bars` more bars in the same scenario
    pub fn extend(
        &mut self,
        bars: &mut Vec<Bar>,
        scenario: MarketScenario,
        num_bars: usize,
        base_price: Decimal,
    ) {
        let Some(last) = bars.last().cloned() else {
            return;
        };
        let base = base_price.to_f64().unwrap_or(100.0);
        let mut price = last.close.to_f64().unwrap_or(base);

        let step = last.timeframe.duration();
        let mut open_time = last.open_time;
        for i in 0..num_bars {
            let Some(next) = open_time
                .checked_add_signed(step)
                .filter(|next| next.checked_add_signed(step).is_some())
            else {
                break;
            };
            open_time = next;
            let previous = price;
            price = self.next_price(scenario, price, base, i, num_bars, last.timeframe);
            bars.push(self.create_bar(&last.symbol, last.timeframe, open_time, previous, price));
        }
    }

    /// Per-timeframe history for a strategy: the shortest timeframe is generated,
    /// the others are resampled from it
    pub fn histories(
        &mut self,
        symbol: &str,
        scenario: MarketScenario,
        timeframes: &[Timeframe],
        start: DateTime<Utc>,
        num_bars: usize,
        start_price: Decimal,
    ) -> Result<HashMap<Timeframe, Vec<Bar>>> {
        let short = timeframes
            .iter()
            .min()
            .copied()
            .ok_or_else(|| Error::Config("no timeframe to generate".to_string()))?;
        let bars = self.generate(symbol, scenario, short, start, num_bars, start_price);

        let mut histories = HashMap::new();
        for &timeframe in timeframes {
            if timeframe != short {
                histories.insert(timeframe, resample(&bars, timeframe)?);
            }
        }
        histories.insert(short, bars);
        Ok(histories)
    }

    fn next_price(
        &mut self,
        scenario: MarketScenario,
        price: f64,
        base_price: f64,
        i: usize,
        num_bars: usize,
        timeframe: Timeframe,
    ) -> f64 {
        let bars_per_day = (24.0 * 60.0 / timeframe.minutes() as f64).max(1.0);

        let next = match scenario {
            MarketScenario::Uptrend | MarketScenario::Downtrend => {
                let daily = if scenario == MarketScenario::Uptrend {
                    0.02
                } else {
                    -0.02
                };
                let drift = price * daily / bars_per_day;
                let noise = price * self.rng.gen_range(-0.002..0.002);
                price + drift + noise
            }
            MarketScenario::Ranging => {
                // pull back towards the starting price
                let reversion = (base_price - price) * 0.05;
                let noise = price * self.rng.gen_range(-0.004..0.004);
                price + reversion + noise
            }
            MarketScenario::Volatile => {
                let change = price * self.rng.gen_range(-0.02..0.02);
                (price + change).max(base_price * 0.5)
            }
            MarketScenario::Crash => {
                if i < num_bars / 2 {
                    price + price * self.rng.gen_range(-0.002..0.003)
                } else {
                    let drop_rate = -0.25 / (num_bars as f64 / 2.0);
                    let noise = price * self.rng.gen_range(-0.002..0.002);
                    price + price * drop_rate + noise
                }
            }
        };

        next.max(f64::EPSILON)
    }

    /// Bar opening at the previous close and closing at `close`
    fn create_bar(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        open_time: DateTime<Utc>,
        open: f64,
        close: f64,
    ) -> Bar {
        // ±0.2% intrabar movement beyond the body
        let noise_pct = 0.002;
        let high = open.max(close) * (1.0 + self.rng.gen_range(0.0..noise_pct));
        let low = open.min(close) * (1.0 - self.rng.gen_range(0.0..noise_pct));
        let volume = self.base_volume * self.rng.gen_range(0.7..1.3);

        let open = to_price(open);
        let close = to_price(close);

        Bar {
            symbol: symbol.to_string(),
            timeframe,
            open_time,
            close_time: close_time_for(open_time, timeframe),
            open,
            high: to_price(high).max(open).max(close),
            low: to_price(low).min(open).min(close),
            close,
            volume: to_price(volume),
        }
    }
}

fn to_price(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default().round_dp(4)
}

/// Close time of a bar: one millisecond before the next bar opens
pub fn close_time_for(open_time: DateTime<Utc>, timeframe: Timeframe) -> DateTime<Utc> {
    open_time + timeframe.duration() - Duration::milliseconds(1)
}

/// Open time of the first of `num_bars` consecutive bars, the last one opening before `end`
pub fn window_start(end: DateTime<Utc>, timeframe: Timeframe, num_bars: usize) -> Result<DateTime<Utc>> {
    i32::try_from(num_bars)
        .ok()
        .and_then(|n| timeframe.duration().checked_mul(n))
        .and_then(|span| end.checked_sub_signed(span))
        .ok_or_else(|| {
            Error::Config(format!(
                "{} bars of {} reach out of the representable time range",
                num_bars, timeframe
            ))
        })
}

/// Start of the epoch-aligned bucket containing `time`
pub fn bucket_start(time: DateTime<Utc>, timeframe: Timeframe) -> Result<DateTime<Utc>> {
    if !timeframe.is_epoch_aligned() {
        return Err(Error::Config(format!(
            "{} bars are not aligned on the epoch",
            timeframe
        )));
    }
    let width = timeframe.minutes() * 60;
    let secs = time.timestamp();
    let start = secs - secs.rem_euclid(width);
    DateTime::from_timestamp(start, 0)
        .ok_or_else(|| Error::Invariant(format!("timestamp {} out of range", start)))
}

/// Aggregate bars into a longer epoch-aligned timeframe
///
/// Each output bar takes the first open, last close, extreme high/low and summed
/// volume of the input bars opening in its bucket. The last bucket may be partial.
pub fn resample(bars: &[Bar], timeframe: Timeframe) -> Result<Vec<Bar>> {
    let Some(first) = bars.first() else {
        return Ok(Vec::new());
    };
    let source = first.timeframe;
    if timeframe.minutes() < source.minutes() || timeframe.minutes() % source.minutes() != 0 {
        return Err(Error::Config(format!(
            "cannot resample {} bars into {}",
            source, timeframe
        )));
    }

    let mut resampled: Vec<Bar> = Vec::new();
    for bar in bars {
        let start = bucket_start(bar.open_time, timeframe)?;
        match resampled.last_mut() {
            Some(current) if current.open_time == start => {
                current.high = current.high.max(bar.high);
                current.low = current.low.min(bar.low);
                current.close = bar.close;
                current.volume += bar.volume;
            }
            _ => resampled.push(Bar {
                symbol: bar.symbol.clone(),
                timeframe,
                open_time: start,
                close_time: close_time_for(start, timeframe),
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
            }),
        }
    }

    Ok(resampled)
}
