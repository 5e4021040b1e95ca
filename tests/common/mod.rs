#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use ocobot::execution::{Exchange, ExchangeResult, ExecutorSettings, SchedulerSettings};
use ocobot::strategy::{AggregatedRow, BarAction, DecisionRow, ExitThresholds, PositionState, Strategy};
use ocobot::{
    Bar, BracketAck, BracketOrder, ExchangeError, MarketFill, MarketOrder, OpenOrder, OrderAmount,
    OrderKind, OrderStatus, SymbolFilters, Timeframe,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

pub const SYMBOL: &str = "BTCEUR";

pub fn filters() -> SymbolFilters {
    SymbolFilters {
        tick_size: dec!(0.01),
        step_size: dec!(0.00001),
        min_price: dec!(0.01),
        max_price: dec!(1000000),
        min_quantity: dec!(0.00001),
        max_quantity: dec!(9000),
    }
}

pub fn exits() -> ExitThresholds {
    ExitThresholds::from_ratio(dec!(0.007), dec!(1.5)).unwrap()
}

pub fn executor_settings(attempts: u32) -> ExecutorSettings {
    ExecutorSettings {
        investment: dec!(100),
        exits: exits(),
        bracket_retry_attempts: attempts,
        bracket_retry_delay: std::time::Duration::ZERO,
    }
}

pub fn scheduler_settings() -> SchedulerSettings {
    SchedulerSettings {
        wake_offset: Duration::seconds(-30),
        freshness_tolerance: Duration::seconds(30),
        recovery_delay: std::time::Duration::ZERO,
        timezone: chrono_tz::Europe::Paris,
        lookback_days: HashMap::new(),
    }
}

/// Flat 15 minute bars at `close`, the last one closing just before `last_close`
pub fn bars_ending_at(last_close: DateTime<Utc>, n: usize, close: Decimal) -> Vec<Bar> {
    let tf = Timeframe::FIFTEEN_MINUTES;
    let first_open = last_close + Duration::milliseconds(1) - tf.duration() * n as i32;
    (0..n)
        .map(|i| {
            let open_time = first_open + tf.duration() * i as i32;
            Bar {
                symbol: SYMBOL.to_string(),
                timeframe: tf,
                open_time,
                close_time: open_time + tf.duration() - Duration::milliseconds(1),
                open: close,
                high: close,
                low: close,
                close,
                volume: dec!(1),
            }
        })
        .collect()
}

pub fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// Scriptable in-memory exchange that records every order it receives
pub struct MockExchange {
    pub price: Mutex<Decimal>,
    pub filters: Mutex<SymbolFilters>,
    pub fee_rate: Decimal,
    pub bars: Mutex<Vec<Bar>>,
    pub open_orders: Mutex<Vec<OpenOrder>>,
    pub market_orders: Mutex<Vec<MarketOrder>>,
    pub bracket_attempts: Mutex<Vec<BracketOrder>>,
    pub placed_brackets: Mutex<Vec<BracketOrder>>,
    /// Bracket submissions still to be rejected
    pub bracket_failures: AtomicU32,
    /// Open order queries still to fail
    pub open_order_failures: AtomicU32,
    pub open_order_calls: AtomicU32,
}

impl MockExchange {
    pub fn new(price: Decimal) -> Self {
        Self {
            price: Mutex::new(price),
            filters: Mutex::new(filters()),
            fee_rate: dec!(0.001),
            bars: Mutex::new(Vec::new()),
            open_orders: Mutex::new(Vec::new()),
            market_orders: Mutex::new(Vec::new()),
            bracket_attempts: Mutex::new(Vec::new()),
            placed_brackets: Mutex::new(Vec::new()),
            bracket_failures: AtomicU32::new(0),
            open_order_failures: AtomicU32::new(0),
            open_order_calls: AtomicU32::new(0),
        }
    }

    pub fn fail_brackets(&self, n: u32) {
        self.bracket_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_open_orders(&self, n: u32) {
        self.open_order_failures.store(n, Ordering::SeqCst);
    }

    pub fn open_order_call_count(&self) -> u32 {
        self.open_order_calls.load(Ordering::SeqCst)
    }

    pub fn set_bars(&self, bars: Vec<Bar>) {
        *self.bars.lock().unwrap() = bars;
    }

    pub fn add_open_order(&self, client_order_id: &str) {
        self.open_orders.lock().unwrap().push(OpenOrder {
            client_order_id: client_order_id.to_string(),
            status: OrderStatus::New,
            kind: OrderKind::LimitMaker,
            side: ocobot::Side::Sell,
            price: Some(dec!(1)),
            quantity: dec!(1),
        });
    }

    pub fn market_order_count(&self) -> usize {
        self.market_orders.lock().unwrap().len()
    }

    pub fn bracket_attempt_count(&self) -> usize {
        self.bracket_attempts.lock().unwrap().len()
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn get_historical_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> ExchangeResult<Vec<Bar>> {
        if symbol != SYMBOL {
            return Err(ExchangeError::UnknownSymbol(symbol.to_string()));
        }
        Ok(self
            .bars
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.timeframe == timeframe && b.open_time >= start)
            .filter(|b| end.map_or(true, |end| b.open_time < end))
            .cloned()
            .collect())
    }

    async fn get_all_ticker_prices(&self) -> ExchangeResult<HashMap<String, Decimal>> {
        Ok(HashMap::from([(
            SYMBOL.to_string(),
            *self.price.lock().unwrap(),
        )]))
    }

    async fn get_open_orders(&self, _symbol: &str) -> ExchangeResult<Vec<OpenOrder>> {
        self.open_order_calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.open_order_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.open_order_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ExchangeError::Transport("timed out".to_string()));
        }

        Ok(self.open_orders.lock().unwrap().clone())
    }

    async fn get_symbol_filters(&self, _symbol: &str) -> ExchangeResult<SymbolFilters> {
        Ok(self.filters.lock().unwrap().clone())
    }

    async fn place_market_order(&self, order: &MarketOrder) -> ExchangeResult<MarketFill> {
        self.market_orders.lock().unwrap().push(order.clone());
        let quantity = match order.amount {
            OrderAmount::Base(q) => q,
            OrderAmount::Quote(_) => {
                return Err(ExchangeError::Rejected {
                    code: -1,
                    message: "quote orders not scripted".to_string(),
                })
            }
        };
        Ok(MarketFill {
            filled_quantity: quantity * (Decimal::ONE - self.fee_rate),
            average_price: *self.price.lock().unwrap(),
        })
    }

    async fn place_bracket_order(&self, order: &BracketOrder) -> ExchangeResult<BracketAck> {
        self.bracket_attempts.lock().unwrap().push(order.clone());

        let remaining = self.bracket_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.bracket_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ExchangeError::Transport("connection reset".to_string()));
        }

        self.placed_brackets.lock().unwrap().push(order.clone());
        self.add_open_order(&order.client_order_id);
        Ok(BracketAck {
            client_order_id: order.client_order_id.clone(),
            raw: serde_json::json!({ "listClientOrderId": order.client_order_id }),
        })
    }
}

/// Strategy that reads only 15 minute bars and emits `last_action` on the newest one
pub struct ScriptedStrategy {
    pub last_action: BarAction,
}

impl Strategy for ScriptedStrategy {
    fn evaluate(&self, histories: &HashMap<Timeframe, Vec<Bar>>) -> ocobot::Result<Vec<DecisionRow>> {
        let bars = histories
            .get(&Timeframe::FIFTEEN_MINUTES)
            .cloned()
            .unwrap_or_default();
        let n = bars.len();

        Ok(bars
            .into_iter()
            .enumerate()
            .map(|(i, bar)| DecisionRow {
                row: AggregatedRow {
                    open_time: bar.open_time,
                    close_time: bar.close_time,
                    open: bar.open,
                    high: bar.high,
                    low: bar.low,
                    close: bar.close,
                    attached: vec![],
                },
                action: if i + 1 == n {
                    self.last_action
                } else {
                    BarAction::None
                },
                state: PositionState::Flat,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn timeframes(&self) -> Vec<Timeframe> {
        vec![Timeframe::FIFTEEN_MINUTES]
    }
}
