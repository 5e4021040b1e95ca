use super::exchange::{Exchange, ExchangeResult};
use super::Clock;
use crate::backtest::synthetic::{bucket_start, resample, MarketScenario, SyntheticDataGenerator};
use crate::config::PaperConfig;
use crate::error::ExchangeError;
use crate::models::{
    Bar, BracketAck, BracketOrder, MarketFill, MarketOrder, OpenOrder, OrderAmount, OrderKind,
    OrderStatus, Side, SymbolFilters, Timeframe,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct RestingBracket {
    order: BracketOrder,
    /// Bars at or after this index can trigger it
    active_from: usize,
}

struct Market {
    base_timeframe: Timeframe,
    bars: Vec<Bar>,
    brackets: Vec<RestingBracket>,
}

struct PaperState {
    generator: SyntheticDataGenerator,
    markets: HashMap<String, Market>,
}

/// In-memory exchange over synthetic prices
///
/// Each market is a seeded random walk on its base timeframe, generated lazily up
/// to the current clock. Longer timeframes are resampled from it. Market orders
/// fill at the latest close minus the fee; brackets rest until a later bar
/// crosses the stop or the take profit.
pub struct PaperExchange {
    config: PaperConfig,
    clock: Clock,
    state: Mutex<PaperState>,
}

impl PaperExchange {
    pub fn new(config: PaperConfig) -> Self {
        Self::with_clock(config, Arc::new(Utc::now))
    }

    pub fn with_clock(config: PaperConfig, clock: Clock) -> Self {
        let generator = SyntheticDataGenerator::new(config.seed);
        Self {
            config,
            clock,
            state: Mutex::new(PaperState {
                generator,
                markets: HashMap::new(),
            }),
        }
    }

    /// List a symbol whose native bars are `base_timeframe`
    pub async fn add_market(&self, symbol: &str, base_timeframe: Timeframe) {
        let mut state = self.state.lock().await;
        state.markets.entry(symbol.to_string()).or_insert(Market {
            base_timeframe,
            bars: Vec::new(),
            brackets: Vec::new(),
        });
    }

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

    /// Generate bars up to the one containing now, then settle resting brackets
    fn advance(&self, state: &mut PaperState, symbol: &str) -> ExchangeResult<()> {
        let now = (self.clock)();
        let PaperState { generator, markets } = state;
        let market = markets
            .get_mut(symbol)
            .ok_or_else(|| ExchangeError::UnknownSymbol(symbol.to_string()))?;

        let current = bucket_start(now, market.base_timeframe)
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;

        if market.bars.is_empty() {
            let first = chrono::Duration::try_days(self.config.history_days as i64)
                .and_then(|history| now.checked_sub_signed(history))
                .ok_or_else(|| {
                    ExchangeError::NotSubmitted(format!(
                        "{} days of history reach before the earliest date",
                        self.config.history_days
                    ))
                })?;
            let start = bucket_start(first, market.base_timeframe)
                .map_err(|e| ExchangeError::Transport(e.to_string()))?;
            let count = ((current - start).num_minutes() / market.base_timeframe.minutes()) as usize + 1;
            market.bars = generator.generate(
                symbol,
                MarketScenario::Ranging,
                market.base_timeframe,
                start,
                count,
                self.config.start_price,
            );
        } else if let Some(last_open) = market.bars.last().map(|b| b.open_time) {
            let missing = (current - last_open).num_minutes() / market.base_timeframe.minutes();
            if missing > 0 {
                generator.extend(
                    &mut market.bars,
                    MarketScenario::Ranging,
                    missing as usize,
                    self.config.start_price,
                );
            }
        }

        let bars = &market.bars;
        market.brackets.retain(|resting| {
            let hit = bars.iter().skip(resting.active_from).find_map(|bar| {
                if bar.low <= resting.order.stop_price {
                    Some("stop loss")
                } else if bar.high >= resting.order.take_profit_price {
                    Some("take profit")
                } else {
                    None
                }
            });
            match hit {
                Some(leg) => {
                    tracing::info!(
                        client_order_id = %resting.order.client_order_id,
                        leg,
                        "paper bracket filled"
                    );
                    false
                }
                None => true,
            }
        });

        Ok(())
    }
}

#[async_trait]
impl Exchange for PaperExchange {
    async fn get_historical_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> ExchangeResult<Vec<Bar>> {
        let mut state = self.state.lock().await;
        self.advance(&mut state, symbol)?;

        let market = state
            .markets
            .get(symbol)
            .ok_or_else(|| ExchangeError::UnknownSymbol(symbol.to_string()))?;

        let bars = if timeframe == market.base_timeframe {
            market.bars.clone()
        } else {
            resample(&market.bars, timeframe).map_err(|e| ExchangeError::Rejected {
                code: -1120,
                message: e.to_string(),
            })?
        };

        Ok(bars
            .into_iter()
            .filter(|b| b.open_time >= start && end.map_or(true, |end| b.open_time < end))
            .collect())
    }

    async fn get_all_ticker_prices(&self) -> ExchangeResult<HashMap<String, Decimal>> {
        let mut state = self.state.lock().await;
        let symbols: Vec<String> = state.markets.keys().cloned().collect();
        for symbol in &symbols {
            self.advance(&mut state, symbol)?;
        }

        Ok(state
            .markets
            .iter()
            .filter_map(|(symbol, m)| m.bars.last().map(|b| (symbol.clone(), b.close)))
            .collect())
    }

    async fn get_open_orders(&self, symbol: &str) -> ExchangeResult<Vec<OpenOrder>> {
        let mut state = self.state.lock().await;
        self.advance(&mut state, symbol)?;

        let market = state
            .markets
            .get(symbol)
            .ok_or_else(|| ExchangeError::UnknownSymbol(symbol.to_string()))?;

        Ok(market
            .brackets
            .iter()
            .flat_map(|resting| {
                let order = &resting.order;
                [
                    OpenOrder {
                        client_order_id: order.client_order_id.clone(),
                        status: OrderStatus::New,
                        kind: OrderKind::LimitMaker,
                        side: order.side,
                        price: Some(order.take_profit_price),
                        quantity: order.quantity,
                    },
                    OpenOrder {
                        client_order_id: order.client_order_id.clone(),
                        status: OrderStatus::New,
                        kind: OrderKind::StopLossLimit,
                        side: order.side,
                        price: Some(order.stop_limit_price),
                        quantity: order.quantity,
                    },
                ]
            })
            .collect())
    }

    async fn get_symbol_filters(&self, symbol: &str) -> ExchangeResult<SymbolFilters> {
        let state = self.state.lock().await;
        if !state.markets.contains_key(symbol) {
            return Err(ExchangeError::UnknownSymbol(symbol.to_string()));
        }
        Ok(Self::filters())
    }

    async fn place_market_order(&self, order: &MarketOrder) -> ExchangeResult<MarketFill> {
        order.validate().map_err(|e| ExchangeError::Rejected {
            code: -1013,
            message: e.to_string(),
        })?;

        let mut state = self.state.lock().await;
        self.advance(&mut state, &order.symbol)?;

        let price = state
            .markets
            .get(&order.symbol)
            .and_then(|m| m.bars.last())
            .map(|b| b.close)
            .ok_or_else(|| ExchangeError::UnknownSymbol(order.symbol.clone()))?;

        let quantity = match order.amount {
            OrderAmount::Base(q) => q,
            OrderAmount::Quote(amount) => amount / price,
        };
        let filled_quantity = match order.side {
            // fees are taken from what we receive
            Side::Buy => quantity * (Decimal::ONE - self.config.fee_rate),
            Side::Sell => quantity,
        };

        tracing::info!(
            client_order_id = %order.client_order_id,
            side = %order.side,
            quantity = %quantity,
            price = %price,
            "paper market order filled"
        );

        Ok(MarketFill {
            filled_quantity,
            average_price: price,
        })
    }

    async fn place_bracket_order(&self, order: &BracketOrder) -> ExchangeResult<BracketAck> {
        order.legs().map_err(|e| ExchangeError::Rejected {
            code: -1106,
            message: e.to_string(),
        })?;

        let mut state = self.state.lock().await;
        self.advance(&mut state, &order.symbol)?;

        let market = state
            .markets
            .get_mut(&order.symbol)
            .ok_or_else(|| ExchangeError::UnknownSymbol(order.symbol.clone()))?;

        if market
            .brackets
            .iter()
            .any(|r| r.order.client_order_id == order.client_order_id)
        {
            return Err(ExchangeError::Rejected {
                code: -2010,
                message: format!("duplicate client order id {}", order.client_order_id),
            });
        }

        market.brackets.push(RestingBracket {
            order: order.clone(),
            active_from: market.bars.len(),
        });

        Ok(BracketAck {
            client_order_id: order.client_order_id.clone(),
            raw: serde_json::json!({
                "listClientOrderId": order.client_order_id,
                "symbol": order.symbol,
                "listStatusType": "EXEC_STARTED",
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicI64, Ordering};

    struct TestClock {
        offset_minutes: Arc<AtomicI64>,
    }

    impl TestClock {
        fn new() -> (Self, Clock) {
            let offset = Arc::new(AtomicI64::new(0));
            let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 7, 0).unwrap();
            let shared = offset.clone();
            let clock: Clock =
                Arc::new(move || base + Duration::minutes(shared.load(Ordering::SeqCst)));
            (
                Self {
                    offset_minutes: offset,
                },
                clock,
            )
        }

        fn advance(&self, minutes: i64) {
            self.offset_minutes.fetch_add(minutes, Ordering::SeqCst);
        }
    }

    fn config() -> PaperConfig {
        PaperConfig {
            seed: 3,
            start_price: dec!(100),
            fee_rate: dec!(0.001),
            history_days: 3,
        }
    }

    #[tokio::test]
    async fn test_history_reaches_current_bar() {
        let (_clock, f) = TestClock::new();
        let exchange = PaperExchange::with_clock(config(), f);
        exchange.add_market("BTCEUR", Timeframe::FIFTEEN_MINUTES).await;

        let start = Utc.with_ymd_and_hms(2024, 5, 31, 0, 0, 0).unwrap();
        let bars = exchange
            .get_historical_bars("BTCEUR", Timeframe::FIFTEEN_MINUTES, start, None)
            .await
            .unwrap();

        let last = bars.last().unwrap();
        assert_eq!(last.open_time, Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
        assert!(bars.iter().all(|b| b.open_time >= start));

        let hourly = exchange
            .get_historical_bars("BTCEUR", Timeframe::ONE_HOUR, start, None)
            .await
            .unwrap();
        assert_eq!(hourly.last().unwrap().close, last.close);
    }

    #[tokio::test]
    async fn test_unknown_symbol() {
        let exchange = PaperExchange::new(config());
        let result = exchange.get_symbol_filters("DOGEEUR").await;
        assert!(matches!(result, Err(ExchangeError::UnknownSymbol(s)) if s == "DOGEEUR"));
    }

    #[tokio::test]
    async fn test_market_fill_net_of_fee() {
        let (_clock, f) = TestClock::new();
        let exchange = PaperExchange::with_clock(config(), f);
        exchange.add_market("BTCEUR", Timeframe::FIFTEEN_MINUTES).await;

        let price = exchange.get_all_ticker_prices().await.unwrap()["BTCEUR"];
        let fill = exchange
            .place_market_order(&MarketOrder {
                side: Side::Buy,
                symbol: "BTCEUR".to_string(),
                amount: OrderAmount::Base(dec!(1)),
                client_order_id: "m1".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(fill.average_price, price);
        assert_eq!(fill.filled_quantity, dec!(0.999));
    }

    #[tokio::test]
    async fn test_bracket_rests_then_resolves() {
        let (clock, f) = TestClock::new();
        let exchange = PaperExchange::with_clock(config(), f);
        exchange.add_market("BTCEUR", Timeframe::FIFTEEN_MINUTES).await;

        let price = exchange.get_all_ticker_prices().await.unwrap()["BTCEUR"];
        let bracket = BracketOrder {
            side: Side::Sell,
            symbol: "BTCEUR".to_string(),
            quantity: dec!(0.5),
            stop_price: price * dec!(0.999),
            stop_limit_price: price * dec!(0.998),
            take_profit_price: price * dec!(1.001),
            client_order_id: "oco-1".to_string(),
        };
        exchange.place_bracket_order(&bracket).await.unwrap();

        let open = exchange.get_open_orders("BTCEUR").await.unwrap();
        assert_eq!(open.len(), 2);
        assert!(open.iter().all(|o| o.client_order_id == "oco-1"));

        // a tight bracket is crossed within a couple of days of 15 minute bars
        clock.advance(2 * 24 * 60);
        let open = exchange.get_open_orders("BTCEUR").await.unwrap();
        assert!(open.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_bracket_rejected() {
        let (_clock, f) = TestClock::new();
        let exchange = PaperExchange::with_clock(config(), f);
        exchange.add_market("BTCEUR", Timeframe::FIFTEEN_MINUTES).await;

        let bracket = BracketOrder {
            side: Side::Sell,
            symbol: "BTCEUR".to_string(),
            quantity: dec!(0.5),
            stop_price: dec!(1),
            stop_limit_price: dec!(0.5),
            take_profit_price: dec!(1000),
            client_order_id: "oco-1".to_string(),
        };
        exchange.place_bracket_order(&bracket).await.unwrap();
        assert!(matches!(
            exchange.place_bracket_order(&bracket).await,
            Err(ExchangeError::Rejected { code: -2010, .. })
        ));
    }
}
