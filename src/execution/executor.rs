use super::exchange::Exchange;
use super::order_log::OrderIdLog;
use super::orders::{compute_bracket_prices, quantity_for, sell_bracket, BracketPrices};
use crate::config::StrategyConfig;
use crate::error::ExchangeError;
use crate::models::{BracketAck, BracketOrder, MarketOrder, OrderAmount, Pair, Side};
use crate::strategy::ExitThresholds;
use crate::{Error, Result};
use rust_decimal::Decimal;
use std::time::Duration;

/// How a bracket execution is sized and retried
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Quote amount spent per entry
    pub investment: Decimal,
    pub exits: ExitThresholds,
    pub bracket_retry_attempts: u32,
    pub bracket_retry_delay: Duration,
}

impl ExecutorSettings {
    pub fn from_config(config: &StrategyConfig) -> Result<Self> {
        Ok(Self {
            investment: config.investment,
            exits: config.exit_thresholds()?,
            bracket_retry_attempts: config.bracket_retry_attempts,
            bracket_retry_delay: Duration::from_secs(config.bracket_retry_delay_secs),
        })
    }
}

/// What a successful entry left on the exchange
#[derive(Debug, Clone)]
pub struct TradeReport {
    pub market_client_order_id: String,
    pub bracket_client_order_id: String,
    pub reference_price: Decimal,
    pub fill_price: Decimal,
    pub filled_quantity: Decimal,
    pub prices: BracketPrices,
    pub bracket: BracketOrder,
    pub ack: BracketAck,
}

/// Places the market entry and its protective bracket for one strategy instance
pub struct BracketExecutor<E> {
    exchange: E,
    strategy_name: String,
    pair: Pair,
    settings: ExecutorSettings,
    log: OrderIdLog,
}

impl<E: Exchange> BracketExecutor<E> {
    pub fn new(
        exchange: E,
        strategy_name: impl Into<String>,
        pair: Pair,
        settings: ExecutorSettings,
        log: OrderIdLog,
    ) -> Result<Self> {
        if settings.bracket_retry_attempts == 0 {
            return Err(Error::Config(
                "bracket_retry_attempts must be at least 1".to_string(),
            ));
        }
        if settings.investment <= Decimal::ZERO {
            return Err(Error::Config("investment must be positive".to_string()));
        }

        Ok(Self {
            exchange,
            strategy_name: strategy_name.into(),
            pair,
            settings,
            log,
        })
    }

    pub fn symbol(&self) -> String {
        self.pair.symbol()
    }

    pub fn order_log(&self) -> &OrderIdLog {
        &self.log
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    /// True when any open order on the symbol was placed by this instance
    pub async fn is_in_position(&self) -> Result<bool> {
        let open_orders = self.exchange.get_open_orders(&self.symbol()).await?;
        let ours = open_orders
            .iter()
            .filter(|o| self.log.contains(&o.client_order_id))
            .count();

        if ours > 0 {
            tracing::debug!(
                strategy = %self.strategy_name,
                symbol = %self.symbol(),
                open_orders = open_orders.len(),
                ours,
                "position guard: orders from this strategy are open"
            );
        }

        Ok(ours > 0)
    }

    /// Buy `investment` worth of the token at market and protect it with a SELL bracket
    ///
    /// Everything that can be checked is checked before the market order goes out.
    /// Once the market leg is filled, bracket submission is retried with the same
    /// client id; exhausting the retries yields [`Error::BracketGap`]. A failed log
    /// write after the fill does not stop the bracket but is reported as
    /// [`Error::UnloggedPosition`].
    pub async fn execute_buy(&mut self) -> Result<TradeReport> {
        let symbol = self.symbol();

        let tickers = self.exchange.get_all_ticker_prices().await?;
        let price = *tickers
            .get(&symbol)
            .ok_or_else(|| ExchangeError::UnknownSymbol(symbol.clone()))?;

        let filters = self.exchange.get_symbol_filters(&symbol).await?;
        let quantity = quantity_for(self.settings.investment, price, &filters)?;
        let prices = compute_bracket_prices(price, &self.settings.exits, &filters);
        // dry run of the bracket so bad prices never reach the market leg
        sell_bracket(&symbol, quantity, &prices, &filters, String::from("pending"))?;

        let market_order = MarketOrder {
            side: Side::Buy,
            symbol: symbol.clone(),
            amount: OrderAmount::Base(quantity),
            client_order_id: new_client_order_id(),
        };
        market_order.validate()?;

        tracing::info!(
            strategy = %self.strategy_name,
            symbol = %symbol,
            client_order_id = %market_order.client_order_id,
            quantity = %quantity,
            price = %price,
            "placing market buy"
        );

        let fill = self.exchange.place_market_order(&market_order).await?;

        // from here on every failure leaves a filled position behind
        let mut log_failure = self.record(&market_order.client_order_id);

        tracing::info!(
            strategy = %self.strategy_name,
            client_order_id = %market_order.client_order_id,
            filled = %fill.filled_quantity,
            avg_price = %fill.average_price,
            "market buy filled"
        );

        let bracket_client_order_id = new_client_order_id();
        if let Some(e) = self.record(&bracket_client_order_id) {
            log_failure.get_or_insert(e);
        }

        let bracket = match sell_bracket(
            &symbol,
            fill.filled_quantity,
            &prices,
            &filters,
            bracket_client_order_id.clone(),
        ) {
            Ok(bracket) => bracket,
            Err(e) => {
                tracing::error!(
                    strategy = %self.strategy_name,
                    market_client_order_id = %market_order.client_order_id,
                    error = %e,
                    "🚨 filled quantity cannot be bracketed"
                );
                return Err(Error::BracketGap {
                    market_client_order_id: market_order.client_order_id,
                    bracket_client_order_id,
                    attempts: 0,
                    last_error: ExchangeError::NotSubmitted(e.to_string()),
                });
            }
        };

        let ack = self
            .submit_bracket(&bracket, &market_order.client_order_id)
            .await?;

        tracing::info!(
            strategy = %self.strategy_name,
            symbol = %symbol,
            bracket_client_order_id = %bracket.client_order_id,
            stop = %prices.stop,
            stop_limit = %prices.stop_limit,
            take_profit = %prices.take_profit,
            "bracket order placed"
        );

        if let Some(source) = log_failure {
            return Err(Error::UnloggedPosition {
                market_client_order_id: market_order.client_order_id,
                bracket_client_order_id,
                bracket_placed: true,
                source,
            });
        }

        Ok(TradeReport {
            market_client_order_id: market_order.client_order_id,
            bracket_client_order_id,
            reference_price: price,
            fill_price: fill.average_price,
            filled_quantity: fill.filled_quantity,
            prices,
            bracket,
            ack,
        })
    }

    /// Append an id after the market leg filled. Failures are returned, not raised,
    /// so the bracket is still attempted.
    fn record(&mut self, client_order_id: &str) -> Option<std::io::Error> {
        match self.log.append(client_order_id) {
            Ok(()) => None,
            Err(e) => {
                tracing::error!(
                    strategy = %self.strategy_name,
                    client_order_id = %client_order_id,
                    path = %self.log.path().display(),
                    error = %e,
                    "🚨 order id could not be written to the log"
                );
                match e {
                    Error::Io(e) => Some(e),
                    other => Some(std::io::Error::other(other.to_string())),
                }
            }
        }
    }

    async fn submit_bracket(
        &self,
        bracket: &BracketOrder,
        market_client_order_id: &str,
    ) -> Result<BracketAck> {
        let max_attempts = self.settings.bracket_retry_attempts;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match self.exchange.place_bracket_order(bracket).await {
                Ok(ack) => {
                    if attempt > 1 {
                        tracing::info!(
                            "✓ Bracket {} placed after {} attempts",
                            bracket.client_order_id,
                            attempt
                        );
                    }
                    return Ok(ack);
                }
                Err(e) => {
                    if attempt < max_attempts {
                        tracing::warn!(
                            "Bracket {} failed: {}, retrying in {}s (attempt {}/{})",
                            bracket.client_order_id,
                            e,
                            self.settings.bracket_retry_delay.as_secs(),
                            attempt,
                            max_attempts
                        );
                        tokio::time::sleep(self.settings.bracket_retry_delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        let last_error = last_error
            .unwrap_or_else(|| ExchangeError::Transport("no attempt was made".to_string()));

        tracing::error!(
            strategy = %self.strategy_name,
            market_client_order_id = %market_client_order_id,
            bracket_client_order_id = %bracket.client_order_id,
            attempts = max_attempts,
            error = %last_error,
            "🚨 market position is unprotected, bracket order could not be placed"
        );

        Err(Error::BracketGap {
            market_client_order_id: market_client_order_id.to_string(),
            bracket_client_order_id: bracket.client_order_id.clone(),
            attempts: max_attempts,
            last_error,
        })
    }
}

fn new_client_order_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
