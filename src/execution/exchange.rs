use crate::error::ExchangeError;
use crate::models::{
    Bar, BracketAck, BracketOrder, MarketFill, MarketOrder, OpenOrder, SymbolFilters, Timeframe,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

pub type ExchangeResult<T> = std::result::Result<T, ExchangeError>;

/// Capabilities the engine needs from a spot exchange
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Bars opening at or after `start` (and before `end` when given), oldest first.
    /// Implementations paginate internally.
    async fn get_historical_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> ExchangeResult<Vec<Bar>>;

    /// Last traded price of every listed symbol
    async fn get_all_ticker_prices(&self) -> ExchangeResult<HashMap<String, Decimal>>;

    async fn get_open_orders(&self, symbol: &str) -> ExchangeResult<Vec<OpenOrder>>;

    async fn get_symbol_filters(&self, symbol: &str) -> ExchangeResult<SymbolFilters>;

    /// Returns the executed quantity net of fees and the average fill price
    async fn place_market_order(&self, order: &MarketOrder) -> ExchangeResult<MarketFill>;

    async fn place_bracket_order(&self, order: &BracketOrder) -> ExchangeResult<BracketAck>;
}

#[async_trait]
impl<E: Exchange + ?Sized> Exchange for Arc<E> {
    async fn get_historical_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> ExchangeResult<Vec<Bar>> {
        (**self).get_historical_bars(symbol, timeframe, start, end).await
    }

    async fn get_all_ticker_prices(&self) -> ExchangeResult<HashMap<String, Decimal>> {
        (**self).get_all_ticker_prices().await
    }

    async fn get_open_orders(&self, symbol: &str) -> ExchangeResult<Vec<OpenOrder>> {
        (**self).get_open_orders(symbol).await
    }

    async fn get_symbol_filters(&self, symbol: &str) -> ExchangeResult<SymbolFilters> {
        (**self).get_symbol_filters(symbol).await
    }

    async fn place_market_order(&self, order: &MarketOrder) -> ExchangeResult<MarketFill> {
        (**self).place_market_order(order).await
    }

    async fn place_bracket_order(&self, order: &BracketOrder) -> ExchangeResult<BracketAck> {
        (**self).place_bracket_order(order).await
    }
}
