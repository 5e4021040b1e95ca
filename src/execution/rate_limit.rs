use super::exchange::{Exchange, ExchangeResult};
use crate::models::{
    Bar, BracketAck, BracketOrder, MarketFill, MarketOrder, OpenOrder, SymbolFilters, Timeframe,
};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;

// Type alias for the rate limiter to simplify signatures
type ExchangeRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Exchange wrapper that waits for a shared request budget before every call
///
/// Cloneable; all clones share the same limiter and inner exchange, so every
/// strategy instance draws from one budget.
pub struct RateLimitedExchange<E> {
    inner: Arc<E>,
    rate_limiter: Arc<ExchangeRateLimiter>,
}

impl<E> Clone for RateLimitedExchange<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            rate_limiter: self.rate_limiter.clone(),
        }
    }
}

impl<E: Exchange> RateLimitedExchange<E> {
    pub fn new(inner: E, requests_per_minute: u32) -> Result<Self> {
        Self::from_shared(Arc::new(inner), requests_per_minute)
    }

    pub fn from_shared(inner: Arc<E>, requests_per_minute: u32) -> Result<Self> {
        let rpm = NonZeroU32::new(requests_per_minute).ok_or_else(|| {
            Error::Config("requests_per_minute must be positive".to_string())
        })?;
        let quota = Quota::per_minute(rpm);

        Ok(Self {
            inner,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    pub fn inner(&self) -> &Arc<E> {
        &self.inner
    }
}

#[async_trait]
impl<E: Exchange> Exchange for RateLimitedExchange<E> {
    async fn get_historical_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> ExchangeResult<Vec<Bar>> {
        self.rate_limiter.until_ready().await;
        self.inner
            .get_historical_bars(symbol, timeframe, start, end)
            .await
    }

    async fn get_all_ticker_prices(&self) -> ExchangeResult<HashMap<String, Decimal>> {
        self.rate_limiter.until_ready().await;
        self.inner.get_all_ticker_prices().await
    }

    async fn get_open_orders(&self, symbol: &str) -> ExchangeResult<Vec<OpenOrder>> {
        self.rate_limiter.until_ready().await;
        self.inner.get_open_orders(symbol).await
    }

    async fn get_symbol_filters(&self, symbol: &str) -> ExchangeResult<SymbolFilters> {
        self.rate_limiter.until_ready().await;
        self.inner.get_symbol_filters(symbol).await
    }

    async fn place_market_order(&self, order: &MarketOrder) -> ExchangeResult<MarketFill> {
        self.rate_limiter.until_ready().await;
        self.inner.place_market_order(order).await
    }

    async fn place_bracket_order(&self, order: &BracketOrder) -> ExchangeResult<BracketAck> {
        self.rate_limiter.until_ready().await;
        self.inner.place_bracket_order(order).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PaperConfig;
    use crate::execution::paper::PaperExchange;

    #[test]
    fn test_zero_budget_rejected() {
        let result = RateLimitedExchange::new(PaperExchange::new(PaperConfig::default()), 0);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_clones_share_inner_exchange() {
        let paper = Arc::new(PaperExchange::new(PaperConfig::default()));
        let a = RateLimitedExchange::from_shared(paper.clone(), 600).unwrap();
        let b = a.clone();

        tokio_test::block_on(paper.add_market("BTCEUR", Timeframe::FIFTEEN_MINUTES));
        let filters = tokio_test::block_on(b.get_symbol_filters("BTCEUR")).unwrap();
        assert_eq!(filters, PaperExchange::filters());
        assert!(Arc::ptr_eq(a.inner(), b.inner()));
        assert_eq!(Arc::strong_count(&paper), 3);
    }
}
