pub mod timeframe;

pub use timeframe::{TimeUnit, Timeframe};

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One OHLCV candle for a symbol and timeframe
///
/// Identity is (symbol, timeframe, open_time). Bars are never mutated once received.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Bar {
    /// Close price as a float for indicator math
    pub fn close_f64(&self) -> f64 {
        self.close.to_f64().unwrap_or(f64::NAN)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

impl FromStr for Side {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(Error::Config(format!(
                "invalid order side '{}', must be BUY or SELL",
                other
            ))),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    Market,
    Limit,
    LimitMaker,
    StopLossLimit,
}

impl OrderKind {
    /// Check that the prices this order type needs are present
    pub fn validate_prices(
        &self,
        limit_price: Option<Decimal>,
        stop_price: Option<Decimal>,
    ) -> Result<()> {
        match self {
            OrderKind::Market => Ok(()),
            OrderKind::Limit | OrderKind::LimitMaker if limit_price.is_none() => Err(
                Error::Config(format!("limit price must be provided for {} orders", self)),
            ),
            OrderKind::StopLossLimit if limit_price.is_none() || stop_price.is_none() => {
                Err(Error::Config(
                    "limit price and stop price must be provided for STOP_LOSS_LIMIT orders"
                        .to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

impl FromStr for OrderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "MARKET" => Ok(OrderKind::Market),
            "LIMIT" => Ok(OrderKind::Limit),
            "LIMIT_MAKER" => Ok(OrderKind::LimitMaker),
            "STOP_LOSS_LIMIT" => Ok(OrderKind::StopLossLimit),
            other => Err(Error::Config(format!("invalid order type '{}'", other))),
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderKind::Market => "MARKET",
            OrderKind::Limit => "LIMIT",
            OrderKind::LimitMaker => "LIMIT_MAKER",
            OrderKind::StopLossLimit => "STOP_LOSS_LIMIT",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Expired,
}

/// An order currently resting on the exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenOrder {
    pub client_order_id: String,
    pub status: OrderStatus,
    pub kind: OrderKind,
    pub side: Side,
    pub price: Option<Decimal>,
    pub quantity: Decimal,
}

/// Price and lot granularity for a trading pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymbolFilters {
    pub tick_size: Decimal,
    pub step_size: Decimal,
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub min_quantity: Decimal,
    pub max_quantity: Decimal,
}

/// A traded pair, e.g. BTC against EUR
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pair {
    pub token: String,
    pub base: String,
}

impl Pair {
    /// Build a pair and check it composes the given exchange symbol
    pub fn new(symbol: &str, token: &str, base: &str) -> Result<Self> {
        if token == base {
            return Err(Error::Config(format!(
                "cannot trade {} against itself",
                token
            )));
        }
        if format!("{}{}", token, base) != symbol {
            return Err(Error::Config(format!(
                "symbol {} is not {} + {}",
                symbol, token, base
            )));
        }
        Ok(Self {
            token: token.to_string(),
            base: base.to_string(),
        })
    }

    pub fn symbol(&self) -> String {
        format!("{}{}", self.token, self.base)
    }
}

/// How much a market order trades
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum OrderAmount {
    /// Quantity of the traded token
    Base(Decimal),
    /// Amount of the quote (base currency) to spend or receive
    Quote(Decimal),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketOrder {
    pub side: Side,
    pub symbol: String,
    pub amount: OrderAmount,
    pub client_order_id: String,
}

impl MarketOrder {
    pub fn validate(&self) -> Result<()> {
        let amount = match self.amount {
            OrderAmount::Base(q) | OrderAmount::Quote(q) => q,
        };
        if amount <= Decimal::ZERO {
            return Err(Error::Config(format!(
                "market order {} needs a positive amount",
                self.client_order_id
            )));
        }
        Ok(())
    }
}

/// Realized result of a market order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MarketFill {
    /// Executed quantity after commissions
    pub filled_quantity: Decimal,
    pub average_price: Decimal,
}

/// Paired stop-loss / take-profit exit, one cancels the other
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BracketOrder {
    pub side: Side,
    pub symbol: String,
    pub quantity: Decimal,
    pub stop_price: Decimal,
    pub stop_limit_price: Decimal,
    pub take_profit_price: Decimal,
    pub client_order_id: String,
}

/// One resting leg of a bracket
#[derive(Debug, Clone, PartialEq)]
pub struct OrderLeg {
    pub kind: OrderKind,
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
}

impl BracketOrder {
    /// The take-profit limit leg and the stop-loss-limit leg
    pub fn legs(&self) -> Result<[OrderLeg; 2]> {
        let take_profit = OrderLeg {
            kind: OrderKind::LimitMaker,
            limit_price: Some(self.take_profit_price),
            stop_price: None,
        };
        let stop_loss = OrderLeg {
            kind: OrderKind::StopLossLimit,
            limit_price: Some(self.stop_limit_price),
            stop_price: Some(self.stop_price),
        };

        for leg in [&take_profit, &stop_loss] {
            leg.kind.validate_prices(leg.limit_price, leg.stop_price)?;
        }

        Ok([take_profit, stop_loss])
    }
}

/// Exchange acknowledgement of a bracket submission
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BracketAck {
    pub client_order_id: String,
    pub raw: serde_json::Value,
}
