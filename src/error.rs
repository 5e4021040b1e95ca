use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors reported by the exchange collaborator
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExchangeError {
    /// Network or HTTP level failure
    #[error("transport error: {0}")]
    Transport(String),

    /// The exchange refused the request
    #[error("exchange rejected request (code {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("symbol {0} not found")]
    UnknownSymbol(String),

    /// Checked locally and never sent to the exchange
    #[error("not submitted: {0}")]
    NotSubmitted(String),
}

/// Crate-wide error taxonomy
#[derive(Debug, Error)]
pub enum Error {
    /// Bad configuration or call arguments. Never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// Latest aggregated row is too old to act upon
    #[error("stale data: last close at {last_close}, now {now}")]
    StaleData {
        last_close: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// The market leg is filled and logged but no exit bracket exists.
    /// Needs manual intervention.
    #[error(
        "bracket order missing for market order {market_client_order_id} after {attempts} attempts: {last_error}"
    )]
    BracketGap {
        market_client_order_id: String,
        bracket_client_order_id: String,
        attempts: u32,
        last_error: ExchangeError,
    },

    /// The market leg is filled but its client ids could not be made durable.
    /// A restart would not recognise the position.
    #[error(
        "order log write failed after market order {market_client_order_id} filled (bracket placed: {bracket_placed}): {source}"
    )]
    UnloggedPosition {
        market_client_order_id: String,
        bracket_client_order_id: String,
        bracket_placed: bool,
        source: std::io::Error,
    },

    /// Internal consistency check failed; nothing was submitted
    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("order log i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to load configuration: {0}")]
    ConfigLoad(#[from] config::ConfigError),
}

impl Error {
    /// Client id of a filled market order left without a durable, protected record
    pub fn unprotected_market_order(&self) -> Option<&str> {
        match self {
            Error::BracketGap {
                market_client_order_id,
                ..
            }
            | Error::UnloggedPosition {
                market_client_order_id,
                ..
            } => Some(market_client_order_id),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
