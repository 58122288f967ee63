//! Grid-specific error types

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur in grid trading operations
#[derive(Error, Debug, Clone)]
pub enum GridError {
    #[error("Invalid grid configuration: {0}")]
    InvalidConfig(String),

    #[error(
        "Insufficient balance: {base_currency} required {base_required}, \
         available {base_available}; {quote_currency} required {quote_required}, \
         available {quote_available}"
    )]
    InsufficientBaseAndQuote {
        base_currency: String,
        base_required: Decimal,
        base_available: Decimal,
        quote_currency: String,
        quote_required: Decimal,
        quote_available: Decimal,
    },

    #[error("Insufficient {currency} balance: required {required}, available {available}")]
    InsufficientBase {
        currency: String,
        required: Decimal,
        available: Decimal,
    },

    #[error("Insufficient {currency} balance: required {required}, available {available}")]
    InsufficientQuote {
        currency: String,
        required: Decimal,
        available: Decimal,
    },

    #[error("{currency} investment {investment} exceeds balance {balance}")]
    InvestmentExceedsBalance {
        currency: String,
        investment: Decimal,
        balance: Decimal,
    },

    #[error("Invalid investment: {0}")]
    InvalidInvestment(String),

    #[error("Balance not found: {0}")]
    BalanceNotFound(String),

    #[error("Price not found: {0}")]
    PriceNotFound(String),

    #[error("Exchange error: {0}")]
    Exchange(String),

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("State persistence error: {0}")]
    StatePersistence(String),

    #[error("JSON parse error: {0}")]
    JsonParse(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl GridError {
    /// True for the balance shortfall family returned by the sizer
    pub fn is_insufficient_balance(&self) -> bool {
        matches!(
            self,
            GridError::InsufficientBaseAndQuote { .. }
                | GridError::InsufficientBase { .. }
                | GridError::InsufficientQuote { .. }
                | GridError::InvestmentExceedsBalance { .. }
        )
    }
}

impl From<serde_json::Error> for GridError {
    fn from(err: serde_json::Error) -> Self {
        GridError::JsonParse(err.to_string())
    }
}

impl From<std::io::Error> for GridError {
    fn from(err: std::io::Error) -> Self {
        GridError::StatePersistence(err.to_string())
    }
}

impl From<config::ConfigError> for GridError {
    fn from(err: config::ConfigError) -> Self {
        GridError::Config(err.to_string())
    }
}

/// Result type for grid operations
pub type GridResult<T> = std::result::Result<T, GridError>;
