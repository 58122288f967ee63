//! Grid Market-Making Module
//!
//! Keeps a ladder of resting limit orders across a bounded price range,
//! sized from the available capital, and replaces each order with its
//! opposite as it fills.
//!
//! # Architecture
//!
//! - [`ladder`] - Price pins, extension and membership (pure)
//! - [`investment`] - Per-level quantity from one of four sizing modes (pure)
//! - [`strategy`] - Grid controller: open / replenish / close lifecycle
//! - [`config`] - Grid configuration and validation
//! - [`types`] - Orders, candles, balances, market metadata, profit stats
//! - [`errors`] - Grid-specific error types
//! - [`executor`] - Exchange and order execution seams (mockable for testing)
//! - [`state`] - Lifecycle state and checkpoint persistence
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rust_decimal_macros::dec;
//! use grid_maker::grid::{GridConfig, GridStrategy, GroupOrderExecutor};
//!
//! let config = GridConfig::new("BTCUSDT", dec!(90), dec!(110), 4)
//!     .with_quote_investment(dec!(1000));
//!
//! let executor = Arc::new(GroupOrderExecutor::new(session.clone(), "BTCUSDT", config.group_id()));
//! let mut strategy = GridStrategy::new(config, market, executor, session)?;
//!
//! strategy.start().await?;
//! strategy.open().await?;
//! ```

pub mod config;
pub mod errors;
pub mod executor;
pub mod investment;
pub mod ladder;
pub mod state;
pub mod strategy;
pub mod types;

// Re-export commonly used types
pub use config::{GridConfig, FEE_RATE, STRATEGY_ID};
pub use errors::{GridError, GridResult};
pub use executor::{ExchangeSession, GroupOrderExecutor, OrderExecutor};
pub use investment::{InvestmentBudget, InvestmentSizer, Leg, OrderSizing, SizingMode};
pub use ladder::{Grid, Pin};
pub use state::{GridSnapshot, GridState, GridStateKind, JsonFileStore, MemoryStore, Persistence};
pub use strategy::GridStrategy;
pub use types::{
    Balance, Fill, GridProfitStats, KLine, Market, Order, OrderSide, OrderStatus, SubmitOrder,
    Ticker,
};
