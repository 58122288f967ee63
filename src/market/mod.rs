//! Market Event Module
//!
//! Event delivery between an exchange session and the strategies trading on
//! it, plus a simulated session for paper trading and kline replay.
//!
//! # Example
//!
//! ```rust,ignore
//! use grid_maker::market::{EventBus, EventKind, MarketEvent};
//!
//! let mut bus = EventBus::new();
//! bus.subscribe(&[EventKind::SessionStart, EventKind::OrderFilled], strategy.clone());
//! bus.publish(&MarketEvent::SessionStart).await;
//! ```

mod listener;
mod paper;

pub use listener::{EventBus, EventKind, MarketEvent, MarketListener};
pub use paper::PaperExchange;
