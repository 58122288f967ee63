//! Strategy Interface Module
//!
//! Strategies are plain event listeners with a lifecycle. They are built by
//! name through a [`StrategyRegistry`] the composition root fills explicitly;
//! there is no process-wide registry.
//!
//! # Example
//!
//! ```rust,ignore
//! use grid_maker::strategy::{GridStrategyFactory, StrategyRegistry};
//!
//! let mut registry = StrategyRegistry::new();
//! registry.register("grid", GridStrategyFactory);
//!
//! let strategy = registry.create_strategy("grid", params, &ctx)?;
//! strategy.lock().await.run().await?;
//! ```

mod grid;
pub mod registry;
mod traits;

pub use grid::GridStrategyFactory;
pub use registry::{SharedStrategy, StrategyContext, StrategyFactory, StrategyRegistry};
pub use traits::{Strategy, StrategyStatus};
