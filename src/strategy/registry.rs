use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use super::Strategy;
use crate::grid::errors::{GridError, GridResult};
use crate::grid::executor::ExchangeSession;
use crate::grid::state::Persistence;
use crate::grid::types::Market;

/// Strategy instance shared between the runner and the event bus
pub type SharedStrategy = Arc<Mutex<dyn Strategy>>;

/// Collaborators handed to a factory at the composition root
#[derive(Clone)]
pub struct StrategyContext {
    pub market: Market,
    pub session: Arc<dyn ExchangeSession>,
    pub persistence: Option<Arc<dyn Persistence>>,
    /// Resolve prices from the backtest session instead of the live ticker
    pub backtest: bool,
}

/// Factory trait for creating strategies
pub trait StrategyFactory: Send + Sync {
    /// Create a new strategy instance from its parameters
    fn create(
        &self,
        params: HashMap<String, Value>,
        ctx: &StrategyContext,
    ) -> GridResult<SharedStrategy>;
}

/// Registry for strategy factories
pub struct StrategyRegistry {
    factories: HashMap<String, Box<dyn StrategyFactory>>,
}

impl StrategyRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a strategy factory
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: StrategyFactory + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Create a strategy by name
    pub fn create_strategy(
        &self,
        name: &str,
        params: HashMap<String, Value>,
        ctx: &StrategyContext,
    ) -> GridResult<SharedStrategy> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| GridError::InvalidConfig(format!("Unknown strategy type: {}", name)))?;
        factory.create(params, ctx)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
