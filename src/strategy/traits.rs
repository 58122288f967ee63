//! Strategy trait definition

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::grid::errors::GridResult;
use crate::market::{EventKind, MarketListener};

/// Strategy interface driven by the session's event bus
///
/// # Lifecycle
///
/// 1. The runner subscribes the strategy to [`Strategy::subscriptions`]
/// 2. [`Strategy::run`] prepares it before any event is published
/// 3. Events arrive through [`MarketListener::on_event`], one at a time
/// 4. [`Strategy::shutdown`] runs once the session ends
#[async_trait]
pub trait Strategy: MarketListener {
    /// Registered strategy name
    fn name(&self) -> &str;

    /// Identifier of this configured instance
    fn instance_id(&self) -> String;

    /// Event kinds this strategy must receive
    fn subscriptions(&self) -> Vec<EventKind>;

    async fn run(&mut self) -> GridResult<()>;

    /// Release orders and checkpoint; never fails
    async fn shutdown(&mut self);

    fn status(&self) -> StrategyStatus;
}

/// Point-in-time report of a strategy instance
#[derive(Debug, Clone, Serialize)]
pub struct StrategyStatus {
    pub name: String,
    pub instance_id: String,
    pub state: String,
    /// Strategy-specific details
    pub details: Value,
}
