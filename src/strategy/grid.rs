//! Grid strategy registration

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use super::registry::{SharedStrategy, StrategyContext, StrategyFactory};
use super::traits::{Strategy, StrategyStatus};
use crate::grid::config::{GridConfig, STRATEGY_ID};
use crate::grid::errors::GridResult;
use crate::grid::executor::GroupOrderExecutor;
use crate::grid::strategy::GridStrategy;
use crate::market::EventKind;

/// Builds a [`GridStrategy`] from JSON parameters shaped like [`GridConfig`].
/// A missing `symbol` defaults to the session market.
pub struct GridStrategyFactory;

impl StrategyFactory for GridStrategyFactory {
    fn create(
        &self,
        mut params: HashMap<String, Value>,
        ctx: &StrategyContext,
    ) -> GridResult<SharedStrategy> {
        params
            .entry("symbol".to_string())
            .or_insert_with(|| Value::String(ctx.market.symbol.clone()));
        let config: GridConfig =
            serde_json::from_value(Value::Object(params.into_iter().collect()))?;

        let executor = Arc::new(GroupOrderExecutor::new(
            ctx.session.clone(),
            &config.symbol,
            config.group_id(),
        ));
        let mut strategy =
            GridStrategy::new(config, ctx.market.clone(), executor, ctx.session.clone())?
                .with_backtest(ctx.backtest);
        if let Some(persistence) = &ctx.persistence {
            strategy = strategy.with_persistence(persistence.clone());
        }

        Ok(Arc::new(Mutex::new(strategy)))
    }
}

#[async_trait]
impl Strategy for GridStrategy {
    fn name(&self) -> &str {
        STRATEGY_ID
    }

    fn instance_id(&self) -> String {
        GridStrategy::instance_id(self).to_string()
    }

    fn subscriptions(&self) -> Vec<EventKind> {
        vec![
            EventKind::SessionStart,
            EventKind::KLineClosed,
            EventKind::OrderFilled,
            EventKind::OrderCanceled,
            EventKind::Trade,
        ]
    }

    async fn run(&mut self) -> GridResult<()> {
        self.start().await
    }

    async fn shutdown(&mut self) {
        GridStrategy::shutdown(self).await
    }

    fn status(&self) -> StrategyStatus {
        let grid = self.grid().map(|grid| {
            json!({
                "lower_price": grid.lower_price(),
                "upper_price": grid.upper_price(),
                "size": grid.size(),
                "spread": grid.spread(),
                "pins": grid.pins().len(),
            })
        });
        StrategyStatus {
            name: STRATEGY_ID.to_string(),
            instance_id: GridStrategy::instance_id(self).to_string(),
            state: format!("{:?}", self.state().kind()),
            details: json!({
                "group_id": self.group_id(),
                "grid": grid,
                "profit_stats": self.profit_stats(),
            }),
        }
    }
}
