//! Exchange and order execution seams - enables mocking for tests

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use rust_decimal::Decimal;

use super::errors::GridResult;
use super::types::{Balance, Order, SubmitOrder, Ticker, GRID_ORDER_TAG};

/// Exchange session operations the grid depends on
#[async_trait]
pub trait ExchangeSession: Send + Sync {
    /// Account balance for a currency, `None` when the account holds none
    async fn balance(&self, currency: &str) -> Option<Balance>;

    /// Live ticker query
    async fn query_ticker(&self, symbol: &str) -> GridResult<Ticker>;

    /// Last price recorded by a backtest session
    async fn last_price(&self, symbol: &str) -> Option<Decimal>;

    /// Place a single order
    async fn submit_order(&self, order: &SubmitOrder) -> GridResult<Order>;

    /// Cancel the given orders
    async fn cancel_orders(&self, orders: &[Order]) -> GridResult<()>;

    /// Open orders for a symbol
    async fn query_open_orders(&self, symbol: &str) -> GridResult<Vec<Order>>;
}

/// Order execution the grid controller drives
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    /// Submit orders in sequence. Stops at the first failure; orders accepted
    /// before it stay on the book.
    async fn submit_orders(&self, orders: &[SubmitOrder]) -> GridResult<Vec<Order>>;

    /// Cancel every open order carrying this executor's group id
    async fn graceful_cancel(&self) -> GridResult<()>;
}

// ============================================================================
// Session-backed implementation
// ============================================================================

/// Executor that tags orders with a grid group id and cancels by that tag
pub struct GroupOrderExecutor {
    session: Arc<dyn ExchangeSession>,
    symbol: String,
    group_id: u32,
}

impl GroupOrderExecutor {
    pub fn new(
        session: Arc<dyn ExchangeSession>,
        symbol: impl Into<String>,
        group_id: u32,
    ) -> Self {
        Self {
            session,
            symbol: symbol.into(),
            group_id,
        }
    }
}

#[async_trait]
impl OrderExecutor for GroupOrderExecutor {
    async fn submit_orders(&self, orders: &[SubmitOrder]) -> GridResult<Vec<Order>> {
        let mut created = Vec::with_capacity(orders.len());
        for order in orders {
            let mut order = order.clone();
            order.group_id = self.group_id;
            if order.tag.is_empty() {
                order.tag = GRID_ORDER_TAG.to_string();
            }

            let accepted = self.session.submit_order(&order).await?;
            debug!(
                "[{}] submitted {} {} @ {} (oid {})",
                order.symbol, order.side, order.quantity, order.price, accepted.order_id
            );
            created.push(accepted);
        }
        Ok(created)
    }

    async fn graceful_cancel(&self) -> GridResult<()> {
        let open_orders = self.session.query_open_orders(&self.symbol).await?;
        let ours: Vec<Order> = open_orders
            .into_iter()
            .filter(|order| order.group_id == self.group_id)
            .collect();

        if ours.is_empty() {
            return Ok(());
        }

        info!("[{}] cancelling {} grid orders (group {})", self.symbol, ours.len(), self.group_id);
        self.session.cancel_orders(&ours).await
    }
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================
