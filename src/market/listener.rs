//! Typed publish/subscribe delivery of market events
//!
//! Listeners subscribe to the event kinds they care about. Publishing awaits
//! every subscriber of that kind one after another, in subscription order, on
//! the caller's task. Nothing runs concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::grid::types::{Fill, KLine, Order};

/// Event delivered on the session's sequential path
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    /// Session data is ready
    SessionStart,
    KLineClosed(KLine),
    OrderFilled(Order),
    OrderCanceled(Order),
    /// Execution report for position and profit accounting
    Trade(Fill),
}

impl MarketEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            MarketEvent::SessionStart => EventKind::SessionStart,
            MarketEvent::KLineClosed(_) => EventKind::KLineClosed,
            MarketEvent::OrderFilled(_) => EventKind::OrderFilled,
            MarketEvent::OrderCanceled(_) => EventKind::OrderCanceled,
            MarketEvent::Trade(_) => EventKind::Trade,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SessionStart,
    KLineClosed,
    OrderFilled,
    OrderCanceled,
    Trade,
}

/// Receiver of market events
#[async_trait]
pub trait MarketListener: Send {
    /// Handle one event. Handlers log their own failures and return normally.
    async fn on_event(&mut self, event: &MarketEvent);
}

#[async_trait]
impl<L> MarketListener for Arc<Mutex<L>>
where
    L: MarketListener + ?Sized,
{
    async fn on_event(&mut self, event: &MarketEvent) {
        self.lock().await.on_event(event).await;
    }
}

/// Per-kind listener lists
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Box<dyn MarketListener>>,
    routes: HashMap<EventKind, Vec<usize>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `listener` to `kinds`; returns its position in delivery order
    pub fn subscribe<L>(&mut self, kinds: &[EventKind], listener: L) -> usize
    where
        L: MarketListener + 'static,
    {
        let id = self.listeners.len();
        self.listeners.push(Box::new(listener));
        for kind in kinds {
            self.routes.entry(*kind).or_default().push(id);
        }
        id
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.routes.get(&kind).map_or(0, Vec::len)
    }

    /// Deliver `event` to every subscriber of its kind
    pub async fn publish(&mut self, event: &MarketEvent) {
        let Some(ids) = self.routes.get(&event.kind()) else {
            return;
        };
        for id in ids {
            if let Some(listener) = self.listeners.get_mut(*id) {
                listener.on_event(event).await;
            }
        }
    }
}
