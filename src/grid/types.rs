//! Core data types for grid trading

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tag stamped on every order the grid submits
pub const GRID_ORDER_TAG: &str = "grid";

/// Order side for grid legs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of an order on the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    Filled,
    Canceled,
}

/// Order request handed to the execution collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
    #[serde(default)]
    pub tag: String,
    /// Grid instance group; zero until the executor stamps it
    #[serde(default)]
    pub group_id: u32,
}

impl SubmitOrder {
    /// GTC limit order tagged for the grid
    pub fn limit(
        symbol: impl Into<String>,
        side: OrderSide,
        price: Decimal,
        quantity: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            price,
            quantity,
            tag: GRID_ORDER_TAG.to_string(),
            group_id: 0,
        }
    }

    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }
}

/// Order as known by the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: u64,
    pub symbol: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
    #[serde(default)]
    pub executed_quantity: Decimal,
    pub status: OrderStatus,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub group_id: u32,
}

impl Order {
    /// Build the exchange-side view of an accepted submission
    pub fn from_submit(order_id: u64, submit: &SubmitOrder) -> Self {
        Self {
            order_id,
            symbol: submit.symbol.clone(),
            side: submit.side,
            price: submit.price,
            quantity: submit.quantity,
            executed_quantity: Decimal::ZERO,
            status: OrderStatus::New,
            tag: submit.tag.clone(),
            group_id: submit.group_id,
        }
    }
}

/// Execution report for a filled order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order: Order,
    /// Fee charged in the quote currency
    pub fee: Decimal,
}

impl Fill {
    pub fn notional(&self) -> Decimal {
        self.order.price * self.order.executed_quantity
    }
}

/// Closed candle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KLine {
    #[serde(default)]
    pub symbol: String,
    /// Candle open time, unix millis
    #[serde(default)]
    pub start_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    #[serde(default)]
    pub volume: Decimal,
}

impl KLine {
    /// Whether `price` lies inside the candle's [low, high] range
    pub fn contains(&self, price: Decimal) -> bool {
        self.low <= price && price <= self.high
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub last: Decimal,
    pub buy: Decimal,
    pub sell: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub currency: String,
    pub available: Decimal,
    #[serde(default)]
    pub locked: Decimal,
}

impl Balance {
    pub fn new(currency: impl Into<String>, available: Decimal) -> Self {
        Self {
            currency: currency.into(),
            available,
            locked: Decimal::ZERO,
        }
    }
}

/// Read-only market metadata supplied at construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub symbol: String,
    pub base_currency: String,
    pub quote_currency: String,
    pub tick_size: Decimal,
    #[serde(default)]
    pub min_quantity: Decimal,
    #[serde(default)]
    pub min_notional: Decimal,
}

/// Floor `value` to a multiple of `tick`; a non-positive tick leaves it untouched
pub fn truncate_to_tick(value: Decimal, tick: Decimal) -> Decimal {
    if tick <= Decimal::ZERO {
        return value;
    }
    (value / tick).floor() * tick
}

/// Cumulative grid profit figures, checkpointed through the persistence collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridProfitStats {
    pub symbol: String,
    #[serde(default)]
    pub total_profit: Decimal,
    #[serde(default)]
    pub float_profit: Decimal,
    #[serde(default)]
    pub grid_profit: Decimal,
    #[serde(default)]
    pub arbitrage_count: u64,
    #[serde(default)]
    pub total_fee: Decimal,
    #[serde(default)]
    pub volume: Decimal,
}

impl GridProfitStats {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Default::default()
        }
    }

    /// Accumulate volume and fee of a fill; a filled sell closes one round trip
    pub fn add_trade(&mut self, fill: &Fill) {
        self.volume += fill.notional();
        self.total_fee += fill.fee;
        if fill.order.side == OrderSide::Sell {
            self.arbitrage_count += 1;
        }
    }
}
