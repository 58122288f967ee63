//! Paper trading exchange session
//!
//! Simulates a spot account for paper trading and kline replay. Resting
//! orders lock their funds on submission and fill at their limit price when a
//! closed candle trades through them. Buys lock their quote fee up front, so a
//! fill never draws on available quote.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use log::{debug, info};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::grid::errors::{GridError, GridResult};
use crate::grid::executor::ExchangeSession;
use crate::grid::types::{
    Balance, Fill, KLine, Market, Order, OrderSide, OrderStatus, SubmitOrder, Ticker,
};

#[derive(Debug, Default)]
struct PaperBook {
    balances: HashMap<String, Balance>,
    orders: BTreeMap<u64, Order>,
    canceled: Vec<Order>,
    next_oid: u64,
    last_price: Option<Decimal>,
    total_fees: Decimal,
}

impl PaperBook {
    fn balance_mut(&mut self, currency: &str) -> &mut Balance {
        self.balances
            .entry(currency.to_string())
            .or_insert_with(|| Balance::new(currency, Decimal::ZERO))
    }
}

/// Simulated exchange session for a single market
pub struct PaperExchange {
    market: Market,
    /// Fee rate applied to fill notional, charged in quote
    fee_rate: Decimal,
    book: Mutex<PaperBook>,
}

impl PaperExchange {
    pub fn new(market: Market, fee_rate: Decimal) -> Self {
        Self {
            market,
            fee_rate,
            book: Mutex::new(PaperBook {
                next_oid: 1,
                ..Default::default()
            }),
        }
    }

    /// Quote a buy of `notional` locks: the notional plus its fee
    fn buy_reserve(&self, notional: Decimal) -> Decimal {
        notional + notional * self.fee_rate
    }

    /// Credit available balance
    pub async fn deposit(&self, currency: &str, amount: Decimal) {
        self.book.lock().await.balance_mut(currency).available += amount;
    }

    pub async fn set_last_price(&self, price: Decimal) {
        self.book.lock().await.last_price = Some(price);
    }

    /// All balances, sorted by currency
    pub async fn balances(&self) -> Vec<Balance> {
        let mut balances: Vec<Balance> =
            self.book.lock().await.balances.values().cloned().collect();
        balances.sort_by(|a, b| a.currency.cmp(&b.currency));
        balances
    }

    pub async fn pending_order_count(&self) -> usize {
        self.book.lock().await.orders.len()
    }

    pub async fn total_fees(&self) -> Decimal {
        self.book.lock().await.total_fees
    }

    /// Orders cancelled since the last call
    pub async fn take_canceled(&self) -> Vec<Order> {
        std::mem::take(&mut self.book.lock().await.canceled)
    }

    /// Fill every resting order the candle traded through and move the last
    /// price to the close. Buys fill when the low reaches them, sells when the
    /// high does.
    pub async fn match_kline(&self, kline: &KLine) -> Vec<Fill> {
        let mut book = self.book.lock().await;

        let crossed: Vec<u64> = book
            .orders
            .values()
            .filter(|order| order.symbol == kline.symbol)
            .filter(|order| match order.side {
                OrderSide::Buy => kline.low <= order.price,
                OrderSide::Sell => kline.high >= order.price,
            })
            .map(|order| order.order_id)
            .collect();

        let mut fills = Vec::with_capacity(crossed.len());
        for order_id in crossed {
            let Some(mut order) = book.orders.remove(&order_id) else {
                continue;
            };

            let notional = order.price * order.quantity;
            let fee = notional * self.fee_rate;
            match order.side {
                OrderSide::Buy => {
                    let reserve = self.buy_reserve(notional);
                    book.balance_mut(&self.market.quote_currency).locked -= reserve;
                    book.balance_mut(&self.market.base_currency).available += order.quantity;
                }
                OrderSide::Sell => {
                    book.balance_mut(&self.market.base_currency).locked -= order.quantity;
                    book.balance_mut(&self.market.quote_currency).available += notional - fee;
                }
            }
            book.total_fees += fee;

            order.executed_quantity = order.quantity;
            order.status = OrderStatus::Filled;
            info!(
                "Paper fill: {} {} {} at {} (fee: {})",
                order.side, order.quantity, order.symbol, order.price, fee
            );
            fills.push(Fill { order, fee });
        }

        book.last_price = Some(kline.close);
        fills
    }
}

#[async_trait]
impl ExchangeSession for PaperExchange {
    async fn balance(&self, currency: &str) -> Option<Balance> {
        self.book.lock().await.balances.get(currency).cloned()
    }

    async fn query_ticker(&self, symbol: &str) -> GridResult<Ticker> {
        let last = self
            .book
            .lock()
            .await
            .last_price
            .ok_or_else(|| GridError::PriceNotFound(format!("no trades yet for {}", symbol)))?;
        Ok(Ticker {
            symbol: symbol.to_string(),
            last,
            buy: last,
            sell: last,
        })
    }

    async fn last_price(&self, _symbol: &str) -> Option<Decimal> {
        self.book.lock().await.last_price
    }

    async fn submit_order(&self, order: &SubmitOrder) -> GridResult<Order> {
        if order.symbol != self.market.symbol {
            return Err(GridError::OrderRejected(format!("unknown symbol {}", order.symbol)));
        }
        if order.price <= Decimal::ZERO || order.quantity <= Decimal::ZERO {
            return Err(GridError::OrderRejected(format!(
                "invalid price {} or quantity {}",
                order.price, order.quantity
            )));
        }

        let mut book = self.book.lock().await;
        let (currency, required) = match order.side {
            OrderSide::Buy => (&self.market.quote_currency, self.buy_reserve(order.notional())),
            OrderSide::Sell => (&self.market.base_currency, order.quantity),
        };
        let balance = book.balance_mut(currency);
        if balance.available < required {
            return Err(GridError::OrderRejected(format!(
                "insufficient {}: required {}, available {}",
                currency, required, balance.available
            )));
        }
        balance.available -= required;
        balance.locked += required;

        let order_id = book.next_oid;
        book.next_oid += 1;
        let accepted = Order::from_submit(order_id, order);
        book.orders.insert(order_id, accepted.clone());
        debug!(
            "Paper order {} resting: {} {} @ {}",
            order_id, order.side, order.quantity, order.price
        );
        Ok(accepted)
    }

    async fn cancel_orders(&self, orders: &[Order]) -> GridResult<()> {
        let mut book = self.book.lock().await;
        for order in orders {
            let Some(mut resting) = book.orders.remove(&order.order_id) else {
                continue;
            };
            let remaining = resting.quantity - resting.executed_quantity;
            let (currency, locked) = match resting.side {
                OrderSide::Buy => {
                    let reserve = self.buy_reserve(resting.price * remaining);
                    (&self.market.quote_currency, reserve)
                }
                OrderSide::Sell => (&self.market.base_currency, remaining),
            };
            let balance = book.balance_mut(currency);
            balance.locked -= locked;
            balance.available += locked;

            resting.status = OrderStatus::Canceled;
            book.canceled.push(resting);
        }
        Ok(())
    }

    async fn query_open_orders(&self, symbol: &str) -> GridResult<Vec<Order>> {
        Ok(self
            .book
            .lock()
            .await
            .orders
            .values()
            .filter(|order| order.symbol == symbol)
            .cloned()
            .collect())
    }
}
