//! Grid controller - opens the ladder, replenishes it on fills, closes it
//!
//! The controller is driven from a single sequential event path. It owns the
//! grid lifecycle state and talks to the exchange only through the
//! [`OrderExecutor`] and [`ExchangeSession`] seams.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use rust_decimal::Decimal;

use super::config::GridConfig;
use super::errors::{GridError, GridResult};
use super::executor::{ExchangeSession, OrderExecutor};
use super::investment::{classify_legs, InvestmentBudget, InvestmentSizer};
use super::ladder::Grid;
use super::state::{GridSnapshot, GridState, GridStateKind, Persistence};
use super::types::{Fill, GridProfitStats, KLine, Market, Order, OrderSide, SubmitOrder};
use crate::market::{MarketEvent, MarketListener};

/// Grid market-making controller for one symbol
pub struct GridStrategy {
    config: GridConfig,
    market: Market,
    executor: Arc<dyn OrderExecutor>,
    session: Arc<dyn ExchangeSession>,
    persistence: Option<Arc<dyn Persistence>>,
    /// Read the last price from the backtest session instead of the ticker
    backtest: bool,
    state: GridState,
    profit_stats: GridProfitStats,
    instance_id: String,
    group_id: u32,
}

impl GridStrategy {
    pub fn new(
        config: GridConfig,
        market: Market,
        executor: Arc<dyn OrderExecutor>,
        session: Arc<dyn ExchangeSession>,
    ) -> GridResult<Self> {
        config.validate()?;
        if config.symbol != market.symbol {
            return Err(GridError::InvalidConfig(format!(
                "config symbol {} does not match market {}",
                config.symbol, market.symbol
            )));
        }

        Ok(Self {
            instance_id: config.instance_id(),
            group_id: config.group_id(),
            profit_stats: GridProfitStats::new(&config.symbol),
            config,
            market,
            executor,
            session,
            persistence: None,
            backtest: false,
            state: GridState::Unopened,
        })
    }

    /// Builder: checkpoint profit stats through `persistence`
    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Builder: resolve the last price from the backtest session
    pub fn with_backtest(mut self, backtest: bool) -> Self {
        self.backtest = backtest;
        self
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn state(&self) -> &GridState {
        &self.state
    }

    pub fn grid(&self) -> Option<&Grid> {
        self.state.grid()
    }

    pub fn profit_stats(&self) -> &GridProfitStats {
        &self.profit_stats
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn group_id(&self) -> u32 {
        self.group_id
    }

    /// Prepare the instance before the session starts delivering events:
    /// restore persisted profit stats and optionally clear stale orders.
    pub async fn start(&mut self) -> GridResult<()> {
        if let Some(persistence) = &self.persistence {
            if let Some(snapshot) = persistence.load(&self.instance_id).await? {
                info!(
                    "[{}] restored profit stats: {} arbitrages, volume {}",
                    self.config.symbol,
                    snapshot.profit_stats.arbitrage_count,
                    snapshot.profit_stats.volume
                );
                self.profit_stats = snapshot.profit_stats;
            }
        }

        if self.config.clear_open_orders_when_start {
            self.clear_open_orders().await?;
        }
        Ok(())
    }

    async fn clear_open_orders(&self) -> GridResult<()> {
        let open_orders = self.session.query_open_orders(&self.config.symbol).await?;
        if open_orders.is_empty() {
            return Ok(());
        }
        info!("[{}] clearing {} open orders on start", self.config.symbol, open_orders.len());
        self.session.cancel_orders(&open_orders).await
    }

    /// Build the ladder, size it against the balances and post the initial legs.
    ///
    /// A no-op unless the grid is still unopened. On any error the state stays
    /// `Unopened` so a later call can retry; legs posted before a failed
    /// submission are cancelled first.
    pub async fn open(&mut self) -> GridResult<()> {
        if !matches!(self.state, GridState::Unopened) {
            debug!("[{}] grid already {:?}, skip open", self.config.symbol, self.state.kind());
            return Ok(());
        }

        let grid = Grid::new(
            self.config.lower_price,
            self.config.upper_price,
            self.config.grid_number,
            self.market.tick_size,
        );
        info!("[{}] {}", self.config.symbol, grid);

        let last_price = self.resolve_last_price().await?;
        let base_balance = self.available_balance(&self.market.base_currency).await?;
        let quote_balance = self.available_balance(&self.market.quote_currency).await?;
        info!(
            "[{}] last price {}, balances {} {} / {} {}",
            self.config.symbol,
            last_price,
            base_balance,
            self.market.base_currency,
            quote_balance,
            self.market.quote_currency
        );

        let mode = self
            .config
            .sizing_mode()
            .ok_or_else(|| GridError::InvalidConfig("no sizing mode configured".into()))?;
        let budget = InvestmentBudget {
            base_investment: self.config.base_investment,
            quote_investment: self.config.quote_investment,
            base_balance,
            quote_balance,
        };
        let sizing =
            InvestmentSizer::new(&self.market, grid.pins(), last_price).size(mode, &budget)?;

        if !budget.base_investment.is_zero() && !budget.quote_investment.is_zero() {
            self.check_investment_within_balances(&budget)?;
        }

        let legs = classify_legs(grid.pins(), last_price, base_balance, |price| {
            sizing.quantity_at(price)
        });
        for leg in legs {
            let order = self.limit_order(leg.side, leg.price, leg.quantity);
            if let Err(err) = self.executor.submit_orders(std::slice::from_ref(&order)).await {
                error!(
                    "[{}] failed to submit {} {} @ {}: {}",
                    self.config.symbol, order.side, order.quantity, order.price, err
                );
                // legs already posted must not outlive an unopened grid
                if let Err(cancel_err) = self.executor.graceful_cancel().await {
                    error!(
                        "[{}] failed to cancel partially opened grid: {}",
                        self.config.symbol, cancel_err
                    );
                }
                return Err(err);
            }
            info!(
                "[{}] placed {} {} @ {}",
                self.config.symbol, order.side, order.quantity, order.price
            );
        }

        self.state = GridState::Open(grid);
        Ok(())
    }

    fn check_investment_within_balances(&self, budget: &InvestmentBudget) -> GridResult<()> {
        if budget.base_investment > budget.base_balance {
            return Err(GridError::InvestmentExceedsBalance {
                currency: self.market.base_currency.clone(),
                investment: budget.base_investment,
                balance: budget.base_balance,
            });
        }
        if budget.quote_investment > budget.quote_balance {
            return Err(GridError::InvestmentExceedsBalance {
                currency: self.market.quote_currency.clone(),
                investment: budget.quote_investment,
                balance: budget.quote_balance,
            });
        }
        Ok(())
    }

    async fn resolve_last_price(&self) -> GridResult<Decimal> {
        let symbol = &self.config.symbol;
        if self.backtest {
            return self
                .session
                .last_price(symbol)
                .await
                .ok_or_else(|| {
                    GridError::PriceNotFound(format!("no backtest price for {}", symbol))
                });
        }

        let ticker = self.session.query_ticker(symbol).await?;
        let price = if ticker.last.is_zero() { ticker.buy } else { ticker.last };
        if price <= Decimal::ZERO {
            return Err(GridError::PriceNotFound(format!("empty ticker for {}", symbol)));
        }
        Ok(price)
    }

    async fn available_balance(&self, currency: &str) -> GridResult<Decimal> {
        self.session
            .balance(currency)
            .await
            .map(|balance| balance.available)
            .ok_or_else(|| GridError::BalanceNotFound(currency.to_string()))
    }

    fn limit_order(&self, side: OrderSide, price: Decimal, quantity: Decimal) -> SubmitOrder {
        let mut order = SubmitOrder::limit(&self.config.symbol, side, price, quantity);
        order.group_id = self.group_id;
        order
    }

    fn owns(&self, order: &Order) -> bool {
        order.symbol == self.config.symbol && order.group_id == self.group_id
    }

    /// Order that takes over from a filled leg, if the grid is open
    pub fn replacement_order(&self, filled: &Order) -> Option<SubmitOrder> {
        let GridState::Open(grid) = &self.state else {
            return None;
        };

        let price = filled.price;
        let quantity = if filled.executed_quantity.is_zero() {
            filled.quantity
        } else {
            filled.executed_quantity
        };
        let spread = self.config.profit_spread;

        let (new_price, rescale) = match filled.side {
            OrderSide::Sell => {
                let new_price = if !spread.is_zero() {
                    price - spread
                } else {
                    grid.next_lower_pin(price).map_or(price, |pin| pin.price())
                };
                (new_price, self.config.compound || self.config.earn_base)
            }
            OrderSide::Buy => {
                let new_price = if !spread.is_zero() {
                    price + spread
                } else {
                    grid.next_higher_pin(price).map_or(price, |pin| pin.price())
                };
                (new_price, self.config.earn_base)
            }
        };

        if new_price <= Decimal::ZERO {
            warn!("[{}] no valid replacement price below {}", self.config.symbol, price);
            return None;
        }
        if new_price == price {
            warn!("[{}] no adjacent pin for {} fill at {}", self.config.symbol, filled.side, price);
        }

        let new_quantity = if rescale {
            quantity * price / new_price
        } else {
            quantity
        };
        Some(self.limit_order(filled.side.opposite(), new_price, new_quantity))
    }

    /// Replace a filled leg with the opposite order. Submission errors are
    /// logged; the level stays empty until the next fill.
    pub async fn on_order_filled(&mut self, order: &Order) {
        if !self.owns(order) {
            return;
        }
        info!(
            "[{}] {} filled: {} @ {} (oid {})",
            self.config.symbol, order.side, order.executed_quantity, order.price, order.order_id
        );

        let Some(replacement) = self.replacement_order(order) else {
            return;
        };
        match self.executor.submit_orders(std::slice::from_ref(&replacement)).await {
            Ok(_) => info!(
                "[{}] replaced with {} {} @ {}",
                self.config.symbol, replacement.side, replacement.quantity, replacement.price
            ),
            Err(err) => error!(
                "[{}] failed to submit replacement {} @ {}: {}",
                self.config.symbol, replacement.side, replacement.price, err
            ),
        }
    }

    pub async fn on_order_canceled(&mut self, order: &Order) {
        if !self.owns(order) {
            return;
        }
        debug!("[{}] order {} canceled", self.config.symbol, order.order_id);

        if self.config.close_when_cancel_order {
            info!("[{}] order canceled, closing grid", self.config.symbol);
            if let Err(err) = self.close().await {
                error!("[{}] failed to close grid: {}", self.config.symbol, err);
            }
        }
    }

    /// Trigger price opens the grid; stop-loss and take-profit close it
    pub async fn on_kline_closed(&mut self, kline: &KLine) {
        if kline.symbol != self.config.symbol {
            return;
        }

        match self.state.kind() {
            GridStateKind::Unopened => {
                let Some(trigger) = self.config.trigger_price else {
                    return;
                };
                if !kline.contains(trigger) {
                    return;
                }
                info!("[{}] trigger price {} reached, opening grid", self.config.symbol, trigger);
                if let Err(err) = self.open().await {
                    error!("[{}] failed to open grid: {}", self.config.symbol, err);
                }
            }
            GridStateKind::Open => {
                let stop_loss = self.config.stop_loss_price.filter(|price| kline.low <= *price);
                let take_profit =
                    self.config.take_profit_price.filter(|price| kline.high >= *price);
                if let Some(price) = stop_loss {
                    warn!("[{}] stop loss {} reached, closing grid", self.config.symbol, price);
                } else if let Some(price) = take_profit {
                    info!("[{}] take profit {} reached, closing grid", self.config.symbol, price);
                } else {
                    return;
                }
                if let Err(err) = self.close().await {
                    error!("[{}] failed to close grid: {}", self.config.symbol, err);
                }
            }
            GridStateKind::Closed => {}
        }
    }

    /// Open straight away unless a trigger price defers it
    pub async fn on_session_start(&mut self) {
        if self.config.trigger_price.is_some() {
            return;
        }
        if let Err(err) = self.open().await {
            error!("[{}] failed to open grid: {}", self.config.symbol, err);
        }
    }

    /// Position update: fold the trade into profit stats and checkpoint
    pub async fn on_trade(&mut self, fill: &Fill) {
        if !self.owns(&fill.order) {
            return;
        }
        self.profit_stats.add_trade(fill);
        self.sync().await;
    }

    /// Cancel this grid's orders and move `Open` to `Closed`, keeping the ladder.
    /// Returns the cancellation error after the state change and checkpoint.
    pub async fn close(&mut self) -> GridResult<()> {
        if matches!(self.state, GridState::Closed(_)) {
            debug!("[{}] grid already closed", self.config.symbol);
            return Ok(());
        }

        let result = self.executor.graceful_cancel().await;
        if let GridState::Open(grid) = std::mem::take(&mut self.state) {
            self.state = GridState::Closed(grid);
        }
        info!("[{}] grid closed", self.config.symbol);

        self.sync().await;
        result
    }

    pub async fn shutdown(&mut self) {
        if self.config.keep_orders_when_shutdown {
            info!("[{}] keeping grid orders on shutdown", self.config.symbol);
        } else if let Err(err) = self.close().await {
            error!("[{}] failed to close grid on shutdown: {}", self.config.symbol, err);
        }
        self.sync().await;
    }

    async fn sync(&self) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        let snapshot = GridSnapshot::new(&self.instance_id, &self.state, &self.profit_stats);
        if let Err(err) = persistence.sync(&snapshot).await {
            error!("[{}] failed to sync grid state: {}", self.config.symbol, err);
        }
    }
}

#[async_trait]
impl MarketListener for GridStrategy {
    async fn on_event(&mut self, event: &MarketEvent) {
        match event {
            MarketEvent::SessionStart => self.on_session_start().await,
            MarketEvent::KLineClosed(kline) => self.on_kline_closed(kline).await,
            MarketEvent::OrderFilled(order) => self.on_order_filled(order).await,
            MarketEvent::OrderCanceled(order) => self.on_order_canceled(order).await,
            MarketEvent::Trade(fill) => self.on_trade(fill).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::executor::mock::{MockExecutor, MockSession};
    use crate::grid::state::MemoryStore;
    use crate::grid::types::OrderStatus;
    use rust_decimal_macros::dec;

    fn market() -> Market {
        Market {
            symbol: "BTCUSDT".into(),
            base_currency: "BTC".into(),
            quote_currency: "USDT".into(),
            tick_size: dec!(1),
            min_quantity: dec!(0.01),
            min_notional: dec!(1),
        }
    }

    fn config() -> GridConfig {
        GridConfig::new("BTCUSDT", dec!(90), dec!(110), 4).with_quantity(dec!(1))
    }

    async fn setup(
        config: GridConfig,
        base: Decimal,
        quote: Decimal,
    ) -> (GridStrategy, Arc<MockExecutor>, Arc<MockSession>) {
        let executor = Arc::new(MockExecutor::new());
        let session = Arc::new(MockSession::new());
        session.set_balance("BTC", base).await;
        session.set_balance("USDT", quote).await;
        session.set_ticker("BTCUSDT", dec!(100), dec!(99.5)).await;
        let strategy =
            GridStrategy::new(config, market(), executor.clone(), session.clone()).unwrap();
        (strategy, executor, session)
    }

    fn legs(orders: &[SubmitOrder]) -> Vec<(OrderSide, Decimal)> {
        orders.iter().map(|o| (o.side, o.price)).collect()
    }

    fn filled(
        strategy: &GridStrategy,
        side: OrderSide,
        price: Decimal,
        quantity: Decimal,
    ) -> Order {
        let mut order = Order::from_submit(99, &strategy.limit_order(side, price, quantity));
        order.executed_quantity = quantity;
        order.status = OrderStatus::Filled;
        order
    }

    fn kline(low: Decimal, high: Decimal) -> KLine {
        KLine {
            symbol: "BTCUSDT".into(),
            start_time: 0,
            open: low,
            high,
            low,
            close: high,
            volume: dec!(0),
        }
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let executor = Arc::new(MockExecutor::new());
        let session = Arc::new(MockSession::new());
        let bad = GridConfig::new("BTCUSDT", dec!(110), dec!(90), 4).with_quantity(dec!(1));
        assert!(GridStrategy::new(bad, market(), executor.clone(), session.clone()).is_err());

        let other_symbol =
            GridConfig::new("ETHUSDT", dec!(90), dec!(110), 4).with_quantity(dec!(1));
        assert!(GridStrategy::new(other_symbol, market(), executor, session).is_err());
    }

    #[tokio::test]
    async fn test_open_posts_sells_above_and_buys_below() {
        let (mut strategy, executor, _) = setup(config(), dec!(2), dec!(1000)).await;

        strategy.open().await.unwrap();

        let submitted = executor.submitted_orders().await;
        assert_eq!(
            legs(&submitted),
            vec![
                (OrderSide::Sell, dec!(110)),
                (OrderSide::Sell, dec!(105)),
                (OrderSide::Buy, dec!(95)),
                (OrderSide::Buy, dec!(90)),
            ]
        );
        assert!(submitted.iter().all(|o| o.group_id == strategy.group_id()));
        assert!(submitted.iter().all(|o| o.quantity == dec!(1)));
        assert!(strategy.state().is_open());
    }

    #[tokio::test]
    async fn test_open_without_base_converts_to_buys() {
        let (mut strategy, executor, _) = setup(config(), dec!(0), dec!(1000)).await;

        strategy.open().await.unwrap();

        assert_eq!(
            legs(&executor.submitted_orders().await),
            vec![
                (OrderSide::Buy, dec!(105)),
                (OrderSide::Buy, dec!(100)),
                (OrderSide::Buy, dec!(95)),
                (OrderSide::Buy, dec!(90)),
            ]
        );
    }

    #[tokio::test]
    async fn test_open_is_noop_when_open() {
        let (mut strategy, executor, _) = setup(config(), dec!(2), dec!(1000)).await;
        strategy.open().await.unwrap();
        strategy.open().await.unwrap();
        assert_eq!(executor.submitted_orders().await.len(), 4);
    }

    #[tokio::test]
    async fn test_open_failure_leaves_unopened_and_allows_retry() {
        let (mut strategy, executor, session) = setup(config(), dec!(2), dec!(100)).await;

        let err = strategy.open().await.unwrap_err();
        assert!(matches!(err, GridError::InsufficientQuote { .. }));
        assert_eq!(strategy.state().kind(), GridStateKind::Unopened);
        assert!(executor.submitted_orders().await.is_empty());

        session.set_balance("USDT", dec!(1000)).await;
        strategy.open().await.unwrap();
        assert!(strategy.state().is_open());
    }

    #[tokio::test]
    async fn test_open_aborts_on_submission_error() {
        let (mut strategy, executor, _) = setup(config(), dec!(2), dec!(1000)).await;
        executor.set_fail_after(Some(1)).await;

        assert!(matches!(strategy.open().await, Err(GridError::Exchange(_))));
        assert_eq!(executor.submitted_orders().await.len(), 1);
        assert_eq!(executor.graceful_cancel_count(), 1);
        assert!(executor.resting_orders().await.is_empty());
        assert!(strategy.grid().is_none());
    }

    #[tokio::test]
    async fn test_trigger_retry_after_partial_open_posts_each_level_once() {
        let (mut strategy, executor, _) =
            setup(config().with_trigger_price(dec!(101)), dec!(2), dec!(1000)).await;
        executor.set_fail_after(Some(2)).await;

        strategy.on_kline_closed(&kline(dec!(99), dec!(102))).await;
        assert_eq!(strategy.state().kind(), GridStateKind::Unopened);
        assert_eq!(
            legs(&executor.submitted_orders().await),
            vec![(OrderSide::Sell, dec!(110)), (OrderSide::Sell, dec!(105))]
        );
        assert_eq!(executor.graceful_cancel_count(), 1);
        assert!(executor.resting_orders().await.is_empty());

        executor.set_fail_after(None).await;
        strategy.on_kline_closed(&kline(dec!(100), dec!(101))).await;
        assert!(strategy.state().is_open());
        assert_eq!(
            legs(&executor.resting_orders().await),
            vec![
                (OrderSide::Sell, dec!(110)),
                (OrderSide::Sell, dec!(105)),
                (OrderSide::Buy, dec!(95)),
                (OrderSide::Buy, dec!(90)),
            ]
        );
    }

    #[tokio::test]
    async fn test_open_requires_balances() {
        let executor = Arc::new(MockExecutor::new());
        let session = Arc::new(MockSession::new());
        session.set_ticker("BTCUSDT", dec!(100), dec!(100)).await;
        session.set_balance("USDT", dec!(1000)).await;
        let mut strategy = GridStrategy::new(config(), market(), executor, session).unwrap();

        assert!(matches!(strategy.open().await, Err(GridError::BalanceNotFound(c)) if c == "BTC"));
    }

    #[tokio::test]
    async fn test_open_uses_backtest_price() {
        let executor = Arc::new(MockExecutor::new());
        let session = Arc::new(MockSession::new());
        session.set_balance("BTC", dec!(0)).await;
        session.set_balance("USDT", dec!(1000)).await;
        session.set_backtest_price(dec!(92)).await;
        let mut strategy = GridStrategy::new(config(), market(), executor.clone(), session)
            .unwrap()
            .with_backtest(true);

        strategy.open().await.unwrap();

        // every pin from 95 up converts one pin lower
        assert_eq!(
            legs(&executor.submitted_orders().await),
            vec![
                (OrderSide::Buy, dec!(105)),
                (OrderSide::Buy, dec!(100)),
                (OrderSide::Buy, dec!(95)),
                (OrderSide::Buy, dec!(90)),
            ]
        );
    }

    #[tokio::test]
    async fn test_open_falls_back_to_ticker_buy() {
        let (mut strategy, executor, session) = setup(config(), dec!(5), dec!(1000)).await;
        session.set_ticker("BTCUSDT", dec!(0), dec!(96)).await;

        strategy.open().await.unwrap();

        // last price 96: 100, 105, 110 sell; 95, 90 buy
        assert_eq!(executor.submitted_orders().await.len(), 5);
    }

    #[tokio::test]
    async fn test_open_checks_investments_against_balances() {
        let config = GridConfig::new("BTCUSDT", dec!(90), dec!(110), 4)
            .with_quote_investment(dec!(390))
            .with_base_investment(dec!(3));
        let (mut strategy, executor, _) = setup(config, dec!(2), dec!(1000)).await;

        let err = strategy.open().await.unwrap_err();
        assert!(matches!(
            err,
            GridError::InvestmentExceedsBalance { ref currency, .. } if currency == "BTC"
        ));
        assert!(executor.submitted_orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_open_with_quote_investment() {
        let config =
            GridConfig::new("BTCUSDT", dec!(90), dec!(110), 4).with_quote_investment(dec!(780));
        let (mut strategy, executor, _) = setup(config, dec!(0), dec!(1000)).await;

        strategy.open().await.unwrap();

        let submitted = executor.submitted_orders().await;
        assert_eq!(submitted.len(), 4);
        assert!(submitted.iter().all(|o| o.quantity == dec!(2)));
    }

    #[tokio::test]
    async fn test_open_with_amount_sizes_each_pin() {
        let config = GridConfig::new("BTCUSDT", dec!(90), dec!(110), 4).with_amount(dec!(210));
        let (mut strategy, executor, _) = setup(config, dec!(5), dec!(1000)).await;

        strategy.open().await.unwrap();

        // 110 and 105 sell; the 100 sell would exceed 5 BTC and becomes a buy at 95
        let submitted = executor.submitted_orders().await;
        assert_eq!(
            legs(&submitted),
            vec![
                (OrderSide::Sell, dec!(110)),
                (OrderSide::Sell, dec!(105)),
                (OrderSide::Buy, dec!(95)),
                (OrderSide::Buy, dec!(90)),
            ]
        );
        let quantities: Vec<Decimal> = submitted.iter().map(|o| o.quantity).collect();
        assert_eq!(
            quantities,
            vec![dec!(210) / dec!(110), dec!(2), dec!(2.1), dec!(210) / dec!(90)]
        );
    }

    #[tokio::test]
    async fn test_open_with_quote_and_base_investment() {
        let config = GridConfig::new("BTCUSDT", dec!(90), dec!(110), 4)
            .with_quote_investment(dec!(195))
            .with_base_investment(dec!(3));
        let (mut strategy, executor, _) = setup(config, dec!(3), dec!(1000)).await;

        strategy.open().await.unwrap();

        // base spread over three sells beats 195 / 390 from the quote side
        let submitted = executor.submitted_orders().await;
        assert_eq!(
            legs(&submitted),
            vec![
                (OrderSide::Sell, dec!(110)),
                (OrderSide::Sell, dec!(105)),
                (OrderSide::Sell, dec!(100)),
                (OrderSide::Buy, dec!(95)),
                (OrderSide::Buy, dec!(90)),
            ]
        );
        assert!(submitted.iter().all(|o| o.quantity == dec!(1)));
        assert!(strategy.state().is_open());
    }

    #[tokio::test]
    async fn test_filled_sell_replaced_by_buy_one_pin_lower() {
        let (mut strategy, executor, _) = setup(config(), dec!(2), dec!(1000)).await;
        strategy.open().await.unwrap();

        let order = filled(&strategy, OrderSide::Sell, dec!(105), dec!(1));
        strategy.on_order_filled(&order).await;

        let last = executor.submitted_orders().await.pop().unwrap();
        assert_eq!((last.side, last.price, last.quantity), (OrderSide::Buy, dec!(100), dec!(1)));
    }

    #[tokio::test]
    async fn test_filled_buy_replaced_by_sell_one_pin_higher() {
        let (mut strategy, executor, _) = setup(config(), dec!(2), dec!(1000)).await;
        strategy.open().await.unwrap();

        let order = filled(&strategy, OrderSide::Buy, dec!(95), dec!(1));
        strategy.on_order_filled(&order).await;

        let last = executor.submitted_orders().await.pop().unwrap();
        assert_eq!((last.side, last.price), (OrderSide::Sell, dec!(100)));
    }

    #[tokio::test]
    async fn test_profit_spread_overrides_pins() {
        let (mut strategy, _, _) =
            setup(config().with_profit_spread(dec!(2)), dec!(2), dec!(1000)).await;
        strategy.open().await.unwrap();

        let sell = filled(&strategy, OrderSide::Sell, dec!(105), dec!(1));
        assert_eq!(strategy.replacement_order(&sell).map(|o| o.price), Some(dec!(103)));

        let buy = filled(&strategy, OrderSide::Buy, dec!(95), dec!(1));
        assert_eq!(strategy.replacement_order(&buy).map(|o| o.price), Some(dec!(97)));
    }

    #[tokio::test]
    async fn test_compound_rescales_buy_only() {
        let (mut strategy, _, _) = setup(config().with_compound(true), dec!(2), dec!(1000)).await;
        strategy.open().await.unwrap();

        let sell = filled(&strategy, OrderSide::Sell, dec!(105), dec!(1));
        let buy = strategy.replacement_order(&sell).unwrap();
        assert_eq!(buy.quantity, dec!(1.05));

        let bought = filled(&strategy, OrderSide::Buy, dec!(95), dec!(1));
        assert_eq!(strategy.replacement_order(&bought).unwrap().quantity, dec!(1));
    }

    #[tokio::test]
    async fn test_earn_base_rescales_both_sides() {
        let (mut strategy, _, _) = setup(config().with_earn_base(true), dec!(2), dec!(1000)).await;
        strategy.open().await.unwrap();

        let sell = filled(&strategy, OrderSide::Sell, dec!(105), dec!(1));
        assert_eq!(strategy.replacement_order(&sell).unwrap().quantity, dec!(1.05));

        let bought = filled(&strategy, OrderSide::Buy, dec!(100), dec!(1.05));
        let sell_again = strategy.replacement_order(&bought).unwrap();
        assert_eq!(sell_again.price, dec!(105));
        assert_eq!(sell_again.quantity, dec!(1));
    }

    #[tokio::test]
    async fn test_fill_of_foreign_order_is_ignored() {
        let (mut strategy, executor, _) = setup(config(), dec!(2), dec!(1000)).await;
        strategy.open().await.unwrap();

        let mut order = filled(&strategy, OrderSide::Sell, dec!(105), dec!(1));
        order.group_id = strategy.group_id().wrapping_add(1);
        strategy.on_order_filled(&order).await;

        assert_eq!(executor.submitted_orders().await.len(), 4);
    }

    #[tokio::test]
    async fn test_replacement_failure_is_swallowed() {
        let (mut strategy, executor, _) = setup(config(), dec!(2), dec!(1000)).await;
        strategy.open().await.unwrap();
        executor.set_fail_after(Some(4)).await;

        let order = filled(&strategy, OrderSide::Sell, dec!(105), dec!(1));
        strategy.on_order_filled(&order).await;

        assert_eq!(executor.submitted_orders().await.len(), 4);
        assert!(strategy.state().is_open());
    }

    #[tokio::test]
    async fn test_cancel_closes_once_when_configured() {
        let (mut strategy, executor, _) =
            setup(config().with_close_when_cancel_order(true), dec!(2), dec!(1000)).await;
        strategy.open().await.unwrap();

        let order = filled(&strategy, OrderSide::Buy, dec!(95), dec!(1));
        strategy.on_order_canceled(&order).await;
        strategy.on_order_canceled(&order).await;

        assert_eq!(executor.graceful_cancel_count(), 1);
        assert_eq!(strategy.state().kind(), GridStateKind::Closed);
    }

    #[tokio::test]
    async fn test_cancel_ignored_by_default() {
        let (mut strategy, executor, _) = setup(config(), dec!(2), dec!(1000)).await;
        strategy.open().await.unwrap();

        let order = filled(&strategy, OrderSide::Buy, dec!(95), dec!(1));
        strategy.on_order_canceled(&order).await;

        assert_eq!(executor.graceful_cancel_count(), 0);
        assert!(strategy.state().is_open());
    }

    #[tokio::test]
    async fn test_open_after_close_is_noop() {
        let (mut strategy, executor, _) = setup(config(), dec!(2), dec!(1000)).await;
        strategy.open().await.unwrap();
        strategy.close().await.unwrap();

        strategy.open().await.unwrap();

        assert_eq!(executor.submitted_orders().await.len(), 4);
        assert_eq!(strategy.state().kind(), GridStateKind::Closed);
        assert!(strategy.grid().is_some());
    }

    #[tokio::test]
    async fn test_close_surfaces_cancel_error() {
        let (mut strategy, executor, _) = setup(config(), dec!(2), dec!(1000)).await;
        strategy.open().await.unwrap();
        *executor.cancel_should_fail.lock().await = true;

        assert!(strategy.close().await.is_err());
        assert_eq!(strategy.state().kind(), GridStateKind::Closed);
    }

    #[tokio::test]
    async fn test_shutdown_closes_unless_keeping_orders() {
        let (mut strategy, executor, _) = setup(config(), dec!(2), dec!(1000)).await;
        strategy.open().await.unwrap();
        strategy.shutdown().await;
        assert_eq!(executor.graceful_cancel_count(), 1);

        let (mut keeper, executor, _) =
            setup(config().with_keep_orders_when_shutdown(true), dec!(2), dec!(1000)).await;
        keeper.open().await.unwrap();
        keeper.shutdown().await;
        assert_eq!(executor.graceful_cancel_count(), 0);
        assert!(keeper.state().is_open());
    }

    #[tokio::test]
    async fn test_trigger_price_defers_open() {
        let (mut strategy, executor, _) =
            setup(config().with_trigger_price(dec!(101)), dec!(2), dec!(1000)).await;

        strategy.on_session_start().await;
        assert_eq!(strategy.state().kind(), GridStateKind::Unopened);

        strategy.on_kline_closed(&kline(dec!(102), dec!(105))).await;
        assert_eq!(strategy.state().kind(), GridStateKind::Unopened);

        strategy.on_kline_closed(&kline(dec!(99), dec!(101.5))).await;
        assert!(strategy.state().is_open());
        assert_eq!(executor.submitted_orders().await.len(), 4);
    }

    #[tokio::test]
    async fn test_session_start_opens_without_trigger() {
        let (mut strategy, _, _) = setup(config(), dec!(2), dec!(1000)).await;
        strategy.on_event(&MarketEvent::SessionStart).await;
        assert!(strategy.state().is_open());
    }

    #[tokio::test]
    async fn test_stop_loss_closes_grid() {
        let (mut strategy, executor, _) =
            setup(config().with_stop_loss_price(dec!(85)), dec!(2), dec!(1000)).await;
        strategy.open().await.unwrap();

        strategy.on_kline_closed(&kline(dec!(88), dec!(92))).await;
        assert!(strategy.state().is_open());

        strategy.on_kline_closed(&kline(dec!(84), dec!(89))).await;
        assert_eq!(strategy.state().kind(), GridStateKind::Closed);
        assert_eq!(executor.graceful_cancel_count(), 1);
    }

    #[tokio::test]
    async fn test_take_profit_closes_grid() {
        let (mut strategy, executor, _) =
            setup(config().with_take_profit_price(dec!(115)), dec!(2), dec!(1000)).await;
        strategy.open().await.unwrap();

        strategy.on_kline_closed(&kline(dec!(108), dec!(116))).await;
        assert_eq!(strategy.state().kind(), GridStateKind::Closed);
        assert_eq!(executor.graceful_cancel_count(), 1);
    }

    #[tokio::test]
    async fn test_start_clears_open_orders() {
        let (mut strategy, _, session) =
            setup(config().with_clear_open_orders_when_start(true), dec!(2), dec!(1000)).await;
        session
            .submit_order(&SubmitOrder::limit("BTCUSDT", OrderSide::Buy, dec!(80), dec!(1)))
            .await
            .unwrap();

        strategy.start().await.unwrap();

        assert!(session.open_orders.lock().await.is_empty());
        assert_eq!(session.cancelled.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_trades_update_and_persist_profit_stats() {
        let store = Arc::new(MemoryStore::new());
        let (strategy, _, _) = setup(config(), dec!(2), dec!(1000)).await;
        let mut strategy = strategy.with_persistence(store.clone());
        strategy.start().await.unwrap();
        strategy.open().await.unwrap();

        let order = filled(&strategy, OrderSide::Sell, dec!(105), dec!(1));
        strategy
            .on_event(&MarketEvent::Trade(Fill {
                order,
                fee: dec!(0.1),
            }))
            .await;

        assert_eq!(strategy.profit_stats().arbitrage_count, 1);
        let snapshot = store.load(strategy.instance_id()).await.unwrap().unwrap();
        assert_eq!(snapshot.profit_stats.volume, dec!(105));
        assert_eq!(snapshot.state, GridStateKind::Open);

        // a fresh instance picks the stats back up
        let (restored, _, _) = setup(config(), dec!(2), dec!(1000)).await;
        let mut restored = restored.with_persistence(store);
        restored.start().await.unwrap();
        assert_eq!(restored.profit_stats().arbitrage_count, 1);
        assert_eq!(restored.profit_stats().total_fee, dec!(0.1));
    }
}
