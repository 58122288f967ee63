use std::path::Path;
use std::sync::Arc;

use log::{info, warn};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::Settings;
use crate::grid::errors::{GridError, GridResult};
use crate::grid::state::{JsonFileStore, MemoryStore, Persistence};
use crate::grid::types::{Balance, KLine};
use crate::market::{EventBus, MarketEvent, PaperExchange};
use crate::strategy::{StrategyContext, StrategyRegistry, StrategyStatus};

/// Outcome of a replayed session
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub status: StrategyStatus,
    pub balances: Vec<Balance>,
    pub fills: usize,
    pub total_fees: Decimal,
}

/// Runner for the trading bot
pub struct BotRunner {
    config: Settings,
    registry: StrategyRegistry,
}

impl BotRunner {
    /// Create a new runner from a configuration file
    pub fn new(
        config_path: impl AsRef<Path>,
        registry: StrategyRegistry,
    ) -> Result<Self, config::ConfigError> {
        let config = Settings::new(&config_path.as_ref().to_string_lossy())?;
        Ok(Self { config, registry })
    }

    pub fn from_settings(config: Settings, registry: StrategyRegistry) -> Self {
        Self { config, registry }
    }

    /// Run the bot over the configured kline file
    pub async fn run(self) -> Result<RunSummary, Box<dyn std::error::Error>> {
        // 1. Setup Logging
        let env = env_logger::Env::default().default_filter_or(&self.config.log.level);
        env_logger::Builder::from_env(env).try_init().ok();

        info!("Starting BotRunner...");

        // 2. Load market data
        let path = self
            .config
            .paper
            .klines_file
            .clone()
            .ok_or_else(|| GridError::InvalidConfig("paper.klines_file is required".to_string()))?;
        let klines = load_klines(&path, &self.config.market.symbol)?;
        info!("Loaded {} klines from {}", klines.len(), path.display());

        // 3. Replay
        Ok(self.replay(klines).await?)
    }

    /// Drive one strategy instance through a paper session over `klines`
    pub async fn replay(self, klines: Vec<KLine>) -> GridResult<RunSummary> {
        let market = self.config.market.clone();
        let paper_config = &self.config.paper;

        let paper = Arc::new(PaperExchange::new(market.clone(), paper_config.fee_rate));
        paper.deposit(&market.base_currency, paper_config.base_balance).await;
        paper.deposit(&market.quote_currency, paper_config.quote_balance).await;
        match klines.first() {
            Some(first) => paper.set_last_price(first.open).await,
            None => warn!("No klines to replay for {}", market.symbol),
        }

        let persistence: Arc<dyn Persistence> = match &self.config.persistence.state_dir {
            Some(dir) => Arc::new(JsonFileStore::new(dir)?),
            None => Arc::new(MemoryStore::new()),
        };

        let ctx = StrategyContext {
            market: market.clone(),
            session: paper.clone(),
            persistence: Some(persistence),
            backtest: true,
        };

        let strategy_config = &self.config.strategy;
        let strategy = self.registry.create_strategy(
            &strategy_config.type_name,
            strategy_config.params.clone(),
            &ctx,
        )?;

        let subscriptions = {
            let guard = strategy.lock().await;
            info!("Strategy '{}' initialized as {}", guard.name(), guard.instance_id());
            guard.subscriptions()
        };

        let mut bus = EventBus::new();
        bus.subscribe(&subscriptions, strategy.clone());

        strategy.lock().await.run().await?;
        bus.publish(&MarketEvent::SessionStart).await;

        let mut fills = 0;
        for kline in &klines {
            for fill in paper.match_kline(kline).await {
                fills += 1;
                bus.publish(&MarketEvent::OrderFilled(fill.order.clone())).await;
                bus.publish(&MarketEvent::Trade(fill)).await;
            }
            for order in paper.take_canceled().await {
                bus.publish(&MarketEvent::OrderCanceled(order)).await;
            }
            bus.publish(&MarketEvent::KLineClosed(kline.clone())).await;
        }

        strategy.lock().await.shutdown().await;

        let status = strategy.lock().await.status();
        info!("Session finished: {} fills, state {}", fills, status.state);

        Ok(RunSummary {
            status,
            balances: paper.balances().await,
            fills,
            total_fees: paper.total_fees().await,
        })
    }
}

fn load_klines(path: &Path, symbol: &str) -> GridResult<Vec<KLine>> {
    let content = std::fs::read_to_string(path)?;
    let mut klines: Vec<KLine> = serde_json::from_str(&content)?;
    for kline in klines.iter_mut().filter(|k| k.symbol.is_empty()) {
        kline.symbol = symbol.to_string();
    }
    Ok(klines)
}
