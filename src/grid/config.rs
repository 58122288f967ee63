//! Grid strategy configuration

use std::path::Path;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::errors::{GridError, GridResult};
use super::investment::SizingMode;

/// Strategy name used in instance ids and the factory registry
pub const STRATEGY_ID: &str = "grid";

/// Maker fee rate a profit spread must at least cover (0.075%)
pub const FEE_RATE: Decimal = dec!(0.00075);

/// Configuration for one grid instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Market symbol (e.g., "BTCUSDT")
    pub symbol: String,

    /// Fixed distance between a filled order and its replacement; zero uses the adjacent pin
    #[serde(default)]
    pub profit_spread: Decimal,

    /// Number of grid intervals
    pub grid_number: u64,

    pub upper_price: Decimal,
    pub lower_price: Decimal,

    /// Reinvest sell proceeds into the replacement buy
    #[serde(default)]
    pub compound: bool,

    /// Keep the round-trip profit in base currency
    #[serde(default)]
    pub earn_base: bool,

    /// Fixed quantity per level
    #[serde(default)]
    pub quantity: Decimal,

    /// Fixed quote notional per level
    #[serde(default)]
    pub amount: Decimal,

    #[serde(default)]
    pub quote_investment: Decimal,

    #[serde(default)]
    pub base_investment: Decimal,

    /// Open the grid once a closed candle trades through this price
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_price: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss_price: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit_price: Option<Decimal>,

    #[serde(default)]
    pub close_when_cancel_order: bool,

    #[serde(default)]
    pub keep_orders_when_shutdown: bool,

    #[serde(default)]
    pub clear_open_orders_when_start: bool,
}

impl GridConfig {
    /// Create a config with bounds and level count; pick a sizing mode with a `with_*` builder
    pub fn new(
        symbol: impl Into<String>,
        lower_price: Decimal,
        upper_price: Decimal,
        grid_number: u64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            profit_spread: Decimal::ZERO,
            grid_number,
            upper_price,
            lower_price,
            compound: false,
            earn_base: false,
            quantity: Decimal::ZERO,
            amount: Decimal::ZERO,
            quote_investment: Decimal::ZERO,
            base_investment: Decimal::ZERO,
            trigger_price: None,
            stop_loss_price: None,
            take_profit_price: None,
            close_when_cancel_order: false,
            keep_orders_when_shutdown: false,
            clear_open_orders_when_start: false,
        }
    }

    /// Validate configuration before any order activity
    pub fn validate(&self) -> GridResult<()> {
        if self.symbol.is_empty() {
            return Err(GridError::InvalidConfig("symbol cannot be empty".into()));
        }

        if self.upper_price.is_zero() {
            return Err(GridError::InvalidConfig("upper_price can not be zero".into()));
        }

        if self.lower_price <= Decimal::ZERO {
            return Err(GridError::InvalidConfig("lower_price must be positive".into()));
        }

        if self.upper_price <= self.lower_price {
            return Err(GridError::InvalidConfig(format!(
                "upper_price ({}) should not be less than or equal to lower_price ({})",
                self.upper_price, self.lower_price
            )));
        }

        if !self.profit_spread.is_zero() {
            let percent = self.profit_spread / self.lower_price;
            if percent < FEE_RATE {
                return Err(GridError::InvalidConfig(format!(
                    "profit_spread {} ({}%) is too small, less than the fee rate {}%",
                    self.profit_spread,
                    (percent * dec!(100)).round_dp(4),
                    FEE_RATE * dec!(100)
                )));
            }
        }

        if self.grid_number == 0 {
            return Err(GridError::InvalidConfig("grid_number can not be zero".into()));
        }

        if self.quantity < Decimal::ZERO
            || self.amount < Decimal::ZERO
            || self.quote_investment < Decimal::ZERO
            || self.base_investment < Decimal::ZERO
        {
            return Err(GridError::InvalidConfig(
                "quantity, amount and investments can not be negative".into(),
            ));
        }

        if self.sizing_mode().is_none() {
            return Err(GridError::InvalidConfig(
                "one of quantity, amount or quote_investment must be set".into(),
            ));
        }

        Ok(())
    }

    /// Sizing mode selected by the non-zero fields; quantity wins over amount,
    /// both investments win over quote investment alone
    pub fn sizing_mode(&self) -> Option<SizingMode> {
        if !self.quantity.is_zero() {
            Some(SizingMode::Quantity(self.quantity))
        } else if !self.amount.is_zero() {
            Some(SizingMode::Amount(self.amount))
        } else if !self.quote_investment.is_zero() && !self.base_investment.is_zero() {
            Some(SizingMode::QuoteBaseInvestment {
                quote: self.quote_investment,
                base: self.base_investment,
            })
        } else if !self.quote_investment.is_zero() {
            Some(SizingMode::QuoteInvestment(self.quote_investment))
        } else {
            None
        }
    }

    /// Stable identifier of this grid instance
    pub fn instance_id(&self) -> String {
        format!(
            "{}-{}-{}-{}-{}",
            STRATEGY_ID,
            self.symbol,
            self.grid_number,
            self.upper_price.trunc(),
            self.lower_price.trunc()
        )
    }

    /// Order group tag derived from the instance id
    pub fn group_id(&self) -> u32 {
        fnv1a_32(self.instance_id().as_bytes())
    }

    /// Builder: fixed quantity per level
    pub fn with_quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = quantity;
        self
    }

    /// Builder: fixed notional per level
    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_quote_investment(mut self, quote: Decimal) -> Self {
        self.quote_investment = quote;
        self
    }

    pub fn with_base_investment(mut self, base: Decimal) -> Self {
        self.base_investment = base;
        self
    }

    pub fn with_profit_spread(mut self, spread: Decimal) -> Self {
        self.profit_spread = spread;
        self
    }

    pub fn with_compound(mut self, compound: bool) -> Self {
        self.compound = compound;
        self
    }

    pub fn with_earn_base(mut self, earn_base: bool) -> Self {
        self.earn_base = earn_base;
        self
    }

    /// Builder: open on the first candle trading through `price`
    pub fn with_trigger_price(mut self, price: Decimal) -> Self {
        self.trigger_price = Some(price);
        self
    }

    pub fn with_stop_loss_price(mut self, price: Decimal) -> Self {
        self.stop_loss_price = Some(price);
        self
    }

    pub fn with_take_profit_price(mut self, price: Decimal) -> Self {
        self.take_profit_price = Some(price);
        self
    }

    pub fn with_close_when_cancel_order(mut self, enabled: bool) -> Self {
        self.close_when_cancel_order = enabled;
        self
    }

    pub fn with_keep_orders_when_shutdown(mut self, enabled: bool) -> Self {
        self.keep_orders_when_shutdown = enabled;
        self
    }

    pub fn with_clear_open_orders_when_start(mut self, enabled: bool) -> Self {
        self.clear_open_orders_when_start = enabled;
        self
    }

    /// Load config from JSON file
    pub fn load_from_file(path: impl AsRef<Path>) -> GridResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save config to JSON file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> GridResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// 32-bit FNV-1a
fn fnv1a_32(data: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    data.iter().fold(OFFSET_BASIS, |hash, byte| (hash ^ u32::from(*byte)).wrapping_mul(PRIME))
}
