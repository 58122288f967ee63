//! Investment sizing: from capital configuration to a per-level order quantity
//!
//! Every function here is pure. The leg classifier walks the pins from the
//! highest to the lowest and decides, level by level, whether the grid posts a
//! sell (base available), a buy one pin lower (base exhausted), or a plain buy
//! (pin below the last trade price).

use log::{debug, info};
use rust_decimal::Decimal;

use super::errors::{GridError, GridResult};
use super::ladder::Pin;
use super::types::{Market, OrderSide};

/// Which capital configuration drives the quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingMode {
    /// Same quantity at every level
    Quantity(Decimal),
    /// Same notional at every level
    Amount(Decimal),
    /// Spread the quote investment over the buy legs
    QuoteInvestment(Decimal),
    /// Deploy both pools, taking the larger feasible quantity
    QuoteBaseInvestment { quote: Decimal, base: Decimal },
}

/// Per-level quantity rule produced by the sizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSizing {
    Quantity(Decimal),
    Amount(Decimal),
}

impl OrderSizing {
    pub fn quantity_at(&self, price: Decimal) -> Decimal {
        match self {
            OrderSizing::Quantity(quantity) => *quantity,
            OrderSizing::Amount(amount) => amount.checked_div(price).unwrap_or(Decimal::ZERO),
        }
    }
}

/// Investment targets against the balances read at open time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvestmentBudget {
    pub base_investment: Decimal,
    pub quote_investment: Decimal,
    pub base_balance: Decimal,
    pub quote_balance: Decimal,
}

/// One order slot of the ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Leg {
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
}

impl Leg {
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }
}

/// Base and quote a set of legs commits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvestmentRequirement {
    pub base: Decimal,
    pub quote: Decimal,
}

impl InvestmentRequirement {
    pub fn from_legs(legs: &[Leg]) -> Self {
        legs.iter().fold(Self::default(), |mut acc, leg| {
            match leg.side {
                OrderSide::Sell => acc.base += leg.quantity,
                OrderSide::Buy => acc.quote += leg.notional(),
            }
            acc
        })
    }
}

/// Classify every pin into a leg, highest pin first.
///
/// A pin at or above `last_price` sells while the cumulative sell quantity
/// stays within `base_balance`; past that it becomes a buy at the next lower
/// pin carrying the same quantity. The lowest pin never converts. A pin below
/// `last_price` buys unless a conversion already placed a buy at that price.
pub fn classify_legs<F>(
    pins: &[Pin],
    last_price: Decimal,
    base_balance: Decimal,
    quantity_at: F,
) -> Vec<Leg>
where
    F: Fn(Decimal) -> Decimal,
{
    let mut legs = Vec::with_capacity(pins.len());
    let mut used_base = Decimal::ZERO;
    let mut buy_placed_price: Option<Decimal> = None;

    for i in (0..pins.len()).rev() {
        let price = pins[i].price();
        let quantity = quantity_at(price);

        if price >= last_price {
            if used_base + quantity <= base_balance {
                used_base += quantity;
                legs.push(Leg {
                    side: OrderSide::Sell,
                    price,
                    quantity,
                });
            } else if i > 0 {
                let next_price = pins[i - 1].price();
                legs.push(Leg {
                    side: OrderSide::Buy,
                    price: next_price,
                    quantity,
                });
                buy_placed_price = Some(next_price);
            }
        } else {
            if buy_placed_price == Some(price) {
                continue;
            }
            legs.push(Leg {
                side: OrderSide::Buy,
                price,
                quantity,
            });
        }
    }

    legs
}

/// Fail when the requirement exceeds either balance, naming the short pool(s)
pub fn check_feasibility(
    market: &Market,
    required: &InvestmentRequirement,
    base_balance: Decimal,
    quote_balance: Decimal,
) -> GridResult<()> {
    let base_short = required.base > base_balance;
    let quote_short = required.quote > quote_balance;

    match (base_short, quote_short) {
        (true, true) => Err(GridError::InsufficientBaseAndQuote {
            base_currency: market.base_currency.clone(),
            base_required: required.base,
            base_available: base_balance,
            quote_currency: market.quote_currency.clone(),
            quote_required: required.quote,
            quote_available: quote_balance,
        }),
        (true, false) => Err(GridError::InsufficientBase {
            currency: market.base_currency.clone(),
            required: required.base,
            available: base_balance,
        }),
        (false, true) => Err(GridError::InsufficientQuote {
            currency: market.quote_currency.clone(),
            required: required.quote,
            available: quote_balance,
        }),
        (false, false) => Ok(()),
    }
}

/// Sizing calculator bound to one ladder and one last trade price
#[derive(Debug, Clone, Copy)]
pub struct InvestmentSizer<'a> {
    market: &'a Market,
    pins: &'a [Pin],
    last_price: Decimal,
}

impl<'a> InvestmentSizer<'a> {
    pub fn new(market: &'a Market, pins: &'a [Pin], last_price: Decimal) -> Self {
        Self {
            market,
            pins,
            last_price,
        }
    }

    /// Resolve the per-level quantity rule for `mode`
    pub fn size(&self, mode: SizingMode, budget: &InvestmentBudget) -> GridResult<OrderSizing> {
        let sizing = match mode {
            SizingMode::Quantity(quantity) => {
                self.required_by_quantity(quantity, budget.base_balance, budget.quote_balance)?;
                OrderSizing::Quantity(quantity)
            }
            SizingMode::Amount(amount) => {
                self.required_by_amount(amount, budget.base_balance, budget.quote_balance)?;
                OrderSizing::Amount(amount)
            }
            SizingMode::QuoteInvestment(quote) => {
                OrderSizing::Quantity(self.quote_investment_quantity(quote)?)
            }
            SizingMode::QuoteBaseInvestment { quote, base } => {
                OrderSizing::Quantity(self.quote_base_investment_quantity(quote, base)?)
            }
        };
        info!("[{}] sizing {:?} resolved to {:?}", self.market.symbol, mode, sizing);
        Ok(sizing)
    }

    /// Base and quote needed to post `quantity` at every level
    pub fn required_by_quantity(
        &self,
        quantity: Decimal,
        base_balance: Decimal,
        quote_balance: Decimal,
    ) -> GridResult<InvestmentRequirement> {
        let legs = classify_legs(self.pins, self.last_price, base_balance, |_| quantity);
        let required = InvestmentRequirement::from_legs(&legs);
        check_feasibility(self.market, &required, base_balance, quote_balance)?;
        Ok(required)
    }

    /// Base and quote needed to post `amount` of notional at every level
    pub fn required_by_amount(
        &self,
        amount: Decimal,
        base_balance: Decimal,
        quote_balance: Decimal,
    ) -> GridResult<InvestmentRequirement> {
        let sizing = OrderSizing::Amount(amount);
        let legs = classify_legs(self.pins, self.last_price, base_balance, |price| {
            sizing.quantity_at(price)
        });
        let required = InvestmentRequirement::from_legs(&legs);
        check_feasibility(self.market, &required, base_balance, quote_balance)?;
        Ok(required)
    }

    /// Sum of buy-leg prices when no base is committed
    fn total_buy_price(&self) -> Decimal {
        classify_legs(self.pins, self.last_price, Decimal::ZERO, |_| Decimal::ONE)
            .iter()
            .map(|leg| leg.price)
            .sum()
    }

    /// q such that the buy legs, each posting q, consume exactly `quote_investment`
    pub fn quote_investment_quantity(&self, quote_investment: Decimal) -> GridResult<Decimal> {
        let total_price = self.total_buy_price();
        quote_investment.checked_div(total_price).ok_or_else(|| {
            GridError::InvalidInvestment(format!(
                "no buy legs to spread quote investment {} over",
                quote_investment
            ))
        })
    }

    /// Larger of the base-constrained and quote-constrained quantity
    pub fn quote_base_investment_quantity(
        &self,
        quote_investment: Decimal,
        base_investment: Decimal,
    ) -> GridResult<Decimal> {
        let sell_orders = self
            .pins
            .iter()
            .rev()
            .take_while(|pin| pin.price() >= self.last_price)
            .count() as u64;

        let min_base_quantity = self
            .market
            .min_notional
            .checked_div(self.last_price)
            .unwrap_or(Decimal::ZERO)
            .max(self.market.min_quantity);

        // shrink the assumed sell count until each sell clears the exchange minimums
        let mut max_sell_orders = sell_orders + 1;
        let mut max_base_quantity = Decimal::ZERO;
        while max_base_quantity <= self.market.min_quantity
            || max_base_quantity <= min_base_quantity
        {
            max_sell_orders -= 1;
            if max_sell_orders == 0 {
                break;
            }
            max_base_quantity = base_investment / Decimal::from(max_sell_orders);
        }
        debug!(
            "[{}] base investment sells {} of {} at quantity {} (min {})",
            self.market.symbol, max_sell_orders, sell_orders, max_base_quantity, min_base_quantity
        );

        let quote_quantity = quote_investment
            .checked_div(self.total_buy_price())
            .unwrap_or(Decimal::ZERO);

        let quantity = if max_sell_orders > 0 {
            quote_quantity.max(max_base_quantity)
        } else {
            quote_quantity
        };

        if quantity <= Decimal::ZERO {
            return Err(GridError::InvalidInvestment(format!(
                "quote {} / base {} investment yields no tradable quantity",
                quote_investment, base_investment
            )));
        }
        Ok(quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::ladder::Grid;
    use rust_decimal_macros::dec;

    fn market() -> Market {
        Market {
            symbol: "BTCUSDT".into(),
            base_currency: "BTC".into(),
            quote_currency: "USDT".into(),
            tick_size: dec!(1),
            min_quantity: dec!(0.1),
            min_notional: dec!(10),
        }
    }

    fn grid() -> Grid {
        Grid::new(dec!(90), dec!(110), 4, dec!(1))
    }

    fn summary(legs: &[Leg]) -> Vec<(OrderSide, Decimal)> {
        legs.iter().map(|l| (l.side, l.price)).collect()
    }

    #[test]
    fn test_classify_without_base_converts_sells() {
        let grid = grid();
        let legs = classify_legs(grid.pins(), dec!(100), dec!(0), |_| dec!(1));
        assert_eq!(
            summary(&legs),
            vec![
                (OrderSide::Buy, dec!(105)),
                (OrderSide::Buy, dec!(100)),
                (OrderSide::Buy, dec!(95)),
                (OrderSide::Buy, dec!(90)),
            ]
        );
    }

    #[test]
    fn test_classify_with_partial_base() {
        let grid = grid();
        let legs = classify_legs(grid.pins(), dec!(100), dec!(2), |_| dec!(1));
        assert_eq!(
            summary(&legs),
            vec![
                (OrderSide::Sell, dec!(110)),
                (OrderSide::Sell, dec!(105)),
                (OrderSide::Buy, dec!(95)),
                (OrderSide::Buy, dec!(90)),
            ]
        );

        let required = InvestmentRequirement::from_legs(&legs);
        assert_eq!(required.base, dec!(2));
        assert_eq!(required.quote, dec!(185));
    }

    #[test]
    fn test_lowest_pin_never_converts() {
        let grid = grid();
        let legs = classify_legs(grid.pins(), dec!(80), dec!(0), |_| dec!(1));
        assert_eq!(legs.len(), 4);
        assert!(legs.iter().all(|l| l.side == OrderSide::Buy));
        assert!(!legs.iter().any(|l| l.price == dec!(110)));
    }

    #[test]
    fn test_feasibility_names_short_pools() {
        let market = market();
        let required = InvestmentRequirement {
            base: dec!(2),
            quote: dec!(300),
        };

        assert!(check_feasibility(&market, &required, dec!(2), dec!(300)).is_ok());

        match check_feasibility(&market, &required, dec!(1), dec!(100)) {
            Err(GridError::InsufficientBaseAndQuote { base_required, quote_required, .. }) => {
                assert_eq!(base_required, dec!(2));
                assert_eq!(quote_required, dec!(300));
            }
            other => panic!("unexpected {:?}", other),
        }

        match check_feasibility(&market, &required, dec!(1), dec!(1000)) {
            Err(GridError::InsufficientBase { currency, .. }) => assert_eq!(currency, "BTC"),
            other => panic!("unexpected {:?}", other),
        }

        match check_feasibility(&market, &required, dec!(5), dec!(299.99)) {
            Err(GridError::InsufficientQuote { currency, required, available }) => {
                assert_eq!(currency, "USDT");
                assert_eq!(required, dec!(300));
                assert_eq!(available, dec!(299.99));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_required_by_quantity() {
        let market = market();
        let grid = grid();
        let sizer = InvestmentSizer::new(&market, grid.pins(), dec!(100));

        let required = sizer.required_by_quantity(dec!(1), dec!(2), dec!(200)).unwrap();
        assert_eq!(required.base, dec!(2));
        assert_eq!(required.quote, dec!(185));

        let err = sizer.required_by_quantity(dec!(1), dec!(2), dec!(100)).unwrap_err();
        assert!(matches!(err, GridError::InsufficientQuote { .. }));
        assert!(err.is_insufficient_balance());
    }

    #[test]
    fn test_required_by_amount_commits_equal_notional() {
        let market = market();
        let grid = grid();
        let sizer = InvestmentSizer::new(&market, grid.pins(), dec!(100));

        let required = sizer.required_by_amount(dec!(100), dec!(10), dec!(1000)).unwrap();
        // buys at 95 and 90 each commit ~100 of quote
        assert!((required.quote - dec!(200)).abs() < dec!(0.000001));
        let expected_base = dec!(100) / dec!(110) + dec!(100) / dec!(105) + dec!(1);
        assert!((required.base - expected_base).abs() < dec!(0.000001));
    }

    #[test]
    fn test_quote_investment_quantity() {
        let market = market();
        let grid = grid();
        let sizer = InvestmentSizer::new(&market, grid.pins(), dec!(100));

        // buy legs at 105, 100, 95, 90
        assert_eq!(sizer.quote_investment_quantity(dec!(390)).unwrap(), dec!(1));
        assert_eq!(sizer.quote_investment_quantity(dec!(780)).unwrap(), dec!(2));
    }

    #[test]
    fn test_quote_base_investment_prefers_larger_pool() {
        let market = market();
        let grid = grid();
        let sizer = InvestmentSizer::new(&market, grid.pins(), dec!(100));

        // three sell pins; 6 base over 3 sells is 2 per level
        assert_eq!(sizer.quote_base_investment_quantity(dec!(390), dec!(6)).unwrap(), dec!(2));

        // 0.25 base only clears the 0.1 minimum across 2 sells
        assert_eq!(
            sizer.quote_base_investment_quantity(dec!(39), dec!(0.25)).unwrap(),
            dec!(0.125)
        );
    }

    #[test]
    fn test_quote_base_investment_falls_back_to_quote_side() {
        let market = market();
        let grid = grid();
        let sizer = InvestmentSizer::new(&market, grid.pins(), dec!(100));

        assert_eq!(sizer.quote_base_investment_quantity(dec!(39), dec!(0.05)).unwrap(), dec!(0.1));
    }

    #[test]
    fn test_sizing_is_idempotent() {
        let market = market();
        let grid = grid();
        let sizer = InvestmentSizer::new(&market, grid.pins(), dec!(100));
        let budget = InvestmentBudget {
            base_investment: dec!(1),
            quote_investment: dec!(390),
            base_balance: dec!(5),
            quote_balance: dec!(1000),
        };

        let modes = [
            SizingMode::Quantity(dec!(1)),
            SizingMode::Amount(dec!(100)),
            SizingMode::QuoteInvestment(dec!(390)),
            SizingMode::QuoteBaseInvestment {
                quote: dec!(390),
                base: dec!(1),
            },
        ];
        for mode in modes {
            let first = sizer.size(mode, &budget).unwrap();
            let second = sizer.size(mode, &budget).unwrap();
            assert_eq!(first, second);
        }
        assert_eq!(grid.pins().len(), 5);
    }

    #[test]
    fn test_order_sizing_amount() {
        let sizing = OrderSizing::Amount(dec!(100));
        assert_eq!(sizing.quantity_at(dec!(50)), dec!(2));
        assert_eq!(OrderSizing::Quantity(dec!(3)).quantity_at(dec!(50)), dec!(3));
    }
}
