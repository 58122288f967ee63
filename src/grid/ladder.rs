//! Price ladder: the pins a grid posts orders at
//!
//! Pins are generated arithmetically between the lower and upper bound and
//! floored to the market tick size. The ladder can only grow: extending a
//! bound appends or prepends pins and never touches the existing ones.

use std::collections::HashSet;
use std::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::types::truncate_to_tick;

/// A single price level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pin(pub Decimal);

impl Pin {
    pub fn price(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Ascending sequence of pins over `[lower_price, upper_price]`
#[derive(Debug, Clone)]
pub struct Grid {
    lower_price: Decimal,
    upper_price: Decimal,
    /// Level count; recomputed by floor division when a bound is extended
    size: Decimal,
    tick_size: Decimal,
    pins: Vec<Pin>,
    pin_set: HashSet<Pin>,
}

impl Grid {
    pub fn new(lower_price: Decimal, upper_price: Decimal, size: u64, tick_size: Decimal) -> Self {
        let mut grid = Self {
            lower_price,
            upper_price,
            size: Decimal::from(size),
            tick_size,
            pins: Vec::new(),
            pin_set: HashSet::new(),
        };
        grid.pins = grid.calculate_pins(size);
        grid.rebuild_pin_set();
        grid
    }

    fn calculate_pins(&self, size: u64) -> Vec<Pin> {
        let mut pins: Vec<Pin> = Vec::with_capacity(size as usize + 1);
        if size == 0 || self.upper_price < self.lower_price {
            return pins;
        }

        let height = self.height();
        let levels = Decimal::from(size);
        for i in 0..=size {
            // multiply before dividing so the last step lands exactly on the upper bound
            let price = self.lower_price + height * Decimal::from(i) / levels;
            if price > self.upper_price {
                break;
            }
            self.push_ascending(&mut pins, price);
        }
        pins
    }

    /// Truncate `price` and push it if it keeps `pins` strictly ascending
    fn push_ascending(&self, pins: &mut Vec<Pin>, price: Decimal) -> Option<Pin> {
        let pin = Pin(truncate_to_tick(price, self.tick_size));
        match pins.last() {
            Some(last) if pin <= *last => None,
            _ => {
                pins.push(pin);
                Some(pin)
            }
        }
    }

    fn rebuild_pin_set(&mut self) {
        self.pin_set = self.pins.iter().copied().collect();
    }

    pub fn lower_price(&self) -> Decimal {
        self.lower_price
    }

    pub fn upper_price(&self) -> Decimal {
        self.upper_price
    }

    pub fn size(&self) -> Decimal {
        self.size
    }

    pub fn tick_size(&self) -> Decimal {
        self.tick_size
    }

    pub fn pins(&self) -> &[Pin] {
        &self.pins
    }

    pub fn height(&self) -> Decimal {
        self.upper_price - self.lower_price
    }

    /// Distance between adjacent pins; zero for a grid without levels
    pub fn spread(&self) -> Decimal {
        self.height().checked_div(self.size).unwrap_or(Decimal::ZERO)
    }

    pub fn above(&self, price: Decimal) -> bool {
        price > self.upper_price
    }

    pub fn below(&self, price: Decimal) -> bool {
        price < self.lower_price
    }

    pub fn out_of_range(&self, price: Decimal) -> bool {
        self.above(price) || self.below(price)
    }

    pub fn has_pin(&self, pin: Pin) -> bool {
        self.pin_set.contains(&pin)
    }

    pub fn has_price(&self, price: Decimal) -> bool {
        self.has_pin(Pin(price))
    }

    /// Raise the upper bound and append the pins that now fit above the last one.
    /// Returns the appended pins; a bound that does not widen the grid is a no-op.
    pub fn extend_upper_price(&mut self, upper_price: Decimal) -> Vec<Pin> {
        let spread = self.spread();
        if upper_price <= self.upper_price || spread <= Decimal::ZERO {
            return Vec::new();
        }

        self.upper_price = upper_price;
        self.size = (self.height() / spread).floor();

        let Some(start) = self.pins.last().copied() else {
            return Vec::new();
        };

        let mut added: Vec<Pin> = Vec::new();
        let mut ladder = vec![start];
        let mut step = Decimal::ONE;
        loop {
            let price = start.0 + spread * step;
            if price > upper_price {
                break;
            }
            if let Some(pin) = self.push_ascending(&mut ladder, price) {
                added.push(pin);
            }
            step += Decimal::ONE;
        }

        self.pins.extend_from_slice(&added);
        self.rebuild_pin_set();
        added
    }

    /// Lower the lower bound and prepend whole spreads below the first pin.
    /// Returns the prepended pins in ascending order.
    pub fn extend_lower_price(&mut self, lower_price: Decimal) -> Vec<Pin> {
        let spread = self.spread();
        if lower_price >= self.lower_price || spread <= Decimal::ZERO {
            return Vec::new();
        }

        self.lower_price = lower_price;
        self.size = (self.height() / spread).floor();

        let Some(first) = self.pins.first().copied() else {
            return Vec::new();
        };

        let num_to_add = ((first.0 - lower_price) / spread).floor().to_u64().unwrap_or(0);
        if num_to_add == 0 {
            return Vec::new();
        }

        let mut added: Vec<Pin> = Vec::with_capacity(num_to_add as usize);
        for k in (1..=num_to_add).rev() {
            let price = first.0 - spread * Decimal::from(k);
            if truncate_to_tick(price, self.tick_size) < first.0 {
                self.push_ascending(&mut added, price);
            }
        }

        let mut pins = added.clone();
        pins.extend_from_slice(&self.pins);
        self.pins = pins;
        self.rebuild_pin_set();
        added
    }

    /// Nearest pin strictly above `price`
    pub fn next_higher_pin(&self, price: Decimal) -> Option<Pin> {
        self.pins.iter().find(|pin| pin.0 > price).copied()
    }

    /// Nearest pin strictly below `price`
    pub fn next_lower_pin(&self, price: Decimal) -> Option<Pin> {
        self.pins.iter().rev().find(|pin| pin.0 < price).copied()
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "grid [{} .. {}] size={} spread={} pins=[",
            self.lower_price,
            self.upper_price,
            self.size,
            self.spread()
        )?;
        for (i, pin) in self.pins.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", pin)?;
        }
        f.write_str("]")
    }
}
