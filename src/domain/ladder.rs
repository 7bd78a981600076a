//! Order ladder generation.
//!
//! Splits a target quantity into a staircase of limit orders spaced evenly
//! between two prices. Sizes grow arithmetically by `mult - 1` of the first
//! size per step; the last step absorbs whatever is left so the ladder adds
//! up to the target exactly ("dust sweep").
//!
//! Two denominations are supported:
//! - `Base`: `start_with_size` and `size` count the asset being sold.
//! - `Quote`: they count the quote asset being spent. Each step still
//!   carries a base-asset size of `start_with_size / start_at_price`
//!   scaled by the growth factor, and the sweep makes the total quote
//!   value match.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::order::{Order, Precision};
use super::precision;

/// Hard cap on ladder length; reaching it means the inputs cannot converge.
pub const MAX_STEPS: usize = 10_000;

/// Invalid ladder input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LadderError {
    #[error("{0} must be positive")]
    NotPositive(&'static str),
    #[error("--mult is invalid. valid values are between 1 and 2")]
    Multiplier(Decimal),
    #[error("start and stop price must differ")]
    EmptyRange,
    #[error("ladder does not reach {target} within {MAX_STEPS} steps")]
    NoConvergence { target: Decimal },
    #[error("ladder quantities exceed the decimal range")]
    Overflow,
}

/// Unit in which `start_with_size` and `size` are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Denomination {
    /// Quantities of the traded asset.
    Base,
    /// Quantities of the quote asset.
    Quote,
}

/// Inputs of one ladder computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LadderParams {
    pub start_at_price: Decimal,
    pub stop_at_price: Decimal,
    pub start_with_size: Decimal,
    pub mult: Decimal,
    pub size: Decimal,
    pub denomination: Denomination,
}

/// One rung of the ladder, rounded to market precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LadderStep {
    /// Zero-based position in the ladder.
    pub index: usize,
    pub order: Order,
}

/// Summed base size and quote value of a set of orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Totals {
    pub size: Decimal,
    pub value: Decimal,
}

impl Totals {
    fn add(self, order: &Order) -> Result<Self, LadderError> {
        let value = order.value().ok_or(LadderError::Overflow)?;
        Ok(Self {
            size: self.size.checked_add(order.size).ok_or(LadderError::Overflow)?,
            value: self.value.checked_add(value).ok_or(LadderError::Overflow)?,
        })
    }

    fn of(orders: &[Order]) -> Result<Self, LadderError> {
        orders.iter().try_fold(Self::default(), Self::add)
    }
}

/// A generated ladder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ladder {
    steps: Vec<LadderStep>,
    unrounded: Vec<Order>,
    exact: Totals,
    rounded: Totals,
}

impl Ladder {
    /// Rounded steps in submission order.
    pub fn steps(&self) -> &[LadderStep] {
        &self.steps
    }

    /// Number of orders in the ladder.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the ladder holds no orders (never true for a generated ladder).
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Orders before rounding; the dust sweep operates on these.
    pub fn unrounded(&self) -> &[Order] {
        &self.unrounded
    }

    /// Sum of unrounded base sizes.
    pub fn total_size(&self) -> Decimal {
        self.exact.size
    }

    /// Sum of unrounded quote values.
    pub fn total_value(&self) -> Decimal {
        self.exact.value
    }

    /// Totals of the rounded orders as they are submitted.
    pub fn rounded_totals(&self) -> Totals {
        self.rounded
    }
}

impl LadderParams {
    /// Check the inputs before any computation.
    pub fn validate(&self) -> Result<(), LadderError> {
        for (name, value) in [
            ("start-at-price", self.start_at_price),
            ("stop-at-price", self.stop_at_price),
            ("start-with-size", self.start_with_size),
            ("size", self.size),
        ] {
            if value <= Decimal::ZERO {
                return Err(LadderError::NotPositive(name));
            }
        }
        if self.mult <= Decimal::ONE || self.mult >= Decimal::TWO {
            return Err(LadderError::Multiplier(self.mult));
        }
        if self.start_at_price == self.stop_at_price {
            return Err(LadderError::EmptyRange);
        }
        Ok(())
    }

    /// Base-asset size of the first order.
    pub fn first_size(&self) -> Result<Decimal, LadderError> {
        match self.denomination {
            Denomination::Base => Ok(self.start_with_size),
            Denomination::Quote => self
                .start_with_size
                .checked_div(self.start_at_price)
                .ok_or(LadderError::Overflow),
        }
    }

    /// Geometric base size of step `index`, before any dust sweep.
    pub fn size_at(&self, index: usize) -> Result<Decimal, LadderError> {
        let growth = Decimal::ONE + Decimal::from(index) * (self.mult - Decimal::ONE);
        self.first_size()?.checked_mul(growth).ok_or(LadderError::Overflow)
    }

    /// Price of step `index` in a ladder spaced by `delta`.
    fn price_at(&self, index: usize, delta: Decimal) -> Result<Decimal, LadderError> {
        Decimal::from(index)
            .checked_mul(delta)
            .and_then(|offset| self.start_at_price.checked_add(offset))
            .ok_or(LadderError::Overflow)
    }

    /// Price spacing for a ladder of `steps` orders.
    pub fn delta(&self, steps: usize) -> Decimal {
        if steps < 2 {
            return Decimal::ZERO;
        }
        (self.stop_at_price - self.start_at_price) / Decimal::from(steps - 1)
    }

    /// Cumulative quantity (in the params' denomination) that `steps`
    /// geometric orders would cover, without a dust sweep.
    pub fn simulate(&self, steps: usize) -> Result<Decimal, LadderError> {
        self.cumulative(steps, steps)
    }

    /// Quantity covered by the first `orders` orders of a `steps` ladder.
    ///
    /// With `g = mult - 1` and `d` the spacing, order `i` holds
    /// `first * (1 + i*g)` base, priced at `p0 + i*d`. Both sums have
    /// closed forms, so this is constant time in `orders`.
    fn cumulative(&self, orders: usize, steps: usize) -> Result<Decimal, LadderError> {
        if orders == 0 {
            return Ok(Decimal::ZERO);
        }
        let n = Decimal::from(orders);
        let growth = self.mult - Decimal::ONE;
        // Σi and Σi² over 0..n
        let sum_i = n * (n - Decimal::ONE) / Decimal::TWO;
        let sum_i2 = sum_i * (Decimal::TWO * n - Decimal::ONE) / Decimal::from(3);
        let weights = n + growth * sum_i;

        let units = match self.denomination {
            Denomination::Base => Some(weights),
            Denomination::Quote => {
                // Σ(1 + i*g)(p0 + i*d) = p0*Σ(1 + i*g) + d*Σ(i + i²*g)
                let spread = sum_i + growth * sum_i2;
                self.start_at_price
                    .checked_mul(weights)
                    .zip(self.delta(steps).checked_mul(spread))
                    .and_then(|(level, slope)| level.checked_add(slope))
            }
        };
        units
            .and_then(|units| units.checked_mul(self.first_size().ok()?))
            .ok_or(LadderError::Overflow)
    }

    /// Smallest step count (at least 2) whose simulation reaches `size`.
    ///
    /// When the first order alone already covers the target the ladder
    /// degenerates to a single order. For quote sizes the count drops by
    /// one when the remainder left for the last order would not be positive.
    pub fn step_count(&self) -> Result<usize, LadderError> {
        if self.start_with_size >= self.size {
            return Ok(1);
        }
        let mut steps = 2;
        while self.simulate(steps)? < self.size {
            steps += 1;
            if steps > MAX_STEPS {
                return Err(LadderError::NoConvergence { target: self.size });
            }
        }
        if steps > 2 && !self.sweep_fits(steps)? {
            // the last order of a shorter ladder absorbs the remainder instead
            steps -= 1;
        }
        Ok(steps)
    }

    /// Whether the first `steps - 1` orders of a `steps` ladder stay below
    /// the target, leaving a positive remainder for the last one.
    ///
    /// Always true for base sizes. Quote values depend on the price spacing,
    /// which tightens as steps are added.
    pub fn sweep_fits(&self, steps: usize) -> Result<bool, LadderError> {
        Ok(self.cumulative(steps.saturating_sub(1), steps)? < self.size)
    }

    /// Validate, size and compute the full ladder.
    pub fn generate(&self, precision: Precision) -> Result<Ladder, LadderError> {
        self.validate()?;
        let steps = self.step_count()?;
        self.generate_with_steps(steps, precision)
    }

    /// Compute a ladder with an explicit number of steps.
    pub fn generate_with_steps(
        &self,
        steps: usize,
        precision: Precision,
    ) -> Result<Ladder, LadderError> {
        let steps = steps.max(1);
        let delta = self.delta(steps);

        let mut unrounded = Vec::with_capacity(steps);
        let mut cumulative = Decimal::ZERO;

        for index in 0..steps {
            let price = self.price_at(index, delta)?;
            if price <= Decimal::ZERO {
                return Err(LadderError::NoConvergence { target: self.size });
            }
            let size = if index == steps - 1 {
                // sweep the dust into the last order
                let remainder = self.size - cumulative;
                match self.denomination {
                    Denomination::Base => remainder,
                    Denomination::Quote => {
                        remainder.checked_div(price).ok_or(LadderError::Overflow)?
                    }
                }
            } else {
                self.size_at(index)?
            };
            if size <= Decimal::ZERO {
                return Err(LadderError::NoConvergence { target: self.size });
            }
            let covered = match self.denomination {
                Denomination::Base => Some(size),
                Denomination::Quote => size.checked_mul(price),
            };
            cumulative = covered
                .and_then(|covered| cumulative.checked_add(covered))
                .ok_or(LadderError::Overflow)?;
            unrounded.push(Order { price, size });
        }

        let steps: Vec<LadderStep> = unrounded
            .iter()
            .enumerate()
            .map(|(index, order)| LadderStep {
                index,
                order: Order {
                    price: precision::round(order.price, precision.price),
                    size: precision::round(order.size, precision.size),
                },
            })
            .collect();

        let exact = Totals::of(&unrounded)?;
        let rounded: Vec<Order> = steps.iter().map(|step| step.order).collect();
        let rounded = Totals::of(&rounded)?;

        Ok(Ladder {
            steps,
            unrounded,
            exact,
            rounded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sell(start_with_size: Decimal, mult: Decimal, size: Decimal) -> LadderParams {
        LadderParams {
            start_at_price: dec!(100),
            stop_at_price: dec!(200),
            start_with_size,
            mult,
            size,
            denomination: Denomination::Base,
        }
    }

    const PREC: Precision = Precision { price: 2, size: 8 };

    #[test]
    fn sizes_sum_to_target() {
        let ladder = sell(dec!(0.1), dec!(1.1), dec!(1.0)).generate(PREC).unwrap();
        assert_eq!(ladder.total_size(), dec!(1.0));
    }

    #[test]
    fn step_count_is_minimal() {
        let params = sell(dec!(1), dec!(1.05), dec!(10));
        let steps = params.step_count().unwrap();
        assert!(params.simulate(steps).unwrap() >= dec!(10));
        assert!(params.simulate(steps - 1).unwrap() < dec!(10));
        // 1 + 1.05 + 1.1 + ... : nine orders cover 10.8
        assert_eq!(steps, 9);
    }

    #[test]
    fn single_order_when_first_covers_target() {
        let ladder = sell(dec!(5), dec!(1.5), dec!(3)).generate(PREC).unwrap();
        assert_eq!(ladder.len(), 1);
        assert_eq!(ladder.steps()[0].order, Order { price: dec!(100), size: dec!(3) });
    }

    #[test]
    fn prices_are_evenly_spaced() {
        // 1 + 1.5 + 2 + 2.5 covers 5 in four orders, so the spacing is 100
        let mut params = sell(dec!(1), dec!(1.5), dec!(5));
        params.stop_at_price = dec!(400);
        let ladder = params.generate(PREC).unwrap();
        let prices: Vec<_> = ladder.unrounded().iter().map(|o| o.price).collect();
        assert_eq!(prices, vec![dec!(100), dec!(200), dec!(300), dec!(400)]);
        let delta = prices[1] - prices[0];
        assert!(prices.windows(2).all(|w| w[1] - w[0] == delta));
    }

    #[test]
    fn descending_range_for_buys() {
        let params = LadderParams {
            start_at_price: dec!(50),
            stop_at_price: dec!(40),
            start_with_size: dec!(100),
            mult: dec!(1.05),
            size: dec!(1000),
            denomination: Denomination::Quote,
        };
        let ladder = params.generate(Precision { price: 4, size: 6 }).unwrap();
        assert!(ladder.unrounded().windows(2).all(|w| w[1].price < w[0].price));
        assert_eq!(ladder.unrounded()[0].size, dec!(2));
        let drift = (ladder.total_value() - dec!(1000)).abs();
        assert!(drift < dec!(0.000000001), "drift {drift}");
    }

    #[test]
    fn quote_ladders_leave_a_positive_last_order() {
        for size in (200..5000).step_by(37) {
            let params = LadderParams {
                start_at_price: dec!(2000),
                stop_at_price: dec!(1500),
                start_with_size: dec!(100),
                mult: dec!(1.05),
                size: Decimal::from(size),
                denomination: Denomination::Quote,
            };
            let steps = params.step_count().unwrap();
            assert!(params.sweep_fits(steps).unwrap(), "size {size}");
            let ladder = params.generate(PREC).unwrap();
            assert!(ladder.unrounded().iter().all(|o| o.size > Decimal::ZERO));
        }
    }

    #[test]
    fn rounding_applies_after_sweep() {
        let ladder = sell(dec!(0.123456789), dec!(1.1), dec!(1)).generate(Precision {
            price: 0,
            size: 3,
        })
        .unwrap();
        for step in ladder.steps() {
            assert!(step.order.size.scale() <= 3);
            assert!(step.order.price.scale() == 0);
        }
        assert_eq!(ladder.total_size(), dec!(1));
    }

    #[test]
    fn closed_form_matches_summed_orders() {
        let params = LadderParams {
            start_at_price: dec!(2000),
            stop_at_price: dec!(1500),
            start_with_size: dec!(100),
            mult: dec!(1.05),
            size: dec!(3000),
            denomination: Denomination::Quote,
        };
        let delta = params.delta(7);
        let summed: Decimal = (0..7)
            .map(|i| params.size_at(i).unwrap() * (params.start_at_price + Decimal::from(i) * delta))
            .sum();
        let drift = (params.cumulative(7, 7).unwrap() - summed).abs();
        assert!(drift < dec!(0.000000000001), "drift {drift}");

        let base = sell(dec!(1), dec!(1.05), dec!(10));
        // 1 + 1.05 + 1.1 + 1.15
        assert_eq!(base.simulate(4).unwrap(), dec!(4.30));
    }

    #[test]
    fn unreachable_target_fails_fast() {
        let params = LadderParams {
            start_at_price: dec!(100),
            stop_at_price: dec!(200),
            start_with_size: dec!(0.0001),
            mult: dec!(1.01),
            size: dec!(1000000),
            denomination: Denomination::Quote,
        };
        let started = std::time::Instant::now();
        assert_eq!(
            params.generate(PREC),
            Err(LadderError::NoConvergence { target: dec!(1000000) })
        );
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn huge_values_overflow_into_an_error() {
        let params = LadderParams {
            start_at_price: dec!(1000000000000000),
            stop_at_price: dec!(2000000000000000),
            start_with_size: dec!(10000000000000),
            mult: dec!(1.5),
            size: dec!(100000000000000),
            denomination: Denomination::Base,
        };
        assert_eq!(params.generate(PREC), Err(LadderError::Overflow));
    }

    #[test]
    fn rounded_totals_follow_submitted_orders() {
        let ladder = sell(dec!(1), dec!(1.5), dec!(5)).generate(Precision { price: 0, size: 0 }).unwrap();
        let totals = ladder.rounded_totals();
        let sizes: Decimal = ladder.steps().iter().map(|s| s.order.size).sum();
        assert_eq!(totals.size, sizes);
        assert_eq!(ladder.total_size(), dec!(5));
    }

    #[test]
    fn validation() {
        assert_eq!(
            sell(dec!(1), dec!(2), dec!(10)).validate(),
            Err(LadderError::Multiplier(dec!(2)))
        );
        assert_eq!(
            sell(dec!(1), dec!(1), dec!(10)).validate(),
            Err(LadderError::Multiplier(dec!(1)))
        );
        assert_eq!(
            sell(dec!(0), dec!(1.1), dec!(10)).validate(),
            Err(LadderError::NotPositive("start-with-size"))
        );
        let mut flat = sell(dec!(1), dec!(1.1), dec!(10));
        flat.stop_at_price = flat.start_at_price;
        assert_eq!(flat.validate(), Err(LadderError::EmptyRange));
    }
}
