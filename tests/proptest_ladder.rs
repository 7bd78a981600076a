//! Property-Based Tests - Ladder and Precision Invariants
//!
//! Uses `proptest` to check that generated ladders conserve the requested
//! quantity, use the fewest steps, and space prices evenly.

use proptest::prelude::*;
use rust_decimal::Decimal;

use ladder::domain::precision;
use ladder::domain::{Denomination, LadderParams, Precision};

const PREC: Precision = Precision { price: 2, size: 8 };

/// Sizes in tenths, multiplier in hundredths above 1, target as a
/// multiple of the first size.
fn params(
    start_tenths: u32,
    mult_hundredths: u32,
    factor: u32,
    low: u32,
    span: u32,
    denomination: Denomination,
) -> LadderParams {
    let start_with_size = Decimal::new(i64::from(start_tenths), 1);
    LadderParams {
        start_at_price: Decimal::from(low),
        stop_at_price: Decimal::from(low + span),
        start_with_size,
        mult: Decimal::ONE + Decimal::new(i64::from(mult_hundredths), 2),
        size: start_with_size * Decimal::from(factor),
        denomination,
    }
}

// ── Ladder Properties ───────────────────────────────────────

proptest! {
    /// Base-denominated sizes add up to the target exactly.
    #[test]
    fn sizes_conserve_target(
        start in 1u32..1000,
        mult in 1u32..100,
        factor in 1u32..40,
        low in 1u32..1000,
        span in 1u32..1000,
    ) {
        let params = params(start, mult, factor, low, span, Denomination::Base);
        let ladder = params.generate(PREC).unwrap();
        prop_assert_eq!(ladder.total_size(), params.size);
    }

    /// Quote-denominated ladders spend the target up to division error.
    #[test]
    fn values_conserve_target(
        start in 1u32..1000,
        mult in 1u32..100,
        factor in 1u32..40,
        low in 100u32..1000,
        span in 1u32..100,
    ) {
        let mut params = params(start, mult, factor, low, span, Denomination::Quote);
        std::mem::swap(&mut params.start_at_price, &mut params.stop_at_price);
        // the first order must still fit under the target in quote terms
        prop_assume!(params.start_with_size < params.size);
        let ladder = params.generate(PREC).unwrap();
        let drift = (ladder.total_value() - params.size).abs();
        prop_assert!(drift < Decimal::new(1, 12), "drift {drift}");
    }

    /// No smaller step count (down to 2) would have reached the target.
    #[test]
    fn step_count_is_minimal(
        start in 1u32..1000,
        mult in 1u32..100,
        factor in 1u32..40,
    ) {
        let params = params(start, mult, factor, 10, 100, Denomination::Base);
        let steps = params.step_count().unwrap();
        if params.start_with_size >= params.size {
            prop_assert_eq!(steps, 1);
        } else {
            prop_assert!(steps >= 2);
            prop_assert!(params.simulate(steps).unwrap() >= params.size);
            if steps > 2 {
                prop_assert!(params.simulate(steps - 1).unwrap() < params.size);
            }
        }
    }

    /// Prices move strictly in one direction with a constant delta.
    #[test]
    fn prices_evenly_spaced(
        start in 1u32..100,
        mult in 1u32..100,
        factor in 2u32..40,
        low in 1u32..1000,
        span in 1u32..1000,
        descending in any::<bool>(),
    ) {
        let mut params = params(start, mult, factor, low, span, Denomination::Base);
        if descending {
            std::mem::swap(&mut params.start_at_price, &mut params.stop_at_price);
        }
        let ladder = params.generate(PREC).unwrap();
        let prices: Vec<Decimal> = ladder.unrounded().iter().map(|o| o.price).collect();
        let delta = params.delta(prices.len());
        for pair in prices.windows(2) {
            prop_assert_eq!(pair[1] - pair[0], delta);
            if descending {
                prop_assert!(pair[1] < pair[0]);
            } else {
                prop_assert!(pair[1] > pair[0]);
            }
        }
        prop_assert_eq!(prices.first().copied(), Some(params.start_at_price));
    }
}

// ── Precision Properties ────────────────────────────────────

proptest! {
    /// Rounding twice to the same places changes nothing.
    #[test]
    fn rounding_is_idempotent(mantissa in any::<i64>(), scale in 0u32..18, places in 0u32..12) {
        let value = Decimal::new(mantissa, scale);
        let once = precision::round(value, places);
        prop_assert_eq!(precision::round(once, places), once);
        prop_assert!(once.scale() <= places);
    }

    /// A step string with `n` leading fractional zeros has `n + 1` places.
    #[test]
    fn step_strings_parse(zeros in 0usize..12, trailing in 0usize..8) {
        let step = format!("0.{}1{}", "0".repeat(zeros), "0".repeat(trailing));
        prop_assert_eq!(precision::parse(&step), u32::try_from(zeros + 1).unwrap());
        let whole = format!("1.{}", "0".repeat(zeros + trailing));
        prop_assert_eq!(precision::parse(&whole), 0);
    }
}
