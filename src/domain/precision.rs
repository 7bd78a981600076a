//! Decimal precision helpers.
//!
//! Venues describe precision as step strings (`"0.00010000"`) or token
//! decimals. Prices and sizes are rounded to those places before they leave
//! the process, and on-chain amounts are carried as integers scaled by the
//! token's decimals.

use alloy::primitives::U256;
use rust_decimal::Decimal;
use thiserror::Error;

/// Significant digits a [`Decimal`] can hold.
const DECIMAL_DIGITS: usize = 28;

/// Failure converting between decimal and scaled on-chain amounts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount {0} is negative")]
    Negative(Decimal),
    #[error("cannot convert {0} to an integer amount")]
    NotAnInteger(String),
    #[error("amount {0} does not fit in a decimal")]
    Overflow(String),
}

/// Number of decimal places implied by a step string.
///
/// Returns the position of the first non-zero digit after the decimal
/// point, or 0 when there is none: `"0.00010000"` gives 4 and
/// `"1.00000000"` gives 0.
pub fn parse(step: &str) -> u32 {
    let Some((_, fraction)) = step.split_once('.') else {
        return 0;
    };
    fraction
        .bytes()
        .position(|b| b != b'0')
        .map_or(0, |i| u32::try_from(i + 1).unwrap_or(u32::MAX))
}

/// Round `value` to `places` decimal places (ties to even).
pub fn round(value: Decimal, places: u32) -> Decimal {
    value.round_dp(places)
}

/// Scale a decimal amount into an integer of `decimals` places (wei-style).
///
/// The amount is rounded to `decimals` places first, so the result is exact
/// and independent of float representation.
pub fn to_base_units(amount: Decimal, decimals: u32) -> Result<U256, AmountError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(AmountError::Negative(amount));
    }
    let text = round(amount, decimals).to_string();
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), ""));

    let width = decimals as usize;
    let mut digits = String::with_capacity(int_part.len() + width);
    digits.push_str(int_part);
    digits.push_str(&frac_part[..frac_part.len().min(width)]);
    for _ in frac_part.len()..width {
        digits.push('0');
    }

    U256::from_str_radix(&digits, 10).map_err(|_| AmountError::NotAnInteger(digits))
}

/// Inverse of [`to_base_units`].
///
/// Fractional digits beyond what a [`Decimal`] can represent are truncated.
pub fn from_base_units(amount: U256, decimals: u32) -> Result<Decimal, AmountError> {
    let raw = amount.to_string();
    let width = decimals as usize;

    let padded = if raw.len() <= width {
        format!("{}{raw}", "0".repeat(width - raw.len() + 1))
    } else {
        raw
    };
    let (int_part, frac_part) = padded.split_at(padded.len() - width);

    let int_part = int_part.trim_start_matches('0');
    let int_part = if int_part.is_empty() { "0" } else { int_part };
    if int_part.len() > DECIMAL_DIGITS {
        return Err(AmountError::Overflow(padded.clone()));
    }

    let keep = DECIMAL_DIGITS.saturating_sub(int_part.len()).min(frac_part.len());
    let text = if keep == 0 {
        int_part.to_string()
    } else {
        format!("{int_part}.{}", &frac_part[..keep])
    };

    text.parse::<Decimal>()
        .map(|d| d.normalize())
        .map_err(|_| AmountError::Overflow(text))
}
