//! Core order types.
//!
//! Venue-neutral shapes shared by the ladder generator, the exchange port
//! and every venue adapter. Adapters translate to and from their native
//! representations; nothing here knows about a specific venue.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────
// Order side
// ────────────────────────────────────────────

/// Order side. Venues spell it differently; adapters own that mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Upper-case wire form (`BUY` / `SELL`).
    pub const fn as_upper(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }

    /// Lower-case wire form (`buy` / `sell`).
    pub const fn as_lower(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }

    /// Case-insensitive comparison against a venue-supplied side string.
    pub fn matches(self, raw: &str) -> bool {
        raw.eq_ignore_ascii_case(self.as_upper())
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_upper())
    }
}

impl FromStr for OrderSide {
    type Err = String;

    /// Only the exact lower-case spellings are accepted, as on the command line.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(Self::Buy),
            "sell" => Ok(Self::Sell),
            _ => Err(r#"--side is invalid. valid values are "buy" or "sell""#.to_string()),
        }
    }
}

// ────────────────────────────────────────────
// Orders and precision
// ────────────────────────────────────────────

/// A limit order: computed by the ladder, or read back from a venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Limit price in quote asset.
    pub price: Decimal,
    /// Quantity in base asset.
    pub size: Decimal,
}

impl Order {
    /// Quote value of the order (`price * size`); `None` past the decimal range.
    pub fn value(&self) -> Option<Decimal> {
        self.price.checked_mul(self.size)
    }
}

/// Decimal places a venue accepts for a market's price and size fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Precision {
    pub price: u32,
    pub size: u32,
}
