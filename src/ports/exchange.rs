//! Exchange Port - Uniform Venue Interface
//!
//! Every venue, centralized or on-chain, implements [`Exchange`]. The
//! orchestration layer only ever talks to `dyn Exchange`; venue identity
//! matters solely when the registry picks an implementation.
//!
//! Key design decisions:
//! - Prices and sizes cross this boundary as [`Decimal`]; adapters convert
//!   to strings, floats or scaled integers on their side.
//! - A missing ticker is `None`, which disables price-bound filtering.
//! - Cancellation may legitimately be impossible (order-book DEXes); such
//!   venues fail with [`ExchangeError::CancelUnsupported`].
//!
//! [`ExchangeError::CancelUnsupported`]: crate::error::ExchangeError::CancelUnsupported

use alloy::primitives::U256;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{Order, OrderSide, Precision};
use crate::error::Result;

/// Static description of a venue, used for lookup and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VenueInfo {
  /// Short code (`BINA`, `KRKN`, ...). Empty when the venue has none.
  pub code: &'static str,
  /// Display name.
  pub name: &'static str,
}

impl VenueInfo {
  /// Case-insensitive match against either the code or the name.
  ///
  /// An empty code never matches.
  pub fn matches(&self, needle: &str) -> bool {
    (!self.code.is_empty() && self.code.eq_ignore_ascii_case(needle))
      || self.name.eq_ignore_ascii_case(needle)
  }
}

impl std::fmt::Display for VenueInfo {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.name)
  }
}

/// A limit order to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
  pub side: OrderSide,
  /// Base-asset quantity, already rounded to market precision.
  pub size: Decimal,
  /// Limit price, already rounded to market precision.
  pub price: Decimal,
  /// Replay-protection nonce from [`Exchange::nonce`]; ignored by CEXes.
  pub nonce: Option<U256>,
  /// Expiry for venues that support it; `None` means good-till-cancelled.
  pub expiry: Option<DateTime<Utc>>,
}

/// Trait for venue adapters.
///
/// Implementors own authentication, throttling and metadata caching for
/// their venue. All state is per instance: two adapters for the same venue
/// never share caches or rate-limit clocks.
#[async_trait]
pub trait Exchange: Send + Sync + 'static {
  /// Code and name of this venue.
  fn info(&self) -> VenueInfo;

  /// Normalize an asset symbol the way the venue spells it.
  ///
  /// DEX venues resolve the symbol (or a raw token address) to its
  /// canonical ticker, which may require network calls.
  ///
  /// # Errors
  /// Returns error if the symbol cannot be resolved.
  async fn format_symbol(&self, asset: &str) -> Result<String>;

  /// Build the venue-native market identifier for `asset`/`quote`.
  ///
  /// # Errors
  /// Returns error if either symbol is empty.
  fn format_market(&self, asset: &str, quote: &str) -> Result<String>;

  /// Decimal places accepted for price and size on `market`.
  ///
  /// # Errors
  /// Returns [`crate::error::ExchangeError::MarketNotFound`] if the market
  /// is unknown even after one metadata refetch.
  async fn precision(&self, market: &str) -> Result<Precision>;

  /// Last traded price of `market`, or `None` when the venue has no usable
  /// price and orders should not be filtered against it.
  async fn ticker(&self, market: &str) -> Result<Option<Decimal>>;

  /// Open orders on `market` for `side`.
  async fn orders(&self, market: &str, side: OrderSide) -> Result<Vec<Order>>;

  /// Cancel every open order on `market` for `side`.
  ///
  /// # Errors
  /// Venues without programmatic cancellation fail with a message pointing
  /// to where the user can cancel by hand.
  async fn cancel(&self, market: &str, side: OrderSide) -> Result<()>;

  /// Submit one limit order; returns the venue's order id when it has one.
  ///
  /// # Errors
  /// Returns error on venue rejection, missing token allowance or
  /// transport failure. Never retried past the venue's own retry loop.
  async fn order(&self, market: &str, request: &OrderRequest) -> Result<Option<String>>;

  /// Replay-protection nonce for signed orders. `None` for venues that
  /// do not use one.
  async fn nonce(&self) -> Result<Option<U256>> {
    Ok(None)
  }
}
