//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates the ladder math with the `Exchange` and `Prompt` ports.
//! Every call runs strictly in sequence: one venue request at a time,
//! cancellation before placement.
//!
//! Use cases:
//! - `LadderService`: plan and place buy or sell ladders
//! - `CancelService`: list or cancel open orders on one side

pub mod cancel;
pub mod ladder;

pub use cancel::{CancelService, OpenOrders};
pub use ladder::{LadderInput, LadderPlan, LadderService, Placement};

use anyhow::{Context, Result};
use tracing::debug;

use crate::domain::Precision;
use crate::error::ExchangeError;
use crate::ports::Exchange;

/// A market resolved on one venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketRef {
  /// Asset label for display.
  pub asset: String,
  /// Quote label for display.
  pub quote: String,
  /// Venue-native market identifier.
  pub market: String,
  pub precision: Precision,
}

/// Build the venue market for `asset`/`quote` and read its precision.
///
/// Display labels go through `format_symbol`; when a symbol cannot be
/// resolved the label falls back to the input as typed.
pub async fn resolve_market(exchange: &dyn Exchange, asset: &str, quote: &str) -> Result<MarketRef> {
  if asset.is_empty() {
    return Err(ExchangeError::missing_flag("asset").into());
  }
  if quote.is_empty() {
    return Err(ExchangeError::missing_flag("quote").into());
  }

  let market = exchange.format_market(asset, quote)?;
  let precision = exchange
    .precision(&market)
    .await
    .with_context(|| format!("Failed to read precision of {market} on {}", exchange.info()))?;

  let asset = label(exchange, asset).await;
  let quote = label(exchange, quote).await;
  debug!(%market, price = precision.price, size = precision.size, "Market resolved");

  Ok(MarketRef {
    asset,
    quote,
    market,
    precision,
  })
}

async fn label(exchange: &dyn Exchange, symbol: &str) -> String {
  match exchange.format_symbol(symbol).await {
    Ok(label) => label,
    Err(e) => {
      debug!(symbol, error = %e, "Symbol not resolved, using input");
      symbol.to_string()
    }
  }
}
