//! Cancel Use Case - Open Orders on One Side
//!
//! Lists open orders for review, or cancels them.

use anyhow::{Context, Result};
use tracing::{info, instrument};

use super::{MarketRef, resolve_market};
use crate::domain::{Order, OrderSide};
use crate::ports::Exchange;

/// Open orders on one side of a market.
#[derive(Debug, Clone)]
pub struct OpenOrders {
  pub side: OrderSide,
  pub market: MarketRef,
  pub orders: Vec<Order>,
}

pub struct CancelService<'a> {
  exchange: &'a dyn Exchange,
}

impl<'a> CancelService<'a> {
  pub fn new(exchange: &'a dyn Exchange) -> Self {
    Self { exchange }
  }

  /// Read the open orders without touching them.
  #[instrument(skip(self), fields(venue = %self.exchange.info()))]
  pub async fn list(&self, asset: &str, quote: &str, side: OrderSide) -> Result<OpenOrders> {
    let market = resolve_market(self.exchange, asset, quote).await?;
    let orders = self
      .exchange
      .orders(&market.market, side)
      .await
      .with_context(|| format!("Failed to read open {side} orders on {}", market.market))?;
    info!(market = %market.market, %side, open = orders.len(), "Open orders read");
    Ok(OpenOrders { side, market, orders })
  }

  /// Cancel every open order on `side`.
  #[instrument(skip(self), fields(venue = %self.exchange.info()))]
  pub async fn cancel(&self, asset: &str, quote: &str, side: OrderSide) -> Result<MarketRef> {
    let market = resolve_market(self.exchange, asset, quote).await?;
    self
      .exchange
      .cancel(&market.market, side)
      .await
      .with_context(|| format!("Failed to cancel open {side} orders on {}", market.market))?;
    info!(market = %market.market, %side, "Open orders cancelled");
    Ok(market)
  }
}
