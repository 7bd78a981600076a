//! Ladder Use Case - Buy and Sell Ladders
//!
//! Planning resolves the market, reads its precision and generates the
//! ladder. Placement then runs the live sequence:
//! 1. Cancel open orders on the same side
//! 2. Read the ticker (and the nonce on DEX venues)
//! 3. For every step on the passive side of the ticker, confirm and submit
//!
//! A failed submission abandons the rest of the ladder.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use super::{MarketRef, resolve_market};
use crate::domain::{Denomination, Ladder, LadderParams, Order, OrderSide};
use crate::ports::{Answer, Exchange, OrderRequest, Prompt};

/// Ladder parameters as entered by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LadderInput {
  pub asset: String,
  pub quote: String,
  pub start_at_price: Decimal,
  pub stop_at_price: Decimal,
  /// First order size: quote asset for buys, base asset for sells.
  pub start_with_size: Decimal,
  pub mult: Decimal,
  /// Total size: quote asset for buys, base asset for sells.
  pub size: Decimal,
  /// Order expiry on venues that support one.
  pub expiry: Option<DateTime<Utc>>,
}

impl LadderInput {
  /// Orient the price range for `side` and pick the size denomination.
  ///
  /// Buys run from the higher price down, sells from the lower price up.
  pub fn params(&self, side: OrderSide) -> LadderParams {
    let (low, high) = if self.start_at_price <= self.stop_at_price {
      (self.start_at_price, self.stop_at_price)
    } else {
      (self.stop_at_price, self.start_at_price)
    };
    let (start_at_price, stop_at_price, denomination) = match side {
      OrderSide::Buy => (high, low, Denomination::Quote),
      OrderSide::Sell => (low, high, Denomination::Base),
    };
    LadderParams {
      start_at_price,
      stop_at_price,
      start_with_size: self.start_with_size,
      mult: self.mult,
      size: self.size,
      denomination,
    }
  }
}

/// A generated ladder bound to a venue market.
#[derive(Debug, Clone)]
pub struct LadderPlan {
  pub side: OrderSide,
  pub market: MarketRef,
  pub ladder: Ladder,
}

/// Outcome of a live placement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placement {
  /// Venue order ids, in submission order (`None` when the venue has none).
  pub placed: Vec<Option<String>>,
  /// Steps on the wrong side of the ticker.
  pub skipped: usize,
  /// Steps the user said no to.
  pub declined: usize,
}

/// Whether an order rests on the book instead of crossing the ticker.
///
/// Without a ticker nothing is filtered.
pub fn is_passive(side: OrderSide, price: Decimal, ticker: Option<Decimal>) -> bool {
  match (side, ticker) {
    (_, None) => true,
    (OrderSide::Buy, Some(ticker)) => price < ticker,
    (OrderSide::Sell, Some(ticker)) => price > ticker,
  }
}

/// One-line order description shown before confirmation.
pub fn describe(side: OrderSide, market: &str, order: &Order) -> String {
  format!("{side} {} {market} @ {}", order.size.normalize(), order.price.normalize())
}

/// Plans and places ladders on one venue.
pub struct LadderService<'a> {
  exchange: &'a dyn Exchange,
}

impl<'a> LadderService<'a> {
  pub fn new(exchange: &'a dyn Exchange) -> Self {
    Self { exchange }
  }

  /// Resolve the market and generate the ladder. No orders are touched.
  #[instrument(skip(self, input), fields(venue = %self.exchange.info(), asset = %input.asset, quote = %input.quote))]
  pub async fn plan(&self, side: OrderSide, input: &LadderInput) -> Result<LadderPlan> {
    let params = input.params(side);
    params.validate()?;

    let market = resolve_market(self.exchange, &input.asset, &input.quote).await?;
    let ladder = params
      .generate(market.precision)
      .with_context(|| format!("Failed to compute ladder for {}", market.market))?;

    info!(market = %market.market, %side, steps = ladder.len(), "Ladder computed");
    Ok(LadderPlan { side, market, ladder })
  }

  /// Replace the open orders on the plan's side with the ladder.
  #[instrument(skip_all, fields(market = %plan.market.market, side = %plan.side))]
  pub async fn place(
    &self,
    plan: &LadderPlan,
    prompt: &mut dyn Prompt,
    expiry: Option<DateTime<Utc>>,
  ) -> Result<Placement> {
    let market = plan.market.market.as_str();
    let side = plan.side;

    self
      .exchange
      .cancel(market, side)
      .await
      .with_context(|| format!("Failed to cancel open {side} orders on {market}"))?;

    let ticker = self.exchange.ticker(market).await?;
    match ticker {
      Some(ticker) => debug!(%ticker, "Ticker read"),
      None => debug!("No ticker, orders are not filtered"),
    }
    let nonce = self.exchange.nonce().await?;

    let total = plan.ladder.len();
    let mut placement = Placement::default();
    let mut yes_to_all = false;

    for step in plan.ladder.steps() {
      let order = step.order;
      if !is_passive(side, order.price, ticker) {
        debug!(index = step.index, price = %order.price, "Step would cross the ticker, skipped");
        placement.skipped += 1;
        continue;
      }

      if !yes_to_all {
        match prompt.confirm(&describe(side, market, &order))? {
          Answer::No => {
            placement.declined += 1;
            continue;
          }
          Answer::Yes => {}
          Answer::YesToAll => yes_to_all = true,
        }
      }

      let request = OrderRequest {
        side,
        size: order.size,
        price: order.price,
        nonce,
        expiry,
      };
      match self.exchange.order(market, &request).await {
        Ok(id) => {
          info!(index = step.index, price = %order.price, size = %order.size, id = id.as_deref().unwrap_or("-"), "Order placed");
          placement.placed.push(id);
        }
        Err(e) => {
          warn!(index = step.index, placed = placement.placed.len(), error = %e, "Order failed, abandoning ladder");
          return Err(anyhow::Error::new(e).context(format!(
            "order {} of {total} failed after {} orders were placed",
            step.index + 1,
            placement.placed.len()
          )));
        }
      }
    }

    info!(
      placed = placement.placed.len(),
      skipped = placement.skipped,
      declined = placement.declined,
      "Ladder placed"
    );
    Ok(placement)
  }
}
