//! Binance spot venue.
//!
//! Markets are `UPPER(asset + quote)`. Precision comes from the
//! `PRICE_FILTER` tick size and `LOT_SIZE` step size of each symbol.

pub mod client;
pub mod types;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{info, instrument};

use self::client::{BinanceClient, Endpoint};
use self::types::{NewOrder, OpenOrder, TickerPrice};
use crate::adapters::http;
use crate::adapters::registry::VenueContext;
use crate::adapters::signing;
use crate::domain::{Order, OrderSide, Precision};
use crate::error::Result;
use crate::ports::{Exchange, OrderRequest, VenueInfo};

pub const INFO: VenueInfo = VenueInfo {
  code: "BINA",
  name: "Binance",
};

/// Broker prefix for client order ids.
const BROKER_PREFIX: &str = "x-J6MCRYME-";
const CLIENT_ORDER_ID_LEN: usize = 36;

/// Client order id tagged with the broker prefix and padded with digits.
pub fn client_order_id() -> String {
  let mut id = BROKER_PREFIX.to_string();
  id.push_str(&signing::random_digits(CLIENT_ORDER_ID_LEN - BROKER_PREFIX.len()));
  id
}

pub struct Binance {
  client: BinanceClient,
}

impl Binance {
  pub fn new(ctx: &VenueContext) -> Result<Self> {
    Ok(Self {
      client: BinanceClient::new(
        ctx.http()?,
        ctx.config.binance.testnet,
        ctx.credentials.api_key.clone(),
        ctx.credentials.api_secret.clone(),
      ),
    })
  }

  async fn open_orders(&self, market: &str, side: OrderSide) -> Result<Vec<OpenOrder>> {
    let body = self
      .client
      .request(Endpoint::OpenOrders, &[("symbol", market.to_string())])
      .await?;
    let orders: Vec<OpenOrder> = http::decode("open orders", &body)?;
    Ok(orders.into_iter().filter(|o| side.matches(&o.side)).collect())
  }
}

#[async_trait]
impl Exchange for Binance {
  fn info(&self) -> VenueInfo {
    INFO
  }

  async fn format_symbol(&self, asset: &str) -> Result<String> {
    Ok(asset.to_uppercase())
  }

  fn format_market(&self, asset: &str, quote: &str) -> Result<String> {
    Ok(format!("{asset}{quote}").to_uppercase())
  }

  async fn precision(&self, market: &str) -> Result<Precision> {
    self.client.precision(market).await
  }

  #[instrument(skip(self))]
  async fn ticker(&self, market: &str) -> Result<Option<Decimal>> {
    let body = self
      .client
      .request(Endpoint::TickerPrice, &[("symbol", market.to_string())])
      .await?;
    let ticker: TickerPrice = http::decode("ticker", &body)?;
    Ok(Some(ticker.price))
  }

  async fn orders(&self, market: &str, side: OrderSide) -> Result<Vec<Order>> {
    Ok(
      self
        .open_orders(market, side)
        .await?
        .iter()
        .map(|o| Order {
          price: o.price,
          size: o.orig_qty,
        })
        .collect(),
    )
  }

  #[instrument(skip(self))]
  async fn cancel(&self, market: &str, side: OrderSide) -> Result<()> {
    for order in self.open_orders(market, side).await? {
      self
        .client
        .request(
          Endpoint::CancelOrder,
          &[("symbol", market.to_string()), ("orderId", order.order_id.to_string())],
        )
        .await?;
      info!(order_id = order.order_id, "Order cancelled");
    }
    Ok(())
  }

  #[instrument(skip(self))]
  async fn order(&self, market: &str, request: &OrderRequest) -> Result<Option<String>> {
    let params = [
      ("symbol", market.to_string()),
      ("side", request.side.as_upper().to_string()),
      ("type", "LIMIT".to_string()),
      ("timeInForce", "GTC".to_string()),
      ("quantity", request.size.normalize().to_string()),
      ("price", request.price.normalize().to_string()),
      ("newClientOrderId", client_order_id()),
    ];
    let body = self.client.request(Endpoint::CreateOrder, &params).await?;
    let order: NewOrder = http::decode("new order", &body)?;
    Ok(Some(order.order_id.to_string()))
  }
}
