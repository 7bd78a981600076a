//! Bitstamp venue (REST API v2).
//!
//! Markets are `lower(asset + quote)`, matching Bitstamp's `url_symbol`.
//! Private calls are form-encoded POSTs signed with the v2 `X-Auth`
//! scheme: an upper-case hex HMAC-SHA256 over the request line, a random
//! nonce and a millisecond timestamp.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, instrument};

use crate::adapters::cache::RefreshingCache;
use crate::adapters::http::{self, Reply};
use crate::adapters::registry::VenueContext;
use crate::adapters::signing;
use crate::adapters::throttle::StaticThrottle;
use crate::domain::{Order, OrderSide, Precision};
use crate::error::{ExchangeError, Result};
use crate::ports::{Exchange, OrderRequest, VenueInfo};

pub const INFO: VenueInfo = VenueInfo {
  code: "BITS",
  name: "Bitstamp",
};

const HOST: &str = "www.bitstamp.net";
const API_PREFIX: &str = "/api/v2";
const REQUESTS_PER_SECOND: f64 = 10.0;
const FORM: &str = "application/x-www-form-urlencoded";

// ────────────────────────────────────────────
// Payloads
// ────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct Pair {
  url_symbol: String,
  base_decimals: u32,
  counter_decimals: u32,
  trading: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Ticker {
  last: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenOrder {
  id: String,
  /// 0 = buy, 1 = sell.
  #[serde(rename = "type")]
  kind: String,
  price: Decimal,
  amount: Decimal,
}

impl OpenOrder {
  fn side(&self) -> Option<OrderSide> {
    match self.kind.as_str() {
      "0" => Some(OrderSide::Buy),
      "1" => Some(OrderSide::Sell),
      _ => None,
    }
  }
}

/// Bitstamp reports most failures with HTTP 200 and a `reason` field.
fn reason(body: &str) -> Option<String> {
  let value: serde_json::Value = serde_json::from_str(body).ok()?;
  let reason = value.get("reason")?;
  if let Some(all) = reason.get("__all__") {
    let msg = match all {
      serde_json::Value::Array(items) => items
        .iter()
        .map(|i| i.as_str().map_or_else(|| i.to_string(), str::to_string))
        .collect::<Vec<_>>()
        .join(", "),
      other => other.to_string(),
    };
    if !msg.is_empty() {
      return Some(msg);
    }
  }
  Some(reason.as_str().map_or_else(|| reason.to_string(), str::to_string))
}

/// Form-encode parameters; callers pass keys in sorted order.
fn form(params: &[(&str, String)]) -> String {
  params
    .iter()
    .map(|(k, v)| format!("{k}={v}"))
    .collect::<Vec<_>>()
    .join("&")
}

/// v2 signature message.
fn auth_message(
  x_auth: &str,
  method: &str,
  path: &str,
  content_type: &str,
  nonce: &str,
  timestamp: &str,
  payload: &str,
) -> String {
  format!("{x_auth}{method}{HOST}{API_PREFIX}{path}{content_type}{nonce}{timestamp}v2{payload}")
}

// ────────────────────────────────────────────
// Client
// ────────────────────────────────────────────

pub struct Bitstamp {
  http: Client,
  base_url: String,
  api_key: Option<String>,
  api_secret: Option<String>,
  throttle: StaticThrottle,
  pairs: RefreshingCache<HashMap<String, Precision>>,
}

impl Bitstamp {
  pub fn new(ctx: &VenueContext) -> Result<Self> {
    Ok(Self {
      http: ctx.http()?,
      base_url: format!("https://{HOST}{API_PREFIX}"),
      api_key: ctx.credentials.api_key.clone(),
      api_secret: ctx.credentials.api_secret.clone(),
      throttle: StaticThrottle::per_second(REQUESTS_PER_SECOND),
      pairs: RefreshingCache::new(),
    })
  }

  async fn execute(&self, builder: reqwest::RequestBuilder, path: &str) -> Result<String> {
    self.throttle.before().await;
    let reply = http::send(builder).await;
    self.throttle.after().await;
    let reply = reply?;
    check(&reply, path)?;
    Ok(reply.body)
  }

  async fn get(&self, path: &str) -> Result<String> {
    let builder = self.http.get(format!("{}{path}", self.base_url));
    self.execute(builder, path).await
  }

  async fn post(&self, path: &str, params: &[(&str, String)]) -> Result<String> {
    let key = self
      .api_key
      .as_deref()
      .filter(|k| !k.is_empty())
      .ok_or_else(|| ExchangeError::missing_flag("api-key"))?;
    let secret = self
      .api_secret
      .as_deref()
      .filter(|s| !s.is_empty())
      .ok_or_else(|| ExchangeError::missing_flag("api-secret"))?;

    let payload = form(params);
    let content_type = if payload.is_empty() { "" } else { FORM };
    let x_auth = format!("BITSTAMP {key}");
    let nonce = signing::random_digits(36);
    let timestamp = chrono::Utc::now().timestamp_millis().to_string();
    let message = auth_message(&x_auth, "POST", path, content_type, &nonce, &timestamp, &payload);
    let signature = signing::hmac_sha256_hex(secret.as_bytes(), message.as_bytes()).to_uppercase();

    let mut builder = self
      .http
      .post(format!("{}{path}", self.base_url))
      .header("X-Auth", x_auth)
      .header("X-Auth-Nonce", nonce)
      .header("X-Auth-Timestamp", timestamp)
      .header("X-Auth-Version", "v2")
      .header("X-Auth-Signature", signature);
    if !payload.is_empty() {
      builder = builder.header("Content-Type", FORM).body(payload);
    }
    self.execute(builder, path).await
  }

  async fn fetch_pairs(&self) -> Result<HashMap<String, Precision>> {
    let body = self.get("/trading-pairs-info/").await?;
    let pairs: Vec<Pair> = http::decode("trading pairs", &body)?;
    Ok(
      pairs
        .into_iter()
        .filter(|p| p.trading.eq_ignore_ascii_case("enabled"))
        .map(|p| {
          let prec = Precision {
            price: p.counter_decimals,
            size: p.base_decimals,
          };
          (p.url_symbol, prec)
        })
        .collect(),
    )
  }

  async fn open_orders(&self, market: &str, side: OrderSide) -> Result<Vec<OpenOrder>> {
    let body = self.post(&format!("/open_orders/{market}/"), &[]).await?;
    let orders: Vec<OpenOrder> = http::decode("open orders", &body)?;
    Ok(orders.into_iter().filter(|o| o.side() == Some(side)).collect())
  }
}

fn check(reply: &Reply, path: &str) -> Result<()> {
  if !reply.is_success() {
    return Err(ExchangeError::Rejected {
      venue: INFO.name,
      message: format!("{path}: HTTP {}", reply.status),
    });
  }
  match reason(&reply.body) {
    Some(message) => Err(ExchangeError::Rejected {
      venue: INFO.name,
      message,
    }),
    None => Ok(()),
  }
}

#[async_trait]
impl Exchange for Bitstamp {
  fn info(&self) -> VenueInfo {
    INFO
  }

  async fn format_symbol(&self, asset: &str) -> Result<String> {
    Ok(asset.to_lowercase())
  }

  fn format_market(&self, asset: &str, quote: &str) -> Result<String> {
    Ok(format!("{asset}{quote}").to_lowercase())
  }

  async fn precision(&self, market: &str) -> Result<Precision> {
    self
      .pairs
      .lookup(|| self.fetch_pairs(), |pairs| pairs.get(market).copied())
      .await?
      .ok_or_else(|| ExchangeError::MarketNotFound(market.to_string()))
  }

  #[instrument(skip(self))]
  async fn ticker(&self, market: &str) -> Result<Option<Decimal>> {
    let body = self.get(&format!("/ticker/{market}/")).await?;
    let ticker: Ticker = http::decode("ticker", &body)?;
    Ok(Some(ticker.last))
  }

  async fn orders(&self, market: &str, side: OrderSide) -> Result<Vec<Order>> {
    Ok(
      self
        .open_orders(market, side)
        .await?
        .iter()
        .map(|o| Order {
          price: o.price,
          size: o.amount,
        })
        .collect(),
    )
  }

  #[instrument(skip(self))]
  async fn cancel(&self, market: &str, side: OrderSide) -> Result<()> {
    for order in self.open_orders(market, side).await? {
      self.post("/cancel_order/", &[("id", order.id.clone())]).await?;
      info!(order_id = %order.id, "Order cancelled");
    }
    Ok(())
  }

  #[instrument(skip(self))]
  async fn order(&self, market: &str, request: &OrderRequest) -> Result<Option<String>> {
    let path = format!("/{}/{market}/", request.side.as_lower());
    let params = [
      ("amount", request.size.normalize().to_string()),
      ("price", request.price.normalize().to_string()),
    ];
    let body = self.post(&path, &params).await?;
    let placed: serde_json::Value = http::decode("order", &body)?;
    Ok(placed.get("id").map(|id| id.as_str().map_or_else(|| id.to_string(), str::to_string)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rust_decimal_macros::dec;

  #[test]
  fn reason_extraction() {
    assert_eq!(
      reason(r#"{"status":"error","reason":{"__all__":["Minimum order size is 10.0 USD."]}}"#),
      Some("Minimum order size is 10.0 USD.".to_string())
    );
    assert_eq!(reason(r#"{"reason":"Invalid nonce"}"#), Some("Invalid nonce".to_string()));
    assert_eq!(reason(r#"[{"id":"1"}]"#), None);
  }

  #[test]
  fn open_order_sides() {
    let orders: Vec<OpenOrder> = serde_json::from_str(
      r#"[{"id":"1","datetime":"2024-01-01 00:00:00","type":"0","price":"100.5","amount":"0.2","currency_pair":"BTC/USD"},
          {"id":"2","datetime":"2024-01-01 00:00:00","type":"1","price":"120","amount":"0.1"}]"#,
    )
    .unwrap();
    assert_eq!(orders[0].side(), Some(OrderSide::Buy));
    assert_eq!(orders[1].side(), Some(OrderSide::Sell));
    assert_eq!(orders[0].price, dec!(100.5));
  }

  #[test]
  fn signature_message_layout() {
    let msg = auth_message("BITSTAMP key", "POST", "/buy/btcusd/", FORM, "123", "456", "amount=1&price=2");
    assert_eq!(
      msg,
      "BITSTAMP keyPOSTwww.bitstamp.net/api/v2/buy/btcusd/application/x-www-form-urlencoded123456v2amount=1&price=2"
    );
  }

  #[test]
  fn markets_are_lower_case() {
    let venue = Bitstamp::new(&VenueContext::default()).unwrap();
    assert_eq!(venue.format_market("BTC", "USD").unwrap(), "btcusd");
  }

  #[tokio::test]
  async fn private_calls_need_credentials() {
    let venue = Bitstamp::new(&VenueContext::default()).unwrap();
    let err = venue.orders("btcusd", OrderSide::Buy).await.unwrap_err();
    assert_eq!(err.to_string(), "--api-key cannot be empty");
  }
}
