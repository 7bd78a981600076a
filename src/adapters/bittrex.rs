//! Bittrex venue (REST API v3).
//!
//! Markets are `UPPER(asset-quote)`. Private calls carry `Api-Key`,
//! `Api-Timestamp`, `Api-Content-Hash` (SHA-512 of the body) and
//! `Api-Signature` (HMAC-SHA512 of timestamp, URL, method and hash).
//! Throttling adapts per endpoint: a 429 slows that endpoint down and
//! forces one cooldown request before the call is retried.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use crate::adapters::cache::RefreshingCache;
use crate::adapters::http::{self, Reply};
use crate::adapters::registry::VenueContext;
use crate::adapters::signing;
use crate::adapters::throttle::AdaptiveThrottle;
use crate::domain::{Order, OrderSide, Precision};
use crate::error::{Attempt, ExchangeError, Result, RetryReason, run_attempts};
use crate::ports::{Exchange, OrderRequest, VenueInfo};

pub const INFO: VenueInfo = VenueInfo {
  code: "BTRX",
  name: "Bittrex",
};

const API_BASE: &str = "https://api.bittrex.com/v3";
const APPLICATION_ID: &str = "214";
/// Bittrex quantities always accept eight decimals.
const SIZE_PRECISION: u32 = 8;

// ────────────────────────────────────────────
// Payloads
// ────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct Market {
  symbol: String,
  precision: u32,
  status: String,
  #[serde(default)]
  notice: Option<String>,
}

impl Market {
  /// Online and not scheduled for removal.
  fn active(&self) -> bool {
    self.status != "OFFLINE"
      && !self
        .notice
        .as_deref()
        .is_some_and(|n| n.contains("will be removed"))
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker {
  last_trade_rate: Decimal,
}

#[derive(Debug, Deserialize)]
struct OpenOrder {
  id: String,
  direction: String,
  quantity: Decimal,
  #[serde(default)]
  limit: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
  code: String,
}

// ────────────────────────────────────────────
// Client
// ────────────────────────────────────────────

pub struct Bittrex {
  http: Client,
  base_url: String,
  api_key: Option<String>,
  api_secret: Option<String>,
  throttle: AdaptiveThrottle,
  markets: RefreshingCache<HashMap<String, Precision>>,
}

impl Bittrex {
  pub fn new(ctx: &VenueContext) -> Result<Self> {
    Ok(Self {
      http: ctx.http()?,
      base_url: API_BASE.to_string(),
      api_key: ctx.credentials.api_key.clone(),
      api_secret: ctx.credentials.api_secret.clone(),
      throttle: AdaptiveThrottle::default(),
      markets: RefreshingCache::new(),
    })
  }

  /// Issue a call, retrying while the venue answers 429.
  async fn call(&self, method: Method, path: &str, payload: &str, auth: bool) -> Result<String> {
    run_attempts(path, || self.attempt(method.clone(), path, payload, auth)).await
  }

  async fn attempt(&self, method: Method, path: &str, payload: &str, auth: bool) -> Attempt<String> {
    // sign only once the throttle lets the request go, so a cooldown
    // never leaves a stale timestamp behind
    let cooled = self.throttle.before(path).await;
    let reply = match self.build(method, path, payload, auth) {
      Ok(builder) => http::send(builder).await,
      Err(e) => return Attempt::Fatal(e),
    };
    self.throttle.after().await;

    let attempt = reply.map_or_else(Attempt::Fatal, classify);
    if matches!(attempt, Attempt::Retry(RetryReason::RateLimited)) {
      self.throttle.rate_limited(path, cooled).await;
    }
    attempt
  }

  fn build(&self, method: Method, path: &str, payload: &str, auth: bool) -> Result<reqwest::RequestBuilder> {
    let url = format!("{}/{path}", self.base_url);
    let mut builder = self
      .http
      .request(method.clone(), &url)
      .header("Content-Type", "application/json")
      .header("Application-Id", APPLICATION_ID);

    if auth {
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

      let timestamp = chrono::Utc::now().timestamp_millis().to_string();
      let content_hash = signing::sha512_hex(payload.as_bytes());
      let message = format!("{timestamp}{url}{method}{content_hash}");
      let signature = hex::encode(signing::hmac_sha512(secret.as_bytes(), message.as_bytes())?);

      builder = builder
        .header("Api-Key", key)
        .header("Api-Timestamp", timestamp)
        .header("Api-Content-Hash", content_hash)
        .header("Api-Signature", signature);
    }

    if !payload.is_empty() {
      builder = builder.body(payload.to_string());
    }
    Ok(builder)
  }

  async fn fetch_markets(&self) -> Result<HashMap<String, Precision>> {
    let body = self.call(Method::GET, "markets", "", false).await?;
    let markets: Vec<Market> = http::decode("markets", &body)?;
    Ok(
      markets
        .into_iter()
        .filter(Market::active)
        .map(|m| {
          let prec = Precision {
            price: m.precision,
            size: SIZE_PRECISION,
          };
          (m.symbol, prec)
        })
        .collect(),
    )
  }

  async fn open_orders(&self, market: &str, side: OrderSide) -> Result<Vec<OpenOrder>> {
    let body = self
      .call(Method::GET, &format!("orders/open?marketSymbol={market}"), "", true)
      .await?;
    let orders: Vec<OpenOrder> = http::decode("open orders", &body)?;
    Ok(orders.into_iter().filter(|o| side.matches(&o.direction)).collect())
  }
}

/// Sort a reply into success, a 429 retry, or a rejection.
fn classify(reply: Reply) -> Attempt<String> {
  match reply.status {
    StatusCode::OK | StatusCode::CREATED => Attempt::Success(reply.body),
    StatusCode::TOO_MANY_REQUESTS => Attempt::Retry(RetryReason::RateLimited),
    _ => Attempt::Fatal(rejected(&reply)),
  }
}

fn rejected(reply: &Reply) -> ExchangeError {
  let message = reply
    .json::<ApiError>("error")
    .map_or_else(|_| format!("HTTP {}", reply.status), |e| e.code);
  ExchangeError::Rejected {
    venue: INFO.name,
    message,
  }
}

#[async_trait]
impl Exchange for Bittrex {
  fn info(&self) -> VenueInfo {
    INFO
  }

  async fn format_symbol(&self, asset: &str) -> Result<String> {
    Ok(asset.to_uppercase())
  }

  fn format_market(&self, asset: &str, quote: &str) -> Result<String> {
    Ok(format!("{asset}-{quote}").to_uppercase())
  }

  async fn precision(&self, market: &str) -> Result<Precision> {
    self
      .markets
      .lookup(|| self.fetch_markets(), |markets| markets.get(market).copied())
      .await?
      .ok_or_else(|| ExchangeError::MarketNotFound(market.to_string()))
  }

  #[instrument(skip(self))]
  async fn ticker(&self, market: &str) -> Result<Option<Decimal>> {
    let body = self
      .call(Method::GET, &format!("markets/{market}/ticker"), "", false)
      .await?;
    let ticker: Ticker = http::decode("ticker", &body)?;
    Ok(Some(ticker.last_trade_rate))
  }

  async fn orders(&self, market: &str, side: OrderSide) -> Result<Vec<Order>> {
    Ok(
      self
        .open_orders(market, side)
        .await?
        .into_iter()
        .map(|o| Order {
          price: o.limit.unwrap_or_default(),
          size: o.quantity,
        })
        .collect(),
    )
  }

  #[instrument(skip(self))]
  async fn cancel(&self, market: &str, side: OrderSide) -> Result<()> {
    for order in self.open_orders(market, side).await? {
      self
        .call(Method::DELETE, &format!("orders/{}", order.id), "", true)
        .await?;
      info!(order_id = %order.id, "Order cancelled");
    }
    Ok(())
  }

  #[instrument(skip(self))]
  async fn order(&self, market: &str, request: &OrderRequest) -> Result<Option<String>> {
    let payload = json!({
      "marketSymbol": market,
      "direction": request.side.as_upper(),
      "type": "LIMIT",
      "quantity": request.size.normalize().to_string(),
      "limit": request.price.normalize().to_string(),
      "timeInForce": "GOOD_TIL_CANCELLED",
    })
    .to_string();
    let body = self.call(Method::POST, "orders", &payload, true).await?;
    let placed: serde_json::Value = http::decode("order", &body)?;
    Ok(placed.get("id").and_then(|id| id.as_str()).map(str::to_string))
  }
}
