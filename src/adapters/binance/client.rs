//! Binance HTTP Client - Weighted, Signed REST Client
//!
//! Wraps reqwest with Binance's weight-based throttling, `HMAC-SHA256`
//! query signing and server-time synchronization. A `-1021` reply (local
//! clock outside the receive window) resyncs the offset and retries the
//! same call.

use std::collections::HashMap;

use reqwest::{Client, Method};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::types::{ApiError, ERR_TIMESTAMP_OUTSIDE_WINDOW, ExchangeInfo, ServerTime};
use crate::adapters::cache::RefreshingCache;
use crate::adapters::http::{self, Reply};
use crate::adapters::signing;
use crate::adapters::throttle::{DEFAULT_WEIGHTED_RPS, WeightedThrottle};
use crate::domain::Precision;
use crate::error::{Attempt, ExchangeError, Result, RetryReason, run_attempts};

const VENUE: &str = "Binance";
const RECV_WINDOW_MS: u32 = 5000;

/// Endpoints and their request weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
  CancelOrder,
  CreateOrder,
  ExchangeInfo,
  OpenOrders,
  ServerTime,
  TickerPrice,
}

impl Endpoint {
  pub const fn weight(self) -> u32 {
    match self {
      Self::CancelOrder | Self::CreateOrder | Self::ServerTime | Self::TickerPrice => 1,
      Self::OpenOrders => 3,
      Self::ExchangeInfo => 10,
    }
  }

  const fn path(self) -> &'static str {
    match self {
      Self::CancelOrder | Self::CreateOrder => "/api/v3/order",
      Self::ExchangeInfo => "/api/v3/exchangeInfo",
      Self::OpenOrders => "/api/v3/openOrders",
      Self::ServerTime => "/api/v3/time",
      Self::TickerPrice => "/api/v3/ticker/price",
    }
  }

  fn method(self) -> Method {
    match self {
      Self::CancelOrder => Method::DELETE,
      Self::CreateOrder => Method::POST,
      _ => Method::GET,
    }
  }

  const fn signed(self) -> bool {
    matches!(self, Self::CancelOrder | Self::CreateOrder | Self::OpenOrders)
  }
}

/// Join parameters into a query string. Values are plain symbols and
/// decimal numbers, so no escaping is needed.
pub fn query_string(params: &[(&str, String)]) -> String {
  params
    .iter()
    .map(|(k, v)| format!("{k}={v}"))
    .collect::<Vec<_>>()
    .join("&")
}

/// Per-instance Binance client.
pub struct BinanceClient {
  http: Client,
  base_url: String,
  api_key: Option<String>,
  api_secret: Option<String>,
  throttle: WeightedThrottle,
  /// Server time minus local time, in milliseconds. `None` until synced.
  time_offset_ms: Mutex<Option<i64>>,
  markets: RefreshingCache<HashMap<String, Precision>>,
}

impl BinanceClient {
  pub fn new(
    http: Client,
    testnet: bool,
    api_key: Option<String>,
    api_secret: Option<String>,
  ) -> Self {
    let base_url = if testnet {
      "https://testnet.binance.vision"
    } else {
      "https://api.binance.com"
    };
    Self::with_base_url(http, base_url, api_key, api_secret)
  }

  /// Client against an explicit REST root.
  pub fn with_base_url(
    http: Client,
    base_url: &str,
    api_key: Option<String>,
    api_secret: Option<String>,
  ) -> Self {
    Self {
      http,
      base_url: base_url.trim_end_matches('/').to_string(),
      api_key,
      api_secret,
      throttle: WeightedThrottle::default(),
      time_offset_ms: Mutex::new(None),
      markets: RefreshingCache::new(),
    }
  }

  /// Execute an endpoint, retrying on clock skew.
  pub async fn request(&self, endpoint: Endpoint, params: &[(&str, String)]) -> Result<String> {
    run_attempts(endpoint.path(), || self.attempt(endpoint, params)).await
  }

  async fn attempt(&self, endpoint: Endpoint, params: &[(&str, String)]) -> Attempt<String> {
    if self.throttle.needs_base().await {
      self.load_rate_limits().await;
    }

    // the timestamp is taken after the throttle wait so it stays inside recvWindow
    self.throttle.before(endpoint.weight()).await;
    let reply = match self.build(endpoint, params).await {
      Ok(builder) => http::send(builder).await,
      Err(e) => return Attempt::Fatal(e),
    };
    self.throttle.after().await;

    match reply.map_or_else(Attempt::Fatal, classify) {
      Attempt::Retry(RetryReason::ClockSkew) => {
        warn!(code = ERR_TIMESTAMP_OUTSIDE_WINDOW, "Clock outside receive window, resyncing");
        match self.sync_time().await {
          Ok(()) => Attempt::Retry(RetryReason::ClockSkew),
          Err(e) => Attempt::Fatal(e),
        }
      }
      attempt => attempt,
    }
  }

  async fn build(
    &self,
    endpoint: Endpoint,
    params: &[(&str, String)],
  ) -> Result<reqwest::RequestBuilder> {
    let mut query = query_string(params);
    let mut builder_key = None;

    if endpoint.signed() {
      let key = self.api_key.as_deref().ok_or_else(|| ExchangeError::missing_flag("api-key"))?;
      let secret = self
        .api_secret
        .as_deref()
        .ok_or_else(|| ExchangeError::missing_flag("api-secret"))?;

      let timestamp = chrono::Utc::now().timestamp_millis() + self.offset().await?;
      if !query.is_empty() {
        query.push('&');
      }
      query.push_str(&format!("recvWindow={RECV_WINDOW_MS}&timestamp={timestamp}"));
      let signature = signing::hmac_sha256_hex(secret.as_bytes(), query.as_bytes());
      query.push_str(&format!("&signature={signature}"));
      builder_key = Some(key.to_string());
    }

    let url = if query.is_empty() {
      format!("{}{}", self.base_url, endpoint.path())
    } else {
      format!("{}{}?{query}", self.base_url, endpoint.path())
    };

    let mut builder = self.http.request(endpoint.method(), url);
    if let Some(key) = builder_key {
      builder = builder.header("X-MBX-APIKEY", key);
    }
    Ok(builder)
  }

  /// Clock offset, synchronizing on first use.
  async fn offset(&self) -> Result<i64> {
    if let Some(offset) = *self.time_offset_ms.lock().await {
      return Ok(offset);
    }
    self.sync_time().await?;
    Ok(self.time_offset_ms.lock().await.unwrap_or_default())
  }

  /// Measure the offset between the venue's clock and ours.
  #[instrument(skip(self))]
  async fn sync_time(&self) -> Result<()> {
    let url = format!("{}{}", self.base_url, Endpoint::ServerTime.path());
    self.throttle.before(Endpoint::ServerTime.weight()).await;
    let reply = http::send(self.http.get(url)).await;
    self.throttle.after().await;

    let reply = reply?;
    if !reply.is_success() {
      return Err(rejected(&reply));
    }
    let server: ServerTime = reply.json("server time")?;
    let offset = server.server_time - chrono::Utc::now().timestamp_millis();
    debug!(offset_ms = offset, "Server time synchronized");
    *self.time_offset_ms.lock().await = Some(offset);
    Ok(())
  }

  /// Derive the base request rate from the venue's published limits.
  /// A failure settles on the default rate for the life of the client.
  async fn load_rate_limits(&self) {
    let url = format!("{}{}", self.base_url, Endpoint::ExchangeInfo.path());
    self.throttle.before(Endpoint::ExchangeInfo.weight()).await;
    let reply = http::send(self.http.get(url)).await;
    self.throttle.after().await;
    let info = match reply {
      Ok(reply) if reply.is_success() => reply.json::<ExchangeInfo>("exchange info"),
      Ok(reply) => Err(rejected(&reply)),
      Err(e) => Err(e),
    };
    match info {
      Ok(info) => {
        let rps = info.requests_per_second().unwrap_or(DEFAULT_WEIGHTED_RPS);
        self.throttle.set_base(rps).await;
        let precisions = info.precisions();
        if let Err(e) = self.markets.refresh(move || async move { Ok(precisions) }).await {
          debug!(error = %e, "Could not prime market cache");
        }
      }
      Err(e) => {
        warn!(error = %e, "Could not read rate limits, using default");
        self.throttle.set_base(DEFAULT_WEIGHTED_RPS).await;
      }
    }
  }

  async fn fetch_precisions(&self) -> Result<HashMap<String, Precision>> {
    let body = self.request(Endpoint::ExchangeInfo, &[]).await?;
    let info: ExchangeInfo = http::decode("exchange info", &body)?;
    Ok(info.precisions())
  }

  /// Precision of `symbol`, refetching the symbol list once on a miss.
  pub async fn precision(&self, symbol: &str) -> Result<Precision> {
    // the rate-limit fetch also primes the symbol cache
    if self.throttle.needs_base().await {
      self.load_rate_limits().await;
    }
    self
      .markets
      .lookup(|| self.fetch_precisions(), |markets| markets.get(symbol).copied())
      .await?
      .ok_or_else(|| ExchangeError::MarketNotFound(symbol.to_string()))
  }
}

/// Sort a reply into success, a clock-skew retry, or a rejection.
fn classify(reply: Reply) -> Attempt<String> {
  if reply.is_success() {
    return Attempt::Success(reply.body);
  }
  match reply.json::<ApiError>("error") {
    Ok(err) if err.code == ERR_TIMESTAMP_OUTSIDE_WINDOW => Attempt::Retry(RetryReason::ClockSkew),
    Ok(err) => Attempt::Fatal(ExchangeError::Rejected {
      venue: VENUE,
      message: format!("{} (code {})", err.msg, err.code),
    }),
    Err(_) => Attempt::Fatal(rejected(&reply)),
  }
}

fn rejected(reply: &Reply) -> ExchangeError {
  ExchangeError::Rejected {
    venue: VENUE,
    message: format!("HTTP {}: {}", reply.status, reply.excerpt()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::StatusCode;

  use crate::adapters::http::stub::Stub;

  const LIMITS: &str = r#"{"rateLimits":[{"rateLimitType":"REQUEST_WEIGHT","interval":"SECOND","intervalNum":1,"limit":1000}],"symbols":[]}"#;
  const SKEW: &str = r#"{"code":-1021,"msg":"Timestamp for this request is outside of the recvWindow."}"#;

  #[test]
  fn weights_match_published_costs() {
    assert_eq!(Endpoint::ExchangeInfo.weight(), 10);
    assert_eq!(Endpoint::OpenOrders.weight(), 3);
    assert_eq!(Endpoint::CreateOrder.weight(), 1);
    assert!(Endpoint::OpenOrders.signed());
    assert!(!Endpoint::TickerPrice.signed());
  }

  #[test]
  fn query_is_joined_in_order() {
    let q = query_string(&[("symbol", "BTCUSDT".into()), ("side", "BUY".into())]);
    assert_eq!(q, "symbol=BTCUSDT&side=BUY");
  }

  #[tokio::test]
  async fn signed_call_without_key_fails_fast() {
    let client = BinanceClient::new(Client::new(), false, None, None);
    let err = client.build(Endpoint::OpenOrders, &[]).await.unwrap_err();
    assert_eq!(err.to_string(), "--api-key cannot be empty");
  }

  #[test]
  fn replies_are_classified() {
    let reply = |status, body: &str| Reply {
      status,
      body: body.to_string(),
    };
    assert!(matches!(classify(reply(StatusCode::OK, "[]")), Attempt::Success(_)));
    assert!(matches!(
      classify(reply(StatusCode::BAD_REQUEST, SKEW)),
      Attempt::Retry(RetryReason::ClockSkew)
    ));
    let Attempt::Fatal(err) = classify(reply(
      StatusCode::BAD_REQUEST,
      r#"{"code":-2010,"msg":"Account has insufficient balance for requested action."}"#,
    )) else {
      panic!("expected rejection");
    };
    assert!(err.to_string().ends_with("(code -2010)"), "{err}");
    assert!(matches!(
      classify(reply(StatusCode::BAD_GATEWAY, "<html>")),
      Attempt::Fatal(ExchangeError::Rejected { .. })
    ));
  }

  #[tokio::test]
  async fn clock_skew_resyncs_then_retries() {
    let stub = Stub::start(&[
      ("/api/v3/exchangeInfo", 200, LIMITS),
      ("/api/v3/time", 200, r#"{"serverTime":1000}"#),
      ("/api/v3/time", 200, r#"{"serverTime":5000000}"#),
      ("/api/v3/openOrders", 400, SKEW),
      ("/api/v3/openOrders", 200, "[]"),
    ])
    .await;
    let client = BinanceClient::with_base_url(
      Client::new(),
      &stub.base_url,
      Some("key".into()),
      Some("secret".into()),
    );

    let body = client
      .request(Endpoint::OpenOrders, &[("symbol", "BTCUSDT".into())])
      .await
      .unwrap();
    assert_eq!(body, "[]");
    assert_eq!(stub.seen_on("/api/v3/time").len(), 2);

    let calls = stub.seen_on("/api/v3/openOrders");
    assert_eq!(calls.len(), 2);
    let stamp = |i: usize| calls[i].param("timestamp").unwrap().parse::<i64>().unwrap();
    // each attempt is stamped with the offset measured just before it
    assert!((1000..61_000).contains(&stamp(0)), "{}", stamp(0));
    assert!((5_000_000..5_060_000).contains(&stamp(1)), "{}", stamp(1));
    assert_eq!(calls[1].headers["x-mbx-apikey"], "key");
  }

  #[tokio::test]
  async fn unreadable_limits_are_fetched_once() {
    let stub = Stub::start(&[
      ("/api/v3/exchangeInfo", 500, "down"),
      ("/api/v3/ticker/price", 200, r#"{"price":"1"}"#),
      ("/api/v3/ticker/price", 200, r#"{"price":"2"}"#),
    ])
    .await;
    let client = BinanceClient::with_base_url(Client::new(), &stub.base_url, None, None);
    for _ in 0..2 {
      client
        .request(Endpoint::TickerPrice, &[("symbol", "BTCUSDT".into())])
        .await
        .unwrap();
    }
    assert_eq!(stub.seen_on("/api/v3/exchangeInfo").len(), 1);
  }
}
