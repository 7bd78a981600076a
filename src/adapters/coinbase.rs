//! Coinbase Advanced Trade venue.
//!
//! Markets are product ids (`BTC-USD`). Every call, including product
//! metadata, is authenticated. Two key kinds are accepted:
//! - legacy keys: `CB-ACCESS-SIGN` is the hex HMAC-SHA256 of
//!   `timestamp + method + path + body`, the path without its query string.
//! - developer platform keys (`organizations/...`): a per-request ES256 JWT
//!   bearer token signed with the key's P-256 private key.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use p256::SecretKey;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::pkcs8::DecodePrivateKey;
use reqwest::{Client, Method, RequestBuilder};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use crate::adapters::cache::RefreshingCache;
use crate::adapters::http::{self, Reply};
use crate::adapters::registry::VenueContext;
use crate::adapters::signing;
use crate::adapters::throttle::StaticThrottle;
use crate::domain::{Order, OrderSide, Precision, precision};
use crate::error::{ExchangeError, Result};
use crate::ports::{Exchange, OrderRequest, VenueInfo};

pub const INFO: VenueInfo = VenueInfo {
  code: "COIN",
  name: "Coinbase",
};

const API_HOST: &str = "api.coinbase.com";
const API_PREFIX: &str = "/api/v3/brokerage/";
/// Lifetime of a developer platform bearer token.
const JWT_TTL_SECS: i64 = 120;
const CLOUD_KEY_PREFIX: &str = "organizations/";

// ────────────────────────────────────────────
// Payloads
// ────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct Product {
  product_id: String,
  #[serde(default)]
  price: String,
  #[serde(default)]
  base_increment: String,
  #[serde(default)]
  quote_increment: String,
  #[serde(default)]
  cancel_only: bool,
  #[serde(default)]
  trading_disabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct Products {
  #[serde(default)]
  products: Vec<Product>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LimitGtc {
  base_size: Decimal,
  limit_price: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Configuration {
  #[serde(default)]
  limit_limit_gtc: Option<LimitGtc>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenOrder {
  order_id: String,
  #[serde(default)]
  order_configuration: Configuration,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenOrders {
  #[serde(default)]
  orders: Vec<OpenOrder>,
  #[serde(default)]
  has_next: bool,
  #[serde(default)]
  cursor: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SuccessResponse {
  #[serde(default)]
  order_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ErrorResponse {
  #[serde(default)]
  error: String,
  #[serde(default)]
  message: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateOrderResponse {
  success: bool,
  #[serde(default)]
  success_response: SuccessResponse,
  #[serde(default)]
  error_response: ErrorResponse,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
  message: String,
}

// ────────────────────────────────────────────
// Client
// ────────────────────────────────────────────

/// Path as signed and requested: venue-relative paths get the brokerage prefix.
fn full_path(path: &str) -> String {
  if path.starts_with("/api") {
    path.to_string()
  } else {
    format!("{API_PREFIX}{path}")
  }
}

fn sign_message(timestamp: &str, method: &Method, path: &str, body: &str) -> String {
  format!("{timestamp}{method}{}{body}", full_path(path))
}

/// Decode a developer platform private key. Shells often hand the PEM over
/// with literal `\n` sequences; those are restored first.
fn cloud_key(secret: &str) -> Result<SigningKey> {
  let pem = secret.replace("\\n", "\n");
  SecretKey::from_sec1_pem(&pem)
    .or_else(|_| SecretKey::from_pkcs8_pem(&pem))
    .map(SigningKey::from)
    .map_err(|_| {
      ExchangeError::Config(
        "could not decode the Coinbase private key, you might need to enclose it in double quotes"
          .to_string(),
      )
    })
}

/// Compact ES256 JWT authorizing one request.
fn cloud_jwt(key_name: &str, key: &SigningKey, method: &Method, path: &str, now: i64, nonce: &str) -> String {
  let header = json!({ "alg": "ES256", "typ": "JWT", "kid": key_name, "nonce": nonce });
  let claims = json!({
    "sub": key_name,
    "iss": "coinbase-cloud",
    "nbf": now,
    "exp": now + JWT_TTL_SECS,
    "uri": format!("{method} {API_HOST}{}", full_path(path)),
  });
  let input = format!(
    "{}.{}",
    URL_SAFE_NO_PAD.encode(header.to_string()),
    URL_SAFE_NO_PAD.encode(claims.to_string())
  );
  let signature: Signature = key.sign(input.as_bytes());
  format!("{input}.{}", URL_SAFE_NO_PAD.encode(signature.to_bytes()))
}

pub struct Coinbase {
  http: Client,
  base_url: String,
  api_key: Option<String>,
  api_secret: Option<String>,
  throttle: StaticThrottle,
  products: RefreshingCache<HashMap<String, Precision>>,
}

impl Coinbase {
  pub fn new(ctx: &VenueContext) -> Result<Self> {
    Ok(Self {
      http: ctx.http()?,
      base_url: format!("https://{API_HOST}"),
      api_key: ctx.credentials.api_key.clone(),
      api_secret: ctx.credentials.api_secret.clone(),
      throttle: StaticThrottle::per_second(ctx.config.coinbase.requests_per_second),
      products: RefreshingCache::new(),
    })
  }

  /// Attach the credentials for one request, picking the scheme from the key.
  fn authorize(&self, builder: RequestBuilder, method: &Method, path: &str, payload: &str) -> Result<RequestBuilder> {
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

    if key.starts_with(CLOUD_KEY_PREFIX) {
      let now = chrono::Utc::now().timestamp();
      let token = cloud_jwt(key, &cloud_key(secret)?, method, path, now, &signing::random_digits(18));
      return Ok(builder.bearer_auth(token));
    }

    let timestamp = chrono::Utc::now().timestamp().to_string();
    let message = sign_message(&timestamp, method, path, payload);
    let signature = signing::hmac_sha256_hex(secret.as_bytes(), message.as_bytes());
    Ok(
      builder
        .header("CB-ACCESS-KEY", key)
        .header("CB-ACCESS-TIMESTAMP", timestamp)
        .header("CB-ACCESS-SIGN", signature),
    )
  }

  async fn call(&self, method: Method, path: &str, query: &str, body: Option<String>) -> Result<String> {
    let payload = body.unwrap_or_default();
    let mut url = format!("{}{}", self.base_url, full_path(path));
    if !query.is_empty() {
      url.push('?');
      url.push_str(query);
    }

    self.throttle.before().await;
    let mut builder = self.authorize(self.http.request(method.clone(), url), &method, path, &payload)?;
    if !payload.is_empty() {
      builder = builder.header("Content-Type", "application/json").body(payload);
    }
    let reply = http::send(builder).await;
    self.throttle.after().await;
    let reply = reply?;
    check(&reply)?;
    Ok(reply.body)
  }

  async fn fetch_products(&self) -> Result<HashMap<String, Precision>> {
    let body = self.call(Method::GET, "products", "", None).await?;
    let products: Products = http::decode("products", &body)?;
    Ok(
      products
        .products
        .into_iter()
        .filter(|p| !p.cancel_only && !p.trading_disabled)
        .map(|p| {
          let prec = Precision {
            price: precision::parse(&p.quote_increment),
            size: precision::parse(&p.base_increment),
          };
          (p.product_id, prec)
        })
        .collect(),
    )
  }

  /// Every open order on one side, following the listing cursor.
  async fn open_orders(&self, market: &str, side: OrderSide) -> Result<Vec<OpenOrder>> {
    let filter = format!(
      "product_id={market}&order_status=OPEN&order_side={}",
      side.as_upper()
    );
    let mut orders = Vec::new();
    let mut cursor = String::new();
    loop {
      let query = if cursor.is_empty() {
        filter.clone()
      } else {
        format!("{filter}&cursor={cursor}")
      };
      let body = self
        .call(Method::GET, "orders/historical/batch", &query, None)
        .await?;
      let page: OpenOrders = http::decode("open orders", &body)?;
      orders.extend(page.orders);
      if !page.has_next || page.cursor.is_empty() || page.cursor == cursor {
        return Ok(orders);
      }
      cursor = page.cursor;
    }
  }
}

fn check(reply: &Reply) -> Result<()> {
  if reply.status.is_success() || reply.status.is_redirection() {
    return Ok(());
  }
  let message = reply
    .json::<ApiMessage>("error")
    .map_or_else(|_| format!("HTTP {}", reply.status), |e| e.message);
  Err(ExchangeError::Rejected {
    venue: INFO.name,
    message,
  })
}

#[async_trait]
impl Exchange for Coinbase {
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
      .products
      .lookup(|| self.fetch_products(), |products| products.get(market).copied())
      .await?
      .ok_or_else(|| ExchangeError::MarketNotFound(market.to_string()))
  }

  #[instrument(skip(self))]
  async fn ticker(&self, market: &str) -> Result<Option<Decimal>> {
    let body = self
      .call(Method::GET, &format!("products/{market}"), "", None)
      .await?;
    let product: Product = http::decode("product", &body)?;
    let price = product.price.parse().map_err(|_| ExchangeError::Rejected {
      venue: INFO.name,
      message: format!("invalid price {:?} for {market}", product.price),
    })?;
    Ok(Some(price))
  }

  async fn orders(&self, market: &str, side: OrderSide) -> Result<Vec<Order>> {
    Ok(
      self
        .open_orders(market, side)
        .await?
        .into_iter()
        .filter_map(|o| o.order_configuration.limit_limit_gtc)
        .map(|limit| Order {
          price: limit.limit_price,
          size: limit.base_size,
        })
        .collect(),
    )
  }

  #[instrument(skip(self))]
  async fn cancel(&self, market: &str, side: OrderSide) -> Result<()> {
    let ids: Vec<String> = self
      .open_orders(market, side)
      .await?
      .into_iter()
      .map(|o| o.order_id)
      .collect();
    if ids.is_empty() {
      return Ok(());
    }
    let body = json!({ "order_ids": ids }).to_string();
    self
      .call(Method::POST, "orders/batch_cancel", "", Some(body))
      .await?;
    info!(count = ids.len(), "Orders cancelled");
    Ok(())
  }

  #[instrument(skip(self))]
  async fn order(&self, market: &str, request: &OrderRequest) -> Result<Option<String>> {
    let body = json!({
      "client_order_id": uuid::Uuid::new_v4().to_string(),
      "product_id": market,
      "side": request.side.as_upper(),
      "order_configuration": {
        "limit_limit_gtc": {
          "base_size": request.size.normalize().to_string(),
          "limit_price": request.price.normalize().to_string(),
        }
      }
    })
    .to_string();
    let reply = self.call(Method::POST, "orders", "", Some(body)).await?;
    let created: CreateOrderResponse = http::decode("create order", &reply)?;
    if !created.success {
      let ErrorResponse { error, message } = created.error_response;
      return Err(ExchangeError::Rejected {
        venue: INFO.name,
        message: if message.is_empty() { error } else { message },
      });
    }
    Ok(Some(created.success_response.order_id))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adapters::http::stub::Stub;
  use crate::config::Credentials;
  use p256::ecdsa::signature::Verifier;
  use rust_decimal_macros::dec;

  #[test]
  fn paths_get_brokerage_prefix() {
    assert_eq!(full_path("products"), "/api/v3/brokerage/products");
    assert_eq!(full_path("/api/v3/brokerage/orders"), "/api/v3/brokerage/orders");
    assert_eq!(
      sign_message("1700000000", &Method::POST, "orders", "{}"),
      "1700000000POST/api/v3/brokerage/orders{}"
    );
  }

  const KEY_NAME: &str = "organizations/abc/apiKeys/def";

  fn test_key() -> SecretKey {
    SecretKey::from_slice(&[7u8; 32]).unwrap()
  }

  fn venue(base_url: &str, api_key: &str, api_secret: &str) -> Coinbase {
    let ctx = VenueContext {
      credentials: Credentials {
        api_key: Some(api_key.into()),
        api_secret: Some(api_secret.into()),
        ..Credentials::default()
      },
      ..VenueContext::default()
    };
    Coinbase {
      base_url: base_url.to_string(),
      throttle: StaticThrottle::per_second(1000.0),
      ..Coinbase::new(&ctx).unwrap()
    }
  }

  fn segment(token: &str, index: usize) -> serde_json::Value {
    let part = token.split('.').nth(index).unwrap();
    serde_json::from_slice(&URL_SAFE_NO_PAD.decode(part).unwrap()).unwrap()
  }

  #[test]
  fn cloud_jwt_header_and_claims() {
    let key = SigningKey::from(test_key());
    let token = cloud_jwt(KEY_NAME, &key, &Method::GET, "products", 1_700_000_000, "42");

    let header = segment(&token, 0);
    assert_eq!(header["alg"], "ES256");
    assert_eq!(header["typ"], "JWT");
    assert_eq!(header["kid"], KEY_NAME);
    assert_eq!(header["nonce"], "42");

    let claims = segment(&token, 1);
    assert_eq!(claims["sub"], KEY_NAME);
    assert_eq!(claims["iss"], "coinbase-cloud");
    assert_eq!(claims["nbf"], 1_700_000_000);
    assert_eq!(claims["exp"], 1_700_000_120);
    assert_eq!(claims["uri"], "GET api.coinbase.com/api/v3/brokerage/products");

    let (input, signature) = token.rsplit_once('.').unwrap();
    let signature = Signature::from_slice(&URL_SAFE_NO_PAD.decode(signature).unwrap()).unwrap();
    assert!(key.verifying_key().verify(input.as_bytes(), &signature).is_ok());
  }

  #[test]
  fn cloud_key_accepts_escaped_pem() {
    let pem = test_key().to_sec1_pem(p256::pkcs8::LineEnding::LF).unwrap();
    let escaped = pem.replace('\n', "\\n");
    let key = cloud_key(&escaped).unwrap();
    assert_eq!(key, SigningKey::from(test_key()));
    assert!(matches!(cloud_key("not a key"), Err(ExchangeError::Config(_))));
  }

  #[tokio::test]
  async fn cloud_keys_send_a_bearer_token() {
    let stub = Stub::start(&[("/api/v3/brokerage/products/BTC-USD", 200, r#"{"product_id":"BTC-USD","price":"27000.5"}"#)]).await;
    let pem = test_key().to_sec1_pem(p256::pkcs8::LineEnding::LF).unwrap();
    let venue = venue(&stub.base_url, KEY_NAME, &pem);

    assert_eq!(venue.ticker("BTC-USD").await.unwrap(), Some(dec!(27000.5)));
    let seen = stub.seen();
    let bearer = seen[0].headers["authorization"].strip_prefix("Bearer ").unwrap();
    assert_eq!(segment(bearer, 1)["uri"], "GET api.coinbase.com/api/v3/brokerage/products/BTC-USD");
    assert!(!seen[0].headers.contains_key("cb-access-sign"));
  }

  #[tokio::test]
  async fn open_orders_follow_the_cursor() {
    let stub = Stub::start(&[
      (
        "/api/v3/brokerage/orders/historical/batch",
        200,
        r#"{"orders":[{"order_id":"a1"}],"has_next":true,"cursor":"c1"}"#,
      ),
      (
        "/api/v3/brokerage/orders/historical/batch",
        200,
        r#"{"orders":[{"order_id":"b2"}],"has_next":false,"cursor":""}"#,
      ),
    ])
    .await;
    let venue = venue(&stub.base_url, "legacy", "secret");

    let ids: Vec<String> = venue
      .open_orders("BTC-USD", OrderSide::Buy)
      .await
      .unwrap()
      .into_iter()
      .map(|o| o.order_id)
      .collect();
    assert_eq!(ids, ["a1", "b2"]);

    let pages = stub.seen_on("/api/v3/brokerage/orders/historical/batch");
    assert_eq!(pages[0].param("cursor"), None);
    assert_eq!(pages[1].param("cursor"), Some("c1"));
    assert_eq!(pages[1].param("order_side"), Some("BUY"));
    assert_eq!(pages[1].headers["cb-access-key"], "legacy");
  }

  #[test]
  fn decode_open_orders() {
    let orders: OpenOrders = serde_json::from_str(
      r#"{"orders":[{"order_id":"a1","product_id":"BTC-USD","side":"BUY","status":"OPEN",
        "order_configuration":{"limit_limit_gtc":{"base_size":"0.001","limit_price":"25000.00","post_only":false}}}],
        "has_next":false}"#,
    )
    .unwrap();
    let limit = orders.orders[0].order_configuration.limit_limit_gtc.clone().unwrap();
    assert_eq!(limit.base_size, dec!(0.001));
    assert_eq!(limit.limit_price, dec!(25000));
  }

  #[test]
  fn create_order_failure_message() {
    let created: CreateOrderResponse = serde_json::from_str(
      r#"{"success":false,"error_response":{"error":"INSUFFICIENT_FUND","message":"Insufficient balance in source account"}}"#,
    )
    .unwrap();
    assert!(!created.success);
    assert_eq!(created.error_response.message, "Insufficient balance in source account");
  }
}
