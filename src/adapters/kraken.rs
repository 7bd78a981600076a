//! Kraken spot venue.
//!
//! Markets are `UPPER(asset + quote)`; Kraken resolves common spellings
//! (`BTCUSD`) to its own pair names (`XXBTZUSD`, altname `XBTUSD`). Private
//! calls are form-encoded POSTs with an `API-Sign` header (see
//! [`signing::kraken`]).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{info, instrument};

use crate::adapters::cache::RefreshingCache;
use crate::adapters::http;
use crate::adapters::registry::VenueContext;
use crate::adapters::signing;
use crate::adapters::throttle::StaticThrottle;
use crate::domain::{Order, OrderSide, Precision};
use crate::error::{ExchangeError, Result};
use crate::ports::{Exchange, OrderRequest, VenueInfo};

pub const INFO: VenueInfo = VenueInfo {
  code: "KRKN",
  name: "Kraken",
};

const API_BASE: &str = "https://api.kraken.com";
const REQUESTS_PER_SECOND: f64 = 1.0;

// ────────────────────────────────────────────
// Payloads
// ────────────────────────────────────────────

/// Every Kraken response wraps its payload.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
  #[serde(default)]
  error: Vec<String>,
  result: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
struct AssetPair {
  altname: String,
  #[serde(default)]
  wsname: Option<String>,
  pair_decimals: u32,
  lot_decimals: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PairInfo {
  precision: Precision,
}

#[derive(Debug, Deserialize)]
struct Ticker {
  /// Last trade closed: `[price, lot volume]`.
  c: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OrderDescription {
  pair: String,
  #[serde(rename = "type")]
  side: String,
  price: Decimal,
}

#[derive(Debug, Deserialize)]
struct OpenOrder {
  status: String,
  descr: OrderDescription,
  vol: Decimal,
}

#[derive(Debug, Deserialize)]
struct OpenOrders {
  #[serde(default)]
  open: HashMap<String, OpenOrder>,
}

#[derive(Debug, Deserialize)]
struct AddOrder {
  #[serde(default)]
  txid: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CancelOrder {
  #[serde(default)]
  count: u32,
  #[serde(default)]
  pending: bool,
}

fn unwrap_envelope<T: DeserializeOwned>(what: &str, body: &str) -> Result<T> {
  let envelope: Envelope<T> = http::decode(what, body)?;
  if !envelope.error.is_empty() {
    return Err(ExchangeError::Rejected {
      venue: INFO.name,
      message: envelope.error.join(", "),
    });
  }
  envelope.result.ok_or_else(|| ExchangeError::Rejected {
    venue: INFO.name,
    message: format!("empty {what} response"),
  })
}

/// Index pairs under every name a user or the API may use for them.
fn index_pairs(pairs: HashMap<String, AssetPair>) -> HashMap<String, PairInfo> {
  let mut out = HashMap::new();
  for (key, pair) in pairs {
    let info = PairInfo {
      precision: Precision {
        price: pair.pair_decimals,
        size: pair.lot_decimals,
      },
    };
    if let Some(ws) = pair.wsname.as_deref() {
      out.insert(ws.replace('/', "").replace("XBT", "BTC"), info);
    }
    out.insert(pair.altname.replace("XBT", "BTC"), info);
    out.insert(pair.altname, info);
    out.insert(key, info);
  }
  out
}

/// Kraken reports `descr.pair` as the altname, which may spell BTC as XBT.
fn same_pair(reported: &str, market: &str) -> bool {
  reported.eq_ignore_ascii_case(market)
    || reported.replace("XBT", "BTC").eq_ignore_ascii_case(&market.replace("XBT", "BTC"))
}

// ────────────────────────────────────────────
// Client
// ────────────────────────────────────────────

pub struct Kraken {
  http: Client,
  api_key: Option<String>,
  api_secret: Option<String>,
  throttle: StaticThrottle,
  last_nonce: AtomicU64,
  pairs: RefreshingCache<HashMap<String, PairInfo>>,
}

impl Kraken {
  pub fn new(ctx: &VenueContext) -> Result<Self> {
    Ok(Self {
      http: ctx.http()?,
      api_key: ctx.credentials.api_key.clone(),
      api_secret: ctx.credentials.api_secret.clone(),
      throttle: StaticThrottle::per_second(REQUESTS_PER_SECOND),
      last_nonce: AtomicU64::new(0),
      pairs: RefreshingCache::new(),
    })
  }

  /// Strictly increasing millisecond nonce.
  fn nonce(&self) -> u64 {
    let now = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
    let prev = self
      .last_nonce
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
      .unwrap_or(now);
    now.max(prev + 1)
  }

  async fn public<T: DeserializeOwned>(&self, what: &str, path: &str) -> Result<T> {
    self.throttle.before().await;
    let reply = http::send(self.http.get(format!("{API_BASE}{path}"))).await;
    self.throttle.after().await;
    unwrap_envelope(what, &reply?.body)
  }

  async fn private<T: DeserializeOwned>(
    &self,
    what: &str,
    method: &str,
    params: &[(&str, String)],
  ) -> Result<T> {
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

    let nonce = self.nonce().to_string();
    let mut post_data = format!("nonce={nonce}");
    for (k, v) in params {
      post_data.push_str(&format!("&{k}={v}"));
    }
    let path = format!("/0/private/{method}");
    let signature = signing::kraken(&path, &nonce, &post_data, secret)?;

    let builder = self
      .http
      .post(format!("{API_BASE}{path}"))
      .header("API-Key", key)
      .header("API-Sign", signature)
      .header("Content-Type", "application/x-www-form-urlencoded")
      .body(post_data);

    self.throttle.before().await;
    let reply = http::send(builder).await;
    self.throttle.after().await;
    unwrap_envelope(what, &reply?.body)
  }

  async fn fetch_pairs(&self) -> Result<HashMap<String, PairInfo>> {
    let pairs: HashMap<String, AssetPair> = self.public("asset pairs", "/0/public/AssetPairs").await?;
    Ok(index_pairs(pairs))
  }

  async fn open_orders(&self, market: &str, side: OrderSide) -> Result<Vec<(String, OpenOrder)>> {
    let orders: OpenOrders = self.private("open orders", "OpenOrders", &[]).await?;
    Ok(
      orders
        .open
        .into_iter()
        .filter(|(_, o)| {
          o.status == "open" && same_pair(&o.descr.pair, market) && side.matches(&o.descr.side)
        })
        .collect(),
    )
  }
}

#[async_trait]
impl Exchange for Kraken {
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
    self
      .pairs
      .lookup(|| self.fetch_pairs(), |pairs| pairs.get(market).map(|p| p.precision))
      .await?
      .ok_or_else(|| ExchangeError::MarketNotFound(market.to_string()))
  }

  #[instrument(skip(self))]
  async fn ticker(&self, market: &str) -> Result<Option<Decimal>> {
    let tickers: HashMap<String, Ticker> = self
      .public("ticker", &format!("/0/public/Ticker?pair={market}"))
      .await?;
    let last = tickers
      .values()
      .next()
      .and_then(|t| t.c.first())
      .ok_or_else(|| ExchangeError::MarketNotFound(market.to_string()))?;
    let price = last.parse().map_err(|_| ExchangeError::Rejected {
      venue: INFO.name,
      message: format!("invalid ticker price {last:?}"),
    })?;
    Ok(Some(price))
  }

  async fn orders(&self, market: &str, side: OrderSide) -> Result<Vec<Order>> {
    Ok(
      self
        .open_orders(market, side)
        .await?
        .into_iter()
        .map(|(_, o)| Order {
          price: o.descr.price,
          size: o.vol,
        })
        .collect(),
    )
  }

  #[instrument(skip(self))]
  async fn cancel(&self, market: &str, side: OrderSide) -> Result<()> {
    for (txid, _) in self.open_orders(market, side).await? {
      let result: CancelOrder = self
        .private("cancel order", "CancelOrder", &[("txid", txid.clone())])
        .await?;
      if result.count == 0 && !result.pending {
        return Err(ExchangeError::Rejected {
          venue: INFO.name,
          message: format!("cannot cancel order {txid}"),
        });
      }
      info!(txid = %txid, "Order cancelled");
    }
    Ok(())
  }

  #[instrument(skip(self))]
  async fn order(&self, market: &str, request: &OrderRequest) -> Result<Option<String>> {
    let params = [
      ("ordertype", "limit".to_string()),
      ("type", request.side.as_lower().to_string()),
      ("volume", request.size.normalize().to_string()),
      ("pair", market.to_string()),
      ("price", request.price.normalize().to_string()),
    ];
    let added: AddOrder = self.private("add order", "AddOrder", &params).await?;
    Ok(added.txid.into_iter().next())
  }
}
