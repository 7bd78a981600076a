//! CoinGecko token metadata.
//!
//! The coin list (with per-platform contract addresses) is fetched once per
//! client. Coin details, which carry decimals and USD prices, are fetched
//! per coin id and memoised. The free tier allows a handful of calls per
//! minute, so every request goes through a static throttle.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::instrument;

use super::{chain, is_address};
use crate::adapters::cache::RefreshingCache;
use crate::adapters::http::{self, Reply};
use crate::adapters::throttle::StaticThrottle;
use crate::config::CoingeckoConfig;
use crate::error::{ExchangeError, Result};

const SERVICE: &str = "CoinGecko";

#[derive(Debug, Clone, Deserialize)]
struct Coin {
  id: String,
  symbol: String,
  #[serde(default)]
  platforms: HashMap<String, Option<String>>,
}

#[derive(Debug, Clone, Deserialize)]
struct PlatformDetail {
  #[serde(default)]
  decimal_place: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct ConvertedLast {
  usd: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
struct CoinTicker {
  converted_last: ConvertedLast,
}

#[derive(Debug, Clone, Deserialize)]
struct CoinDetail {
  #[serde(default)]
  detail_platforms: HashMap<String, Option<PlatformDetail>>,
  #[serde(default)]
  tickers: Vec<CoinTicker>,
}

#[derive(Debug, Deserialize)]
struct ErrorStatus {
  #[serde(default)]
  error_message: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
  #[serde(default)]
  error: String,
  #[serde(default)]
  status: Option<ErrorStatus>,
}

/// A coin listed on a given platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinRef {
  pub id: String,
  pub symbol: String,
  pub address: String,
}

/// Match by symbol, or by contract address when `needle` is one.
fn find_coin(coins: &[Coin], needle: &str, platform: &str) -> Option<CoinRef> {
  let by_address = is_address(needle);
  coins.iter().find_map(|coin| {
    let address = coin.platforms.get(platform)?.as_deref()?;
    if address.is_empty() {
      return None;
    }
    let hit = coin.symbol.eq_ignore_ascii_case(needle) || (by_address && address.eq_ignore_ascii_case(needle));
    hit.then(|| CoinRef {
      id: coin.id.clone(),
      symbol: coin.symbol.clone(),
      address: address.to_string(),
    })
  })
}

fn rejected(reply: &Reply) -> ExchangeError {
  let message = match reply.json::<ApiError>("error") {
    Ok(e) if !e.error.is_empty() => e.error,
    Ok(ApiError {
      status: Some(status), ..
    }) if !status.error_message.is_empty() => status.error_message,
    _ => format!("HTTP {}", reply.status),
  };
  ExchangeError::Rejected {
    venue: SERVICE,
    message,
  }
}

pub struct Coingecko {
  http: Client,
  base_url: String,
  throttle: StaticThrottle,
  coins: RefreshingCache<Vec<Coin>>,
  details: Mutex<HashMap<String, Arc<CoinDetail>>>,
}

impl Coingecko {
  pub fn new(http: Client, config: &CoingeckoConfig) -> Self {
    Self {
      http,
      base_url: config.base_url.trim_end_matches('/').to_string(),
      throttle: StaticThrottle::per_minute(config.requests_per_minute),
      coins: RefreshingCache::new(),
      details: Mutex::new(HashMap::new()),
    }
  }

  async fn get(&self, path: &str) -> Result<String> {
    self.throttle.before().await;
    let reply = http::send(self.http.get(format!("{}/{path}", self.base_url))).await;
    self.throttle.after().await;
    let reply = reply?;
    if !reply.is_success() {
      return Err(rejected(&reply));
    }
    Ok(reply.body)
  }

  async fn fetch_coins(&self) -> Result<Vec<Coin>> {
    let body = self.get("coins/list?include_platform=true").await?;
    http::decode("coin list", &body)
  }

  #[instrument(skip(self))]
  async fn detail(&self, id: &str) -> Result<Arc<CoinDetail>> {
    let mut details = self.details.lock().await;
    if let Some(detail) = details.get(id) {
      return Ok(Arc::clone(detail));
    }
    let body = self.get(&format!("coins/{id}")).await?;
    let detail: Arc<CoinDetail> = Arc::new(http::decode("coin", &body)?);
    details.insert(id.to_string(), Arc::clone(&detail));
    Ok(detail)
  }

  /// The coin matching `symbol` (or contract address) on `chain_id`.
  pub async fn coin(&self, symbol: &str, chain_id: u64) -> Result<Option<CoinRef>> {
    let platform = chain(chain_id)?.platform;
    let coins = self.coins.get(|| self.fetch_coins()).await?;
    Ok(find_coin(&coins, symbol, platform))
  }

  /// Contract decimals of coin `id` on `chain_id`.
  pub async fn decimals(&self, id: &str, chain_id: u64) -> Result<u32> {
    let platform = chain(chain_id)?.platform;
    let detail = self.detail(id).await?;
    detail
      .detail_platforms
      .get(platform)
      .and_then(|d| d.as_ref())
      .and_then(|d| d.decimal_place)
      .ok_or_else(|| ExchangeError::Rejected {
        venue: SERVICE,
        message: format!("{id}'s decimals not found on chain {platform}"),
      })
  }

  /// Last USD price of coin `id`, from its first listed ticker.
  pub async fn usd_price(&self, id: &str) -> Result<Decimal> {
    let detail = self.detail(id).await?;
    detail
      .tickers
      .first()
      .map(|t| t.converted_last.usd)
      .ok_or_else(|| ExchangeError::Rejected {
        venue: SERVICE,
        message: format!("{id}'s ticker not found"),
      })
  }
}
