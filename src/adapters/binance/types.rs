//! Binance spot REST payloads.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::{Precision, precision};

/// Error body returned with non-2xx statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
  pub code: i64,
  pub msg: String,
}

/// "Timestamp for this request is outside of the recvWindow."
pub const ERR_TIMESTAMP_OUTSIDE_WINDOW: i64 = -1021;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerTime {
  pub server_time: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
  pub rate_limit_type: String,
  pub interval: String,
  #[serde(default)]
  pub interval_num: i64,
  pub limit: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "filterType")]
pub enum Filter {
  #[serde(rename = "PRICE_FILTER", rename_all = "camelCase")]
  Price { tick_size: String },
  #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
  LotSize { step_size: String },
  #[serde(other)]
  Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SymbolInfo {
  pub symbol: String,
  #[serde(default)]
  pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeInfo {
  #[serde(default)]
  pub rate_limits: Vec<RateLimit>,
  #[serde(default)]
  pub symbols: Vec<SymbolInfo>,
}

impl ExchangeInfo {
  /// Requests per second allowed by the `REQUEST_WEIGHT` limit, or `None`
  /// when the venue reports none (or one that rounds down to zero).
  pub fn requests_per_second(&self) -> Option<f64> {
    let rl = self
      .rate_limits
      .iter()
      .find(|rl| rl.rate_limit_type == "REQUEST_WEIGHT")?;
    let per_interval = rl.limit / rl.interval_num.max(1);
    let rps = match rl.interval.as_str() {
      "SECOND" => per_interval,
      "MINUTE" => per_interval / 60,
      "DAY" => per_interval / (24 * 60 * 60),
      _ => return None,
    };
    (rps > 0).then_some(rps as f64)
  }

  /// Price and size precision per symbol.
  pub fn precisions(&self) -> HashMap<String, Precision> {
    self
      .symbols
      .iter()
      .map(|s| {
        let mut prec = Precision::default();
        for filter in &s.filters {
          match filter {
            Filter::Price { tick_size } => prec.price = precision::parse(tick_size),
            Filter::LotSize { step_size } => prec.size = precision::parse(step_size),
            Filter::Other => {}
          }
        }
        (s.symbol.clone(), prec)
      })
      .collect()
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TickerPrice {
  pub price: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrder {
  pub order_id: u64,
  pub price: Decimal,
  pub orig_qty: Decimal,
  pub side: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
  pub order_id: u64,
}
