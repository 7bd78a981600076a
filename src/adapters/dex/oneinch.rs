//! 1inch limit order protocol v4.
//!
//! Orders are signed off-chain against the Aggregation Router v6 and posted
//! to the 1inch orderbook API. Cancelling requires an on-chain transaction,
//! so `cancel` only points the user at the 1inch app when orders exist.

use alloy::primitives::{Address, U256, address};
use async_trait::async_trait;
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::{Amounts, Dex, eip712, parse_address, parse_amount, scale, unscale};
use crate::adapters::http::{self, Reply};
use crate::adapters::registry::VenueContext;
use crate::adapters::throttle::StaticThrottle;
use crate::domain::{Order, OrderSide, Precision};
use crate::error::{ExchangeError, Result};
use crate::ports::{Exchange, OrderRequest, VenueInfo};

pub const INFO: VenueInfo = VenueInfo {
  code: "",
  name: "1inch",
};

/// Aggregation Router v6, same address on every supported chain.
pub const ROUTER: Address = address!("111111125421cA6dc452d289314280a0f8842A65");
const REQUESTS_PER_SECOND: f64 = 1.0;
const PAGE_LIMIT: usize = 100;

const ALLOW_MULTIPLE_FILLS: usize = 254;
const NONCE_SHIFT: usize = 120;
const EXPIRY_SHIFT: usize = 80;
const FORTY_BITS: u64 = (1 << 40) - 1;

const ORDER_FIELDS: [(&str, &str); 8] = [
  ("salt", "uint256"),
  ("makerAsset", "address"),
  ("takerAsset", "address"),
  ("maker", "address"),
  ("receiver", "address"),
  ("makingAmount", "uint256"),
  ("takingAmount", "uint256"),
  ("makerTraits", "uint256"),
];

// ────────────────────────────────────────────
// Order encoding
// ────────────────────────────────────────────

/// Limit order options packed into one word.
///
/// Partial and multiple fills are allowed; nonce (epoch) and expiry are
/// 40-bit fields. An expiry of 0 never expires.
pub fn maker_traits(nonce: U256, expiry: u64) -> U256 {
  let forty = U256::from(FORTY_BITS);
  (U256::from(1) << ALLOW_MULTIPLE_FILLS)
    | ((nonce & forty) << NONCE_SHIFT)
    | ((U256::from(expiry) & forty) << EXPIRY_SHIFT)
}

/// 96 random bits in the high part; the low 160 bits stay zero (no extension).
pub fn salt(random: [u8; 12]) -> U256 {
  U256::from_be_slice(&random) << 160
}

fn word_hex(value: U256) -> String {
  format!("0x{}", hex::encode(value.to_be_bytes::<32>()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderData {
  salt: String,
  maker_asset: String,
  taker_asset: String,
  maker: String,
  receiver: String,
  making_amount: String,
  taking_amount: String,
  maker_traits: String,
}

impl OrderData {
  fn amounts(&self) -> Result<Amounts> {
    Ok(Amounts {
      maker_asset: parse_address(&self.maker_asset)?,
      taker_asset: parse_address(&self.taker_asset)?,
      making: parse_amount(&self.making_amount)?,
      taking: parse_amount(&self.taking_amount)?,
    })
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedOrder {
  order_hash: String,
  signature: String,
  data: OrderData,
}

#[derive(Debug, Deserialize)]
struct ApiError {
  #[serde(default)]
  error: String,
  #[serde(default)]
  message: String,
}

/// Join `error` and `message` into one sentence.
fn rejected(reply: &Reply) -> ExchangeError {
  let message = match reply.json::<ApiError>("error") {
    Ok(ApiError { error, message }) => {
      let mut text = error.trim().to_string();
      if !message.is_empty() {
        if !text.is_empty() {
          text.push_str(if text.ends_with('.') { " " } else { ". " });
        }
        text.push_str(&message);
      }
      if text.is_empty() { format!("HTTP {}", reply.status) } else { text }
    }
    Err(_) => format!("HTTP {}", reply.status),
  };
  ExchangeError::Rejected {
    venue: INFO.name,
    message,
  }
}

// ────────────────────────────────────────────
// Client
// ────────────────────────────────────────────

pub struct OneInch {
  dex: Dex,
  http: Client,
  base_url: String,
  api_key: Option<String>,
  throttle: StaticThrottle,
}

impl OneInch {
  pub fn new(ctx: &VenueContext) -> Result<Self> {
    let api_key = ctx
      .config
      .oneinch
      .api_key
      .clone()
      .or_else(|| ctx.credentials.api_key.clone());
    Ok(Self {
      dex: Dex::new(INFO.name, ctx)?,
      http: ctx.http()?,
      base_url: ctx.config.oneinch.base_url.trim_end_matches('/').to_string(),
      api_key,
      throttle: StaticThrottle::per_second(REQUESTS_PER_SECOND),
    })
  }

  async fn call(&self, method: Method, path: &str, body: Option<String>) -> Result<String> {
    let key = self
      .api_key
      .as_deref()
      .filter(|k| !k.is_empty())
      .ok_or_else(|| ExchangeError::missing_flag("api-key"))?;
    let mut builder = self
      .http
      .request(method, format!("{}{path}", self.base_url))
      .bearer_auth(key);
    if let Some(body) = body {
      builder = builder.header("Content-Type", "application/json").body(body);
    }

    self.throttle.before().await;
    let reply = http::send(builder).await;
    self.throttle.after().await;
    let reply = reply?;
    if !reply.is_success() {
      return Err(rejected(&reply));
    }
    Ok(reply.body)
  }

  async fn signed_orders(&self, chain_id: u64, owner: Address) -> Result<Vec<SignedOrder>> {
    let mut out = Vec::new();
    for page in 1.. {
      let path = format!(
        "/orderbook/v4.0/{chain_id}/address/{owner}?page={page}&limit={PAGE_LIMIT}&sortBy=createDateTime"
      );
      let body = self.call(Method::GET, &path, None).await?;
      let batch: Vec<SignedOrder> = http::decode("limit orders", &body)?;
      let done = batch.len() < PAGE_LIMIT;
      out.extend(batch);
      if done {
        break;
      }
    }
    Ok(out)
  }
}

#[async_trait]
impl Exchange for OneInch {
  fn info(&self) -> VenueInfo {
    INFO
  }

  async fn format_symbol(&self, asset: &str) -> Result<String> {
    self.dex.format_symbol(asset).await
  }

  fn format_market(&self, asset: &str, quote: &str) -> Result<String> {
    self.dex.format_market(asset, quote)
  }

  async fn precision(&self, market: &str) -> Result<Precision> {
    self.dex.precision(market).await
  }

  async fn ticker(&self, market: &str) -> Result<Option<Decimal>> {
    self.dex.ticker(market).await
  }

  #[instrument(skip(self))]
  async fn orders(&self, market: &str, side: OrderSide) -> Result<Vec<Order>> {
    let chain_id = self.dex.chain_id()?;
    let owner = self.dex.signer()?.address();
    let ((asset, asset_dec), (quote, quote_dec)) = self.dex.market(market).await?;
    let mut out = Vec::new();
    for order in self.signed_orders(chain_id, owner).await? {
      let amounts = order.data.amounts()?;
      if let Some(found) = unscale(side, &amounts, (&asset, asset_dec), (&quote, quote_dec))? {
        out.push(found);
      }
    }
    Ok(out)
  }

  async fn cancel(&self, market: &str, side: OrderSide) -> Result<()> {
    if self.orders(market, side).await?.is_empty() {
      return Ok(());
    }
    let (asset, quote) = market
      .split_once('-')
      .ok_or_else(|| ExchangeError::MarketNotFound(market.to_string()))?;
    let (maker, taker) = match side {
      OrderSide::Buy => (quote, asset),
      OrderSide::Sell => (asset, quote),
    };
    Err(ExchangeError::CancelUnsupported(format!(
      "https://app.1inch.io/#/{}/advanced/limit-order/{maker}/{taker}",
      self.dex.chain_id()?
    )))
  }

  #[instrument(skip(self))]
  async fn order(&self, market: &str, request: &OrderRequest) -> Result<Option<String>> {
    let chain_id = self.dex.chain_id()?;
    let signer = self.dex.signer()?;
    let maker = signer.address();
    let ((asset, asset_dec), (quote, quote_dec)) = self.dex.market(market).await?;
    let amounts = scale(
      request.side,
      request.size,
      request.price,
      (&asset, asset_dec),
      (&quote, quote_dec),
    )?;

    self
      .dex
      .ensure_allowance(
        amounts.maker_asset,
        maker,
        ROUTER,
        amounts.making,
        &format!("https://app.1inch.io/#/{chain_id}/advanced/limit-order"),
      )
      .await?;

    let expiry = request
      .expiry
      .map_or(0, |at| u64::try_from(at.timestamp()).unwrap_or_default());
    let traits = maker_traits(request.nonce.unwrap_or_default(), expiry);
    let data = OrderData {
      salt: salt(rand::random()).to_string(),
      maker_asset: amounts.maker_asset.to_checksum(None),
      taker_asset: amounts.taker_asset.to_checksum(None),
      maker: maker.to_checksum(None),
      receiver: Address::ZERO.to_checksum(None),
      making_amount: amounts.making.to_string(),
      taking_amount: amounts.taking.to_string(),
      maker_traits: word_hex(traits),
    };

    let domain = eip712::Domain {
      name: "1inch Aggregation Router",
      version: "6",
      chain_id,
      verifying_contract: ROUTER,
    };
    let message = serde_json::to_value(&data).map_err(|e| ExchangeError::Signing(e.to_string()))?;
    let typed = eip712::order(&domain, &ORDER_FIELDS, message)?;
    let (hash, signature) = eip712::sign(&signer, &typed)?;

    let order = SignedOrder {
      order_hash: hash.to_string(),
      signature,
      data,
    };
    let body = serde_json::to_string(&order).map_err(|e| ExchangeError::Signing(e.to_string()))?;
    self
      .call(Method::POST, &format!("/orderbook/v4.0/{chain_id}"), Some(body))
      .await?;
    info!(order_hash = %order.order_hash, "Limit order posted");
    Ok(Some(order.order_hash))
  }

  async fn nonce(&self) -> Result<Option<U256>> {
    let maker = self.dex.signer()?.address();
    let epoch = self.dex.web3()?.epoch(ROUTER, maker).await?;
    Ok(Some(epoch))
  }
}
