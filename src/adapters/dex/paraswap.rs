//! ParaSwap limit orders (AugustusRFQ).
//!
//! Orders are EIP-712 signed against the chain's AugustusRFQ contract and
//! posted to the ParaSwap order API. There is no nonce: uniqueness comes
//! from random bits packed into `nonceAndMeta` above the taker address.

use alloy::primitives::{Address, U256, address};
use async_trait::async_trait;
use rand::Rng;
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
  code: "PSP",
  name: "ParaSwap",
};

const API_BASE: &str = "https://api.paraswap.io/";
const REQUESTS_PER_SECOND: f64 = 1.0;
const CANCEL_URL: &str = "https://app.paraswap.io/#/limit";
const APPROVE_URL: &str = "https://app.velora.xyz/#/limit";

const ORDER_FIELDS: [(&str, &str); 8] = [
  ("nonceAndMeta", "uint256"),
  ("expiry", "uint128"),
  ("makerAsset", "address"),
  ("takerAsset", "address"),
  ("maker", "address"),
  ("taker", "address"),
  ("makerAmount", "uint256"),
  ("takerAmount", "uint256"),
];

/// AugustusRFQ deployment per chain.
pub fn router(chain_id: u64) -> Result<Address> {
  Ok(match chain_id {
    super::ETHEREUM => address!("e92b586627cca7a83dc919cc7127196d70f55a06"),
    super::OPTIMISM | super::ARBITRUM => address!("0927fd43a7a87e3e8b81df2c44b03c4756849f6d"),
    super::BINANCE_SMART_CHAIN => address!("8dcdfe88ef0351f27437284d0710cd65b20288bb"),
    super::POLYGON => address!("F3CD476C3C4D3Ac5cA2724767f269070CA09A043"),
    super::FANTOM => address!("2df17455b96dde3618fd6b1c3a9aa06d6ab89347"),
    super::BASE => address!("a003dFBA51C9e1e56C67ae445b852bdEd7aC5EEd"),
    super::AVALANCHE => address!("34302c4267d0da0a8c65510282cc22e9e39df51f"),
    other => return Err(ExchangeError::UnsupportedChain(other)),
  })
}

/// Taker address in the low 160 bits, `meta` above it.
pub fn nonce_and_meta(taker: Address, meta: u64) -> U256 {
  U256::from_be_slice(taker.as_slice()) + (U256::from(meta) << 160)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LimitOrder {
  expiry: i64,
  nonce_and_meta: String,
  maker: String,
  taker: String,
  maker_asset: String,
  taker_asset: String,
  maker_amount: String,
  taker_amount: String,
  #[serde(default)]
  signature: String,
  #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
  kind: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  state: Option<String>,
}

impl LimitOrder {
  fn is_pending_limit(&self) -> bool {
    self.kind.as_deref() == Some("LIMIT") && self.state.as_deref() == Some("PENDING")
  }

  fn amounts(&self) -> Result<Amounts> {
    Ok(Amounts {
      maker_asset: parse_address(&self.maker_asset)?,
      taker_asset: parse_address(&self.taker_asset)?,
      making: parse_amount(&self.maker_amount)?,
      taking: parse_amount(&self.taker_amount)?,
    })
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrdersPage {
  #[serde(default)]
  orders: Vec<LimitOrder>,
  #[serde(default)]
  has_more: bool,
}

#[derive(Debug, Deserialize)]
struct ApiError {
  error: String,
}

fn rejected(reply: &Reply) -> ExchangeError {
  let message = reply
    .json::<ApiError>("error")
    .map_or_else(|_| format!("HTTP {}", reply.status), |e| e.error);
  ExchangeError::Rejected {
    venue: INFO.name,
    message,
  }
}

pub struct ParaSwap {
  dex: Dex,
  http: Client,
  throttle: StaticThrottle,
}

impl ParaSwap {
  pub fn new(ctx: &VenueContext) -> Result<Self> {
    Ok(Self {
      dex: Dex::new(INFO.name, ctx)?,
      http: ctx.http()?,
      throttle: StaticThrottle::per_second(REQUESTS_PER_SECOND),
    })
  }

  async fn call(&self, method: Method, path: &str, body: Option<String>) -> Result<String> {
    let mut builder = self.http.request(method, format!("{API_BASE}{path}"));
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

  async fn limit_orders(&self, chain_id: u64, owner: Address) -> Result<Vec<LimitOrder>> {
    let mut out = Vec::new();
    let mut offset = 0;
    loop {
      let path = format!("ft/orders/{chain_id}/maker/{owner}?offset={offset}");
      let body = self.call(Method::GET, &path, None).await?;
      let page: OrdersPage = http::decode("limit orders", &body)?;
      out.extend(page.orders);
      if !page.has_more {
        break;
      }
      offset += 1;
    }
    Ok(out)
  }
}

#[async_trait]
impl Exchange for ParaSwap {
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
    for order in self.limit_orders(chain_id, owner).await? {
      if !order.is_pending_limit() {
        continue;
      }
      if let Some(found) = unscale(side, &order.amounts()?, (&asset, asset_dec), (&quote, quote_dec))? {
        out.push(found);
      }
    }
    Ok(out)
  }

  async fn cancel(&self, market: &str, side: OrderSide) -> Result<()> {
    if self.orders(market, side).await?.is_empty() {
      return Ok(());
    }
    Err(ExchangeError::CancelUnsupported(CANCEL_URL.to_string()))
  }

  #[instrument(skip(self))]
  async fn order(&self, market: &str, request: &OrderRequest) -> Result<Option<String>> {
    let chain_id = self.dex.chain_id()?;
    let router = router(chain_id)?;
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
      .ensure_allowance(amounts.maker_asset, maker, router, amounts.making, APPROVE_URL)
      .await?;

    let taker = Address::ZERO;
    let meta = rand::thread_rng().gen_range(1..(1_u64 << 53));
    let mut order = LimitOrder {
      expiry: request.expiry.map_or(0, |at| at.timestamp()),
      nonce_and_meta: nonce_and_meta(taker, meta).to_string(),
      maker: maker.to_checksum(None),
      taker: taker.to_checksum(None),
      maker_asset: amounts.maker_asset.to_checksum(None),
      taker_asset: amounts.taker_asset.to_checksum(None),
      maker_amount: amounts.making.to_string(),
      taker_amount: amounts.taking.to_string(),
      signature: String::new(),
      kind: None,
      state: None,
    };

    let domain = eip712::Domain {
      name: "AUGUSTUS RFQ",
      version: "1",
      chain_id,
      verifying_contract: router,
    };
    let message = serde_json::json!({
      "nonceAndMeta": order.nonce_and_meta,
      "expiry": order.expiry.to_string(),
      "makerAsset": order.maker_asset,
      "takerAsset": order.taker_asset,
      "maker": order.maker,
      "taker": order.taker,
      "makerAmount": order.maker_amount,
      "takerAmount": order.taker_amount,
    });
    let typed = eip712::order(&domain, &ORDER_FIELDS, message)?;
    let (hash, signature) = eip712::sign(&signer, &typed)?;
    order.signature = signature;

    let body = serde_json::to_string(&order).map_err(|e| ExchangeError::Signing(e.to_string()))?;
    self
      .call(Method::POST, &format!("ft/orders/{chain_id}"), Some(body))
      .await?;
    info!(order_hash = %hash, "Limit order posted");
    Ok(Some(hash.to_string()))
  }

  async fn nonce(&self) -> Result<Option<U256>> {
    Ok(Some(U256::ZERO))
  }
}
