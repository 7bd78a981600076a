//! On-chain Limit Order Venues - Shared DEX Base
//!
//! 1inch and ParaSwap both trade ERC-20 tokens through an off-chain order
//! book with EIP-712 signed orders. Everything they have in common lives in
//! [`Dex`], which each venue holds by composition:
//! - market parsing and token resolution (CoinGecko, raw address fallback)
//! - token decimals and USD-derived tickers
//! - scaling decimal sizes into integer token amounts and back
//! - the allowance check against the venue's router
//!
//! Nothing here touches the network at construction time. The chain id is
//! checked on first use, the private key only when an order is signed.

pub mod coingecko;
pub mod eip712;
pub mod oneinch;
pub mod paraswap;
pub mod web3;

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use rust_decimal::Decimal;
use tracing::debug;

use crate::adapters::registry::VenueContext;
use crate::config::AppConfig;
use crate::domain::{Order, OrderSide, Precision, precision};
use crate::error::{ExchangeError, Result};

use self::coingecko::Coingecko;
use self::web3::Web3;

// ────────────────────────────────────────────
// Chains
// ────────────────────────────────────────────

/// An EVM chain the DEX venues can trade on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chain {
  pub id: u64,
  /// CoinGecko asset platform id.
  pub platform: &'static str,
  /// Infura subdomain, when the chain is served through Infura.
  infura: Option<&'static str>,
  /// Keyless public endpoint otherwise.
  public: Option<&'static str>,
}

pub const ETHEREUM: u64 = 1;
pub const OPTIMISM: u64 = 10;
pub const BINANCE_SMART_CHAIN: u64 = 56;
pub const POLYGON: u64 = 137;
pub const FANTOM: u64 = 250;
pub const BASE: u64 = 8453;
pub const ARBITRUM: u64 = 42161;
pub const AVALANCHE: u64 = 43114;

const CHAINS: [Chain; 8] = [
  Chain {
    id: ETHEREUM,
    platform: "ethereum",
    infura: Some("mainnet"),
    public: None,
  },
  Chain {
    id: OPTIMISM,
    platform: "optimistic-ethereum",
    infura: Some("optimism-mainnet"),
    public: None,
  },
  Chain {
    id: BINANCE_SMART_CHAIN,
    platform: "binance-smart-chain",
    infura: None,
    public: Some("https://bsc-dataseed.binance.org"),
  },
  Chain {
    id: POLYGON,
    platform: "polygon-pos",
    infura: Some("polygon-mainnet"),
    public: None,
  },
  Chain {
    id: FANTOM,
    platform: "fantom",
    infura: None,
    public: Some("https://rpc.fantom.network"),
  },
  Chain {
    id: BASE,
    platform: "base",
    infura: None,
    public: Some("https://mainnet.base.org"),
  },
  Chain {
    id: ARBITRUM,
    platform: "arbitrum-one",
    infura: Some("arbitrum-mainnet"),
    public: None,
  },
  Chain {
    id: AVALANCHE,
    platform: "avalanche",
    infura: Some("avalanche-mainnet"),
    public: None,
  },
];

/// Look up a supported chain.
pub fn chain(id: u64) -> Result<&'static Chain> {
  CHAINS
    .iter()
    .find(|c| c.id == id)
    .ok_or(ExchangeError::UnsupportedChain(id))
}

/// JSON-RPC endpoint for `chain_id`.
///
/// A `[chains.rpc]` override wins, then Infura (which needs a key), then the
/// chain's public endpoint.
pub fn rpc_url(chain_id: u64, config: &AppConfig) -> Result<String> {
  if let Some(url) = config.chains.rpc_override(chain_id) {
    return Ok(url.to_string());
  }
  let chain = chain(chain_id)?;
  if let Some(host) = chain.infura {
    let key = config
      .chains
      .infura_api_key
      .as_deref()
      .filter(|k| !k.is_empty())
      .ok_or_else(|| {
        ExchangeError::Config(
          "please generate an API key on infura.io and set [chains] infura_api_key in ladder.toml"
            .to_string(),
        )
      })?;
    return Ok(format!("https://{host}.infura.io/v3/{key}"));
  }
  chain
    .public
    .map(str::to_string)
    .ok_or(ExchangeError::UnsupportedChain(chain_id))
}

/// A 42-character `0x` token address.
pub fn is_address(symbol: &str) -> bool {
  symbol.len() == 42 && symbol.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("0x"))
}

pub fn parse_address(raw: &str) -> Result<Address> {
  raw
    .parse()
    .map_err(|_| ExchangeError::Config(format!("{raw} is not a valid token address")))
}

// ────────────────────────────────────────────
// Tokens and amounts
// ────────────────────────────────────────────

/// A resolved token: CoinGecko id when listed, and its on-chain address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
  pub id: Option<String>,
  pub address: Address,
}

/// Integer amounts of one order, maker side first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Amounts {
  pub maker_asset: Address,
  pub taker_asset: Address,
  pub making: U256,
  pub taking: U256,
}

/// Scale a decimal order into token amounts.
///
/// A buy gives the quote (`size × price`) and takes the asset; a sell is
/// the reverse.
pub fn scale(
  side: OrderSide,
  size: Decimal,
  price: Decimal,
  asset: (&Token, u32),
  quote: (&Token, u32),
) -> Result<Amounts> {
  let (asset, asset_dec) = asset;
  let (quote, quote_dec) = quote;
  let base_units = precision::to_base_units(size, asset_dec).map_err(amount_error)?;
  let quote_units = precision::to_base_units(size * price, quote_dec).map_err(amount_error)?;
  Ok(match side {
    OrderSide::Buy => Amounts {
      maker_asset: quote.address,
      taker_asset: asset.address,
      making: quote_units,
      taking: base_units,
    },
    OrderSide::Sell => Amounts {
      maker_asset: asset.address,
      taker_asset: quote.address,
      making: base_units,
      taking: quote_units,
    },
  })
}

/// Read an open order back as size and price, or `None` when it belongs to
/// another pair or the opposite side.
pub fn unscale(
  side: OrderSide,
  amounts: &Amounts,
  asset: (&Token, u32),
  quote: (&Token, u32),
) -> Result<Option<Order>> {
  let (asset, asset_dec) = asset;
  let (quote, quote_dec) = quote;
  let (base, counter) = match side {
    OrderSide::Buy if amounts.maker_asset == quote.address && amounts.taker_asset == asset.address => {
      (amounts.taking, amounts.making)
    }
    OrderSide::Sell if amounts.maker_asset == asset.address && amounts.taker_asset == quote.address => {
      (amounts.making, amounts.taking)
    }
    _ => return Ok(None),
  };
  let size = precision::from_base_units(base, asset_dec).map_err(amount_error)?;
  let value = precision::from_base_units(counter, quote_dec).map_err(amount_error)?;
  let price = if size.is_zero() {
    Decimal::ZERO
  } else {
    precision::round(value / size, quote_dec)
  };
  Ok(Some(Order { price, size }))
}

/// Parse a decimal integer string as returned by order book APIs.
pub fn parse_amount(raw: &str) -> Result<U256> {
  U256::from_str_radix(raw, 10)
    .map_err(|_| ExchangeError::Config(format!("cannot convert {raw} to an integer amount")))
}

fn amount_error(e: precision::AmountError) -> ExchangeError {
  ExchangeError::Config(e.to_string())
}

// ────────────────────────────────────────────
// Shared base
// ────────────────────────────────────────────

/// State and behaviour shared by every DEX venue.
pub struct Dex {
  venue: &'static str,
  chain_id: u64,
  config: Arc<AppConfig>,
  private_key: Option<String>,
  coingecko: Coingecko,
}

impl Dex {
  pub fn new(venue: &'static str, ctx: &VenueContext) -> Result<Self> {
    Ok(Self {
      venue,
      chain_id: ctx.credentials.chain_id,
      config: Arc::clone(&ctx.config),
      private_key: ctx.credentials.private_key.clone(),
      coingecko: Coingecko::new(ctx.http()?, &ctx.config.coingecko),
    })
  }

  /// The configured chain, validated against the supported set.
  pub fn chain_id(&self) -> Result<u64> {
    chain(self.chain_id).map(|c| c.id)
  }

  pub fn web3(&self) -> Result<Web3> {
    Ok(Web3::new(rpc_url(self.chain_id()?, &self.config)?))
  }

  /// The order signer, from `--private-key`.
  pub fn signer(&self) -> Result<PrivateKeySigner> {
    let key = self
      .private_key
      .as_deref()
      .filter(|k| !k.is_empty())
      .ok_or_else(|| ExchangeError::missing_flag("private-key"))?;
    key
      .trim_start_matches("0x")
      .parse()
      .map_err(|_| ExchangeError::Signing("--private-key is not a valid secp256k1 key".to_string()))
  }

  /// Venue market id: `UPPER(asset-quote)`.
  pub fn format_market(&self, asset: &str, quote: &str) -> Result<String> {
    if asset.is_empty() || quote.is_empty() {
      return Err(ExchangeError::Config("--asset and --quote cannot be empty".to_string()));
    }
    Ok(format!("{asset}-{quote}").to_uppercase())
  }

  /// Canonical ticker of a symbol or token address.
  pub async fn format_symbol(&self, symbol: &str) -> Result<String> {
    let chain_id = self.chain_id()?;
    match self.coingecko.coin(symbol, chain_id).await {
      Ok(Some(coin)) => return Ok(coin.symbol.to_uppercase()),
      Ok(None) if !is_address(symbol) => {
        return Err(ExchangeError::TokenNotFound {
          symbol: symbol.to_string(),
          chain_id,
        });
      }
      Err(e) if !is_address(symbol) => return Err(e),
      _ => {}
    }
    let address = parse_address(symbol)?;
    let found = self.web3()?.symbol(address).await?;
    Ok(found.to_uppercase())
  }

  /// Resolve one side of a market to a token.
  pub async fn token(&self, symbol: &str) -> Result<Token> {
    let chain_id = self.chain_id()?;
    match self.coingecko.coin(symbol, chain_id).await {
      Ok(Some(coin)) => Ok(Token {
        id: Some(coin.id),
        address: parse_address(&coin.address)?,
      }),
      Ok(None) if is_address(symbol) => Ok(Token {
        id: None,
        address: parse_address(symbol)?,
      }),
      Err(e) if is_address(symbol) => {
        debug!(error = %e, symbol, "CoinGecko unavailable, using raw token address");
        Ok(Token {
          id: None,
          address: parse_address(symbol)?,
        })
      }
      Ok(None) => Err(ExchangeError::TokenNotFound {
        symbol: symbol.to_string(),
        chain_id,
      }),
      Err(e) => Err(e),
    }
  }

  /// Split `ASSET-QUOTE` and resolve both tokens.
  pub async fn parse_market(&self, market: &str) -> Result<(Token, Token)> {
    let (asset, quote) = market
      .split_once('-')
      .ok_or_else(|| ExchangeError::MarketNotFound(market.to_string()))?;
    Ok((self.token(asset).await?, self.token(quote).await?))
  }

  /// Token decimals from CoinGecko, or from the contract for unlisted tokens.
  pub async fn decimals(&self, token: &Token) -> Result<u32> {
    match &token.id {
      Some(id) => self.coingecko.decimals(id, self.chain_id()?).await,
      None => self.web3()?.decimals(token.address).await,
    }
  }

  /// Both tokens of a market with their decimals.
  pub async fn market(&self, market: &str) -> Result<((Token, u32), (Token, u32))> {
    let (asset, quote) = self.parse_market(market).await?;
    let asset_dec = self.decimals(&asset).await?;
    let quote_dec = self.decimals(&quote).await?;
    Ok(((asset, asset_dec), (quote, quote_dec)))
  }

  pub async fn precision(&self, market: &str) -> Result<Precision> {
    let ((_, asset_dec), (_, quote_dec)) = self.market(market).await?;
    Ok(Precision {
      price: quote_dec,
      size: asset_dec,
    })
  }

  /// Asset price in quote terms, derived from both USD prices.
  ///
  /// `None` when either token is not listed on CoinGecko.
  pub async fn ticker(&self, market: &str) -> Result<Option<Decimal>> {
    let (asset, quote) = self.parse_market(market).await?;
    let (Some(asset_id), Some(quote_id)) = (asset.id, quote.id) else {
      return Ok(None);
    };
    let asset_usd = self.coingecko.usd_price(&asset_id).await?;
    let quote_usd = self.coingecko.usd_price(&quote_id).await?;
    if quote_usd.is_zero() {
      return Ok(None);
    }
    Ok(Some(asset_usd / quote_usd))
  }

  /// Fail with an approve hint when `spender` may not move `amount` of
  /// `token` on behalf of `owner`.
  pub async fn ensure_allowance(
    &self,
    token: Address,
    owner: Address,
    spender: Address,
    amount: U256,
    approve_url: &str,
  ) -> Result<()> {
    let web3 = self.web3()?;
    let allowance = web3.allowance(token, owner, spender).await?;
    if allowance >= amount {
      return Ok(());
    }
    debug!(venue = self.venue, %token, %allowance, %amount, "Allowance below maker amount");
    let symbol = match web3.symbol(token).await {
      Ok(symbol) if !symbol.is_empty() => symbol,
      _ => token.to_checksum(None),
    };
    Err(ExchangeError::AllowanceRequired {
      symbol,
      url: approve_url.to_string(),
    })
  }
}
