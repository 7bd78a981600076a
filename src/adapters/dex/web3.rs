//! Read-only contract calls over JSON-RPC.
//!
//! Only `eth_call` is needed: ERC-20 `decimals`, `symbol` and `allowance`,
//! plus the 1inch router's `epoch`. Calldata is built by hand from the
//! function selector and left-padded 32-byte words.

use alloy::dyn_abi::{DynSolType, DynSolValue};
use alloy::primitives::{Address, Bytes, U256, keccak256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use tracing::{debug, instrument};

use crate::error::{ExchangeError, Result};

/// Four-byte function selector.
pub fn selector(signature: &str) -> [u8; 4] {
  let hash = keccak256(signature.as_bytes());
  [hash[0], hash[1], hash[2], hash[3]]
}

/// An address left-padded to one ABI word.
pub fn address_word(address: Address) -> [u8; 32] {
  let mut word = [0u8; 32];
  word[12..].copy_from_slice(address.as_slice());
  word
}

/// Selector followed by static arguments.
pub fn calldata(signature: &str, args: &[[u8; 32]]) -> Vec<u8> {
  let mut data = Vec::with_capacity(4 + 32 * args.len());
  data.extend_from_slice(&selector(signature));
  for arg in args {
    data.extend_from_slice(arg);
  }
  data
}

/// Decode `symbol()`: ABI `string`, or `bytes32` for older tokens (MKR).
pub fn decode_symbol(raw: &[u8]) -> Option<String> {
  if let Ok(DynSolValue::String(symbol)) = DynSolType::String.abi_decode(raw) {
    if !symbol.is_empty() {
      return Some(symbol);
    }
  }
  let word = raw.get(..32)?;
  let end = word.iter().position(|b| *b == 0).unwrap_or(word.len());
  String::from_utf8(word[..end].to_vec()).ok().filter(|s| !s.is_empty())
}

fn decode_uint(what: &str, raw: &[u8]) -> Result<U256> {
  if raw.len() < 32 {
    return Err(ExchangeError::Rpc(format!("{what} returned {} bytes", raw.len())));
  }
  Ok(U256::from_be_slice(&raw[..32]))
}

/// JSON-RPC client for one chain.
#[derive(Debug, Clone)]
pub struct Web3 {
  rpc_url: String,
}

impl Web3 {
  pub fn new(rpc_url: String) -> Self {
    Self { rpc_url }
  }

  async fn call(&self, to: Address, data: Vec<u8>) -> Result<Bytes> {
    let provider = ProviderBuilder::new().on_http(
      self
        .rpc_url
        .parse()
        .map_err(|e| ExchangeError::Config(format!("invalid RPC URL: {e}")))?,
    );
    let tx = TransactionRequest::default()
      .to(to)
      .input(Bytes::from(data).into());
    provider
      .call(&tx)
      .await
      .map_err(|e| ExchangeError::Rpc(e.to_string()))
  }

  #[instrument(skip(self))]
  pub async fn decimals(&self, token: Address) -> Result<u32> {
    let raw = self.call(token, calldata("decimals()", &[])).await?;
    let value = decode_uint("decimals()", &raw)?;
    u32::try_from(value).map_err(|_| ExchangeError::Rpc(format!("decimals() of {token} out of range")))
  }

  #[instrument(skip(self))]
  pub async fn symbol(&self, token: Address) -> Result<String> {
    let raw = self.call(token, calldata("symbol()", &[])).await?;
    decode_symbol(&raw).ok_or_else(|| ExchangeError::Rpc(format!("symbol() of {token} is unreadable")))
  }

  pub async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
    let data = calldata(
      "allowance(address,address)",
      &[address_word(owner), address_word(spender)],
    );
    let raw = self.call(token, data).await?;
    let allowance = decode_uint("allowance()", &raw)?;
    debug!(%token, %owner, %spender, %allowance, "Allowance read");
    Ok(allowance)
  }

  /// 1inch limit order protocol epoch of `maker` for series 0.
  pub async fn epoch(&self, router: Address, maker: Address) -> Result<U256> {
    let data = calldata("epoch(address,uint96)", &[address_word(maker), [0u8; 32]]);
    let raw = self.call(router, data).await?;
    decode_uint("epoch()", &raw)
  }
}
