//! EIP-712 order signing.
//!
//! Typed data is assembled as JSON and parsed into alloy's `TypedData`, so
//! each venue only describes its domain, field list and message values.

use alloy::dyn_abi::eip712::TypedData;
use alloy::primitives::{Address, B256};
use alloy::signers::SignerSync;
use alloy::signers::local::PrivateKeySigner;
use serde_json::{Value, json};

use crate::error::{ExchangeError, Result};

/// Signing domain of a verifying contract.
#[derive(Debug, Clone, Copy)]
pub struct Domain {
  pub name: &'static str,
  pub version: &'static str,
  pub chain_id: u64,
  pub verifying_contract: Address,
}

/// Build typed data with primary type `Order`.
pub fn order(domain: &Domain, fields: &[(&str, &str)], message: Value) -> Result<TypedData> {
  let fields: Vec<Value> = fields
    .iter()
    .map(|(name, kind)| json!({ "name": name, "type": kind }))
    .collect();
  let typed = json!({
    "types": {
      "EIP712Domain": [
        { "name": "name", "type": "string" },
        { "name": "version", "type": "string" },
        { "name": "chainId", "type": "uint256" },
        { "name": "verifyingContract", "type": "address" },
      ],
      "Order": fields,
    },
    "primaryType": "Order",
    "domain": {
      "name": domain.name,
      "version": domain.version,
      "chainId": domain.chain_id,
      "verifyingContract": domain.verifying_contract.to_checksum(None),
    },
    "message": message,
  });
  serde_json::from_value(typed).map_err(|e| ExchangeError::Signing(format!("invalid typed data: {e}")))
}

/// Force the recovery byte into the 27/28 form order books expect.
pub fn normalize_v(mut signature: [u8; 65]) -> [u8; 65] {
  if signature[64] < 27 {
    signature[64] += 27;
  }
  signature
}

/// Sign typed data; returns the signing hash and the `0x` hex signature.
pub fn sign(signer: &PrivateKeySigner, typed: &TypedData) -> Result<(B256, String)> {
  let hash = typed
    .eip712_signing_hash()
    .map_err(|e| ExchangeError::Signing(format!("EIP-712 encoding failed: {e}")))?;
  let signature = signer
    .sign_hash_sync(&hash)
    .map_err(|e| ExchangeError::Signing(e.to_string()))?;
  let bytes = normalize_v(signature.as_bytes());
  Ok((hash, format!("0x{}", hex::encode(bytes))))
}
