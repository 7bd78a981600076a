//! Request signing primitives shared by the CEX clients.
//!
//! SHA-256 HMACs go through `hmac-sha256`; the SHA-512 schemes (Kraken,
//! Bittrex) use `hmac` + `sha2`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::{Digest, Sha256, Sha512};

use crate::error::{ExchangeError, Result};

type HmacSha512 = Hmac<Sha512>;

/// Lower-case hex HMAC-SHA256.
pub fn hmac_sha256_hex(secret: &[u8], message: &[u8]) -> String {
  hex::encode(hmac_sha256::HMAC::mac(message, secret))
}

/// Raw HMAC-SHA512.
pub fn hmac_sha512(secret: &[u8], message: &[u8]) -> Result<Vec<u8>> {
  let mut mac = HmacSha512::new_from_slice(secret)
    .map_err(|e| ExchangeError::Signing(format!("HMAC key error: {e}")))?;
  mac.update(message);
  Ok(mac.finalize().into_bytes().to_vec())
}

/// Lower-case hex SHA-512 digest.
pub fn sha512_hex(data: &[u8]) -> String {
  hex::encode(Sha512::digest(data))
}

/// Kraken `API-Sign`: base64 HMAC-SHA512 keyed with the base64-decoded
/// secret, over `uri_path || SHA256(nonce || post_data)`.
pub fn kraken(uri_path: &str, nonce: &str, post_data: &str, secret_b64: &str) -> Result<String> {
  let secret = STANDARD
    .decode(secret_b64)
    .map_err(|e| ExchangeError::Config(format!("api secret is not valid base64: {e}")))?;

  let mut inner = Sha256::new();
  inner.update(nonce.as_bytes());
  inner.update(post_data.as_bytes());

  let mut message = uri_path.as_bytes().to_vec();
  message.extend_from_slice(&inner.finalize());

  Ok(STANDARD.encode(hmac_sha512(&secret, &message)?))
}

/// A string of `len` random decimal digits.
pub fn random_digits(len: usize) -> String {
  let mut rng = rand::thread_rng();
  (0..len)
    .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sha256_hmac_known_vector() {
    // RFC 4231 test case 2
    assert_eq!(
      hmac_sha256_hex(b"Jefe", b"what do ya want for nothing?"),
      "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
    );
  }

  #[test]
  fn sha512_hmac_known_vector() {
    let mac = hmac_sha512(b"Jefe", b"what do ya want for nothing?").unwrap();
    assert_eq!(
      hex::encode(mac),
      "164b7a7bfcf819e2e395fbe73b56e0a387bd64222e831fd610270cd7ea2505549758bf75c05a994a6d034f65f8f0e6fdcaeab1a34d4a6b4b636e070a38bce737"
    );
  }

  #[test]
  fn empty_payload_hash() {
    assert!(sha512_hex(b"").starts_with("cf83e1357eefb8bd"));
  }

  #[test]
  fn kraken_rejects_bad_secret() {
    assert!(matches!(
      kraken("/0/private/OpenOrders", "1", "nonce=1", "not base64!"),
      Err(ExchangeError::Config(_))
    ));
    let sig = kraken("/0/private/OpenOrders", "1", "nonce=1", "c2VjcmV0").unwrap();
    assert_eq!(STANDARD.decode(sig).unwrap().len(), 64);
  }

  #[test]
  fn digits_only() {
    let digits = random_digits(36);
    assert_eq!(digits.len(), 36);
    assert!(digits.bytes().all(|b| b.is_ascii_digit()));
  }
}
