//! Configuration Module - TOML-based Ladder Configuration
//!
//! Loads optional settings from `ladder.toml`: logging, the HTTP timeout,
//! per-venue knobs and chain RPC endpoints. Every field has a default, so
//! the tool runs without a config file. Credentials are not read from
//! here; they arrive as command-line flags (see [`Credentials`]).

pub mod loader;

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  /// Log output.
  pub logging: LoggingConfig,
  /// Outbound HTTP settings shared by every venue.
  pub http: HttpConfig,
  /// Binance settings.
  pub binance: BinanceConfig,
  /// Coinbase Advanced Trade settings.
  pub coinbase: CoinbaseConfig,
  /// CoinGecko token metadata service (used by DEX venues).
  pub coingecko: CoingeckoConfig,
  /// 1inch orderbook API settings.
  pub oneinch: OneInchConfig,
  /// JSON-RPC endpoints per chain.
  pub chains: ChainsConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins.
  pub level: String,
  /// Emit JSON lines instead of human-readable output.
  pub json: bool,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      json: false,
    }
  }
}

/// HTTP client configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
  /// Timeout applied to every request, in seconds.
  pub timeout_secs: u64,
}

impl Default for HttpConfig {
  fn default() -> Self {
    Self {
      timeout_secs: default_timeout_secs(),
    }
  }
}

impl HttpConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BinanceConfig {
  /// Route requests to the Binance spot testnet.
  pub testnet: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoinbaseConfig {
  pub requests_per_second: f64,
}

impl Default for CoinbaseConfig {
  fn default() -> Self {
    Self {
      requests_per_second: default_coinbase_rps(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoingeckoConfig {
  /// API root, including the version path.
  pub base_url: String,
  /// Free tier allows roughly five calls per minute.
  pub requests_per_minute: f64,
}

impl Default for CoingeckoConfig {
  fn default() -> Self {
    Self {
      base_url: default_coingecko_url(),
      requests_per_minute: default_coingecko_rpm(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OneInchConfig {
  pub base_url: String,
  /// Developer portal key, sent as a bearer token.
  pub api_key: Option<String>,
}

impl Default for OneInchConfig {
  fn default() -> Self {
    Self {
      base_url: default_oneinch_url(),
      api_key: None,
    }
  }
}

/// Chain RPC configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChainsConfig {
  /// Infura project key for chains served through Infura.
  pub infura_api_key: Option<String>,
  /// Explicit RPC URL per chain id; wins over Infura and public endpoints.
  pub rpc: HashMap<String, String>,
}

impl ChainsConfig {
  /// Configured RPC override for `chain_id`.
  pub fn rpc_override(&self, chain_id: u64) -> Option<&str> {
    self.rpc.get(&chain_id.to_string()).map(String::as_str)
  }
}

/// Credentials supplied on the command line, passed to venues as-is.
#[derive(Clone, Default)]
pub struct Credentials {
  pub api_key: Option<String>,
  pub api_secret: Option<String>,
  /// Hex private key for DEX venues.
  pub private_key: Option<String>,
  /// EVM chain id for DEX venues.
  pub chain_id: u64,
}

impl std::fmt::Debug for Credentials {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Credentials")
      .field("api_key", &self.api_key.as_ref().map(|_| "***"))
      .field("api_secret", &self.api_secret.as_ref().map(|_| "***"))
      .field("private_key", &self.private_key.as_ref().map(|_| "***"))
      .field("chain_id", &self.chain_id)
      .finish()
  }
}

// Default value functions for serde
fn default_log_level() -> String {
  "info".to_string()
}
fn default_timeout_secs() -> u64 {
  30
}
fn default_coinbase_rps() -> f64 {
  10.0
}
fn default_coingecko_url() -> String {
  "https://api.coingecko.com/api/v3".to_string()
}
fn default_coingecko_rpm() -> f64 {
  5.0
}
fn default_oneinch_url() -> String {
  "https://api.1inch.com".to_string()
}
