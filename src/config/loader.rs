//! Configuration Loader - File Loading and Validation
//!
//! A missing file yields the defaults. A file that exists but cannot be
//! read, parsed or validated is an error.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use super::AppConfig;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "ladder.toml";

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - The file exists but can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  if !path.exists() {
    debug!(path = %path.display(), "No config file, using defaults");
    return Ok(AppConfig::default());
  }

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)
    .with_context(|| format!("Invalid config file: {}", path.display()))?;

  debug!(path = %path.display(), "Configuration loaded");
  Ok(config)
}

/// Parse and validate TOML content.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content).context("Failed to parse TOML")?;
  validate_config(&config)?;
  Ok(config)
}

fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    config.http.timeout_secs > 0,
    "http.timeout_secs must be positive"
  );
  anyhow::ensure!(
    config.coinbase.requests_per_second > 0.0,
    "coinbase.requests_per_second must be positive, got {}",
    config.coinbase.requests_per_second
  );
  anyhow::ensure!(
    config.coingecko.requests_per_minute > 0.0,
    "coingecko.requests_per_minute must be positive, got {}",
    config.coingecko.requests_per_minute
  );
  anyhow::ensure!(
    !config.coingecko.base_url.is_empty(),
    "coingecko.base_url must not be empty"
  );
  anyhow::ensure!(
    !config.oneinch.base_url.is_empty(),
    "oneinch.base_url must not be empty"
  );

  for (chain, url) in &config.chains.rpc {
    anyhow::ensure!(
      chain.parse::<u64>().is_ok(),
      "chains.rpc key {chain:?} is not a chain id"
    );
    anyhow::ensure!(
      url.starts_with("http://") || url.starts_with("https://"),
      "chains.rpc.{chain} must be an http(s) URL"
    );
  }

  Ok(())
}
