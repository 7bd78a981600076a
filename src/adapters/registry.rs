//! Venue registry.
//!
//! A static list of every supported venue with a constructor for each.
//! Lookup matches case-insensitively on the short code or display name.
//! Constructors do no I/O: clients connect, authenticate and fetch metadata
//! lazily on first use.

use std::sync::Arc;

use reqwest::Client;

use crate::adapters::dex::{oneinch, paraswap};
use crate::adapters::{binance, bitstamp, bittrex, coinbase, http, kraken};
use crate::config::{AppConfig, Credentials};
use crate::error::{ExchangeError, Result};
use crate::ports::{Exchange, VenueInfo};

/// Everything a venue constructor may need.
#[derive(Debug, Clone, Default)]
pub struct VenueContext {
  pub config: Arc<AppConfig>,
  pub credentials: Credentials,
}

impl VenueContext {
  pub fn new(config: Arc<AppConfig>, credentials: Credentials) -> Self {
    Self { config, credentials }
  }

  /// A fresh HTTP client with the configured timeout.
  pub fn http(&self) -> Result<Client> {
    http::client(self.config.http.timeout())
  }

  /// The API key, or a "cannot be empty" error.
  pub fn api_key(&self) -> Result<String> {
    non_empty(self.credentials.api_key.as_deref(), "api-key")
  }

  /// The API secret, or a "cannot be empty" error.
  pub fn api_secret(&self) -> Result<String> {
    non_empty(self.credentials.api_secret.as_deref(), "api-secret")
  }
}

fn non_empty(value: Option<&str>, flag: &str) -> Result<String> {
  match value {
    Some(v) if !v.is_empty() => Ok(v.to_string()),
    _ => Err(ExchangeError::missing_flag(flag)),
  }
}

type Builder = fn(&VenueContext) -> Result<Box<dyn Exchange>>;

/// A registered venue.
pub struct Entry {
  pub info: VenueInfo,
  build: Builder,
}

impl Entry {
  pub fn build(&self, ctx: &VenueContext) -> Result<Box<dyn Exchange>> {
    (self.build)(ctx)
  }
}

fn boxed<E: Exchange>(venue: Result<E>) -> Result<Box<dyn Exchange>> {
  venue.map(|v| Box::new(v) as Box<dyn Exchange>)
}

static VENUES: [Entry; 7] = [
  Entry {
    info: coinbase::INFO,
    build: |ctx| boxed(coinbase::Coinbase::new(ctx)),
  },
  Entry {
    info: bitstamp::INFO,
    build: |ctx| boxed(bitstamp::Bitstamp::new(ctx)),
  },
  Entry {
    info: binance::INFO,
    build: |ctx| boxed(binance::Binance::new(ctx)),
  },
  Entry {
    info: oneinch::INFO,
    build: |ctx| boxed(oneinch::OneInch::new(ctx)),
  },
  Entry {
    info: kraken::INFO,
    build: |ctx| boxed(kraken::Kraken::new(ctx)),
  },
  Entry {
    info: paraswap::INFO,
    build: |ctx| boxed(paraswap::ParaSwap::new(ctx)),
  },
  Entry {
    info: bittrex::INFO,
    build: |ctx| boxed(bittrex::Bittrex::new(ctx)),
  },
];

/// Every registered venue, in registration order.
pub fn venues() -> &'static [Entry] {
  &VENUES
}

/// Find a venue by code or name.
pub fn find_by_name(name: &str) -> Result<&'static Entry> {
  VENUES
    .iter()
    .find(|entry| entry.info.matches(name))
    .ok_or_else(|| ExchangeError::UnsupportedExchange(name.to_string()))
}

/// Find and construct a venue.
pub fn build(name: &str, ctx: &VenueContext) -> Result<Box<dyn Exchange>> {
  find_by_name(name)?.build(ctx)
}
