//! Shared HTTP plumbing for venue clients.
//!
//! One `reqwest::Client` per venue adapter, built with the configured
//! timeout. Responses are read fully into a [`Reply`] so that venue code
//! can inspect status and body before deciding between success, retry and
//! failure.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::{ExchangeError, Result};

/// Build an HTTP client with a uniform request timeout.
pub fn client(timeout: Duration) -> Result<Client> {
  Client::builder()
    .timeout(timeout)
    .pool_max_idle_per_host(2)
    .user_agent(concat!("ladder/", env!("CARGO_PKG_VERSION")))
    .build()
    .map_err(ExchangeError::Http)
}

/// A fully-read HTTP response.
#[derive(Debug, Clone)]
pub struct Reply {
  pub status: StatusCode,
  pub body: String,
}

impl Reply {
  /// Decode the body as JSON.
  pub fn json<T: DeserializeOwned>(&self, what: &str) -> Result<T> {
    decode(what, &self.body)
  }

  /// Whether the status is 2xx.
  pub fn is_success(&self) -> bool {
    self.status.is_success()
  }

  /// Body trimmed for error messages.
  pub fn excerpt(&self) -> &str {
    let body = self.body.trim();
    match body.char_indices().nth(512) {
      Some((idx, _)) => &body[..idx],
      None => body,
    }
  }
}

/// Send a request and read its body.
pub async fn send(request: RequestBuilder) -> Result<Reply> {
  let response = request.send().await?;
  let status = response.status();
  let body = response.text().await?;
  Ok(Reply { status, body })
}

/// Decode a JSON payload, naming it in the error.
pub fn decode<T: DeserializeOwned>(what: &str, body: &str) -> Result<T> {
  serde_json::from_str(body).map_err(|e| ExchangeError::decode(what, e))
}
