//! Venue Error Taxonomy
//!
//! Every venue adapter reports failures through [`ExchangeError`]. Request
//! loops additionally classify each round-trip as an [`Attempt`] so that
//! "retry this call" never travels as an error value.

use thiserror::Error;

/// Failure surfaced by an exchange adapter or one of its clients.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Missing or invalid user input (flags, credentials, config).
    #[error("{0}")]
    Config(String),

    /// No registered venue matches the requested name or code.
    #[error("exchange {0} is not supported at this time")]
    UnsupportedExchange(String),

    /// The chain id has no router, RPC endpoint or platform mapping.
    #[error("chain {0} is not supported at this time")]
    UnsupportedChain(u64),

    /// Market is unknown to the venue, even after a metadata refetch.
    #[error("market {0} does not exist")]
    MarketNotFound(String),

    /// Token symbol could not be resolved on the given chain.
    #[error("token {symbol} does not exist on chain {chain_id}")]
    TokenNotFound {
        /// Symbol or address as supplied.
        symbol: String,
        /// EVM chain id.
        chain_id: u64,
    },

    /// The venue understood the request and refused it.
    #[error("{venue}: {message}")]
    Rejected {
        /// Venue display name.
        venue: &'static str,
        /// Message returned by the venue.
        message: String,
    },

    /// The DEX router may not spend the maker asset yet.
    #[error("please approve {symbol} on {url}")]
    AllowanceRequired {
        /// Token symbol (or address when the symbol is unreadable).
        symbol: String,
        /// Where the user can grant the approval.
        url: String,
    },

    /// Orders exist that this venue cannot cancel through its API.
    #[error("please cancel your orders on {0}")]
    CancelUnsupported(String),

    /// Network failure, timeout or TLS error.
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body did not match the expected shape.
    #[error("cannot decode {what}: {source}")]
    Decode {
        /// What was being decoded.
        what: String,
        /// Underlying serde error.
        source: serde_json::Error,
    },

    /// JSON-RPC call against a chain node failed.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// Request or order signing failed.
    #[error("signing error: {0}")]
    Signing(String),

    /// A retry loop gave up.
    #[error("{what} still failing after {attempts} attempts")]
    RetriesExhausted {
        /// The operation being retried.
        what: String,
        /// Number of attempts made.
        attempts: u32,
    },
}

/// Convenience alias used across adapters and ports.
pub type Result<T> = std::result::Result<T, ExchangeError>;

impl ExchangeError {
    /// Build a [`ExchangeError::Decode`] for a named payload.
    pub fn decode(what: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            what: what.into(),
            source,
        }
    }

    /// Build a [`ExchangeError::Config`] for an empty credential flag.
    pub fn missing_flag(flag: &str) -> Self {
        Self::Config(format!("--{flag} cannot be empty"))
    }
}

/// Why a request loop decided to go around again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// Local clock drifted outside the venue's receive window; resynced.
    ClockSkew,
    /// Venue answered 429; the throttler has been adjusted.
    RateLimited,
}

/// Outcome of a single round-trip inside a retrying request loop.
#[derive(Debug)]
pub enum Attempt<T> {
    /// The call completed.
    Success(T),
    /// Transient condition already handled locally; issue the call again.
    Retry(RetryReason),
    /// Give up and propagate.
    Fatal(ExchangeError),
}

impl<T> From<Result<T>> for Attempt<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(e) => Self::Fatal(e),
        }
    }
}

/// Upper bound on retries of one logical operation.
pub const MAX_ATTEMPTS: u32 = 10;

/// Drive `step` until it succeeds, fails fatally, or exhausts [`MAX_ATTEMPTS`].
pub async fn run_attempts<T, F, Fut>(what: &str, mut step: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Attempt<T>>,
{
    for attempt in 1..=MAX_ATTEMPTS {
        match step().await {
            Attempt::Success(value) => return Ok(value),
            Attempt::Fatal(e) => return Err(e),
            Attempt::Retry(reason) => {
                tracing::debug!(what, attempt, ?reason, "Retrying request");
            }
        }
    }
    Err(ExchangeError::RetriesExhausted {
        what: what.to_string(),
        attempts: MAX_ATTEMPTS,
    })
}
