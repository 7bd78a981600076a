//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (venue REST APIs, chain JSON-RPC, the terminal).
//!
//! Adapter categories:
//! - Venues: `binance`, `bitstamp`, `bittrex`, `coinbase`, `kraken`, and
//!   the on-chain order books under `dex`
//! - `registry`: venue lookup by code or name
//! - Shared plumbing: `http`, `throttle`, `cache`, `signing`
//! - `console`: terminal implementation of the `Prompt` port

pub mod binance;
pub mod bitstamp;
pub mod bittrex;
pub mod cache;
pub mod coinbase;
pub mod console;
pub mod dex;
pub mod http;
pub mod kraken;
pub mod registry;
pub mod signing;
pub mod throttle;
