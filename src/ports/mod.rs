//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Interfaces the usecases layer requires from the outside world.
//! Adapters implement these traits.
//!
//! Port categories:
//! - `Exchange`: market metadata, open orders, cancellation and submission
//! - `Prompt`: per-order confirmation before submission

pub mod exchange;
pub mod prompt;

pub use exchange::{Exchange, OrderRequest, VenueInfo};
pub use prompt::{Answer, Prompt};
