//! Domain layer - ladder math and venue-neutral order types.
//!
//! Pure computation only: no I/O, no venue knowledge. Everything here is
//! deterministic and testable in isolation.

pub mod ladder;
pub mod order;
pub mod precision;

pub use ladder::{Denomination, Ladder, LadderError, LadderParams, LadderStep, Totals};
pub use order::{Order, OrderSide, Precision};
