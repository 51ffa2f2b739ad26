//! Ledger module containing invariant validation, the posting engine, and
//! period locking

pub mod engine;
pub mod invariants;
pub mod period;

pub use engine::*;
pub use period::*;
