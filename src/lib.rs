//! # Ledger Core
//!
//! An append-only double-entry ledger core with enforced bookkeeping
//! invariants, period locking, idempotent replay, revenue recognition, and
//! replay-derived financial statements.
//!
//! ## Features
//!
//! - **Double-entry posting**: every transaction is validated for balance,
//!   tenant isolation, currency isolation, and negative-balance rules
//!   before an atomic append-only commit
//! - **Idempotent replay**: reposting a transaction number with identical
//!   content returns the original result; reuse with different content is
//!   a distinct, audited error
//! - **Period locking**: per-date `OPEN -> SOFT_CLOSED -> HARD_LOCKED`
//!   state machine; hard-locked history is immutable
//! - **Revenue recognition**: straight-line and milestone schedules posted
//!   through the same validated write path
//! - **Financial statements**: trial balance, income statement, balance
//!   sheet, and direct cash flow rebuilt purely by replaying posted
//!   history, each carrying a tamper-evident integrity hash
//! - **Reconciliation**: a diagnostic scan for corruption that should be
//!   impossible if the write path behaved
//! - **Storage abstraction**: database-agnostic design with trait-based
//!   stores; an in-memory implementation ships for tests
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use chrono::NaiveDate;
//! use ledger_core::utils::{seed, MemoryStore};
//! use ledger_core::{
//!     Cents, LedgerEngine, LedgerTransactionBuilder, PostStatus, RandomIds, SystemClock,
//!     TracingAuditSink,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::new());
//! seed::standard_accounts(&store, "acme");
//!
//! let engine = LedgerEngine::new(
//!     Arc::clone(&store),
//!     Arc::new(TracingAuditSink),
//!     Arc::new(RandomIds),
//!     Arc::new(SystemClock),
//! );
//!
//! let sale = LedgerTransactionBuilder::new(
//!     "acme",
//!     "INV-1001",
//!     NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
//!     "USD",
//! )
//! .debit("cash", Cents::parse("120.00")?)
//! .credit("revenue", Cents::parse("120.00")?)
//! .build()?;
//!
//! let receipt = engine.post(sale).await?;
//! assert_eq!(receipt.status, PostStatus::Posted);
//! # Ok(())
//! # }
//! ```

pub mod ledger;
pub mod money;
pub mod reconciliation;
pub mod revenue;
pub mod statements;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use ledger::*;
pub use money::Cents;
pub use reconciliation::*;
pub use revenue::*;
pub use statements::*;
pub use traits::*;
pub use types::*;

// Re-export posting patterns for convenience
pub use ledger::engine::patterns;
