//! Traits for storage abstraction and engine collaborators
//!
//! The engines are storage-agnostic: any backend (PostgreSQL, SQLite,
//! in-memory, etc.) can host the ledger by implementing the store traits
//! here. The audit sink, id generator, and clock are likewise injected so
//! tests can supply deterministic fakes without mutating process state.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::money::Cents;
use crate::types::*;

/// Storage seam for posted transactions and account data.
///
/// The store is the single authority for concurrent safety: commits execute
/// as one atomic unit, and a commit must never be half-applied. Everything
/// the engines enforce is re-derived from what this trait returns.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Persist a transaction and its lines as a single atomic unit.
    /// Posted history is append-only; committing an existing
    /// `transaction_id` is a storage error.
    async fn commit_append_only(&self, transaction: &LedgerTransaction) -> LedgerResult<()>;

    /// All non-void posted transactions for a company within the inclusive
    /// date range, in a stable order.
    async fn list_posted_transactions(
        &self,
        company_id: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> LedgerResult<Vec<LedgerTransaction>>;

    /// Snapshots for the requested accounts. Unknown accounts are simply
    /// absent from the result.
    async fn get_account_snapshots(
        &self,
        company_id: &str,
        account_ids: &[String],
    ) -> LedgerResult<Vec<AccountSnapshot>>;

    /// Current signed balances (debit minus credit cents) for the requested
    /// accounts. Accounts with no postings report zero.
    async fn get_account_balances_cents(
        &self,
        company_id: &str,
        account_ids: &[String],
    ) -> LedgerResult<HashMap<String, Cents>>;

    /// Look up a posted transaction by its domain-level number.
    async fn get_posted_transaction_by_number(
        &self,
        company_id: &str,
        transaction_number: &str,
    ) -> LedgerResult<Option<LedgerTransaction>>;
}

/// The lock state resolved for a (company, date) pair. `period_id` is absent
/// when no accounting period covers the date, which resolves to `Open`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPeriod {
    pub period_id: Option<String>,
    pub state: PeriodState,
}

/// Storage seam for accounting periods and their lock-action history.
#[async_trait]
pub trait PeriodStore: Send + Sync {
    /// Resolve the lock state for the period covering `date`.
    async fn resolve_period(
        &self,
        company_id: &str,
        date: NaiveDate,
    ) -> LedgerResult<ResolvedPeriod>;

    /// Fetch a period with its resolved state.
    async fn get_period(&self, period_id: &str) -> LedgerResult<Option<AccountingPeriod>>;

    /// Append a lock action, atomically verifying the period is still in
    /// `expected_current`. Concurrent transitions serialize here: the loser
    /// observes a changed state and gets [`LedgerError::PeriodLockViolation`].
    async fn record_lock_action(
        &self,
        period_id: &str,
        expected_current: PeriodState,
        action: PeriodLockAction,
    ) -> LedgerResult<()>;
}

/// Storage seam for revenue schedules.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn save_schedule(&self, schedule: &RevenueSchedule) -> LedgerResult<()>;

    async fn get_schedule(&self, schedule_id: &str) -> LedgerResult<Option<RevenueSchedule>>;
}

/// Whether an audited attempt was permitted or refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    Allowed,
    Denied,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOutcome::Allowed => write!(f, "ALLOWED"),
            AuditOutcome::Denied => write!(f, "DENIED"),
        }
    }
}

/// Forensic weight of an audit event. Rejections are `High`; expected
/// outcomes like a skipped recognition window are `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditSeverity {
    Low,
    Medium,
    High,
}

impl fmt::Display for AuditSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditSeverity::Low => write!(f, "LOW"),
            AuditSeverity::Medium => write!(f, "MEDIUM"),
            AuditSeverity::High => write!(f, "HIGH"),
        }
    }
}

/// A security/audit event describing one state-changing or state-denying
/// attempt. Carries enough metadata to reconstruct intent without the full
/// transaction body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub tenant_id: String,
    pub actor_id: String,
    /// Dotted operation name, e.g. `ledger.post`
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub outcome: AuditOutcome,
    pub correlation_id: String,
    pub severity: AuditSeverity,
    pub occurred_at: NaiveDateTime,
    pub metadata: HashMap<String, String>,
}

/// Collaborator receiving the forensic trail. Every engine emits exactly one
/// event per attempt, before any error propagates to the caller.
pub trait AuditSink: Send + Sync {
    fn log_security_event(&self, event: SecurityEvent);
}

/// An [`AuditSink`] that forwards events to the `tracing` subscriber, for
/// hosts that want structured logs as their audit channel.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn log_security_event(&self, event: SecurityEvent) {
        match event.outcome {
            AuditOutcome::Allowed => tracing::info!(
                tenant = %event.tenant_id,
                actor = %event.actor_id,
                action = %event.action,
                resource = %event.resource_id,
                severity = %event.severity,
                correlation = %event.correlation_id,
                "audit allowed"
            ),
            AuditOutcome::Denied => tracing::warn!(
                tenant = %event.tenant_id,
                actor = %event.actor_id,
                action = %event.action,
                resource = %event.resource_id,
                severity = %event.severity,
                correlation = %event.correlation_id,
                metadata = ?event.metadata,
                "audit denied"
            ),
        }
    }
}

/// Strategy for generating physical ids. Injected explicitly so the
/// determinism switch is a constructor argument, never ambient state.
pub trait IdGenerator: Send + Sync {
    fn transaction_id(&self) -> String;
    fn correlation_id(&self) -> String;
    fn action_id(&self) -> String;
    fn schedule_id(&self) -> String;
}

/// Production id source backed by UUID v4.
#[derive(Debug, Default)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn transaction_id(&self) -> String {
        format!("txn-{}", uuid::Uuid::new_v4())
    }

    fn correlation_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn action_id(&self) -> String {
        format!("act-{}", uuid::Uuid::new_v4())
    }

    fn schedule_id(&self) -> String {
        format!("sched-{}", uuid::Uuid::new_v4())
    }
}

/// Deterministic id source for reproducible tests: a prefix plus a counter.
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }

    fn next(&self, kind: &str) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{kind}-{n}", self.prefix)
    }
}

impl IdGenerator for SequentialIds {
    fn transaction_id(&self) -> String {
        self.next("txn")
    }

    fn correlation_id(&self) -> String {
        self.next("corr")
    }

    fn action_id(&self) -> String {
        self.next("act")
    }

    fn schedule_id(&self) -> String {
        self.next("sched")
    }
}

/// Time source for audit timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Wall-clock time.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Utc::now().naive_utc()
    }
}

/// A clock pinned to a fixed instant, for reproducible tests.
#[derive(Debug)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_ids_are_stable_and_distinct() {
        let ids = SequentialIds::new("t");
        assert_eq!(ids.transaction_id(), "t-txn-1");
        assert_eq!(ids.correlation_id(), "t-corr-2");
        assert_eq!(ids.action_id(), "t-act-3");
    }

    #[test]
    fn random_transaction_ids_do_not_collide() {
        let ids = RandomIds;
        assert_ne!(ids.transaction_id(), ids.transaction_id());
    }
}
