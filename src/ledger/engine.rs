//! Posting engine: the single write path into the ledger
//!
//! `post()` runs the period-lock gate, the idempotent-replay check, full
//! invariant validation against live balances, and the atomic append-only
//! commit, emitting exactly one audit event per attempt.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ledger::invariants;
use crate::ledger::period::PeriodLockManager;
use crate::money::Cents;
use crate::traits::*;
use crate::types::*;

/// How a post attempt concluded successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostStatus {
    /// A new transaction was committed
    Posted,
    /// An identical transaction with this number already existed; nothing
    /// was written
    Replay,
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostStatus::Posted => write!(f, "POSTED"),
            PostStatus::Replay => write!(f, "REPLAY"),
        }
    }
}

/// Result of a successful [`LedgerEngine::post`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostReceipt {
    pub status: PostStatus,
    pub transaction_id: String,
    pub transaction_number: String,
}

/// A line reduced to the fields that define replay equivalence. Line ids
/// participate in the sort only, so a retry that regenerated them still
/// replays cleanly.
#[derive(Debug, PartialEq, Eq)]
struct CanonicalLine {
    account_id: String,
    side: EntrySide,
    amount: Cents,
    currency: String,
}

fn canonical_lines(entries: &[LedgerEntry]) -> Vec<CanonicalLine> {
    let mut sorted: Vec<&LedgerEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| {
        (&a.account_id, a.side, a.amount, &a.line_id)
            .cmp(&(&b.account_id, b.side, b.amount, &b.line_id))
    });
    sorted
        .into_iter()
        .map(|e| CanonicalLine {
            account_id: e.account_id.clone(),
            side: e.side,
            amount: e.amount,
            currency: e.currency.clone(),
        })
        .collect()
}

/// The ledger's write path over a store and its collaborators.
pub struct LedgerEngine<S> {
    store: Arc<S>,
    periods: PeriodLockManager<S>,
    audit: Arc<dyn AuditSink>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl<S: LedgerStore + PeriodStore> LedgerEngine<S> {
    pub fn new(
        store: Arc<S>,
        audit: Arc<dyn AuditSink>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let periods = PeriodLockManager::new(
            Arc::clone(&store),
            Arc::clone(&audit),
            Arc::clone(&ids),
            Arc::clone(&clock),
        );
        Self {
            store,
            periods,
            audit,
            ids,
            clock,
        }
    }

    /// The period-lock manager sharing this engine's store and audit sink.
    pub fn periods(&self) -> &PeriodLockManager<S> {
        &self.periods
    }

    /// Validate and commit a candidate transaction.
    ///
    /// In order: period-lock gate, idempotent-replay check by transaction
    /// number, invariant validation against live snapshots and balances,
    /// atomic append-only commit. Exactly one audit event is emitted per
    /// attempt - including rejected ones - before any error propagates.
    pub async fn post(&self, transaction: LedgerTransaction) -> LedgerResult<PostReceipt> {
        let correlation_id = self.ids.correlation_id();
        let result = self.post_checked(&transaction).await;
        self.emit_post_audit(&transaction, &correlation_id, &result);
        result
    }

    async fn post_checked(&self, txn: &LedgerTransaction) -> LedgerResult<PostReceipt> {
        // 1. Period gate: hard-locked history is immutable.
        self.periods.assert_can_post(&txn.company_id, txn.date).await?;

        // 2. Idempotency: an existing transaction with this number is
        // either a byte-equivalent replay or a reused number.
        if let Some(existing) = self
            .store
            .get_posted_transaction_by_number(&txn.company_id, &txn.transaction_number)
            .await?
        {
            return replay_or_mismatch(&existing, txn);
        }

        // 3. Full invariant validation against live account data.
        invariants::assert_tenant_isolation(txn)?;
        invariants::assert_currency_isolation(txn)?;
        invariants::assert_balanced(txn)?;

        let touched = txn.touched_accounts();
        let snapshots = self
            .store
            .get_account_snapshots(&txn.company_id, &touched)
            .await?;
        let accounts: HashMap<String, AccountSnapshot> = snapshots
            .into_iter()
            .map(|s| (s.account_id.clone(), s))
            .collect();
        for account_id in &touched {
            if !accounts.contains_key(account_id) {
                return Err(LedgerError::AccountNotFound {
                    account_id: account_id.clone(),
                });
            }
        }

        let prior = self
            .store
            .get_account_balances_cents(&txn.company_id, &touched)
            .await?;
        let deltas = invariants::signed_deltas(txn);
        let overrides = invariants::negative_overrides(txn);
        invariants::assert_no_forbidden_negative_balances(&prior, &deltas, &accounts, &overrides)?;

        // 4. Single atomic unit; the store is the correctness authority.
        self.store.commit_append_only(txn).await?;

        tracing::debug!(
            company = %txn.company_id,
            number = %txn.transaction_number,
            lines = txn.entries.len(),
            "transaction posted"
        );
        Ok(PostReceipt {
            status: PostStatus::Posted,
            transaction_id: txn.transaction_id.clone(),
            transaction_number: txn.transaction_number.clone(),
        })
    }

    fn emit_post_audit(
        &self,
        txn: &LedgerTransaction,
        correlation_id: &str,
        result: &LedgerResult<PostReceipt>,
    ) {
        let mut metadata = HashMap::from([
            (
                "transaction_number".to_string(),
                txn.transaction_number.clone(),
            ),
            (
                "transaction_type".to_string(),
                txn.transaction_type.to_string(),
            ),
            ("line_count".to_string(), txn.entries.len().to_string()),
            ("idempotency_key".to_string(), txn.idempotency_key.clone()),
        ]);
        let (outcome, severity) = match result {
            Ok(receipt) => {
                metadata.insert("status".to_string(), receipt.status.to_string());
                (AuditOutcome::Allowed, AuditSeverity::Low)
            }
            Err(error) => {
                metadata.insert("error".to_string(), error.to_string());
                (AuditOutcome::Denied, AuditSeverity::High)
            }
        };

        self.audit.log_security_event(SecurityEvent {
            tenant_id: txn.company_id.clone(),
            actor_id: txn.created_by.clone(),
            action: "ledger.post".to_string(),
            resource_type: "ledger_transaction".to_string(),
            resource_id: txn.transaction_id.clone(),
            outcome,
            correlation_id: correlation_id.to_string(),
            severity,
            occurred_at: self.clock.now(),
            metadata,
        });
    }
}

fn replay_or_mismatch(
    existing: &LedgerTransaction,
    proposed: &LedgerTransaction,
) -> LedgerResult<PostReceipt> {
    let identical = existing.total_debits() == proposed.total_debits()
        && existing.total_credits() == proposed.total_credits()
        && canonical_lines(&existing.entries) == canonical_lines(&proposed.entries);

    if identical {
        tracing::debug!(
            company = %existing.company_id,
            number = %existing.transaction_number,
            "idempotent replay, no second write"
        );
        Ok(PostReceipt {
            status: PostStatus::Replay,
            transaction_id: existing.transaction_id.clone(),
            transaction_number: existing.transaction_number.clone(),
        })
    } else {
        // Same number, different content: a caller bug or an attack,
        // never a legitimate retry.
        Err(LedgerError::IdempotencyMismatch {
            transaction_number: existing.transaction_number.clone(),
            existing_transaction_id: existing.transaction_id.clone(),
        })
    }
}

/// Entry captured by the builder before line ids exist.
#[derive(Debug, Clone)]
struct PendingEntry {
    account_id: String,
    side: EntrySide,
    amount: Cents,
    allow_negative: bool,
    memo: Option<String>,
}

/// Builder for candidate transactions.
///
/// Propagates the company, transaction id, and currency onto every line at
/// `build()` time, so tenant and currency isolation hold by construction,
/// and assigns deterministic line ids (`<transaction_id>:<n>`).
#[derive(Debug)]
pub struct LedgerTransactionBuilder {
    company_id: String,
    transaction_number: String,
    date: NaiveDate,
    currency: String,
    transaction_id: Option<String>,
    transaction_type: TransactionType,
    reference: Option<String>,
    description: Option<String>,
    idempotency_key: Option<String>,
    created_by: String,
    pending: Vec<PendingEntry>,
}

impl LedgerTransactionBuilder {
    pub fn new(
        company_id: impl Into<String>,
        transaction_number: impl Into<String>,
        date: NaiveDate,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            company_id: company_id.into(),
            transaction_number: transaction_number.into(),
            date,
            currency: currency.into(),
            transaction_id: None,
            transaction_type: TransactionType::Manual,
            reference: None,
            description: None,
            idempotency_key: None,
            created_by: "system".to_string(),
            pending: Vec::new(),
        }
    }

    /// Override the physical key. Defaults to
    /// `txn-<company_id>-<transaction_number>`, which is deterministic per
    /// domain key and therefore replay-stable.
    pub fn transaction_id(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    pub fn transaction_type(mut self, transaction_type: TransactionType) -> Self {
        self.transaction_type = transaction_type;
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Override the retry key. Defaults to the transaction number.
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn created_by(mut self, actor: impl Into<String>) -> Self {
        self.created_by = actor.into();
        self
    }

    /// Add a debit line.
    pub fn debit(self, account_id: impl Into<String>, amount: Cents) -> Self {
        self.entry(account_id, EntrySide::Debit, amount, false, None)
    }

    /// Add a credit line.
    pub fn credit(self, account_id: impl Into<String>, amount: Cents) -> Self {
        self.entry(account_id, EntrySide::Credit, amount, false, None)
    }

    /// Add a line with full control over the override flag and memo.
    pub fn entry(
        mut self,
        account_id: impl Into<String>,
        side: EntrySide,
        amount: Cents,
        allow_negative: bool,
        memo: Option<String>,
    ) -> Self {
        self.pending.push(PendingEntry {
            account_id: account_id.into(),
            side,
            amount,
            allow_negative,
            memo,
        });
        self
    }

    /// Materialize and validate the transaction.
    pub fn build(self) -> LedgerResult<LedgerTransaction> {
        let transaction_id = self.transaction_id.unwrap_or_else(|| {
            format!("txn-{}-{}", self.company_id, self.transaction_number)
        });

        let entries = self
            .pending
            .into_iter()
            .enumerate()
            .map(|(index, pending)| LedgerEntry {
                line_id: format!("{transaction_id}:{}", index + 1),
                transaction_id: transaction_id.clone(),
                company_id: self.company_id.clone(),
                account_id: pending.account_id,
                side: pending.side,
                amount: pending.amount,
                currency: self.currency.clone(),
                allow_negative: pending.allow_negative,
                memo: pending.memo,
            })
            .collect();

        let transaction = LedgerTransaction {
            transaction_id,
            company_id: self.company_id,
            transaction_number: self.transaction_number.clone(),
            date: self.date,
            transaction_type: self.transaction_type,
            reference: self.reference,
            description: self.description,
            currency: self.currency,
            idempotency_key: self.idempotency_key.unwrap_or(self.transaction_number),
            created_by: self.created_by,
            status: TransactionStatus::Posted,
            entries,
        };

        invariants::assert_balanced(&transaction)?;
        Ok(transaction)
    }
}

/// Common posting shapes
pub mod patterns {
    use super::*;

    /// A simple balanced two-line transaction: debit one account, credit
    /// another for the same amount.
    #[allow(clippy::too_many_arguments)]
    pub fn two_line(
        company_id: &str,
        transaction_number: &str,
        date: NaiveDate,
        currency: &str,
        debit_account_id: &str,
        credit_account_id: &str,
        amount: Cents,
        transaction_type: TransactionType,
    ) -> LedgerResult<LedgerTransaction> {
        LedgerTransactionBuilder::new(company_id, transaction_number, date, currency)
            .transaction_type(transaction_type)
            .debit(debit_account_id, amount)
            .credit(credit_account_id, amount)
            .build()
    }

    /// Build the reversal of a posted transaction: every line flipped to
    /// the opposite side with `allow_negative` set, referencing the
    /// original's number. The original is never edited.
    pub fn reversal_of(
        original: &LedgerTransaction,
        reversal_number: &str,
        date: NaiveDate,
    ) -> LedgerResult<LedgerTransaction> {
        let mut builder = LedgerTransactionBuilder::new(
            &original.company_id,
            reversal_number,
            date,
            &original.currency,
        )
        .transaction_type(TransactionType::Reversal)
        .reference(original.transaction_number.clone())
        .description(format!("reversal of {}", original.transaction_number))
        .created_by(original.created_by.clone());

        for entry in &original.entries {
            let flipped = match entry.side {
                EntrySide::Debit => EntrySide::Credit,
                EntrySide::Credit => EntrySide::Debit,
            };
            builder = builder.entry(
                entry.account_id.clone(),
                flipped,
                entry.amount,
                true,
                entry.memo.clone(),
            );
        }

        builder.build()
    }
}
