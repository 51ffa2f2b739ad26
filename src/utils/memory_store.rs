//! In-memory store implementation for testing and development
//!
//! Implements all three store seams behind a single mutex, so every
//! state-mutating operation is one atomic unit and balance derivation
//! always observes fully committed history - the same guarantee a
//! database-backed store provides with transactions.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::money::Cents;
use crate::traits::*;
use crate::types::*;

#[derive(Debug, Clone)]
struct StoredPeriod {
    company_id: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    initial_state: PeriodState,
    actions: Vec<PeriodLockAction>,
}

impl StoredPeriod {
    fn resolved_state(&self) -> PeriodState {
        self.actions
            .last()
            .map(|action| action.to)
            .unwrap_or(self.initial_state)
    }
}

#[derive(Debug, Default)]
struct Inner {
    transactions: Vec<LedgerTransaction>,
    snapshots: HashMap<(String, String), AccountSnapshot>,
    periods: HashMap<String, StoredPeriod>,
    schedules: HashMap<String, RevenueSchedule>,
}

/// In-memory store for tests and development. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = Inner::default();
    }

    /// Seed an account snapshot.
    pub fn put_account(&self, snapshot: AccountSnapshot) {
        let mut inner = self.inner.lock().unwrap();
        inner.snapshots.insert(
            (snapshot.company_id.clone(), snapshot.account_id.clone()),
            snapshot,
        );
    }

    /// Seed an accounting period. The given `state` becomes the period's
    /// starting point; later lock actions are appended on top of it.
    pub fn put_period(&self, period: AccountingPeriod) {
        let mut inner = self.inner.lock().unwrap();
        inner.periods.insert(
            period.period_id.clone(),
            StoredPeriod {
                company_id: period.company_id,
                start_date: period.start_date,
                end_date: period.end_date,
                initial_state: period.state,
                actions: Vec::new(),
            },
        );
    }

    /// Mark a committed transaction voided. Test seeding only - the engines
    /// never edit posted history.
    pub fn mark_voided(&self, transaction_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(txn) = inner
            .transactions
            .iter_mut()
            .find(|t| t.transaction_id == transaction_id)
        {
            txn.status = TransactionStatus::Voided;
        }
    }

    /// Number of committed transactions, voided included.
    pub fn transaction_count(&self) -> usize {
        self.inner.lock().unwrap().transactions.len()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn commit_append_only(&self, transaction: &LedgerTransaction) -> LedgerResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .transactions
            .iter()
            .any(|t| t.transaction_id == transaction.transaction_id)
        {
            return Err(LedgerError::Storage(format!(
                "transaction {} is already committed; posted history is append-only",
                transaction.transaction_id
            )));
        }
        inner.transactions.push(transaction.clone());
        Ok(())
    }

    async fn list_posted_transactions(
        &self,
        company_id: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> LedgerResult<Vec<LedgerTransaction>> {
        let inner = self.inner.lock().unwrap();
        let mut matching: Vec<LedgerTransaction> = inner
            .transactions
            .iter()
            .filter(|txn| {
                txn.company_id == company_id
                    && txn.status == TransactionStatus::Posted
                    && from.is_none_or(|start| txn.date >= start)
                    && to.is_none_or(|end| txn.date <= end)
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            (a.date, &a.transaction_number).cmp(&(b.date, &b.transaction_number))
        });
        Ok(matching)
    }

    async fn get_account_snapshots(
        &self,
        company_id: &str,
        account_ids: &[String],
    ) -> LedgerResult<Vec<AccountSnapshot>> {
        let inner = self.inner.lock().unwrap();
        Ok(account_ids
            .iter()
            .filter_map(|account_id| {
                inner
                    .snapshots
                    .get(&(company_id.to_string(), account_id.clone()))
                    .cloned()
            })
            .collect())
    }

    async fn get_account_balances_cents(
        &self,
        company_id: &str,
        account_ids: &[String],
    ) -> LedgerResult<HashMap<String, Cents>> {
        let inner = self.inner.lock().unwrap();
        let mut balances: HashMap<String, Cents> = account_ids
            .iter()
            .map(|id| (id.clone(), Cents::ZERO))
            .collect();

        for txn in &inner.transactions {
            if txn.company_id != company_id || txn.status != TransactionStatus::Posted {
                continue;
            }
            for entry in &txn.entries {
                if let Some(balance) = balances.get_mut(&entry.account_id) {
                    match entry.side {
                        EntrySide::Debit => *balance += entry.amount,
                        EntrySide::Credit => *balance -= entry.amount,
                    }
                }
            }
        }

        Ok(balances)
    }

    async fn get_posted_transaction_by_number(
        &self,
        company_id: &str,
        transaction_number: &str,
    ) -> LedgerResult<Option<LedgerTransaction>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .transactions
            .iter()
            .find(|txn| {
                txn.company_id == company_id && txn.transaction_number == transaction_number
            })
            .cloned())
    }
}

#[async_trait]
impl PeriodStore for MemoryStore {
    async fn resolve_period(
        &self,
        company_id: &str,
        date: NaiveDate,
    ) -> LedgerResult<ResolvedPeriod> {
        let inner = self.inner.lock().unwrap();
        let covering = inner.periods.iter().find(|(_, period)| {
            period.company_id == company_id
                && period.start_date <= date
                && date <= period.end_date
        });
        Ok(match covering {
            Some((period_id, period)) => ResolvedPeriod {
                period_id: Some(period_id.clone()),
                state: period.resolved_state(),
            },
            None => ResolvedPeriod {
                period_id: None,
                state: PeriodState::Open,
            },
        })
    }

    async fn get_period(&self, period_id: &str) -> LedgerResult<Option<AccountingPeriod>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.periods.get(period_id).map(|period| AccountingPeriod {
            period_id: period_id.to_string(),
            company_id: period.company_id.clone(),
            start_date: period.start_date,
            end_date: period.end_date,
            state: period.resolved_state(),
        }))
    }

    async fn record_lock_action(
        &self,
        period_id: &str,
        expected_current: PeriodState,
        action: PeriodLockAction,
    ) -> LedgerResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let period = inner
            .periods
            .get_mut(period_id)
            .ok_or_else(|| LedgerError::PeriodNotFound {
                period_id: period_id.to_string(),
            })?;

        // Compare-and-swap: a concurrent transition that landed first
        // invalidates this one.
        let current = period.resolved_state();
        if current != expected_current {
            return Err(LedgerError::PeriodLockViolation {
                company_id: period.company_id.clone(),
                date: period.start_date,
                state: current,
                detail: "period state changed concurrently".to_string(),
            });
        }

        period.actions.push(action);
        Ok(())
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn save_schedule(&self, schedule: &RevenueSchedule) -> LedgerResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .schedules
            .insert(schedule.schedule_id.clone(), schedule.clone());
        Ok(())
    }

    async fn get_schedule(&self, schedule_id: &str) -> LedgerResult<Option<RevenueSchedule>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.schedules.get(schedule_id).cloned())
    }
}

/// An [`AuditSink`] capturing events for assertions.
#[derive(Debug, Clone, Default)]
pub struct RecordingAuditSink {
    events: Arc<Mutex<Vec<SecurityEvent>>>,
}

impl RecordingAuditSink {
    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<SecurityEvent> {
        self.events.lock().unwrap().last().cloned()
    }
}

impl AuditSink for RecordingAuditSink {
    fn log_security_event(&self, event: SecurityEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Seeding helpers shared by tests and demos
pub mod seed {
    use super::*;

    /// A minimal chart of accounts covering all five account types.
    pub fn standard_accounts(store: &MemoryStore, company_id: &str) {
        let accounts = [
            ("cash", AccountType::Asset),
            ("accounts_receivable", AccountType::Asset),
            ("deferred_revenue", AccountType::Liability),
            ("owners_equity", AccountType::Equity),
            ("revenue", AccountType::Revenue),
            ("office_supplies", AccountType::Expense),
        ];
        for (account_id, account_type) in accounts {
            store.put_account(AccountSnapshot {
                company_id: company_id.to_string(),
                account_id: account_id.to_string(),
                account_type,
                allow_negative_balance: false,
            });
        }
    }
}
