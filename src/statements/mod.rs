//! Financial statement generation by replay
//!
//! A pure read path: statements are never stored, they are recomputed on
//! demand by replaying the posted transaction log. Each result carries an
//! `integrity_hash` over its canonicalized rows, so two independent replays
//! of the same history can be compared byte-for-byte.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::money::Cents;
use crate::traits::*;
use crate::types::*;

/// Account id carried by the synthetic implied-net-income equity line.
/// Never a real account; callers enumerating real accounts filter on
/// [`StatementLine::synthetic`].
pub const NET_INCOME_LINE_ID: &str = "net_income";

/// One account's replayed totals for a date range. `opening`, `closing`,
/// and the activity fields are signed debit-minus-credit cents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalanceRow {
    pub account_id: String,
    pub currency: String,
    pub opening: Cents,
    pub debit_activity: Cents,
    pub credit_activity: Cents,
    pub closing: Cents,
}

impl TrialBalanceRow {
    /// Net in-window movement, signed debit minus credit.
    pub fn activity(&self) -> Cents {
        self.debit_activity - self.credit_activity
    }
}

/// The replayed, per-account totals for a date range, the basis for all
/// other statements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalance {
    pub company_id: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Sorted by account id, then currency
    pub rows: Vec<TrialBalanceRow>,
    pub total_debits: Cents,
    pub total_credits: Cents,
    pub integrity_hash: String,
}

/// One display line of a generated statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementLine {
    pub account_id: String,
    pub amount: Cents,
    /// True for derived lines that correspond to no real account, like the
    /// implied net income injected into the balance sheet
    pub synthetic: bool,
}

impl StatementLine {
    fn real(account_id: &str, amount: Cents) -> Self {
        Self {
            account_id: account_id.to_string(),
            amount,
            synthetic: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomeStatement {
    pub company_id: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub revenue: Vec<StatementLine>,
    pub expenses: Vec<StatementLine>,
    pub total_revenue: Cents,
    pub total_expenses: Cents,
    pub net_income: Cents,
    pub integrity_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSheet {
    pub company_id: String,
    pub as_of: NaiveDate,
    pub assets: Vec<StatementLine>,
    pub liabilities: Vec<StatementLine>,
    pub equity: Vec<StatementLine>,
    pub total_assets: Cents,
    pub total_liabilities: Cents,
    pub total_equity: Cents,
    /// Whether `assets == liabilities + equity` held after injecting the
    /// implied net income; false only if replay or bucketing is broken
    pub balanced: bool,
    pub integrity_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashFlowStatement {
    pub company_id: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Signed (debit minus credit) movement per cash account
    pub lines: Vec<StatementLine>,
    pub net_cash_flow: Cents,
    pub integrity_hash: String,
}

/// Hex SHA-256 over pre-canonicalized statement rows.
fn fingerprint<I>(parts: I) -> String
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref().as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

fn line_fingerprint_parts(section: &str, lines: &[StatementLine]) -> Vec<String> {
    lines
        .iter()
        .map(|line| {
            format!(
                "{section}|{}|{}|{}",
                line.account_id,
                line.amount.value(),
                line.synthetic
            )
        })
        .collect()
}

/// Rebuilds statements from posted history. Holds no state; safe to run
/// concurrently with writes, since it only ever sees committed history.
pub struct StatementEngine<S> {
    store: Arc<S>,
    audit: Arc<dyn AuditSink>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl<S: LedgerStore> StatementEngine<S> {
    pub fn new(
        store: Arc<S>,
        audit: Arc<dyn AuditSink>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            audit,
            ids,
            clock,
        }
    }

    /// Replay every non-void posted transaction dated up to `to`,
    /// accumulating opening balances (before `from`) and in-window
    /// activity per (account, currency).
    ///
    /// Accumulation is commutative and rows come out of a sorted map, so
    /// the result - and its hash - is independent of the order the store
    /// returns transactions in.
    pub async fn build_trial_balance(
        &self,
        company_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> LedgerResult<TrialBalance> {
        let transactions = self
            .store
            .list_posted_transactions(company_id, None, Some(to))
            .await?;

        let mut rows: BTreeMap<(String, String), TrialBalanceRow> = BTreeMap::new();
        for transaction in &transactions {
            let pre_window = transaction.date < from;
            for entry in &transaction.entries {
                let row = rows
                    .entry((entry.account_id.clone(), entry.currency.clone()))
                    .or_insert_with(|| TrialBalanceRow {
                        account_id: entry.account_id.clone(),
                        currency: entry.currency.clone(),
                        opening: Cents::ZERO,
                        debit_activity: Cents::ZERO,
                        credit_activity: Cents::ZERO,
                        closing: Cents::ZERO,
                    });
                match (pre_window, entry.side) {
                    (true, EntrySide::Debit) => row.opening += entry.amount,
                    (true, EntrySide::Credit) => row.opening -= entry.amount,
                    (false, EntrySide::Debit) => row.debit_activity += entry.amount,
                    (false, EntrySide::Credit) => row.credit_activity += entry.amount,
                }
            }
        }

        let mut rows: Vec<TrialBalanceRow> = rows.into_values().collect();
        for row in &mut rows {
            row.closing = row.opening + row.debit_activity - row.credit_activity;
        }

        let total_debits = rows.iter().map(|r| r.debit_activity).sum();
        let total_credits = rows.iter().map(|r| r.credit_activity).sum();
        let integrity_hash = fingerprint(rows.iter().map(|row| {
            format!(
                "{}|{}|{}|{}|{}|{}",
                row.account_id,
                row.currency,
                row.opening.value(),
                row.debit_activity.value(),
                row.credit_activity.value(),
                row.closing.value()
            )
        }));

        Ok(TrialBalance {
            company_id: company_id.to_string(),
            from,
            to,
            rows,
            total_debits,
            total_credits,
            integrity_hash,
        })
    }

    /// Rebuild the trial balance and compare it with a previously computed
    /// fingerprint. Disagreement means posted history or the replay logic
    /// drifted; it is audited at high severity before the error returns.
    pub async fn verify_replay(
        &self,
        company_id: &str,
        from: NaiveDate,
        to: NaiveDate,
        expected_hash: &str,
    ) -> LedgerResult<TrialBalance> {
        let trial_balance = self.build_trial_balance(company_id, from, to).await?;
        if trial_balance.integrity_hash != expected_hash {
            self.audit.log_security_event(SecurityEvent {
                tenant_id: company_id.to_string(),
                actor_id: "system".to_string(),
                action: "statements.verify_replay".to_string(),
                resource_type: "trial_balance".to_string(),
                resource_id: format!("{company_id}:{from}:{to}"),
                outcome: AuditOutcome::Denied,
                correlation_id: self.ids.correlation_id(),
                severity: AuditSeverity::High,
                occurred_at: self.clock.now(),
                metadata: HashMap::from([
                    ("expected".to_string(), expected_hash.to_string()),
                    ("actual".to_string(), trial_balance.integrity_hash.clone()),
                ]),
            });
            return Err(LedgerError::ReplayFingerprintMismatch {
                expected: expected_hash.to_string(),
                actual: trial_balance.integrity_hash,
            });
        }
        Ok(trial_balance)
    }

    /// Bucket in-window activity into revenue (credit-normal, displayed as
    /// `-activity`) and expenses (debit-normal).
    pub async fn generate_income_statement(
        &self,
        company_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> LedgerResult<IncomeStatement> {
        let trial_balance = self.build_trial_balance(company_id, from, to).await?;
        let accounts = self.account_types(company_id, &trial_balance).await?;

        let mut revenue = Vec::new();
        let mut expenses = Vec::new();
        for row in &trial_balance.rows {
            match accounts.get(row.account_id.as_str()) {
                Some(AccountType::Revenue) => {
                    revenue.push(StatementLine::real(&row.account_id, -row.activity()));
                }
                Some(AccountType::Expense) => {
                    expenses.push(StatementLine::real(&row.account_id, row.activity()));
                }
                _ => {}
            }
        }

        let total_revenue: Cents = revenue.iter().map(|l| l.amount).sum();
        let total_expenses: Cents = expenses.iter().map(|l| l.amount).sum();
        let net_income = total_revenue - total_expenses;

        let mut parts = line_fingerprint_parts("revenue", &revenue);
        parts.extend(line_fingerprint_parts("expense", &expenses));
        parts.push(format!("net_income|{}", net_income.value()));

        Ok(IncomeStatement {
            company_id: company_id.to_string(),
            from,
            to,
            revenue,
            expenses,
            total_revenue,
            total_expenses,
            net_income,
            integrity_hash: fingerprint(parts),
        })
    }

    /// Replay from the epoch through `as_of` and bucket closing balances
    /// into assets, liabilities, and equity.
    ///
    /// This ledger requires no explicit period-closing entries, so the
    /// revenue and expense accumulated to date are injected as one
    /// synthetic equity line; `assets == liabilities + equity` then holds
    /// by construction. If the identity still fails the sheet is returned
    /// with `balanced == false` and a high-severity audit event fires.
    pub async fn generate_balance_sheet(
        &self,
        company_id: &str,
        as_of: NaiveDate,
    ) -> LedgerResult<BalanceSheet> {
        let trial_balance = self
            .build_trial_balance(company_id, NaiveDate::MIN, as_of)
            .await?;
        let accounts = self.account_types(company_id, &trial_balance).await?;

        let mut assets = Vec::new();
        let mut liabilities = Vec::new();
        let mut equity = Vec::new();
        let mut implied_net_income = Cents::ZERO;
        for row in &trial_balance.rows {
            match accounts.get(row.account_id.as_str()) {
                Some(AccountType::Asset) => {
                    assets.push(StatementLine::real(&row.account_id, row.closing));
                }
                Some(AccountType::Liability) => {
                    liabilities.push(StatementLine::real(&row.account_id, -row.closing));
                }
                Some(AccountType::Equity) => {
                    equity.push(StatementLine::real(&row.account_id, -row.closing));
                }
                Some(AccountType::Revenue) => implied_net_income -= row.closing,
                Some(AccountType::Expense) => implied_net_income -= row.closing,
                None => {}
            }
        }

        if !implied_net_income.is_zero() {
            equity.push(StatementLine {
                account_id: NET_INCOME_LINE_ID.to_string(),
                amount: implied_net_income,
                synthetic: true,
            });
        }

        let total_assets: Cents = assets.iter().map(|l| l.amount).sum();
        let total_liabilities: Cents = liabilities.iter().map(|l| l.amount).sum();
        let total_equity: Cents = equity.iter().map(|l| l.amount).sum();
        let balanced = total_assets == total_liabilities + total_equity;

        if !balanced {
            self.audit.log_security_event(SecurityEvent {
                tenant_id: company_id.to_string(),
                actor_id: "system".to_string(),
                action: "statements.balance_sheet".to_string(),
                resource_type: "balance_sheet".to_string(),
                resource_id: format!("{company_id}:{as_of}"),
                outcome: AuditOutcome::Denied,
                correlation_id: self.ids.correlation_id(),
                severity: AuditSeverity::High,
                occurred_at: self.clock.now(),
                metadata: HashMap::from([
                    ("total_assets".to_string(), total_assets.to_string()),
                    (
                        "total_liabilities".to_string(),
                        total_liabilities.to_string(),
                    ),
                    ("total_equity".to_string(), total_equity.to_string()),
                ]),
            });
        }

        let mut parts = line_fingerprint_parts("asset", &assets);
        parts.extend(line_fingerprint_parts("liability", &liabilities));
        parts.extend(line_fingerprint_parts("equity", &equity));

        Ok(BalanceSheet {
            company_id: company_id.to_string(),
            as_of,
            assets,
            liabilities,
            equity,
            total_assets,
            total_liabilities,
            total_equity,
            balanced,
            integrity_hash: fingerprint(parts),
        })
    }

    /// Direct-method cash flow: signed (debit minus credit) in-window
    /// activity restricted to the caller's set of cash accounts.
    pub async fn generate_cash_flow_direct(
        &self,
        company_id: &str,
        from: NaiveDate,
        to: NaiveDate,
        cash_account_ids: &[String],
    ) -> LedgerResult<CashFlowStatement> {
        let trial_balance = self.build_trial_balance(company_id, from, to).await?;
        let cash: HashSet<&str> = cash_account_ids.iter().map(String::as_str).collect();

        let lines: Vec<StatementLine> = trial_balance
            .rows
            .iter()
            .filter(|row| cash.contains(row.account_id.as_str()))
            .map(|row| StatementLine::real(&row.account_id, row.activity()))
            .collect();
        let net_cash_flow: Cents = lines.iter().map(|l| l.amount).sum();

        let mut parts = line_fingerprint_parts("cash", &lines);
        parts.push(format!("net_cash_flow|{}", net_cash_flow.value()));

        Ok(CashFlowStatement {
            company_id: company_id.to_string(),
            from,
            to,
            lines,
            net_cash_flow,
            integrity_hash: fingerprint(parts),
        })
    }

    async fn account_types(
        &self,
        company_id: &str,
        trial_balance: &TrialBalance,
    ) -> LedgerResult<HashMap<String, AccountType>> {
        let account_ids: Vec<String> = trial_balance
            .rows
            .iter()
            .map(|row| row.account_id.clone())
            .collect();
        let snapshots = self
            .store
            .get_account_snapshots(company_id, &account_ids)
            .await?;
        Ok(snapshots
            .into_iter()
            .map(|s| (s.account_id, s.account_type))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerTransactionBuilder;
    use crate::utils::memory_store::{seed, MemoryStore, RecordingAuditSink};
    use chrono::NaiveDateTime;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn engine(store: &MemoryStore, sink: &RecordingAuditSink) -> StatementEngine<MemoryStore> {
        StatementEngine::new(
            Arc::new(store.clone()),
            Arc::new(sink.clone()),
            Arc::new(SequentialIds::new("st")),
            Arc::new(FixedClock(NaiveDateTime::default())),
        )
    }

    async fn commit_sale(store: &MemoryStore, number: &str, day: u32, cents: i64) {
        let txn = LedgerTransactionBuilder::new("co1", number, date(2026, 1, day), "USD")
            .debit("cash", Cents::new(cents))
            .credit("revenue", Cents::new(cents))
            .build()
            .unwrap();
        store.commit_append_only(&txn).await.unwrap();
    }

    #[tokio::test]
    async fn trial_balance_accumulates_opening_and_activity() {
        let store = MemoryStore::new();
        let sink = RecordingAuditSink::default();
        seed::standard_accounts(&store, "co1");
        commit_sale(&store, "T1", 2, 1000).await;
        commit_sale(&store, "T2", 20, 500).await;
        let engine = engine(&store, &sink);

        let tb = engine
            .build_trial_balance("co1", date(2026, 1, 10), date(2026, 1, 31))
            .await
            .unwrap();

        let cash = tb.rows.iter().find(|r| r.account_id == "cash").unwrap();
        assert_eq!(cash.opening, Cents::new(1000));
        assert_eq!(cash.debit_activity, Cents::new(500));
        assert_eq!(cash.closing, Cents::new(1500));

        let revenue = tb.rows.iter().find(|r| r.account_id == "revenue").unwrap();
        assert_eq!(revenue.opening, Cents::new(-1000));
        assert_eq!(revenue.closing, Cents::new(-1500));

        assert_eq!(tb.total_debits, tb.total_credits);
    }

    #[tokio::test]
    async fn rebuilding_yields_an_identical_hash() {
        let store = MemoryStore::new();
        let sink = RecordingAuditSink::default();
        seed::standard_accounts(&store, "co1");
        commit_sale(&store, "T1", 2, 1000).await;
        commit_sale(&store, "T2", 20, 500).await;
        let engine = engine(&store, &sink);

        let first = engine
            .build_trial_balance("co1", date(2026, 1, 1), date(2026, 1, 31))
            .await
            .unwrap();
        let second = engine
            .build_trial_balance("co1", date(2026, 1, 1), date(2026, 1, 31))
            .await
            .unwrap();
        assert_eq!(first.integrity_hash, second.integrity_hash);
        assert_eq!(first.rows, second.rows);

        assert!(engine
            .verify_replay("co1", date(2026, 1, 1), date(2026, 1, 31), &first.integrity_hash)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn replay_mismatch_is_detected_and_audited() {
        let store = MemoryStore::new();
        let sink = RecordingAuditSink::default();
        seed::standard_accounts(&store, "co1");
        commit_sale(&store, "T1", 2, 1000).await;
        let engine = engine(&store, &sink);

        let fingerprint = engine
            .build_trial_balance("co1", date(2026, 1, 1), date(2026, 1, 31))
            .await
            .unwrap()
            .integrity_hash;

        commit_sale(&store, "T2", 15, 500).await;
        assert!(matches!(
            engine
                .verify_replay("co1", date(2026, 1, 1), date(2026, 1, 31), &fingerprint)
                .await,
            Err(LedgerError::ReplayFingerprintMismatch { .. })
        ));
        let event = sink.last().unwrap();
        assert_eq!(event.outcome, AuditOutcome::Denied);
        assert_eq!(event.severity, AuditSeverity::High);
    }

    #[tokio::test]
    async fn income_statement_shows_positive_revenue() {
        let store = MemoryStore::new();
        let sink = RecordingAuditSink::default();
        seed::standard_accounts(&store, "co1");
        commit_sale(&store, "T1", 10, 10000).await;

        let expense = LedgerTransactionBuilder::new("co1", "T2", date(2026, 1, 12), "USD")
            .debit("office_supplies", Cents::new(3000))
            .credit("cash", Cents::new(3000))
            .build()
            .unwrap();
        store.commit_append_only(&expense).await.unwrap();
        let engine = engine(&store, &sink);

        let statement = engine
            .generate_income_statement("co1", date(2026, 1, 1), date(2026, 1, 31))
            .await
            .unwrap();
        assert_eq!(statement.total_revenue, Cents::new(10000));
        assert_eq!(statement.total_expenses, Cents::new(3000));
        assert_eq!(statement.net_income, Cents::new(7000));
    }

    #[tokio::test]
    async fn balance_sheet_balances_with_synthetic_net_income() {
        let store = MemoryStore::new();
        let sink = RecordingAuditSink::default();
        seed::standard_accounts(&store, "co1");
        commit_sale(&store, "T1", 10, 10000).await;
        let engine = engine(&store, &sink);

        let sheet = engine
            .generate_balance_sheet("co1", date(2026, 1, 31))
            .await
            .unwrap();
        assert!(sheet.balanced);
        assert_eq!(sheet.total_assets, Cents::new(10000));

        let synthetic: Vec<_> = sheet.equity.iter().filter(|l| l.synthetic).collect();
        assert_eq!(synthetic.len(), 1);
        assert_eq!(synthetic[0].account_id, NET_INCOME_LINE_ID);
        assert_eq!(synthetic[0].amount, Cents::new(10000));
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn cash_flow_sums_only_the_requested_accounts() {
        let store = MemoryStore::new();
        let sink = RecordingAuditSink::default();
        seed::standard_accounts(&store, "co1");
        commit_sale(&store, "T1", 10, 10000).await;

        let expense = LedgerTransactionBuilder::new("co1", "T2", date(2026, 1, 12), "USD")
            .debit("office_supplies", Cents::new(3000))
            .credit("cash", Cents::new(3000))
            .build()
            .unwrap();
        store.commit_append_only(&expense).await.unwrap();
        let engine = engine(&store, &sink);

        let cash_flow = engine
            .generate_cash_flow_direct(
                "co1",
                date(2026, 1, 1),
                date(2026, 1, 31),
                &["cash".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(cash_flow.lines.len(), 1);
        assert_eq!(cash_flow.net_cash_flow, Cents::new(7000));
    }

    #[tokio::test]
    async fn voided_transactions_are_excluded_from_replay() {
        let store = MemoryStore::new();
        let sink = RecordingAuditSink::default();
        seed::standard_accounts(&store, "co1");
        commit_sale(&store, "T1", 10, 10000).await;
        commit_sale(&store, "T2", 12, 500).await;
        store.mark_voided("txn-co1-T2");
        let engine = engine(&store, &sink);

        let tb = engine
            .build_trial_balance("co1", date(2026, 1, 1), date(2026, 1, 31))
            .await
            .unwrap();
        let cash = tb.rows.iter().find(|r| r.account_id == "cash").unwrap();
        assert_eq!(cash.closing, Cents::new(10000));
    }
}
