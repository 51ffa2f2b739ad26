//! Core types and data structures for the ledger system

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::money::Cents;

/// Account types following standard accounting principles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    /// Assets - what the business owns (Cash, Receivables, Equipment, etc.)
    Asset,
    /// Liabilities - what the business owes (Deferred Revenue, Payables, etc.)
    Liability,
    /// Equity - owner's interest in the business
    Equity,
    /// Revenue - money earned by the business
    Revenue,
    /// Expenses - costs incurred by the business
    Expense,
}

impl AccountType {
    /// Returns the normal balance side for this account type.
    /// Assets and Expenses normally carry debit balances;
    /// Liabilities, Equity, and Revenue normally carry credit balances.
    pub fn normal_balance(&self) -> EntrySide {
        match self {
            AccountType::Asset | AccountType::Expense => EntrySide::Debit,
            AccountType::Liability | AccountType::Equity | AccountType::Revenue => {
                EntrySide::Credit
            }
        }
    }

    /// Whether a balance in this account may drop below zero without an
    /// explicit override. Liability, equity, and revenue accounts routinely
    /// swing negative (reversals, drawdowns); asset and expense accounts
    /// may not.
    pub fn allows_negative_balance(&self) -> bool {
        matches!(
            self,
            AccountType::Liability | AccountType::Equity | AccountType::Revenue
        )
    }
}

/// The two sides of a double-entry line. A line is exactly one of these,
/// never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntrySide {
    Debit,
    Credit,
}

impl fmt::Display for EntrySide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntrySide::Debit => write!(f, "DEBIT"),
            EntrySide::Credit => write!(f, "CREDIT"),
        }
    }
}

/// Classification of a ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Manual,
    Invoice,
    Payment,
    Reversal,
    RevenueRecognition,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionType::Manual => "manual",
            TransactionType::Invoice => "invoice",
            TransactionType::Payment => "payment",
            TransactionType::Reversal => "reversal",
            TransactionType::RevenueRecognition => "revenue_recognition",
        };
        write!(f, "{name}")
    }
}

/// Lifecycle status of a posted transaction. Posted history is append-only;
/// `Voided` exists so the store can exclude administratively voided rows
/// from replay without ever editing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Posted,
    Voided,
}

/// A single line within a transaction, touching one account on one side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Identifier of this line within its transaction
    pub line_id: String,
    /// Physical key of the owning transaction; must match the parent
    pub transaction_id: String,
    /// Tenant scope; must match the parent
    pub company_id: String,
    /// Account being affected
    pub account_id: String,
    /// Debit or credit
    pub side: EntrySide,
    /// Positive amount in cents
    pub amount: Cents,
    /// Currency code; must equal the parent transaction's currency
    pub currency: String,
    /// Permits the touched account to go negative for this posting even if
    /// its type would normally forbid it
    pub allow_negative: bool,
    /// Optional line-level note
    pub memo: Option<String>,
}

/// A company-scoped double-entry transaction. Once committed to the store it
/// is immutable; a correction is a new `Reversal` transaction referencing
/// this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    /// Physical key
    pub transaction_id: String,
    /// Tenant scope
    pub company_id: String,
    /// Domain-level idempotency key, unique per company
    pub transaction_number: String,
    /// Accounting date the transaction belongs to
    pub date: NaiveDate,
    pub transaction_type: TransactionType,
    /// Optional pointer to a related document or original transaction
    pub reference: Option<String>,
    pub description: Option<String>,
    /// Currency code shared by every line
    pub currency: String,
    /// Caller-supplied retry key, recorded for audit
    pub idempotency_key: String,
    /// Actor who submitted the transaction, recorded for audit
    pub created_by: String,
    pub status: TransactionStatus,
    /// Ordered entry lines
    pub entries: Vec<LedgerEntry>,
}

impl LedgerTransaction {
    /// Sum of all debit lines.
    pub fn total_debits(&self) -> Cents {
        self.entries
            .iter()
            .filter(|e| e.side == EntrySide::Debit)
            .map(|e| e.amount)
            .sum()
    }

    /// Sum of all credit lines.
    pub fn total_credits(&self) -> Cents {
        self.entries
            .iter()
            .filter(|e| e.side == EntrySide::Credit)
            .map(|e| e.amount)
            .sum()
    }

    /// Whether debit and credit totals agree, in exact integer cents.
    pub fn is_balanced(&self) -> bool {
        self.total_debits() == self.total_credits()
    }

    /// The distinct account ids this transaction touches, in sorted order.
    pub fn touched_accounts(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self.entries.iter().map(|e| e.account_id.as_str()).collect();
        set.into_iter().map(str::to_string).collect()
    }
}

/// Per-company view of an account, used only to decide whether a resulting
/// balance may go negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub company_id: String,
    pub account_id: String,
    pub account_type: AccountType,
    /// Explicit negative-balance allowance overriding the type default
    pub allow_negative_balance: bool,
}

/// Lock state of an accounting period. The only forward path is
/// `Open -> SoftClosed -> HardLocked`; `HardLocked` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodState {
    Open,
    SoftClosed,
    HardLocked,
}

impl fmt::Display for PeriodState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeriodState::Open => "OPEN",
            PeriodState::SoftClosed => "SOFT_CLOSED",
            PeriodState::HardLocked => "HARD_LOCKED",
        };
        write!(f, "{name}")
    }
}

/// An accounting period covering an inclusive date range for one company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingPeriod {
    pub period_id: String,
    pub company_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// State resolved from the most recent lock action; `Open` when no
    /// action has ever been recorded
    pub state: PeriodState,
}

/// One recorded lock-state transition. Periods keep their full action
/// history; the latest action determines the resolved state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodLockAction {
    pub action_id: String,
    pub period_id: String,
    pub from: PeriodState,
    pub to: PeriodState,
    pub reason: String,
}

/// How a revenue schedule releases deferred revenue over time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "method", content = "milestones")]
pub enum RecognitionMethod {
    /// Day-prorated across the schedule's date range
    StraightLine,
    /// Discrete dated amounts
    Milestone(Vec<Milestone>),
}

/// A discrete recognition point within a milestone schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub date: NaiveDate,
    pub amount: Cents,
    pub description: Option<String>,
}

/// A plan to recognize `total_amount` into the revenue account out of the
/// deferred-revenue account over `[start_date, end_date]`. Created once,
/// read many times; recognition runs are idempotent per schedule + window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueSchedule {
    pub schedule_id: String,
    pub company_id: String,
    pub currency: String,
    pub total_amount: Cents,
    pub revenue_account_id: String,
    pub deferred_revenue_account_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub method: RecognitionMethod,
}

/// Structural corruption classes the reconciliation scan detects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationIssueKind {
    /// A posted transaction with zero lines: evidence of a non-atomic commit
    PartialWrite,
    /// Two transaction ids sharing one transaction number: broken idempotency
    DuplicateTransactionNumber,
    /// Posted lines that do not balance: validation was bypassed
    UnbalancedPosted,
}

impl fmt::Display for ReconciliationIssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReconciliationIssueKind::PartialWrite => "PARTIAL_WRITE",
            ReconciliationIssueKind::DuplicateTransactionNumber => "DUPLICATE_TRANSACTION_NUMBER",
            ReconciliationIssueKind::UnbalancedPosted => "UNBALANCED_POSTED",
        };
        write!(f, "{name}")
    }
}

/// One finding from a reconciliation scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationIssue {
    pub kind: ReconciliationIssueKind,
    pub transaction_id: String,
    pub transaction_number: String,
    pub detail: String,
}

/// Result of a clean or dirty reconciliation scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub company_id: String,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub scanned_transactions: usize,
    pub issues: Vec<ReconciliationIssue>,
}

/// Errors that can occur in the ledger system. One variant per failure kind
/// so callers can match exhaustively instead of comparing code strings.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("malformed amount {input:?}: {reason}")]
    MalformedAmount { input: String, reason: String },

    #[error("transaction {transaction_number} has no entry lines")]
    EmptyTransaction { transaction_number: String },

    #[error("entry {line_id} has non-positive amount {amount}")]
    NonPositiveAmount { line_id: String, amount: Cents },

    #[error(
        "entry {line_id} is scoped to company {found} but transaction {transaction_id} belongs to {expected}"
    )]
    TenantMismatch {
        transaction_id: String,
        line_id: String,
        expected: String,
        found: String,
    },

    #[error(
        "entry {line_id} is denominated in {found} but transaction {transaction_number} is in {expected}"
    )]
    CurrencyMismatch {
        transaction_number: String,
        line_id: String,
        expected: String,
        found: String,
    },

    #[error(
        "transaction {transaction_number} does not balance: debits {debits}, credits {credits}"
    )]
    UnbalancedTransaction {
        transaction_number: String,
        debits: Cents,
        credits: Cents,
    },

    #[error("account {account_id} would go negative ({resulting_balance}) and is not allowed to")]
    NegativeBalanceNotAllowed {
        account_id: String,
        resulting_balance: Cents,
    },

    #[error(
        "transaction number {transaction_number} was already posted as {existing_transaction_id} with different content"
    )]
    IdempotencyMismatch {
        transaction_number: String,
        existing_transaction_id: String,
    },

    #[error("period covering {date} for company {company_id} is {state}: {detail}")]
    PeriodLockViolation {
        company_id: String,
        date: NaiveDate,
        state: PeriodState,
        detail: String,
    },

    #[error("period not found: {period_id}")]
    PeriodNotFound { period_id: String },

    #[error("replay fingerprint mismatch: expected {expected}, rebuilt {actual}")]
    ReplayFingerprintMismatch { expected: String, actual: String },

    #[error("revenue schedule not found: {schedule_id}")]
    ScheduleNotFound { schedule_id: String },

    #[error("reconciliation found {} issue(s) in posted history", .issues.len())]
    ReconciliationFailure { issues: Vec<ReconciliationIssue> },

    #[error("account not found: {account_id}")]
    AccountNotFound { account_id: String },

    #[error("storage error: {0}")]
    Storage(String),
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_balance_sides() {
        assert_eq!(AccountType::Asset.normal_balance(), EntrySide::Debit);
        assert_eq!(AccountType::Expense.normal_balance(), EntrySide::Debit);
        assert_eq!(AccountType::Liability.normal_balance(), EntrySide::Credit);
        assert_eq!(AccountType::Equity.normal_balance(), EntrySide::Credit);
        assert_eq!(AccountType::Revenue.normal_balance(), EntrySide::Credit);
    }

    #[test]
    fn negative_balance_defaults_follow_the_type() {
        assert!(!AccountType::Asset.allows_negative_balance());
        assert!(!AccountType::Expense.allows_negative_balance());
        assert!(AccountType::Liability.allows_negative_balance());
        assert!(AccountType::Equity.allows_negative_balance());
        assert!(AccountType::Revenue.allows_negative_balance());
    }

    #[test]
    fn period_state_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&PeriodState::HardLocked).unwrap(),
            "\"HARD_LOCKED\""
        );
        assert_eq!(
            serde_json::from_str::<PeriodState>("\"SOFT_CLOSED\"").unwrap(),
            PeriodState::SoftClosed
        );
    }

    #[test]
    fn recognition_method_is_adjacently_tagged() {
        let straight = serde_json::to_value(RecognitionMethod::StraightLine).unwrap();
        assert_eq!(straight["method"], "STRAIGHT_LINE");

        let milestone = serde_json::to_value(RecognitionMethod::Milestone(vec![Milestone {
            date: NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
            amount: Cents::new(4000),
            description: None,
        }]))
        .unwrap();
        assert_eq!(milestone["method"], "MILESTONE");
        assert_eq!(milestone["milestones"][0]["amount"], 4000);
    }

    #[test]
    fn entry_side_wire_names_are_uppercase() {
        assert_eq!(serde_json::to_string(&EntrySide::Debit).unwrap(), "\"DEBIT\"");
        assert_eq!(EntrySide::Credit.to_string(), "CREDIT");
    }
}
