//! Pure invariant assertions over in-memory transactions
//!
//! Everything here is a function of its arguments alone: no I/O, no clock,
//! no randomness. Identical inputs must produce identical results, because
//! replayed validation has to agree exactly with the validation that ran
//! when history was first written.

use std::collections::{HashMap, HashSet};

use crate::money::Cents;
use crate::types::*;

/// Fails with `EmptyTransaction` when there are zero lines,
/// `NonPositiveAmount` when any line's amount is zero or negative, and
/// `UnbalancedTransaction` (carrying both sums) when debit and credit
/// totals differ in integer cents.
pub fn assert_balanced(transaction: &LedgerTransaction) -> LedgerResult<()> {
    if transaction.entries.is_empty() {
        return Err(LedgerError::EmptyTransaction {
            transaction_number: transaction.transaction_number.clone(),
        });
    }

    for entry in &transaction.entries {
        if !entry.amount.is_positive() {
            return Err(LedgerError::NonPositiveAmount {
                line_id: entry.line_id.clone(),
                amount: entry.amount,
            });
        }
    }

    let debits = transaction.total_debits();
    let credits = transaction.total_credits();
    if debits != credits {
        return Err(LedgerError::UnbalancedTransaction {
            transaction_number: transaction.transaction_number.clone(),
            debits,
            credits,
        });
    }

    Ok(())
}

/// Fails with `TenantMismatch` when any line's company or transaction id
/// disagrees with the parent transaction.
pub fn assert_tenant_isolation(transaction: &LedgerTransaction) -> LedgerResult<()> {
    for entry in &transaction.entries {
        if entry.company_id != transaction.company_id
            || entry.transaction_id != transaction.transaction_id
        {
            return Err(LedgerError::TenantMismatch {
                transaction_id: transaction.transaction_id.clone(),
                line_id: entry.line_id.clone(),
                expected: transaction.company_id.clone(),
                found: entry.company_id.clone(),
            });
        }
    }
    Ok(())
}

/// Fails with `CurrencyMismatch` when any line's currency differs from the
/// transaction's.
pub fn assert_currency_isolation(transaction: &LedgerTransaction) -> LedgerResult<()> {
    for entry in &transaction.entries {
        if entry.currency != transaction.currency {
            return Err(LedgerError::CurrencyMismatch {
                transaction_number: transaction.transaction_number.clone(),
                line_id: entry.line_id.clone(),
                expected: transaction.currency.clone(),
                found: entry.currency.clone(),
            });
        }
    }
    Ok(())
}

/// Per-account signed delta (debit minus credit cents) this transaction
/// would apply. Shared by negative-balance enforcement and replay.
pub fn signed_deltas(transaction: &LedgerTransaction) -> HashMap<String, Cents> {
    let mut deltas: HashMap<String, Cents> = HashMap::new();
    for entry in &transaction.entries {
        let slot = deltas.entry(entry.account_id.clone()).or_default();
        match entry.side {
            EntrySide::Debit => *slot += entry.amount,
            EntrySide::Credit => *slot -= entry.amount,
        }
    }
    deltas
}

/// Accounts for which at least one line carries the `allow_negative`
/// override.
pub fn negative_overrides(transaction: &LedgerTransaction) -> HashSet<String> {
    transaction
        .entries
        .iter()
        .filter(|e| e.allow_negative)
        .map(|e| e.account_id.clone())
        .collect()
}

/// Computes `prior + delta` per touched account and fails with
/// `NegativeBalanceNotAllowed` when the result is negative, in the
/// account's natural sign, for an account whose type, snapshot flag, and
/// line-level override all forbid it.
///
/// `prior_balances` and `deltas` are signed debit-minus-credit cents;
/// conversion to the natural sign happens here, per account type. Accounts
/// are checked in sorted order so the reported violation is deterministic.
pub fn assert_no_forbidden_negative_balances(
    prior_balances: &HashMap<String, Cents>,
    deltas: &HashMap<String, Cents>,
    accounts: &HashMap<String, AccountSnapshot>,
    overrides: &HashSet<String>,
) -> LedgerResult<()> {
    let mut touched: Vec<&String> = deltas.keys().collect();
    touched.sort();

    for account_id in touched {
        let snapshot = accounts
            .get(account_id)
            .ok_or_else(|| LedgerError::AccountNotFound {
                account_id: account_id.clone(),
            })?;

        let prior = prior_balances
            .get(account_id)
            .copied()
            .unwrap_or(Cents::ZERO);
        let resulting = prior + deltas[account_id];
        let natural = match snapshot.account_type.normal_balance() {
            EntrySide::Debit => resulting,
            EntrySide::Credit => -resulting,
        };

        if natural.is_negative() {
            let allowed = snapshot.account_type.allows_negative_balance()
                || snapshot.allow_negative_balance
                || overrides.contains(account_id);
            if !allowed {
                return Err(LedgerError::NegativeBalanceNotAllowed {
                    account_id: account_id.clone(),
                    resulting_balance: natural,
                });
            }
        }
    }

    Ok(())
}
