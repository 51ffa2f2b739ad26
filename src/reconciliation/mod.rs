//! Reconciliation scan over posted history
//!
//! Diagnostic, not preventive: the posting engine should make these
//! findings impossible, so anything surfaced here is evidence that an
//! invariant was bypassed on the way into storage - a partial write, a
//! duplicated transaction number, or an unbalanced committed transaction.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::traits::*;
use crate::types::*;

/// Scans posted transactions for structural corruption.
pub struct ReconciliationEngine<S> {
    store: Arc<S>,
    audit: Arc<dyn AuditSink>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl<S: LedgerStore> ReconciliationEngine<S> {
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

    /// Scan a company's posted history, optionally bounded by dates.
    ///
    /// A clean scan returns a report with an empty issue list. Any finding
    /// raises [`LedgerError::ReconciliationFailure`] carrying the full
    /// list, after one high-severity audit event.
    pub async fn reconcile_period(
        &self,
        actor_id: &str,
        company_id: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> LedgerResult<ReconciliationReport> {
        let transactions = self
            .store
            .list_posted_transactions(company_id, from, to)
            .await?;

        let mut issues = Vec::new();
        let mut first_id_by_number: HashMap<&str, &str> = HashMap::new();

        for transaction in &transactions {
            if transaction.entries.is_empty() {
                issues.push(ReconciliationIssue {
                    kind: ReconciliationIssueKind::PartialWrite,
                    transaction_id: transaction.transaction_id.clone(),
                    transaction_number: transaction.transaction_number.clone(),
                    detail: "posted transaction has zero lines".to_string(),
                });
            } else if !transaction.is_balanced() {
                issues.push(ReconciliationIssue {
                    kind: ReconciliationIssueKind::UnbalancedPosted,
                    transaction_id: transaction.transaction_id.clone(),
                    transaction_number: transaction.transaction_number.clone(),
                    detail: format!(
                        "debits {} do not equal credits {}",
                        transaction.total_debits(),
                        transaction.total_credits()
                    ),
                });
            }

            match first_id_by_number
                .get(transaction.transaction_number.as_str())
                .copied()
            {
                None => {
                    first_id_by_number.insert(
                        transaction.transaction_number.as_str(),
                        transaction.transaction_id.as_str(),
                    );
                }
                Some(first_id) if first_id != transaction.transaction_id => {
                    issues.push(ReconciliationIssue {
                        kind: ReconciliationIssueKind::DuplicateTransactionNumber,
                        transaction_id: transaction.transaction_id.clone(),
                        transaction_number: transaction.transaction_number.clone(),
                        detail: format!("number is also posted as {first_id}"),
                    });
                }
                Some(_) => {}
            }
        }

        let report = ReconciliationReport {
            company_id: company_id.to_string(),
            from,
            to,
            scanned_transactions: transactions.len(),
            issues: issues.clone(),
        };

        self.emit_audit(actor_id, company_id, from, to, &report);

        if issues.is_empty() {
            Ok(report)
        } else {
            Err(LedgerError::ReconciliationFailure { issues })
        }
    }

    fn emit_audit(
        &self,
        actor_id: &str,
        company_id: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        report: &ReconciliationReport,
    ) {
        let clean = report.issues.is_empty();
        let mut metadata = HashMap::from([
            (
                "scanned".to_string(),
                report.scanned_transactions.to_string(),
            ),
            ("issue_count".to_string(), report.issues.len().to_string()),
        ]);
        if let Some(from) = from {
            metadata.insert("from".to_string(), from.to_string());
        }
        if let Some(to) = to {
            metadata.insert("to".to_string(), to.to_string());
        }
        if !clean {
            let kinds: Vec<String> = report.issues.iter().map(|i| i.kind.to_string()).collect();
            metadata.insert("issue_kinds".to_string(), kinds.join(","));
        }

        self.audit.log_security_event(SecurityEvent {
            tenant_id: company_id.to_string(),
            actor_id: actor_id.to_string(),
            action: "ledger.reconcile".to_string(),
            resource_type: "ledger_history".to_string(),
            resource_id: company_id.to_string(),
            outcome: if clean {
                AuditOutcome::Allowed
            } else {
                AuditOutcome::Denied
            },
            correlation_id: self.ids.correlation_id(),
            severity: if clean {
                AuditSeverity::Low
            } else {
                AuditSeverity::High
            },
            occurred_at: self.clock.now(),
            metadata,
        });
    }
}
