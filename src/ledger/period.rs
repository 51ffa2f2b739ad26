//! Period lock state machine
//!
//! Each (company, date) resolves to the state of the accounting period
//! covering it: `OPEN` until a lock action says otherwise, `SOFT_CLOSED` as
//! a reopenable warning boundary, `HARD_LOCKED` as the terminal,
//! irreversible cutoff. Posting is only blocked by `HARD_LOCKED`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::traits::*;
use crate::types::*;

/// Manages lock-state resolution and transitions over a [`PeriodStore`].
///
/// Holds no state of its own; race-safety comes from the store's
/// compare-and-swap on [`PeriodStore::record_lock_action`].
pub struct PeriodLockManager<S> {
    store: Arc<S>,
    audit: Arc<dyn AuditSink>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl<S: PeriodStore> PeriodLockManager<S> {
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

    /// Resolved lock state for the period covering `date`; `Open` when no
    /// period or lock record exists.
    pub async fn resolve_state(&self, company_id: &str, date: NaiveDate) -> LedgerResult<PeriodState> {
        Ok(self.store.resolve_period(company_id, date).await?.state)
    }

    /// Fails with `PeriodLockViolation` iff the resolved state is
    /// `HardLocked`. `SoftClosed` does not block posting; it is a warning
    /// boundary enforced elsewhere.
    pub async fn assert_can_post(&self, company_id: &str, date: NaiveDate) -> LedgerResult<()> {
        let resolved = self.store.resolve_period(company_id, date).await?;
        if resolved.state == PeriodState::HardLocked {
            return Err(LedgerError::PeriodLockViolation {
                company_id: company_id.to_string(),
                date,
                state: resolved.state,
                detail: "cannot post into a hard-locked period".to_string(),
            });
        }
        Ok(())
    }

    /// Move a period to `next`, recording the lock action and emitting one
    /// audit event for the attempt.
    ///
    /// Denied when the period is already `HardLocked` (terminal, even for a
    /// repeated hard lock), when `Open` is requested from any state other
    /// than `SoftClosed`, or when the requested state equals the current
    /// one. A concurrent transition that changes the state first wins; the
    /// loser is denied by the store's compare-and-swap.
    pub async fn transition_period(
        &self,
        actor_id: &str,
        period_id: &str,
        next: PeriodState,
        reason: &str,
    ) -> LedgerResult<()> {
        let correlation_id = self.ids.correlation_id();

        let period = match self.store.get_period(period_id).await? {
            Some(period) => period,
            None => {
                let err = LedgerError::PeriodNotFound {
                    period_id: period_id.to_string(),
                };
                self.emit_transition_audit(
                    actor_id,
                    "unknown",
                    period_id,
                    None,
                    next,
                    reason,
                    &correlation_id,
                    Some(&err),
                );
                return Err(err);
            }
        };

        let result = self.transition_checked(&period, next, reason).await;
        self.emit_transition_audit(
            actor_id,
            &period.company_id,
            period_id,
            Some(period.state),
            next,
            reason,
            &correlation_id,
            result.as_ref().err(),
        );
        result
    }

    async fn transition_checked(
        &self,
        period: &AccountingPeriod,
        next: PeriodState,
        reason: &str,
    ) -> LedgerResult<()> {
        let current = period.state;
        let violation = |detail: String| LedgerError::PeriodLockViolation {
            company_id: period.company_id.clone(),
            date: period.start_date,
            state: current,
            detail,
        };

        if current == PeriodState::HardLocked {
            return Err(violation(
                "hard-locked periods are immutable; no transition is permitted".to_string(),
            ));
        }
        if next == PeriodState::Open && current != PeriodState::SoftClosed {
            return Err(violation(
                "only a soft-closed period may be reopened".to_string(),
            ));
        }
        if next == current {
            return Err(violation(format!("period is already {current}")));
        }

        let action = PeriodLockAction {
            action_id: self.ids.action_id(),
            period_id: period.period_id.clone(),
            from: current,
            to: next,
            reason: reason.to_string(),
        };
        self.store
            .record_lock_action(&period.period_id, current, action)
            .await?;

        tracing::debug!(
            period = %period.period_id,
            company = %period.company_id,
            %current,
            %next,
            "period transitioned"
        );
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_transition_audit(
        &self,
        actor_id: &str,
        tenant_id: &str,
        period_id: &str,
        from: Option<PeriodState>,
        to: PeriodState,
        reason: &str,
        correlation_id: &str,
        error: Option<&LedgerError>,
    ) {
        let mut metadata = HashMap::from([
            ("to".to_string(), to.to_string()),
            ("reason".to_string(), reason.to_string()),
        ]);
        if let Some(from) = from {
            metadata.insert("from".to_string(), from.to_string());
        }
        if let Some(error) = error {
            metadata.insert("error".to_string(), error.to_string());
        }

        self.audit.log_security_event(SecurityEvent {
            tenant_id: tenant_id.to_string(),
            actor_id: actor_id.to_string(),
            action: "period.transition".to_string(),
            resource_type: "accounting_period".to_string(),
            resource_id: period_id.to_string(),
            outcome: if error.is_none() {
                AuditOutcome::Allowed
            } else {
                AuditOutcome::Denied
            },
            correlation_id: correlation_id.to_string(),
            severity: if error.is_none() {
                AuditSeverity::Medium
            } else {
                AuditSeverity::High
            },
            occurred_at: self.clock.now(),
            metadata,
        });
    }
}
