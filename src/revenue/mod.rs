//! Revenue recognition engine
//!
//! Converts previously deferred revenue into recognized revenue per a
//! schedule, by deriving recognition events for a date window and posting
//! each one as a balanced two-line transaction through the ledger engine.
//! Transaction numbers are derived from `(schedule, date, amount)`, so a
//! re-run of the same window replays instead of double-posting.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ledger::{LedgerEngine, LedgerTransactionBuilder};
use crate::money::Cents;
use crate::traits::*;
use crate::types::*;

/// Input for creating a schedule; the engine assigns the schedule id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRevenueSchedule {
    pub company_id: String,
    pub currency: String,
    pub total_amount: Cents,
    pub revenue_account_id: String,
    pub deferred_revenue_account_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub method: RecognitionMethod,
}

/// How a recognition run concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecognitionStatus {
    /// At least one recognition transaction went through the ledger
    Posted,
    /// The window produced no recognizable amount; nothing was written
    Skipped,
}

impl fmt::Display for RecognitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecognitionStatus::Posted => write!(f, "POSTED"),
            RecognitionStatus::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// Result of [`RevenueRecognitionEngine::recognize_window`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionRun {
    pub status: RecognitionStatus,
    pub posted_transaction_numbers: Vec<String>,
}

/// One derived recognition point: this much revenue becomes recognizable on
/// this date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RecognitionEvent {
    date: NaiveDate,
    amount: Cents,
}

/// Inclusive day count of a date range.
fn days_inclusive(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days() + 1
}

/// Compute the recognition events for a schedule over `[from, to]`.
///
/// STRAIGHT_LINE clamps the window to the schedule's range and prorates the
/// total by inclusive day count, flooring to whole cents, as one event
/// dated at the clamped window's end. MILESTONE selects the milestones
/// falling inside the requested window, sorted by date.
fn recognition_events(
    schedule: &RevenueSchedule,
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<RecognitionEvent> {
    match &schedule.method {
        RecognitionMethod::StraightLine => {
            let clamped_from = from.max(schedule.start_date);
            let clamped_to = to.min(schedule.end_date);
            if clamped_from > clamped_to {
                return Vec::new();
            }

            let total_days = days_inclusive(schedule.start_date, schedule.end_date);
            let window_days = days_inclusive(clamped_from, clamped_to);
            let recognized = (schedule.total_amount.value() as i128 * window_days as i128
                / total_days as i128) as i64;
            if recognized <= 0 {
                // A sliver of a window can floor to zero cents; a zero
                // posting would violate the positive-amount invariant.
                return Vec::new();
            }
            vec![RecognitionEvent {
                date: clamped_to,
                amount: Cents::new(recognized),
            }]
        }
        RecognitionMethod::Milestone(milestones) => {
            let mut hits: Vec<RecognitionEvent> = milestones
                .iter()
                .filter(|m| m.date >= from && m.date <= to && m.amount.is_positive())
                .map(|m| RecognitionEvent {
                    date: m.date,
                    amount: m.amount,
                })
                .collect();
            hits.sort_by_key(|event| event.date);
            hits
        }
    }
}

/// Deterministic transaction number for one recognition event, doubling as
/// its idempotency key.
fn recognition_number(schedule_id: &str, event: &RecognitionEvent) -> String {
    format!(
        "revrec-{}-{}-{}",
        schedule_id,
        event.date.format("%Y%m%d"),
        event.amount.value()
    )
}

/// Schedules and posts revenue recognition through the ledger engine.
pub struct RevenueRecognitionEngine<S> {
    store: Arc<S>,
    ledger: Arc<LedgerEngine<S>>,
    audit: Arc<dyn AuditSink>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl<S: LedgerStore + PeriodStore + ScheduleStore> RevenueRecognitionEngine<S> {
    pub fn new(
        store: Arc<S>,
        ledger: Arc<LedgerEngine<S>>,
        audit: Arc<dyn AuditSink>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            ledger,
            audit,
            ids,
            clock,
        }
    }

    /// Persist a new schedule and audit its creation.
    pub async fn create_schedule(
        &self,
        actor_id: &str,
        input: NewRevenueSchedule,
    ) -> LedgerResult<RevenueSchedule> {
        let schedule = RevenueSchedule {
            schedule_id: self.ids.schedule_id(),
            company_id: input.company_id,
            currency: input.currency,
            total_amount: input.total_amount,
            revenue_account_id: input.revenue_account_id,
            deferred_revenue_account_id: input.deferred_revenue_account_id,
            start_date: input.start_date,
            end_date: input.end_date,
            method: input.method,
        };

        let correlation_id = self.ids.correlation_id();
        let result = self.store.save_schedule(&schedule).await;
        self.emit_audit(
            actor_id,
            &schedule.company_id,
            "revenue.schedule.create",
            "revenue_schedule",
            &schedule.schedule_id,
            &correlation_id,
            HashMap::from([
                ("total_amount".to_string(), schedule.total_amount.to_string()),
                ("start_date".to_string(), schedule.start_date.to_string()),
                ("end_date".to_string(), schedule.end_date.to_string()),
            ]),
            if result.is_ok() {
                AuditSeverity::Low
            } else {
                AuditSeverity::High
            },
            result.as_ref().err(),
        );
        result?;
        Ok(schedule)
    }

    /// Recognize the revenue attributable to `[from, to]`.
    ///
    /// A window yielding no recognizable amount is a normal outcome: the
    /// run reports `Skipped` and audits at low severity. Any failure is
    /// audited with the triggering error and re-raised; partial success is
    /// never swallowed - numbers already posted stay posted and will
    /// replay on retry.
    pub async fn recognize_window(
        &self,
        actor_id: &str,
        schedule_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> LedgerResult<RecognitionRun> {
        let correlation_id = self.ids.correlation_id();

        let schedule = match self.store.get_schedule(schedule_id).await? {
            Some(schedule) => schedule,
            None => {
                let err = LedgerError::ScheduleNotFound {
                    schedule_id: schedule_id.to_string(),
                };
                self.emit_audit(
                    actor_id,
                    "unknown",
                    "revenue.recognize",
                    "revenue_schedule",
                    schedule_id,
                    &correlation_id,
                    HashMap::from([("error".to_string(), err.to_string())]),
                    AuditSeverity::High,
                    Some(&err),
                );
                return Err(err);
            }
        };

        let result = self.recognize_checked(actor_id, &schedule, from, to).await;

        let mut metadata = HashMap::from([
            ("from".to_string(), from.to_string()),
            ("to".to_string(), to.to_string()),
        ]);
        let severity = match &result {
            Ok(run) => {
                metadata.insert("status".to_string(), run.status.to_string());
                metadata.insert(
                    "posted_count".to_string(),
                    run.posted_transaction_numbers.len().to_string(),
                );
                AuditSeverity::Low
            }
            Err(error) => {
                metadata.insert("error".to_string(), error.to_string());
                AuditSeverity::High
            }
        };
        self.emit_audit(
            actor_id,
            &schedule.company_id,
            "revenue.recognize",
            "revenue_schedule",
            schedule_id,
            &correlation_id,
            metadata,
            severity,
            result.as_ref().err(),
        );
        result
    }

    async fn recognize_checked(
        &self,
        actor_id: &str,
        schedule: &RevenueSchedule,
        from: NaiveDate,
        to: NaiveDate,
    ) -> LedgerResult<RecognitionRun> {
        // Courtesy fail-fast; the authoritative check runs inside each post.
        self.ledger
            .periods()
            .assert_can_post(&schedule.company_id, to)
            .await?;

        let events = recognition_events(schedule, from, to);
        if events.is_empty() {
            tracing::debug!(
                schedule = %schedule.schedule_id,
                %from,
                %to,
                "window yields nothing to recognize"
            );
            return Ok(RecognitionRun {
                status: RecognitionStatus::Skipped,
                posted_transaction_numbers: Vec::new(),
            });
        }

        let mut numbers = Vec::with_capacity(events.len());
        for event in events {
            let number = recognition_number(&schedule.schedule_id, &event);
            let transaction = LedgerTransactionBuilder::new(
                &schedule.company_id,
                &number,
                event.date,
                &schedule.currency,
            )
            .transaction_type(TransactionType::RevenueRecognition)
            .reference(schedule.schedule_id.clone())
            .description(format!(
                "revenue recognition for schedule {}",
                schedule.schedule_id
            ))
            .idempotency_key(number.clone())
            .created_by(actor_id)
            // The deferred leg draws a liability-like account down, and the
            // revenue leg may swing negative on reversal.
            .entry(
                &schedule.deferred_revenue_account_id,
                EntrySide::Debit,
                event.amount,
                true,
                None,
            )
            .entry(
                &schedule.revenue_account_id,
                EntrySide::Credit,
                event.amount,
                true,
                None,
            )
            .build()?;

            let receipt = self.ledger.post(transaction).await?;
            numbers.push(receipt.transaction_number);
        }

        Ok(RecognitionRun {
            status: RecognitionStatus::Posted,
            posted_transaction_numbers: numbers,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_audit(
        &self,
        actor_id: &str,
        tenant_id: &str,
        action: &str,
        resource_type: &str,
        resource_id: &str,
        correlation_id: &str,
        metadata: HashMap<String, String>,
        severity: AuditSeverity,
        error: Option<&LedgerError>,
    ) {
        self.audit.log_security_event(SecurityEvent {
            tenant_id: tenant_id.to_string(),
            actor_id: actor_id.to_string(),
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            outcome: if error.is_none() {
                AuditOutcome::Allowed
            } else {
                AuditOutcome::Denied
            },
            correlation_id: correlation_id.to_string(),
            severity,
            occurred_at: self.clock.now(),
            metadata,
        });
    }
}
