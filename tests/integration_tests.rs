//! Integration tests for ledger-core

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use ledger_core::utils::{seed, MemoryStore, RecordingAuditSink};
use ledger_core::{
    patterns, AccountingPeriod, AuditOutcome, AuditSeverity, AuditSink, Cents, Clock, FixedClock,
    IdGenerator, LedgerEngine, LedgerError, LedgerStore, LedgerTransactionBuilder, Milestone,
    NewRevenueSchedule, PeriodState, PostStatus, RecognitionMethod, RecognitionStatus,
    ReconciliationEngine, ReconciliationIssueKind, RevenueRecognitionEngine, SequentialIds,
    StatementEngine, TransactionType,
};

struct Harness {
    store: MemoryStore,
    audit: RecordingAuditSink,
    ledger: Arc<LedgerEngine<MemoryStore>>,
    revenue: RevenueRecognitionEngine<MemoryStore>,
    statements: StatementEngine<MemoryStore>,
    reconciliation: ReconciliationEngine<MemoryStore>,
}

fn harness() -> Harness {
    let store = MemoryStore::new();
    let audit = RecordingAuditSink::default();
    let shared = Arc::new(store.clone());
    let sink: Arc<dyn AuditSink> = Arc::new(audit.clone());
    let ids: Arc<dyn IdGenerator> = Arc::new(SequentialIds::new("it"));
    let clock: Arc<dyn Clock> = Arc::new(FixedClock(NaiveDateTime::default()));

    let ledger = Arc::new(LedgerEngine::new(
        Arc::clone(&shared),
        Arc::clone(&sink),
        Arc::clone(&ids),
        Arc::clone(&clock),
    ));
    let revenue = RevenueRecognitionEngine::new(
        Arc::clone(&shared),
        Arc::clone(&ledger),
        Arc::clone(&sink),
        Arc::clone(&ids),
        Arc::clone(&clock),
    );
    let statements = StatementEngine::new(
        Arc::clone(&shared),
        Arc::clone(&sink),
        Arc::clone(&ids),
        Arc::clone(&clock),
    );
    let reconciliation = ReconciliationEngine::new(
        Arc::clone(&shared),
        Arc::clone(&sink),
        Arc::clone(&ids),
        Arc::clone(&clock),
    );

    seed::standard_accounts(&store, "acme");
    Harness {
        store,
        audit,
        ledger,
        revenue,
        statements,
        reconciliation,
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn january() -> AccountingPeriod {
    AccountingPeriod {
        period_id: "acme-2026-01".to_string(),
        company_id: "acme".to_string(),
        start_date: date(2026, 1, 1),
        end_date: date(2026, 1, 31),
        state: PeriodState::Open,
    }
}

fn ten_dollar_sale(amount: &str) -> ledger_core::LedgerTransaction {
    LedgerTransactionBuilder::new("acme", "T1", date(2026, 1, 10), "USD")
        .transaction_type(TransactionType::Invoice)
        .created_by("alice")
        .debit("cash", Cents::parse(amount).unwrap())
        .credit("revenue", Cents::parse(amount).unwrap())
        .build()
        .unwrap()
}

#[tokio::test]
async fn post_replay_and_idempotency_mismatch() {
    let h = harness();

    let first = h.ledger.post(ten_dollar_sale("10.00")).await.unwrap();
    assert_eq!(first.status, PostStatus::Posted);

    let replay = h.ledger.post(ten_dollar_sale("10.00")).await.unwrap();
    assert_eq!(replay.status, PostStatus::Replay);
    assert_eq!(replay.transaction_id, first.transaction_id);
    assert_eq!(h.store.transaction_count(), 1);

    let mismatch = h.ledger.post(ten_dollar_sale("11.00")).await;
    assert!(matches!(
        mismatch,
        Err(LedgerError::IdempotencyMismatch { .. })
    ));
    assert_eq!(h.store.transaction_count(), 1);
}

#[tokio::test]
async fn straight_line_schedule_recognizes_the_full_total() {
    let h = harness();

    // Fund deferred revenue so the schedule draws down a real balance.
    let booking = LedgerTransactionBuilder::new("acme", "INV-1", date(2026, 1, 1), "USD")
        .transaction_type(TransactionType::Invoice)
        .created_by("alice")
        .debit("cash", Cents::parse("120.00").unwrap())
        .credit("deferred_revenue", Cents::parse("120.00").unwrap())
        .build()
        .unwrap();
    h.ledger.post(booking).await.unwrap();

    let schedule = h
        .revenue
        .create_schedule(
            "alice",
            NewRevenueSchedule {
                company_id: "acme".to_string(),
                currency: "USD".to_string(),
                total_amount: Cents::parse("120.00").unwrap(),
                revenue_account_id: "revenue".to_string(),
                deferred_revenue_account_id: "deferred_revenue".to_string(),
                start_date: date(2026, 1, 1),
                end_date: date(2026, 1, 31),
                method: RecognitionMethod::StraightLine,
            },
        )
        .await
        .unwrap();

    let run = h
        .revenue
        .recognize_window("alice", &schedule.schedule_id, date(2026, 1, 1), date(2026, 1, 31))
        .await
        .unwrap();
    assert_eq!(run.status, RecognitionStatus::Posted);
    assert_eq!(run.posted_transaction_numbers.len(), 1);

    // The whole 120.00 moved from deferred revenue into revenue.
    let statement = h
        .statements
        .generate_income_statement("acme", date(2026, 1, 1), date(2026, 1, 31))
        .await
        .unwrap();
    assert_eq!(statement.total_revenue, Cents::parse("120.00").unwrap());
    assert!(statement.net_income.is_positive());

    // Re-running the same window replays the same transaction number.
    let rerun = h
        .revenue
        .recognize_window("alice", &schedule.schedule_id, date(2026, 1, 1), date(2026, 1, 31))
        .await
        .unwrap();
    assert_eq!(rerun.status, RecognitionStatus::Posted);
    assert_eq!(
        rerun.posted_transaction_numbers,
        run.posted_transaction_numbers
    );
    assert_eq!(h.store.transaction_count(), 2);
}

#[tokio::test]
async fn milestone_schedule_posts_one_transaction_per_milestone() {
    let h = harness();

    let schedule = h
        .revenue
        .create_schedule(
            "alice",
            NewRevenueSchedule {
                company_id: "acme".to_string(),
                currency: "USD".to_string(),
                total_amount: Cents::parse("100.00").unwrap(),
                revenue_account_id: "revenue".to_string(),
                deferred_revenue_account_id: "deferred_revenue".to_string(),
                start_date: date(2026, 1, 1),
                end_date: date(2026, 3, 31),
                method: RecognitionMethod::Milestone(vec![
                    Milestone {
                        date: date(2026, 1, 10),
                        amount: Cents::parse("40.00").unwrap(),
                        description: Some("kickoff".to_string()),
                    },
                    Milestone {
                        date: date(2026, 2, 10),
                        amount: Cents::parse("60.00").unwrap(),
                        description: Some("delivery".to_string()),
                    },
                ]),
            },
        )
        .await
        .unwrap();

    let run = h
        .revenue
        .recognize_window("alice", &schedule.schedule_id, date(2026, 1, 1), date(2026, 1, 31))
        .await
        .unwrap();
    assert_eq!(run.posted_transaction_numbers.len(), 1);

    let rest = h
        .revenue
        .recognize_window("alice", &schedule.schedule_id, date(2026, 2, 1), date(2026, 2, 28))
        .await
        .unwrap();
    assert_eq!(rest.posted_transaction_numbers.len(), 1);
    assert_ne!(
        run.posted_transaction_numbers,
        rest.posted_transaction_numbers
    );
}

#[tokio::test]
async fn empty_window_skips_and_audits_low() {
    let h = harness();

    let schedule = h
        .revenue
        .create_schedule(
            "alice",
            NewRevenueSchedule {
                company_id: "acme".to_string(),
                currency: "USD".to_string(),
                total_amount: Cents::parse("120.00").unwrap(),
                revenue_account_id: "revenue".to_string(),
                deferred_revenue_account_id: "deferred_revenue".to_string(),
                start_date: date(2026, 1, 1),
                end_date: date(2026, 1, 31),
                method: RecognitionMethod::StraightLine,
            },
        )
        .await
        .unwrap();

    let run = h
        .revenue
        .recognize_window("alice", &schedule.schedule_id, date(2026, 6, 1), date(2026, 6, 30))
        .await
        .unwrap();
    assert_eq!(run.status, RecognitionStatus::Skipped);
    assert!(run.posted_transaction_numbers.is_empty());
    assert_eq!(h.store.transaction_count(), 0);

    let event = h.audit.last().unwrap();
    assert_eq!(event.outcome, AuditOutcome::Allowed);
    assert_eq!(event.severity, AuditSeverity::Low);
    assert_eq!(event.metadata["status"], "SKIPPED");
}

#[tokio::test]
async fn recognizing_into_a_hard_locked_period_posts_nothing() {
    let h = harness();
    h.store.put_period(january());
    h.ledger
        .periods()
        .transition_period("cfo", "acme-2026-01", PeriodState::SoftClosed, "close")
        .await
        .unwrap();
    h.ledger
        .periods()
        .transition_period("cfo", "acme-2026-01", PeriodState::HardLocked, "filed")
        .await
        .unwrap();

    let schedule = h
        .revenue
        .create_schedule(
            "alice",
            NewRevenueSchedule {
                company_id: "acme".to_string(),
                currency: "USD".to_string(),
                total_amount: Cents::parse("120.00").unwrap(),
                revenue_account_id: "revenue".to_string(),
                deferred_revenue_account_id: "deferred_revenue".to_string(),
                start_date: date(2026, 1, 1),
                end_date: date(2026, 1, 31),
                method: RecognitionMethod::StraightLine,
            },
        )
        .await
        .unwrap();

    let result = h
        .revenue
        .recognize_window("alice", &schedule.schedule_id, date(2026, 1, 1), date(2026, 1, 31))
        .await;
    assert!(matches!(result, Err(LedgerError::PeriodLockViolation { .. })));
    assert_eq!(h.store.transaction_count(), 0);
}

#[tokio::test]
async fn hard_locked_periods_reject_posts_and_transitions() {
    let h = harness();
    h.store.put_period(january());
    h.ledger
        .periods()
        .transition_period("cfo", "acme-2026-01", PeriodState::SoftClosed, "close")
        .await
        .unwrap();
    h.ledger
        .periods()
        .transition_period("cfo", "acme-2026-01", PeriodState::HardLocked, "filed")
        .await
        .unwrap();

    assert!(matches!(
        h.ledger.post(ten_dollar_sale("10.00")).await,
        Err(LedgerError::PeriodLockViolation { .. })
    ));

    for next in [
        PeriodState::Open,
        PeriodState::SoftClosed,
        PeriodState::HardLocked,
    ] {
        assert!(matches!(
            h.ledger
                .periods()
                .transition_period("cfo", "acme-2026-01", next, "tamper")
                .await,
            Err(LedgerError::PeriodLockViolation { .. })
        ));
    }

    // February is a different period and still accepts postings.
    let feb = LedgerTransactionBuilder::new("acme", "T-FEB", date(2026, 2, 1), "USD")
        .debit("cash", Cents::parse("10.00").unwrap())
        .credit("revenue", Cents::parse("10.00").unwrap())
        .build()
        .unwrap();
    assert_eq!(h.ledger.post(feb).await.unwrap().status, PostStatus::Posted);
}

#[tokio::test]
async fn reopened_period_accepts_postings_again() {
    let h = harness();
    h.store.put_period(january());
    h.ledger
        .periods()
        .transition_period("cfo", "acme-2026-01", PeriodState::SoftClosed, "close")
        .await
        .unwrap();
    h.ledger
        .periods()
        .transition_period("cfo", "acme-2026-01", PeriodState::Open, "late invoice")
        .await
        .unwrap();

    let receipt = h.ledger.post(ten_dollar_sale("10.00")).await.unwrap();
    assert_eq!(receipt.status, PostStatus::Posted);
}

#[tokio::test]
async fn trial_balance_hash_is_stable_across_rebuilds() {
    let h = harness();
    h.ledger.post(ten_dollar_sale("10.00")).await.unwrap();
    let spend = LedgerTransactionBuilder::new("acme", "T2", date(2026, 1, 12), "USD")
        .debit("office_supplies", Cents::parse("3.00").unwrap())
        .credit("cash", Cents::parse("3.00").unwrap())
        .build()
        .unwrap();
    h.ledger.post(spend).await.unwrap();

    let first = h
        .statements
        .build_trial_balance("acme", date(2026, 1, 1), date(2026, 1, 31))
        .await
        .unwrap();
    let second = h
        .statements
        .build_trial_balance("acme", date(2026, 1, 1), date(2026, 1, 31))
        .await
        .unwrap();

    assert_eq!(first.integrity_hash, second.integrity_hash);
    assert_eq!(first.total_debits, first.total_credits);
    h.statements
        .verify_replay("acme", date(2026, 1, 1), date(2026, 1, 31), &first.integrity_hash)
        .await
        .unwrap();
}

#[tokio::test]
async fn balance_sheet_balances_for_engine_validated_history() {
    let h = harness();
    h.ledger.post(ten_dollar_sale("10.00")).await.unwrap();

    let investment = patterns::two_line(
        "acme",
        "T-EQ",
        date(2026, 1, 2),
        "USD",
        "cash",
        "owners_equity",
        Cents::parse("500.00").unwrap(),
        TransactionType::Payment,
    )
    .unwrap();
    h.ledger.post(investment).await.unwrap();

    let spend = LedgerTransactionBuilder::new("acme", "T3", date(2026, 1, 20), "USD")
        .debit("office_supplies", Cents::parse("42.50").unwrap())
        .credit("cash", Cents::parse("42.50").unwrap())
        .build()
        .unwrap();
    h.ledger.post(spend).await.unwrap();

    let sheet = h
        .statements
        .generate_balance_sheet("acme", date(2026, 1, 31))
        .await
        .unwrap();
    assert!(sheet.balanced);
    assert_eq!(
        sheet.total_assets,
        sheet.total_liabilities + sheet.total_equity
    );
    // Only the injected net-income line is synthetic.
    assert!(sheet.assets.iter().all(|l| !l.synthetic));
    assert!(sheet.liabilities.iter().all(|l| !l.synthetic));
    assert_eq!(sheet.equity.iter().filter(|l| l.synthetic).count(), 1);
}

#[tokio::test]
async fn reversal_restores_prior_balances() {
    let h = harness();
    let original = ten_dollar_sale("10.00");
    h.ledger.post(original.clone()).await.unwrap();

    let reversal = patterns::reversal_of(&original, "T1-R", date(2026, 1, 20)).unwrap();
    h.ledger.post(reversal).await.unwrap();

    let tb = h
        .statements
        .build_trial_balance("acme", date(2026, 1, 1), date(2026, 1, 31))
        .await
        .unwrap();
    for row in &tb.rows {
        assert!(row.closing.is_zero(), "{} should net to zero", row.account_id);
    }
}

#[tokio::test]
async fn reconciliation_reports_a_seeded_partial_write() {
    let h = harness();
    h.ledger.post(ten_dollar_sale("10.00")).await.unwrap();

    // Inject a torn write behind the engine's back.
    let mut torn = LedgerTransactionBuilder::new("acme", "T-TORN", date(2026, 1, 11), "USD")
        .debit("cash", Cents::parse("1.00").unwrap())
        .credit("revenue", Cents::parse("1.00").unwrap())
        .build()
        .unwrap();
    torn.entries.clear();
    h.store.commit_append_only(&torn).await.unwrap();

    match h
        .reconciliation
        .reconcile_period("auditor", "acme", None, None)
        .await
    {
        Err(LedgerError::ReconciliationFailure { issues }) => {
            assert_eq!(issues.len(), 1);
            assert_eq!(issues[0].kind, ReconciliationIssueKind::PartialWrite);
        }
        other => panic!("expected ReconciliationFailure, got {other:?}"),
    }

    let event = h.audit.last().unwrap();
    assert_eq!(event.outcome, AuditOutcome::Denied);
    assert_eq!(event.severity, AuditSeverity::High);
}

#[tokio::test]
async fn clean_history_reconciles_without_issues() {
    let h = harness();
    h.ledger.post(ten_dollar_sale("10.00")).await.unwrap();

    let report = h
        .reconciliation
        .reconcile_period("auditor", "acme", None, None)
        .await
        .unwrap();
    assert_eq!(report.scanned_transactions, 1);
    assert!(report.issues.is_empty());
}

#[tokio::test]
async fn unknown_schedule_is_audited_and_rejected() {
    let h = harness();

    let result = h
        .revenue
        .recognize_window("alice", "missing", date(2026, 1, 1), date(2026, 1, 31))
        .await;
    assert!(matches!(result, Err(LedgerError::ScheduleNotFound { .. })));

    let event = h.audit.last().unwrap();
    assert_eq!(event.outcome, AuditOutcome::Denied);
    assert_eq!(event.severity, AuditSeverity::High);
}

#[tokio::test]
async fn cross_tenant_lines_never_commit() {
    let h = harness();
    let mut txn = ten_dollar_sale("10.00");
    txn.entries[0].company_id = "intruder".to_string();

    assert!(matches!(
        h.ledger.post(txn).await,
        Err(LedgerError::TenantMismatch { .. })
    ));
    assert_eq!(h.store.transaction_count(), 0);
}
