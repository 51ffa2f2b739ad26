//! Basic posting walkthrough: post, replay, lock a period, recognize
//! revenue, and rebuild statements

use std::sync::Arc;

use chrono::NaiveDate;
use ledger_core::utils::{seed, MemoryStore, RecordingAuditSink};
use ledger_core::{
    AccountingPeriod, AuditSink, Cents, Clock, IdGenerator, LedgerEngine,
    LedgerTransactionBuilder, NewRevenueSchedule, PeriodState, RandomIds, RecognitionMethod,
    RevenueRecognitionEngine, StatementEngine, SystemClock, TransactionType,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Ledger Core - basic posting walkthrough\n");

    let store = MemoryStore::new();
    let audit = RecordingAuditSink::default();
    seed::standard_accounts(&store, "acme");

    let shared = Arc::new(store.clone());
    let sink: Arc<dyn AuditSink> = Arc::new(audit.clone());
    let ids: Arc<dyn IdGenerator> = Arc::new(RandomIds);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

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

    // 1. Post an invoice that defers its revenue.
    let booking = LedgerTransactionBuilder::new(
        "acme",
        "INV-1001",
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        "USD",
    )
    .transaction_type(TransactionType::Invoice)
    .created_by("alice")
    .description("Annual subscription, billed up front")
    .debit("cash", Cents::parse("120.00")?)
    .credit("deferred_revenue", Cents::parse("120.00")?)
    .build()?;

    let receipt = ledger.post(booking.clone()).await?;
    println!("posted {} -> {}", receipt.transaction_number, receipt.status);

    // 2. Retry the same transaction: an idempotent replay, no second write.
    let retry = ledger.post(booking).await?;
    println!("reposted {} -> {}", retry.transaction_number, retry.status);

    // 3. Recognize January's slice of the subscription.
    let schedule = revenue
        .create_schedule(
            "alice",
            NewRevenueSchedule {
                company_id: "acme".to_string(),
                currency: "USD".to_string(),
                total_amount: Cents::parse("120.00")?,
                revenue_account_id: "revenue".to_string(),
                deferred_revenue_account_id: "deferred_revenue".to_string(),
                start_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
                method: RecognitionMethod::StraightLine,
            },
        )
        .await?;
    let run = revenue
        .recognize_window(
            "alice",
            &schedule.schedule_id,
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
        )
        .await?;
    println!(
        "recognition -> {} ({} transaction(s))",
        run.status,
        run.posted_transaction_numbers.len()
    );

    // 4. Close January and hard-lock it.
    store.put_period(AccountingPeriod {
        period_id: "acme-2026-01".to_string(),
        company_id: "acme".to_string(),
        start_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
        state: PeriodState::Open,
    });
    ledger
        .periods()
        .transition_period("cfo", "acme-2026-01", PeriodState::SoftClosed, "month end")
        .await?;
    ledger
        .periods()
        .transition_period("cfo", "acme-2026-01", PeriodState::HardLocked, "books filed")
        .await?;

    let late = LedgerTransactionBuilder::new(
        "acme",
        "INV-LATE",
        NaiveDate::from_ymd_opt(2026, 1, 20).unwrap(),
        "USD",
    )
    .debit("cash", Cents::parse("5.00")?)
    .credit("revenue", Cents::parse("5.00")?)
    .build()?;
    match ledger.post(late).await {
        Err(err) => println!("late posting rejected: {err}"),
        Ok(_) => unreachable!("hard lock must block the posting"),
    }

    // 5. Rebuild statements from posted history.
    let trial_balance = statements
        .build_trial_balance(
            "acme",
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
        )
        .await?;
    println!("\ntrial balance ({} rows)", trial_balance.rows.len());
    for row in &trial_balance.rows {
        println!(
            "  {:<20} opening {:>10} activity {:>10} closing {:>10}",
            row.account_id,
            row.opening.to_string(),
            row.activity().to_string(),
            row.closing.to_string()
        );
    }
    println!("integrity hash: {}", trial_balance.integrity_hash);

    let sheet = statements
        .generate_balance_sheet("acme", NaiveDate::from_ymd_opt(2026, 1, 31).unwrap())
        .await?;
    println!(
        "\nbalance sheet: assets {} = liabilities {} + equity {} (balanced: {})",
        sheet.total_assets, sheet.total_liabilities, sheet.total_equity, sheet.balanced
    );

    println!("\naudit trail: {} event(s)", audit.events().len());
    Ok(())
}
