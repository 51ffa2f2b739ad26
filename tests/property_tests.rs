//! Property-based tests for the invariant and replay logic

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use ledger_core::ledger::invariants;
use ledger_core::utils::{seed, MemoryStore, RecordingAuditSink};
use ledger_core::{
    AuditSink, Cents, Clock, EntrySide, IdGenerator, LedgerEngine, LedgerStore,
    LedgerTransaction, LedgerTransactionBuilder, SequentialIds, StatementEngine, FixedClock,
};
use proptest::prelude::*;

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, day).unwrap()
}

/// Generate a positive amount between one cent and 10,000.00.
fn arb_amount() -> impl Strategy<Value = Cents> {
    (1i64..1_000_000i64).prop_map(Cents::new)
}

/// Generate a day within January 2026.
fn arb_day() -> impl Strategy<Value = u32> {
    1u32..=31u32
}

/// The two posting shapes that are always valid against the standard chart:
/// a cash sale and a deferred-revenue draw-down (which may go negative).
#[derive(Debug, Clone)]
enum Shape {
    CashSale,
    Recognition,
}

fn arb_shape() -> impl Strategy<Value = Shape> {
    prop_oneof![Just(Shape::CashSale), Just(Shape::Recognition)]
}

fn build_transaction(index: usize, shape: &Shape, day: u32, amount: Cents) -> LedgerTransaction {
    let number = format!("P-{index}");
    match shape {
        Shape::CashSale => LedgerTransactionBuilder::new("acme", number, date(day), "USD")
            .debit("cash", amount)
            .credit("revenue", amount)
            .build()
            .unwrap(),
        Shape::Recognition => LedgerTransactionBuilder::new("acme", number, date(day), "USD")
            .entry("deferred_revenue", EntrySide::Debit, amount, true, None)
            .entry("revenue", EntrySide::Credit, amount, true, None)
            .build()
            .unwrap(),
    }
}

fn arb_history() -> impl Strategy<Value = Vec<LedgerTransaction>> {
    prop::collection::vec((arb_shape(), arb_day(), arb_amount()), 1..20).prop_map(|cases| {
        cases
            .into_iter()
            .enumerate()
            .map(|(index, (shape, day, amount))| build_transaction(index, &shape, day, amount))
            .collect()
    })
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("tokio runtime")
}

fn engines(store: &MemoryStore) -> (LedgerEngine<MemoryStore>, StatementEngine<MemoryStore>) {
    let shared = Arc::new(store.clone());
    let sink: Arc<dyn AuditSink> = Arc::new(RecordingAuditSink::default());
    let ids: Arc<dyn IdGenerator> = Arc::new(SequentialIds::new("prop"));
    let clock: Arc<dyn Clock> = Arc::new(FixedClock(NaiveDateTime::default()));
    (
        LedgerEngine::new(
            Arc::clone(&shared),
            Arc::clone(&sink),
            Arc::clone(&ids),
            Arc::clone(&clock),
        ),
        StatementEngine::new(shared, sink, ids, clock),
    )
}

proptest! {
    // ===================================================================
    // INVARIANT 1: Builder output always satisfies the balance assertion,
    // and debit totals equal credit totals exactly.
    // ===================================================================
    #[test]
    fn generated_transactions_are_balanced(history in arb_history()) {
        for txn in &history {
            prop_assert!(invariants::assert_balanced(txn).is_ok());
            prop_assert_eq!(txn.total_debits(), txn.total_credits());
        }
    }

    // ===================================================================
    // INVARIANT 2: Money is conserved. For any engine-validated history,
    // the trial balance's debit and credit activity totals agree and all
    // closing balances sum to zero.
    // ===================================================================
    #[test]
    fn replayed_totals_conserve_money(history in arb_history()) {
        runtime().block_on(async move {
            let store = MemoryStore::new();
            seed::standard_accounts(&store, "acme");
            let (ledger, statements) = engines(&store);

            for txn in history {
                ledger.post(txn).await.unwrap();
            }

            let tb = statements
                .build_trial_balance("acme", date(1), date(31))
                .await
                .unwrap();
            assert_eq!(tb.total_debits, tb.total_credits);
            let closing_sum: Cents = tb.rows.iter().map(|r| r.closing).sum();
            assert_eq!(closing_sum, Cents::ZERO);
        });
    }

    // ===================================================================
    // INVARIANT 3: Replay is deterministic. Committing the same history in
    // reverse order produces an identical integrity hash.
    // ===================================================================
    #[test]
    fn integrity_hash_is_order_independent(history in arb_history()) {
        runtime().block_on(async move {
            let forward = MemoryStore::new();
            let backward = MemoryStore::new();
            for txn in &history {
                forward.commit_append_only(txn).await.unwrap();
            }
            for txn in history.iter().rev() {
                backward.commit_append_only(txn).await.unwrap();
            }

            let (_, statements_forward) = engines(&forward);
            let (_, statements_backward) = engines(&backward);
            let first = statements_forward
                .build_trial_balance("acme", date(1), date(31))
                .await
                .unwrap();
            let second = statements_backward
                .build_trial_balance("acme", date(1), date(31))
                .await
                .unwrap();
            assert_eq!(first.integrity_hash, second.integrity_hash);
            assert_eq!(first.rows, second.rows);
        });
    }

    // ===================================================================
    // INVARIANT 4: The balance sheet always balances for histories made
    // solely of engine-validated transactions.
    // ===================================================================
    #[test]
    fn balance_sheet_always_balances(history in arb_history()) {
        runtime().block_on(async move {
            let store = MemoryStore::new();
            seed::standard_accounts(&store, "acme");
            let (ledger, statements) = engines(&store);

            for txn in history {
                ledger.post(txn).await.unwrap();
            }

            let sheet = statements
                .generate_balance_sheet("acme", date(31))
                .await
                .unwrap();
            assert!(sheet.balanced);
            assert_eq!(
                sheet.total_assets,
                sheet.total_liabilities + sheet.total_equity
            );
        });
    }

    // ===================================================================
    // INVARIANT 5: The wire format round-trips exactly for any cent value.
    // ===================================================================
    #[test]
    fn cents_round_trip_through_the_wire_format(raw in -1_000_000_000i64..1_000_000_000i64) {
        let value = Cents::new(raw);
        prop_assert_eq!(Cents::parse(&value.to_string()).unwrap(), value);
    }
}
