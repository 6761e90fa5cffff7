use engine::store::rebuild;
use payloads::{AccountId, CategoryId, TransactionStatus, requests};
use sqlx::FromRow;

use test_helpers::{TestEngine, spawn_engine};

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
struct DerivedState {
    category_id: CategoryId,
    month_start: String,
    allocated_minor: i64,
    inflow_minor: i64,
    activity_minor: i64,
    available_minor: i64,
}

async fn snapshot(app: &TestEngine) -> anyhow::Result<(Vec<(AccountId, i64)>, Vec<DerivedState>)> {
    let balances: Vec<(AccountId, i64)> = sqlx::query_as(
        "SELECT id, current_balance_minor FROM accounts ORDER BY id",
    )
    .fetch_all(app.store.pool())
    .await?;
    let monthly = sqlx::query_as::<_, DerivedState>(
        "SELECT * FROM budget_category_monthly_state
         ORDER BY category_id, month_start",
    )
    .fetch_all(app.store.pool())
    .await?;
    Ok((balances, monthly))
}

async fn populate(app: &TestEngine) -> anyhow::Result<()> {
    app.setup_budget().await?;
    app.create_savings().await?;
    app.create_visa().await?;

    app.allocate(
        "available_to_budget",
        "groceries",
        20_000,
        "2025-01-01".parse()?,
    )
    .await?;
    app.allocate(
        "available_to_budget",
        "payment_visa",
        5_000,
        "2025-01-02".parse()?,
    )
    .await?;
    app.spend("checking", "groceries", "2025-01-15".parse()?, -15_000)
        .await?;
    app.spend("visa", "groceries", "2025-01-20".parse()?, -4_000)
        .await?;
    app.spend("checking", "available_to_budget", "2025-02-01".parse()?, 90_000)
        .await?;
    app.spend("checking", "groceries", "2025-03-10".parse()?, -2_500)
        .await?;

    engine::store::ledger::create_transfer(
        &requests::CreateTransfer {
            source_account: AccountId("checking".into()),
            destination_account: AccountId("savings".into()),
            amount_minor: 30_000,
            transaction_date: "2025-02-15".parse()?,
            memo: None,
        },
        &app.time_source,
        &app.store,
    )
    .await?;
    Ok(())
}

#[tokio::test]
async fn rebuild_equals_incremental_maintenance() -> anyhow::Result<()> {
    let app = spawn_engine().await;
    populate(&app).await?;

    let incremental = snapshot(&app).await?;
    rebuild::rebuild(&app.store).await?;
    let rebuilt = snapshot(&app).await?;

    assert_eq!(incremental, rebuilt);
    Ok(())
}

#[tokio::test]
async fn rebuild_is_idempotent() -> anyhow::Result<()> {
    let app = spawn_engine().await;
    populate(&app).await?;

    rebuild::rebuild(&app.store).await?;
    let first = snapshot(&app).await?;
    rebuild::rebuild(&app.store).await?;
    let second = snapshot(&app).await?;

    assert_eq!(first, second);
    Ok(())
}

#[tokio::test]
async fn rebuild_repairs_a_corrupted_cache() -> anyhow::Result<()> {
    let app = spawn_engine().await;
    populate(&app).await?;
    let healthy = snapshot(&app).await?;

    sqlx::query(
        "UPDATE accounts SET current_balance_minor = 999 WHERE id = 'checking'",
    )
    .execute(app.store.pool())
    .await?;
    sqlx::query(
        "UPDATE budget_category_monthly_state SET available_minor = -1",
    )
    .execute(app.store.pool())
    .await?;

    rebuild::rebuild(&app.store).await?;
    assert_eq!(snapshot(&app).await?, healthy);
    Ok(())
}

#[tokio::test]
async fn rebuild_after_edits_matches_incremental() -> anyhow::Result<()> {
    let app = spawn_engine().await;
    populate(&app).await?;

    // Edit one spend in place (same month) and bulk-clear a pending row so
    // the version chains have retired rows to ignore.
    let pending = engine::store::ledger::create(
        &requests::CreateTransaction {
            account_id: AccountId("checking".into()),
            category_id: CategoryId("groceries".into()),
            transaction_date: "2025-01-25".parse()?,
            amount_minor: -1_000,
            memo: None,
            status: TransactionStatus::Pending,
        },
        &app.time_source,
        &app.store,
    )
    .await?;
    engine::store::ledger::set_status(
        pending.transaction.transaction_id,
        TransactionStatus::Cleared,
        &app.time_source,
        &app.store,
    )
    .await?;
    engine::store::ledger::edit(
        &requests::EditTransaction {
            transaction_id: pending.transaction.transaction_id,
            account_id: AccountId("checking".into()),
            category_id: CategoryId("groceries".into()),
            transaction_date: "2025-01-26".parse()?,
            amount_minor: -1_500,
            memo: Some("corrected".into()),
            status: TransactionStatus::Cleared,
        },
        &app.time_source,
        &app.store,
    )
    .await?;

    let incremental = snapshot(&app).await?;
    rebuild::rebuild(&app.store).await?;
    assert_eq!(snapshot(&app).await?, incremental);

    // Version uniqueness held throughout: one active row per concept.
    let worst: Option<i64> = sqlx::query_scalar(
        "SELECT MAX(n) FROM (
             SELECT COUNT(*) AS n FROM transactions
             WHERE is_active = 1
             GROUP BY transaction_id)",
    )
    .fetch_one(app.store.pool())
    .await?;
    assert_eq!(worst, Some(1));
    Ok(())
}

#[tokio::test]
async fn envelope_identity_holds_for_every_month() -> anyhow::Result<()> {
    let app = spawn_engine().await;
    populate(&app).await?;

    // available = previous available + allocated + inflow + activity for
    // every materialized month of every envelope category.
    let rows = sqlx::query_as::<_, DerivedState>(
        "SELECT s.* FROM budget_category_monthly_state s
         JOIN categories c ON s.category_id = c.id
         WHERE c.is_envelope = 1 AND c.is_system = 0
         ORDER BY s.category_id, s.month_start",
    )
    .fetch_all(app.store.pool())
    .await?;
    assert!(!rows.is_empty());

    let mut previous: Option<&DerivedState> = None;
    for row in &rows {
        let carried = match previous {
            Some(p) if p.category_id == row.category_id => {
                p.available_minor
            }
            _ => 0,
        };
        assert_eq!(
            row.available_minor,
            carried
                + row.allocated_minor
                + row.inflow_minor
                + row.activity_minor,
            "identity broken at {} {}",
            row.category_id,
            row.month_start,
        );
        previous = Some(row);
    }

    // Balance cache equals the sum of active amounts for every account.
    let mismatches: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM accounts a
         WHERE a.current_balance_minor <> COALESCE(
             (SELECT SUM(t.amount_minor) FROM transactions t
              WHERE t.account_id = a.id AND t.is_active = 1),
             0)",
    )
    .fetch_one(app.store.pool())
    .await?;
    assert_eq!(mismatches, 0);
    Ok(())
}
