use engine::store::{StoreError, allocations, reports};
use payloads::{CategoryId, requests};

use test_helpers::spawn_engine;

#[tokio::test]
async fn envelope_outflow_reduces_availability_and_rta() -> anyhow::Result<()>
{
    let app = spawn_engine().await;
    app.setup_budget().await?;

    app.allocate(
        "available_to_budget",
        "groceries",
        20_000,
        "2025-01-01".parse()?,
    )
    .await?;
    app.spend("checking", "groceries", "2025-01-15".parse()?, -15_000)
        .await?;

    assert_eq!(app.account_balance("checking").await?, 485_000);

    let state = reports::category_month_state(
        &CategoryId("groceries".into()),
        "2025-01-01".parse()?,
        &app.store,
    )
    .await?;
    assert_eq!(state.allocated_minor, 20_000);
    assert_eq!(state.activity_minor, -15_000);
    assert_eq!(state.available_minor, 5_000);

    let rta = reports::ready_to_assign("2025-01-01".parse()?, &app.store)
        .await?;
    assert_eq!(rta.amount_minor, 485_000 - 5_000);
    Ok(())
}

#[tokio::test]
async fn endpoints_must_differ_and_amount_be_positive() -> anyhow::Result<()>
{
    let app = spawn_engine().await;
    app.setup_budget().await?;

    let same = app
        .allocate("groceries", "groceries", 1_000, "2025-01-01".parse()?)
        .await
        .unwrap_err()
        .downcast::<StoreError>()?;
    assert!(matches!(same, StoreError::SameCategory));

    let negative = app
        .allocate(
            "available_to_budget",
            "groceries",
            -1_000,
            "2025-01-01".parse()?,
        )
        .await
        .unwrap_err()
        .downcast::<StoreError>()?;
    assert!(matches!(negative, StoreError::AmountMustBePositive));
    Ok(())
}

#[tokio::test]
async fn allocation_endpoints_respect_capability_flags() -> anyhow::Result<()>
{
    let app = spawn_engine().await;
    app.setup_budget().await?;

    // opening_balance allows transactions but never allocations.
    let err = app
        .allocate("opening_balance", "groceries", 1_000, "2025-01-01".parse()?)
        .await
        .unwrap_err()
        .downcast::<StoreError>()?;
    assert!(matches!(err, StoreError::CategoryDisallowsAllocations));

    // Payment envelopes are valid allocation endpoints.
    app.create_visa().await?;
    let allocation = app
        .allocate(
            "available_to_budget",
            "payment_visa",
            5_000,
            "2025-01-01".parse()?,
        )
        .await?;
    assert_eq!(allocation.amount_minor, 5_000);
    Ok(())
}

#[tokio::test]
async fn overspend_shows_as_negative_availability() -> anyhow::Result<()> {
    let app = spawn_engine().await;
    app.setup_budget().await?;

    app.allocate(
        "available_to_budget",
        "groceries",
        10_000,
        "2025-01-01".parse()?,
    )
    .await?;
    app.spend("checking", "groceries", "2025-01-20".parse()?, -18_000)
        .await?;

    let state = reports::category_month_state(
        &CategoryId("groceries".into()),
        "2025-01-01".parse()?,
        &app.store,
    )
    .await?;
    assert_eq!(state.available_minor, -8_000);
    Ok(())
}

#[tokio::test]
async fn availability_rolls_over_between_months() -> anyhow::Result<()> {
    let app = spawn_engine().await;
    app.setup_budget().await?;

    app.allocate(
        "available_to_budget",
        "groceries",
        20_000,
        "2025-01-01".parse()?,
    )
    .await?;
    app.spend("checking", "groceries", "2025-01-15".parse()?, -5_000)
        .await?;
    app.spend("checking", "groceries", "2025-03-10".parse()?, -3_000)
        .await?;

    // February is never materialized; March seeds from January's 15_000.
    let march = reports::category_month_state(
        &CategoryId("groceries".into()),
        "2025-03-01".parse()?,
        &app.store,
    )
    .await?;
    assert_eq!(march.allocated_minor, 0);
    assert_eq!(march.activity_minor, -3_000);
    assert_eq!(march.available_minor, 12_000);

    // A rollover-aware read of February carries January forward.
    let february = reports::category_month_state(
        &CategoryId("groceries".into()),
        "2025-02-01".parse()?,
        &app.store,
    )
    .await?;
    assert_eq!(february.available_minor, 15_000);
    assert_eq!(february.activity_minor, 0);
    Ok(())
}

#[tokio::test]
async fn backdated_mutations_propagate_to_later_months() -> anyhow::Result<()>
{
    let app = spawn_engine().await;
    app.setup_budget().await?;

    app.allocate(
        "available_to_budget",
        "groceries",
        20_000,
        "2025-02-01".parse()?,
    )
    .await?;
    // Backdated January allocation must flow into February's rollover.
    app.allocate(
        "available_to_budget",
        "groceries",
        7_000,
        "2025-01-05".parse()?,
    )
    .await?;

    let february = reports::category_month_state(
        &CategoryId("groceries".into()),
        "2025-02-01".parse()?,
        &app.store,
    )
    .await?;
    assert_eq!(february.allocated_minor, 20_000);
    assert_eq!(february.available_minor, 27_000);
    Ok(())
}

#[tokio::test]
async fn edit_and_delete_reverse_monthly_state() -> anyhow::Result<()> {
    let app = spawn_engine().await;
    app.setup_budget().await?;

    let allocation = app
        .allocate(
            "available_to_budget",
            "groceries",
            20_000,
            "2025-01-01".parse()?,
        )
        .await?;

    let edited = allocations::edit(
        &requests::EditAllocation {
            allocation_id: allocation.allocation_id,
            allocation_date: "2025-01-01".parse()?,
            from_category_id: CategoryId::available_to_budget(),
            to_category_id: CategoryId("groceries".into()),
            amount_minor: 12_000,
            memo: None,
        },
        &app.time_source,
        &app.store,
    )
    .await?;
    assert_eq!(edited.allocation_id, allocation.allocation_id);
    assert_ne!(edited.version_id, allocation.version_id);

    let state = reports::category_month_state(
        &CategoryId("groceries".into()),
        "2025-01-01".parse()?,
        &app.store,
    )
    .await?;
    assert_eq!(state.allocated_minor, 12_000);
    assert_eq!(state.available_minor, 12_000);

    allocations::delete(
        allocation.allocation_id,
        &app.time_source,
        &app.store,
    )
    .await?;
    let state = reports::category_month_state(
        &CategoryId("groceries".into()),
        "2025-01-01".parse()?,
        &app.store,
    )
    .await?;
    assert_eq!(state.allocated_minor, 0);
    assert_eq!(state.available_minor, 0);

    // Exactly one version chain with no active rows remains.
    let active: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM budget_allocations
         WHERE allocation_id = ?1 AND is_active = 1",
    )
    .bind(allocation.allocation_id)
    .fetch_one(app.store.pool())
    .await?;
    assert_eq!(active, 0);
    Ok(())
}

#[tokio::test]
async fn rta_pseudo_category_tracks_net_movement() -> anyhow::Result<()> {
    let app = spawn_engine().await;
    app.setup_budget().await?;

    app.allocate(
        "available_to_budget",
        "groceries",
        20_000,
        "2025-01-01".parse()?,
    )
    .await?;
    app.allocate(
        "groceries",
        "available_to_budget",
        4_000,
        "2025-01-10".parse()?,
    )
    .await?;

    let rta_row = reports::category_month_state(
        &CategoryId::available_to_budget(),
        "2025-01-01".parse()?,
        &app.store,
    )
    .await?;
    assert_eq!(rta_row.allocated_minor, -16_000);

    let groceries = reports::category_month_state(
        &CategoryId("groceries".into()),
        "2025-01-01".parse()?,
        &app.store,
    )
    .await?;
    assert_eq!(groceries.available_minor, 16_000);
    Ok(())
}
