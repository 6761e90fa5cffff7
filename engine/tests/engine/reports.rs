use engine::store::{StoreError, accounts, reports};
use payloads::{
    AccountClass, AccountDetailFields, AccountId, AccountRole, AccountType,
    CategoryId, StatusFilter, requests,
};

use test_helpers::spawn_engine;

#[tokio::test]
async fn credit_purchases_do_not_move_ready_to_assign() -> anyhow::Result<()>
{
    let app = spawn_engine().await;
    app.setup_budget().await?;
    app.create_visa().await?;
    app.allocate(
        "available_to_budget",
        "groceries",
        20_000,
        "2025-01-01".parse()?,
    )
    .await?;

    let before =
        reports::ready_to_assign("2025-01-01".parse()?, &app.store).await?;
    assert_eq!(before.amount_minor, 480_000);

    // Groceries bought on credit: the liability moves, cash does not.
    app.spend("visa", "groceries", "2025-01-15".parse()?, -10_000)
        .await?;

    assert_eq!(app.account_balance("visa").await?, -10_000);
    assert_eq!(app.account_balance("checking").await?, 500_000);

    let groceries = reports::category_month_state(
        &CategoryId("groceries".into()),
        "2025-01-01".parse()?,
        &app.store,
    )
    .await?;
    assert_eq!(groceries.activity_minor, -10_000);
    assert_eq!(groceries.available_minor, 10_000);

    let after =
        reports::ready_to_assign("2025-01-01".parse()?, &app.store).await?;
    assert_eq!(after.amount_minor, before.amount_minor);
    Ok(())
}

#[tokio::test]
async fn budget_listing_carries_rollover_months() -> anyhow::Result<()> {
    let app = spawn_engine().await;
    app.setup_budget().await?;
    app.create_visa().await?;
    app.allocate(
        "available_to_budget",
        "groceries",
        20_000,
        "2025-01-01".parse()?,
    )
    .await?;

    let listing = reports::list_budget_categories(
        "2025-02-01".parse()?,
        &app.store,
    )
    .await?;
    // groceries plus the payment envelope; system categories are hidden.
    assert_eq!(listing.len(), 2);
    let groceries = listing
        .iter()
        .find(|c| c.category.category_id == CategoryId("groceries".into()))
        .expect("groceries listed");
    assert_eq!(groceries.state.month_start, "2025-02-01".parse()?);
    assert_eq!(groceries.state.allocated_minor, 0);
    assert_eq!(groceries.state.available_minor, 20_000);
    Ok(())
}

#[tokio::test]
async fn net_worth_combines_all_four_streams() -> anyhow::Result<()> {
    let app = spawn_engine().await;
    app.setup_budget().await?;
    app.create_visa().await?;
    app.spend("visa", "groceries", "2025-01-15".parse()?, -40_000)
        .await?;

    // Investment account valued from holdings and uninvested cash.
    accounts::create_account(
        &requests::CreateAccount {
            account_id: Some(AccountId("brokerage".into())),
            name: "Brokerage".into(),
            account_type: AccountType::Asset,
            account_class: AccountClass::Investment,
            account_role: AccountRole::Tracking,
            current_balance_minor: 0,
            currency: "USD".into(),
            opened_on: None,
            details: Some(AccountDetailFields::Investment {
                uninvested_cash_minor: 25_000,
            }),
        },
        &app.time_source,
        &app.store,
    )
    .await?;
    accounts::upsert_holding(
        &requests::UpsertHolding {
            account_id: AccountId("brokerage".into()),
            symbol: "VTI".into(),
            quantity: 10.0,
        },
        &app.time_source,
        &app.store,
    )
    .await?;
    accounts::record_market_close(
        &requests::RecordMarketClose {
            symbol: "VTI".into(),
            quote_date: "2025-01-14".parse()?,
            close_minor: 30_000,
        },
        &app.store,
    )
    .await?;

    // Tangible asset valued from its fair-value detail row.
    accounts::create_account(
        &requests::CreateAccount {
            account_id: Some(AccountId("car".into())),
            name: "Car".into(),
            account_type: AccountType::Asset,
            account_class: AccountClass::Tangible,
            account_role: AccountRole::Tracking,
            current_balance_minor: 0,
            currency: "USD".into(),
            opened_on: None,
            details: Some(AccountDetailFields::Tangible {
                fair_value_minor: 1_200_000,
            }),
        },
        &app.time_source,
        &app.store,
    )
    .await?;

    let snapshot = reports::net_worth_current(&app.store).await?;
    assert_eq!(snapshot.assets_minor, 500_000);
    assert_eq!(snapshot.liabilities_minor, -40_000);
    // 10 shares at 30_000 plus 25_000 uninvested.
    assert_eq!(snapshot.positions_minor, 325_000);
    assert_eq!(snapshot.tangibles_minor, 1_200_000);
    assert_eq!(
        snapshot.net_worth_minor,
        snapshot.assets_minor
            + snapshot.liabilities_minor
            + snapshot.positions_minor
            + snapshot.tangibles_minor
    );
    Ok(())
}

#[tokio::test]
async fn investment_without_positions_falls_back_to_ledger()
-> anyhow::Result<()> {
    let app = spawn_engine().await;
    accounts::create_account(
        &requests::CreateAccount {
            account_id: Some(AccountId("old401k".into())),
            name: "Old 401k".into(),
            account_type: AccountType::Asset,
            account_class: AccountClass::Investment,
            account_role: AccountRole::Tracking,
            current_balance_minor: 0,
            currency: "USD".into(),
            opened_on: None,
            details: None,
        },
        &app.time_source,
        &app.store,
    )
    .await?;
    engine::store::ledger::post_opening_balance(
        &AccountId("old401k".into()),
        "2025-01-01".parse()?,
        80_000,
        &app.time_source,
        &app.store,
    )
    .await?;

    let snapshot = reports::net_worth_current(&app.store).await?;
    assert_eq!(snapshot.positions_minor, 80_000);
    assert_eq!(snapshot.assets_minor, 0);
    Ok(())
}

#[tokio::test]
async fn account_history_is_an_absolute_series() -> anyhow::Result<()> {
    let app = spawn_engine().await;
    app.setup_budget().await?;
    app.spend("checking", "groceries", "2025-01-10".parse()?, -20_000)
        .await?;
    app.spend("checking", "groceries", "2025-01-12".parse()?, -5_000)
        .await?;

    // The range starts after the opening balance: it lands in the baseline.
    let series = reports::account_history(
        &requests::GetAccountHistory {
            account_id: AccountId("checking".into()),
            start_date: "2025-01-09".parse()?,
            end_date: "2025-01-13".parse()?,
            status: StatusFilter::All,
        },
        &app.store,
    )
    .await?;

    let balances: Vec<i64> =
        series.iter().map(|p| p.balance_minor).collect();
    assert_eq!(balances, vec![500_000, 480_000, 480_000, 475_000, 475_000]);
    assert_eq!(series[0].as_of_date, "2025-01-09".parse()?);
    Ok(())
}

#[tokio::test]
async fn history_final_point_matches_balance_cache() -> anyhow::Result<()> {
    let app = spawn_engine().await;
    app.setup_budget().await?;
    app.spend("checking", "groceries", "2025-01-10".parse()?, -20_000)
        .await?;

    // Mock clock: today is 2025-01-01; end the range there with status all.
    let series = reports::account_history(
        &requests::GetAccountHistory {
            account_id: AccountId("checking".into()),
            start_date: "2024-12-01".parse()?,
            end_date: "2025-01-01".parse()?,
            status: StatusFilter::All,
        },
        &app.store,
    )
    .await?;
    let last = series.last().expect("non-empty series");
    assert_eq!(last.balance_minor, 500_000);

    // With the backdated spend included the endpoint equals the cache.
    let full = reports::account_history(
        &requests::GetAccountHistory {
            account_id: AccountId("checking".into()),
            start_date: "2025-01-01".parse()?,
            end_date: "2025-01-31".parse()?,
            status: StatusFilter::All,
        },
        &app.store,
    )
    .await?;
    assert_eq!(
        full.last().expect("non-empty").balance_minor,
        app.account_balance("checking").await?
    );
    Ok(())
}

#[tokio::test]
async fn history_range_guardrail() -> anyhow::Result<()> {
    let app = spawn_engine().await;
    app.create_checking().await?;

    let result = reports::account_history(
        &requests::GetAccountHistory {
            account_id: AccountId("checking".into()),
            start_date: "2000-01-01".parse()?,
            end_date: "2025-01-01".parse()?,
            status: StatusFilter::All,
        },
        &app.store,
    )
    .await;
    match result {
        Err(err @ StoreError::RangeTooLong { .. }) => {
            assert_eq!(err.kind(), engine::store::ErrorKind::Guardrail);
        }
        other => panic!("expected range guardrail, got {other:?}"),
    }

    let inverted = reports::account_history(
        &requests::GetAccountHistory {
            account_id: AccountId("checking".into()),
            start_date: "2025-02-01".parse()?,
            end_date: "2025-01-01".parse()?,
            status: StatusFilter::All,
        },
        &app.store,
    )
    .await;
    assert!(matches!(inverted, Err(StoreError::EmptyRange)));
    Ok(())
}

#[tokio::test]
async fn net_worth_history_uses_as_of_joins() -> anyhow::Result<()> {
    let app = spawn_engine().await;
    app.setup_budget().await?;
    app.spend("checking", "groceries", "2025-01-10".parse()?, -100_000)
        .await?;

    accounts::create_account(
        &requests::CreateAccount {
            account_id: Some(AccountId("brokerage".into())),
            name: "Brokerage".into(),
            account_type: AccountType::Asset,
            account_class: AccountClass::Investment,
            account_role: AccountRole::Tracking,
            current_balance_minor: 0,
            currency: "USD".into(),
            opened_on: None,
            details: None,
        },
        &app.time_source,
        &app.store,
    )
    .await?;
    accounts::upsert_holding(
        &requests::UpsertHolding {
            account_id: AccountId("brokerage".into()),
            symbol: "VTI".into(),
            quantity: 2.0,
        },
        &app.time_source,
        &app.store,
    )
    .await?;
    accounts::record_market_close(
        &requests::RecordMarketClose {
            symbol: "VTI".into(),
            quote_date: "2025-01-09".parse()?,
            close_minor: 10_000,
        },
        &app.store,
    )
    .await?;
    accounts::record_market_close(
        &requests::RecordMarketClose {
            symbol: "VTI".into(),
            quote_date: "2025-01-11".parse()?,
            close_minor: 12_000,
        },
        &app.store,
    )
    .await?;

    let series = reports::net_worth_history(
        "2025-01-09".parse()?,
        "2025-01-11".parse()?,
        &app.store,
    )
    .await?;
    let balances: Vec<i64> =
        series.iter().map(|p| p.balance_minor).collect();
    // Jan 9: 500_000 cash + 2 x 10_000; Jan 10: spend lands, price holds;
    // Jan 11: new close applies.
    assert_eq!(
        balances,
        vec![500_000 + 20_000, 400_000 + 20_000, 400_000 + 24_000]
    );
    Ok(())
}
