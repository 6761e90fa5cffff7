use engine::store::{StoreError, accounts, ledger};
use payloads::{
    AccountClass, AccountDetailFields, AccountId, AccountRole, AccountType,
    requests,
};

use test_helpers::{cash_account_details, spawn_engine};

#[tokio::test]
async fn create_account_starts_at_zero() -> anyhow::Result<()> {
    let app = spawn_engine().await;
    let account = app.create_checking().await?;

    assert_eq!(account.current_balance_minor, 0);
    assert!(account.is_active);
    assert_eq!(account.account_type, AccountType::Asset);
    Ok(())
}

#[tokio::test]
async fn nonzero_balance_at_create_is_rejected() -> anyhow::Result<()> {
    let app = spawn_engine().await;
    let mut details = cash_account_details("checking", "Checking");
    details.current_balance_minor = 12_345;

    let result =
        accounts::create_account(&details, &app.time_source, &app.store)
            .await;
    assert!(matches!(result, Err(StoreError::NonZeroOpeningBalance)));
    Ok(())
}

#[tokio::test]
async fn class_and_type_must_agree() -> anyhow::Result<()> {
    let app = spawn_engine().await;
    let details = requests::CreateAccount {
        account_id: Some(AccountId("visa".into())),
        name: "Visa".into(),
        // Credit implies liability.
        account_type: AccountType::Asset,
        account_class: AccountClass::Credit,
        account_role: AccountRole::OnBudget,
        current_balance_minor: 0,
        currency: "USD".into(),
        opened_on: None,
        details: None,
    };

    let result =
        accounts::create_account(&details, &app.time_source, &app.store)
            .await;
    assert!(matches!(
        result,
        Err(StoreError::ClassTypeMismatch { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn credit_account_upserts_payment_category() -> anyhow::Result<()> {
    let app = spawn_engine().await;
    app.create_visa().await?;

    let category = engine::store::categories::get_category(
        &AccountId("visa".into()).payment_category(),
        &app.store,
    )
    .await?;
    assert!(category.is_payment);
    assert!(category.is_envelope);
    assert!(!category.allow_transactions);
    assert!(category.allow_allocations);
    assert_eq!(
        category.group_id,
        Some(payloads::GroupId::credit_card_payments())
    );
    Ok(())
}

#[tokio::test]
async fn update_is_metadata_only_and_renames_payment_envelope()
-> anyhow::Result<()> {
    let app = spawn_engine().await;
    app.create_visa().await?;

    let rejected = accounts::update_account(
        &requests::UpdateAccount {
            account_id: AccountId("visa".into()),
            name: None,
            currency: None,
            opened_on: None,
            current_balance_minor: Some(-10_000),
        },
        &app.time_source,
        &app.store,
    )
    .await;
    assert!(matches!(rejected, Err(StoreError::CannotMutateBalance)));

    let updated = accounts::update_account(
        &requests::UpdateAccount {
            account_id: AccountId("visa".into()),
            name: Some("Visa Platinum".into()),
            currency: None,
            opened_on: None,
            current_balance_minor: None,
        },
        &app.time_source,
        &app.store,
    )
    .await?;
    assert_eq!(updated.name, "Visa Platinum");
    assert_eq!(updated.current_balance_minor, 0);

    let category = engine::store::categories::get_category(
        &AccountId("visa".into()).payment_category(),
        &app.store,
    )
    .await?;
    assert_eq!(category.name, "Payment: Visa Platinum");
    Ok(())
}

#[tokio::test]
async fn deactivation_requires_zero_balance() -> anyhow::Result<()> {
    let app = spawn_engine().await;
    app.create_checking().await?;
    app.fund_checking(500_000).await?;

    let result = accounts::deactivate_account(
        &AccountId("checking".into()),
        &app.time_source,
        &app.store,
    )
    .await;
    assert!(matches!(
        result,
        Err(StoreError::BalanceNotZero { balance_minor: 500_000 })
    ));

    // Zero it out with an offsetting ledger event, then deactivate.
    ledger::post_opening_balance(
        &AccountId("checking".into()),
        "2025-01-02".parse()?,
        -500_000,
        &app.time_source,
        &app.store,
    )
    .await?;
    let account = accounts::deactivate_account(
        &AccountId("checking".into()),
        &app.time_source,
        &app.store,
    )
    .await?;
    assert!(!account.is_active);
    Ok(())
}

#[tokio::test]
async fn tangible_retirement_needs_zero_fair_value() -> anyhow::Result<()> {
    let app = spawn_engine().await;
    let details = requests::CreateAccount {
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
    };
    accounts::create_account(&details, &app.time_source, &app.store).await?;

    let result = accounts::deactivate_account(
        &AccountId("car".into()),
        &app.time_source,
        &app.store,
    )
    .await;
    assert!(matches!(result, Err(StoreError::TangibleValueNotZero)));

    // A zero fair-value detail version unlocks retirement.
    accounts::update_details(
        &requests::UpdateAccountDetails {
            account_id: AccountId("car".into()),
            fields: AccountDetailFields::Tangible { fair_value_minor: 0 },
        },
        &app.time_source,
        &app.store,
    )
    .await?;
    let account = accounts::deactivate_account(
        &AccountId("car".into()),
        &app.time_source,
        &app.store,
    )
    .await?;
    assert!(!account.is_active);
    Ok(())
}

#[tokio::test]
async fn detail_versions_are_scd2() -> anyhow::Result<()> {
    let app = spawn_engine().await;
    app.create_visa().await?;

    app.time_source.advance(jiff::Span::new().hours(1));
    let detail = accounts::update_details(
        &requests::UpdateAccountDetails {
            account_id: AccountId("visa".into()),
            fields: AccountDetailFields::Credit {
                apr_bps: Some(2399),
                credit_limit_minor: Some(1_000_000),
            },
        },
        &app.time_source,
        &app.store,
    )
    .await?;
    assert!(detail.is_active);
    assert!(detail.valid_to.is_none());

    // One active row, one retired row with a closed validity window.
    let (active, total): (i64, i64) = (
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM account_details
             WHERE account_id = 'visa' AND is_active = 1",
        )
        .fetch_one(app.store.pool())
        .await?,
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM account_details
             WHERE account_id = 'visa'",
        )
        .fetch_one(app.store.pool())
        .await?,
    );
    assert_eq!(active, 1);
    assert_eq!(total, 2);

    let closed: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM account_details
         WHERE account_id = 'visa' AND is_active = 0
           AND valid_to IS NOT NULL",
    )
    .fetch_one(app.store.pool())
    .await?;
    assert_eq!(closed, 1);
    Ok(())
}
