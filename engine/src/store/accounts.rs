//! Account registry.
//!
//! Accounts are created at a zero balance; any opening balance is a separate
//! ledger event. The registry owns the per-class SCD-2 detail rows and, for
//! credit accounts, the payment-envelope upsert. Balances themselves move
//! only through the ledger.

use sqlx::FromRow;
use sqlx::types::Json;

use payloads::{
    AccountClass, AccountDetailFields, AccountId, AccountRole, AccountType,
    DetailId, HoldingId, requests, responses,
};
use uuid::Uuid;

use crate::store::categories::{ensure_payment_category, slugify};
use crate::store::{
    Store, StoreError, UnitOfWork, micros, opt_parse_date,
    opt_ts_from_micros, ts_from_micros,
};
use crate::time::TimeSource;

#[derive(Debug, Clone, FromRow)]
pub(crate) struct AccountRow {
    pub id: AccountId,
    pub name: String,
    pub account_type: AccountType,
    pub account_class: AccountClass,
    pub account_role: AccountRole,
    pub current_balance_minor: i64,
    pub currency: String,
    pub is_active: bool,
    pub opened_on: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<AccountRow> for responses::Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(responses::Account {
            account_id: row.id,
            name: row.name,
            account_type: row.account_type,
            account_class: row.account_class,
            account_role: row.account_role,
            current_balance_minor: row.current_balance_minor,
            currency: row.currency,
            is_active: row.is_active,
            opened_on: opt_parse_date(row.opened_on.as_deref())?,
            created_at: ts_from_micros(row.created_at)?,
            updated_at: ts_from_micros(row.updated_at)?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct DetailRow {
    pub detail_id: DetailId,
    pub account_id: AccountId,
    pub account_class: AccountClass,
    pub fields: Json<AccountDetailFields>,
    pub valid_from: i64,
    pub valid_to: Option<i64>,
    pub is_active: bool,
}

impl TryFrom<DetailRow> for responses::AccountDetail {
    type Error = StoreError;

    fn try_from(row: DetailRow) -> Result<Self, Self::Error> {
        Ok(responses::AccountDetail {
            detail_id: row.detail_id,
            account_id: row.account_id,
            account_class: row.account_class,
            fields: row.fields.0,
            valid_from: ts_from_micros(row.valid_from)?,
            valid_to: opt_ts_from_micros(row.valid_to)?,
            is_active: row.is_active,
        })
    }
}

pub(crate) async fn fetch_account(
    id: &AccountId,
    uow: &mut UnitOfWork<'_>,
) -> Result<AccountRow, StoreError> {
    sqlx::query_as::<_, AccountRow>("SELECT * FROM accounts WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut **uow)
        .await?
        .ok_or(StoreError::AccountNotFound)
}

pub async fn get_account(
    id: &AccountId,
    store: &Store,
) -> Result<responses::Account, StoreError> {
    sqlx::query_as::<_, AccountRow>("SELECT * FROM accounts WHERE id = ?1")
        .bind(id)
        .fetch_optional(store.pool())
        .await?
        .ok_or(StoreError::AccountNotFound)?
        .try_into()
}

pub async fn list_accounts(
    store: &Store,
) -> Result<Vec<responses::Account>, StoreError> {
    let rows = sqlx::query_as::<_, AccountRow>(
        "SELECT * FROM accounts ORDER BY id",
    )
    .fetch_all(store.pool())
    .await?;
    rows.into_iter().map(TryInto::try_into).collect()
}

pub async fn create_account_tx(
    details: &requests::CreateAccount,
    time_source: &TimeSource,
    uow: &mut UnitOfWork<'_>,
) -> Result<responses::Account, StoreError> {
    if details.name.is_empty()
        || details.name.len() > requests::NAME_MAX_LEN
    {
        return Err(StoreError::FieldTooLong);
    }
    // Opening balances are ledger events, never creation-time state.
    if details.current_balance_minor != 0 {
        return Err(StoreError::NonZeroOpeningBalance);
    }
    let expected = details.account_class.account_type();
    if details.account_type != expected {
        return Err(StoreError::ClassTypeMismatch {
            class: details.account_class,
            expected,
            requested: details.account_type,
        });
    }
    let fields = details
        .details
        .clone()
        .unwrap_or_else(|| {
            AccountDetailFields::default_for(details.account_class)
        });
    if fields.class() != details.account_class {
        return Err(StoreError::DetailClassMismatch {
            class: details.account_class,
            provided: fields.class(),
        });
    }
    let id = match &details.account_id {
        Some(id) => id.clone(),
        None => {
            let slug = slugify(&details.name);
            if slug.is_empty() {
                return Err(StoreError::FieldTooLong);
            }
            AccountId(slug)
        }
    };

    let now = micros(time_source.now());
    let row = sqlx::query_as::<_, AccountRow>(
        "INSERT INTO accounts
            (id, name, account_type, account_class, account_role,
             current_balance_minor, currency, is_active, opened_on,
             created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, 1, ?7, ?8, ?8)
         RETURNING *",
    )
    .bind(&id)
    .bind(&details.name)
    .bind(details.account_type)
    .bind(details.account_class)
    .bind(details.account_role)
    .bind(&details.currency)
    .bind(details.opened_on.map(|d| d.to_string()))
    .bind(now)
    .fetch_one(&mut **uow)
    .await?;

    insert_detail_row(&id, &fields, now, uow).await?;

    if details.account_class == AccountClass::Credit {
        ensure_payment_category(&id, &details.name, uow).await?;
    }

    tracing::info!(account = %id, class = %details.account_class,
        "created account");
    row.try_into()
}

pub async fn create_account(
    details: &requests::CreateAccount,
    time_source: &TimeSource,
    store: &Store,
) -> Result<responses::Account, StoreError> {
    let mut uow = store.begin().await?;
    let account = create_account_tx(details, time_source, &mut uow).await?;
    uow.commit().await?;
    Ok(account)
}

/// Metadata-only update; the balance cache is untouchable from here.
pub async fn update_account_tx(
    details: &requests::UpdateAccount,
    time_source: &TimeSource,
    uow: &mut UnitOfWork<'_>,
) -> Result<responses::Account, StoreError> {
    if details.current_balance_minor.is_some() {
        return Err(StoreError::CannotMutateBalance);
    }
    let current = fetch_account(&details.account_id, uow).await?;
    let name = match &details.name {
        Some(name) => {
            if name.is_empty() || name.len() > requests::NAME_MAX_LEN {
                return Err(StoreError::FieldTooLong);
            }
            name.clone()
        }
        None => current.name.clone(),
    };
    let currency =
        details.currency.clone().unwrap_or_else(|| current.currency.clone());
    let opened_on = details
        .opened_on
        .map(|d| d.to_string())
        .or_else(|| current.opened_on.clone());

    let row = sqlx::query_as::<_, AccountRow>(
        "UPDATE accounts
         SET name = ?2, currency = ?3, opened_on = ?4, updated_at = ?5
         WHERE id = ?1
         RETURNING *",
    )
    .bind(&details.account_id)
    .bind(&name)
    .bind(&currency)
    .bind(&opened_on)
    .bind(micros(time_source.now()))
    .fetch_one(&mut **uow)
    .await?;

    // Keep the payment envelope's display name in sync.
    if current.account_class == AccountClass::Credit {
        ensure_payment_category(&details.account_id, &name, uow).await?;
    }

    row.try_into()
}

pub async fn update_account(
    details: &requests::UpdateAccount,
    time_source: &TimeSource,
    store: &Store,
) -> Result<responses::Account, StoreError> {
    let mut uow = store.begin().await?;
    let account = update_account_tx(details, time_source, &mut uow).await?;
    uow.commit().await?;
    Ok(account)
}

/// Accounts become inactive only once their ledger balance is zero; tangible
/// accounts additionally require a zero fair-value detail row.
pub async fn deactivate_account_tx(
    id: &AccountId,
    time_source: &TimeSource,
    uow: &mut UnitOfWork<'_>,
) -> Result<responses::Account, StoreError> {
    let current = fetch_account(id, uow).await?;
    if current.current_balance_minor != 0 {
        return Err(StoreError::BalanceNotZero {
            balance_minor: current.current_balance_minor,
        });
    }
    if current.account_class == AccountClass::Tangible {
        let detail = active_detail_tx(id, uow).await?;
        match detail {
            Some(DetailRow {
                fields:
                    Json(AccountDetailFields::Tangible { fair_value_minor: 0 }),
                ..
            }) => {}
            _ => return Err(StoreError::TangibleValueNotZero),
        }
    }

    let row = sqlx::query_as::<_, AccountRow>(
        "UPDATE accounts SET is_active = 0, updated_at = ?2
         WHERE id = ?1
         RETURNING *",
    )
    .bind(id)
    .bind(micros(time_source.now()))
    .fetch_one(&mut **uow)
    .await?;
    tracing::info!(account = %id, "deactivated account");
    row.try_into()
}

pub async fn deactivate_account(
    id: &AccountId,
    time_source: &TimeSource,
    store: &Store,
) -> Result<responses::Account, StoreError> {
    let mut uow = store.begin().await?;
    let account = deactivate_account_tx(id, time_source, &mut uow).await?;
    uow.commit().await?;
    Ok(account)
}

async fn insert_detail_row(
    account_id: &AccountId,
    fields: &AccountDetailFields,
    now: i64,
    uow: &mut UnitOfWork<'_>,
) -> Result<DetailRow, StoreError> {
    let row = sqlx::query_as::<_, DetailRow>(
        "INSERT INTO account_details
            (detail_id, account_id, account_class, fields, valid_from,
             valid_to, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, NULL, 1)
         RETURNING *",
    )
    .bind(DetailId(Uuid::new_v4()))
    .bind(account_id)
    .bind(fields.class())
    .bind(Json(fields))
    .bind(now)
    .fetch_one(&mut **uow)
    .await?;
    Ok(row)
}

pub(crate) async fn active_detail_tx(
    account_id: &AccountId,
    uow: &mut UnitOfWork<'_>,
) -> Result<Option<DetailRow>, StoreError> {
    Ok(sqlx::query_as::<_, DetailRow>(
        "SELECT * FROM account_details
         WHERE account_id = ?1 AND is_active = 1",
    )
    .bind(account_id)
    .fetch_optional(&mut **uow)
    .await?)
}

pub async fn get_active_detail(
    account_id: &AccountId,
    store: &Store,
) -> Result<responses::AccountDetail, StoreError> {
    sqlx::query_as::<_, DetailRow>(
        "SELECT * FROM account_details
         WHERE account_id = ?1 AND is_active = 1",
    )
    .bind(account_id)
    .fetch_optional(store.pool())
    .await?
    .ok_or(StoreError::DetailNotFound)?
    .try_into()
}

/// New detail versions close the prior active row.
pub async fn update_details_tx(
    details: &requests::UpdateAccountDetails,
    time_source: &TimeSource,
    uow: &mut UnitOfWork<'_>,
) -> Result<responses::AccountDetail, StoreError> {
    let account = fetch_account(&details.account_id, uow).await?;
    if details.fields.class() != account.account_class {
        return Err(StoreError::DetailClassMismatch {
            class: account.account_class,
            provided: details.fields.class(),
        });
    }

    let now = micros(time_source.now());
    sqlx::query(
        "UPDATE account_details
         SET is_active = 0, valid_to = ?3
         WHERE account_id = ?1 AND account_class = ?2 AND is_active = 1",
    )
    .bind(&details.account_id)
    .bind(account.account_class)
    .bind(now)
    .execute(&mut **uow)
    .await?;

    let row =
        insert_detail_row(&details.account_id, &details.fields, now, uow)
            .await?;
    row.try_into()
}

pub async fn update_details(
    details: &requests::UpdateAccountDetails,
    time_source: &TimeSource,
    store: &Store,
) -> Result<responses::AccountDetail, StoreError> {
    let mut uow = store.begin().await?;
    let detail = update_details_tx(details, time_source, &mut uow).await?;
    uow.commit().await?;
    Ok(detail)
}

/// Declare the current position for one symbol of an investment account,
/// retiring the prior active holding row. A zero quantity closes the
/// position without a replacement.
pub async fn upsert_holding_tx(
    details: &requests::UpsertHolding,
    time_source: &TimeSource,
    uow: &mut UnitOfWork<'_>,
) -> Result<(), StoreError> {
    let account = fetch_account(&details.account_id, uow).await?;
    if account.account_class != AccountClass::Investment {
        return Err(StoreError::DetailClassMismatch {
            class: account.account_class,
            provided: AccountClass::Investment,
        });
    }

    let now = micros(time_source.now());
    sqlx::query(
        "UPDATE investment_holdings
         SET is_active = 0, valid_to = ?3
         WHERE account_id = ?1 AND symbol = ?2 AND is_active = 1",
    )
    .bind(&details.account_id)
    .bind(&details.symbol)
    .bind(now)
    .execute(&mut **uow)
    .await?;

    if details.quantity != 0.0 {
        sqlx::query(
            "INSERT INTO investment_holdings
                (holding_id, account_id, symbol, quantity, valid_from,
                 valid_to, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, 1)",
        )
        .bind(HoldingId(Uuid::new_v4()))
        .bind(&details.account_id)
        .bind(&details.symbol)
        .bind(details.quantity)
        .bind(now)
        .execute(&mut **uow)
        .await?;
    }
    Ok(())
}

pub async fn upsert_holding(
    details: &requests::UpsertHolding,
    time_source: &TimeSource,
    store: &Store,
) -> Result<(), StoreError> {
    let mut uow = store.begin().await?;
    upsert_holding_tx(details, time_source, &mut uow).await?;
    uow.commit().await?;
    Ok(())
}

/// Record an externally-fetched close quote, replacing any quote already
/// stored for the symbol and date.
pub async fn record_market_close(
    details: &requests::RecordMarketClose,
    store: &Store,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO market_prices (symbol, quote_date, close_minor)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (symbol, quote_date) DO UPDATE
             SET close_minor = excluded.close_minor",
    )
    .bind(&details.symbol)
    .bind(details.quote_date.to_string())
    .bind(details.close_minor)
    .execute(store.pool())
    .await?;
    Ok(())
}
