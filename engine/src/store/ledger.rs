//! Ledger core: SCD-2 transaction versions, the account balance cache, and
//! monthly category state maintenance.
//!
//! Editing never updates a version in place. The active row is retired
//! (`is_active = 0`, `valid_to` set) and a replacement inserted under the
//! same `transaction_id`, both inside one unit of work together with the
//! reversal and re-application of balance effects. Status changes ride the
//! same path.

use jiff::civil::Date;
use sqlx::FromRow;
use uuid::Uuid;

use payloads::{
    AccountClass, AccountId, CategoryId, EntrySource, StatusFilter,
    TransactionId, TransactionStatus, TransactionVersionId, requests,
    responses,
};

use crate::money::month_start;
use crate::store::categories::{CategoryRow, fetch_category};
use crate::store::accounts::fetch_account;
use crate::store::{
    Store, StoreError, UnitOfWork, micros, monthly, opt_ts_from_micros,
    parse_date, ts_from_micros,
};
use crate::time::{RecordStamp, TimeSource};

#[derive(Debug, Clone, FromRow)]
pub(crate) struct TxnRow {
    pub version_id: TransactionVersionId,
    pub transaction_id: TransactionId,
    pub account_id: AccountId,
    pub category_id: CategoryId,
    pub transaction_date: String,
    pub amount_minor: i64,
    pub memo: Option<String>,
    pub status: TransactionStatus,
    pub source: EntrySource,
    pub recorded_at: i64,
    pub valid_from: i64,
    pub valid_to: Option<i64>,
    pub is_active: bool,
}

impl TryFrom<TxnRow> for responses::TransactionVersion {
    type Error = StoreError;

    fn try_from(row: TxnRow) -> Result<Self, Self::Error> {
        Ok(responses::TransactionVersion {
            version_id: row.version_id,
            transaction_id: row.transaction_id,
            account_id: row.account_id,
            category_id: row.category_id,
            transaction_date: parse_date(&row.transaction_date)?,
            amount_minor: row.amount_minor,
            memo: row.memo,
            status: row.status,
            source: row.source,
            recorded_at: ts_from_micros(row.recorded_at)?,
            valid_from: ts_from_micros(row.valid_from)?,
            valid_to: opt_ts_from_micros(row.valid_to)?,
            is_active: row.is_active,
        })
    }
}

/// Field set for one version, shared by create and edit.
struct VersionFields {
    account_id: AccountId,
    category_id: CategoryId,
    transaction_date: Date,
    amount_minor: i64,
    memo: Option<String>,
    status: TransactionStatus,
    source: EntrySource,
}

pub(crate) async fn fetch_active_version(
    transaction_id: TransactionId,
    uow: &mut UnitOfWork<'_>,
) -> Result<TxnRow, StoreError> {
    sqlx::query_as::<_, TxnRow>(
        "SELECT * FROM transactions
         WHERE transaction_id = ?1 AND is_active = 1",
    )
    .bind(transaction_id)
    .fetch_optional(&mut **uow)
    .await?
    .ok_or(StoreError::TransactionNotFound)
}

fn validate_memo(memo: Option<&str>) -> Result<(), StoreError> {
    if memo.is_some_and(|m| m.len() > requests::MEMO_MAX_LEN) {
        return Err(StoreError::FieldTooLong);
    }
    Ok(())
}

/// Validate the referenced account and category for a version write.
/// System categories are reachable only from the engine's own paths, and
/// only an edit that keeps the category may retain one.
async fn validate_references(
    fields: &VersionFields,
    previous_category: Option<&CategoryId>,
    uow: &mut UnitOfWork<'_>,
) -> Result<CategoryRow, StoreError> {
    let account = fetch_account(&fields.account_id, uow).await?;
    if !account.is_active {
        return Err(StoreError::AccountInactive);
    }
    let category = fetch_category(&fields.category_id, uow).await?;
    if !category.is_active {
        return Err(StoreError::CategoryNotFound);
    }
    if !category.allow_transactions {
        return Err(StoreError::CategoryDisallowsTransactions);
    }
    // `available_to_budget` is the user-facing income endpoint; the other
    // system categories are written only by the engine's own paths.
    if category.is_system
        && category.id != CategoryId::available_to_budget()
        && fields.source == EntrySource::User
        && previous_category != Some(&category.id)
    {
        return Err(StoreError::SystemCategoryProtected);
    }
    Ok(category)
}

/// Apply one signed amount to the account balance cache and the category's
/// monthly state. Reversal is the same call with the amount negated.
async fn apply_amount(
    account_id: &AccountId,
    category: &CategoryRow,
    transaction_date: Date,
    amount_minor: i64,
    now_micros: i64,
    uow: &mut UnitOfWork<'_>,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE accounts
         SET current_balance_minor = current_balance_minor + ?2,
             updated_at = ?3
         WHERE id = ?1",
    )
    .bind(account_id)
    .bind(amount_minor)
    .bind(now_micros)
    .execute(&mut **uow)
    .await?;

    let (inflow, activity, available) =
        monthly::transaction_deltas(category, amount_minor);
    monthly::apply(
        &category.id,
        month_start(transaction_date),
        0,
        inflow,
        activity,
        available,
        uow,
    )
    .await
}

async fn insert_version(
    transaction_id: TransactionId,
    fields: &VersionFields,
    stamp: RecordStamp,
    uow: &mut UnitOfWork<'_>,
) -> Result<TxnRow, StoreError> {
    let row = sqlx::query_as::<_, TxnRow>(
        "INSERT INTO transactions
            (version_id, transaction_id, account_id, category_id,
             transaction_date, amount_minor, memo, status, source,
             recorded_at, recorded_seq, valid_from, valid_to, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?10, NULL, 1)
         RETURNING *",
    )
    .bind(TransactionVersionId(Uuid::new_v4()))
    .bind(transaction_id)
    .bind(&fields.account_id)
    .bind(&fields.category_id)
    .bind(fields.transaction_date.to_string())
    .bind(fields.amount_minor)
    .bind(&fields.memo)
    .bind(fields.status)
    .bind(fields.source)
    .bind(micros(stamp.at))
    .bind(stamp.seq)
    .fetch_one(&mut **uow)
    .await?;
    Ok(row)
}

/// Retire the active version. Zero rows affected means another writer got
/// there first.
async fn retire_version(
    version_id: TransactionVersionId,
    stamp: RecordStamp,
    uow: &mut UnitOfWork<'_>,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE transactions
         SET is_active = 0, valid_to = ?2
         WHERE version_id = ?1 AND is_active = 1",
    )
    .bind(version_id)
    .bind(micros(stamp.at))
    .execute(&mut **uow)
    .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::VersionConflict);
    }
    Ok(())
}

/// Snapshot bundle for a write: the version plus the account and affected
/// month as they stand inside this unit of work.
async fn write_result(
    row: TxnRow,
    uow: &mut UnitOfWork<'_>,
) -> Result<responses::LedgerWrite, StoreError> {
    let account = fetch_account(&row.account_id, uow).await?.try_into()?;
    let month_state = monthly::get_row(
        &row.category_id,
        month_start(parse_date(&row.transaction_date)?),
        uow,
    )
    .await?;
    Ok(responses::LedgerWrite {
        transaction: row.try_into()?,
        account,
        month_state,
    })
}

async fn create_version(
    fields: VersionFields,
    time_source: &TimeSource,
    uow: &mut UnitOfWork<'_>,
) -> Result<responses::LedgerWrite, StoreError> {
    if fields.amount_minor == 0 {
        return Err(StoreError::ZeroAmount);
    }
    validate_memo(fields.memo.as_deref())?;
    let category = validate_references(&fields, None, uow).await?;

    let stamp = time_source.stamp();
    let transaction_id = TransactionId(Uuid::new_v4());
    let row = insert_version(transaction_id, &fields, stamp, uow).await?;
    apply_amount(
        &fields.account_id,
        &category,
        fields.transaction_date,
        fields.amount_minor,
        micros(stamp.at),
        uow,
    )
    .await?;

    tracing::info!(transaction = %transaction_id,
        account = %fields.account_id, amount = fields.amount_minor,
        "created transaction");
    write_result(row, uow).await
}

pub async fn create_tx(
    details: &requests::CreateTransaction,
    time_source: &TimeSource,
    uow: &mut UnitOfWork<'_>,
) -> Result<responses::LedgerWrite, StoreError> {
    create_version(
        VersionFields {
            account_id: details.account_id.clone(),
            category_id: details.category_id.clone(),
            transaction_date: details.transaction_date,
            amount_minor: details.amount_minor,
            memo: details.memo.clone(),
            status: details.status,
            source: EntrySource::User,
        },
        time_source,
        uow,
    )
    .await
}

pub async fn create(
    details: &requests::CreateTransaction,
    time_source: &TimeSource,
    store: &Store,
) -> Result<responses::LedgerWrite, StoreError> {
    let mut uow = store.begin().await?;
    let write = create_tx(details, time_source, &mut uow).await?;
    uow.commit().await?;
    Ok(write)
}

/// Atomically retire the current active version and write its replacement,
/// reversing the old balance effects and applying the new ones.
pub async fn edit_tx(
    details: &requests::EditTransaction,
    time_source: &TimeSource,
    uow: &mut UnitOfWork<'_>,
) -> Result<responses::LedgerWrite, StoreError> {
    if details.amount_minor == 0 {
        return Err(StoreError::ZeroAmount);
    }
    validate_memo(details.memo.as_deref())?;

    let old = fetch_active_version(details.transaction_id, uow).await?;
    let fields = VersionFields {
        account_id: details.account_id.clone(),
        category_id: details.category_id.clone(),
        transaction_date: details.transaction_date,
        amount_minor: details.amount_minor,
        memo: details.memo.clone(),
        status: details.status,
        // The replacement inherits the concept's provenance.
        source: old.source,
    };
    let category =
        validate_references(&fields, Some(&old.category_id), uow).await?;

    let stamp = time_source.stamp();
    let old_category = fetch_category(&old.category_id, uow).await?;
    apply_amount(
        &old.account_id,
        &old_category,
        parse_date(&old.transaction_date)?,
        -old.amount_minor,
        micros(stamp.at),
        uow,
    )
    .await?;
    retire_version(old.version_id, stamp, uow).await?;

    let row = insert_version(details.transaction_id, &fields, stamp, uow)
        .await?;
    apply_amount(
        &fields.account_id,
        &category,
        fields.transaction_date,
        fields.amount_minor,
        micros(stamp.at),
        uow,
    )
    .await?;

    tracing::info!(transaction = %details.transaction_id,
        amount = fields.amount_minor, "edited transaction");
    write_result(row, uow).await
}

pub async fn edit(
    details: &requests::EditTransaction,
    time_source: &TimeSource,
    store: &Store,
) -> Result<responses::LedgerWrite, StoreError> {
    let mut uow = store.begin().await?;
    let write = edit_tx(details, time_source, &mut uow).await?;
    uow.commit().await?;
    Ok(write)
}

/// Retire the active version with no replacement, reversing its effects.
pub async fn delete_tx(
    transaction_id: TransactionId,
    time_source: &TimeSource,
    uow: &mut UnitOfWork<'_>,
) -> Result<(), StoreError> {
    let old = fetch_active_version(transaction_id, uow).await?;
    let stamp = time_source.stamp();
    let old_category = fetch_category(&old.category_id, uow).await?;
    apply_amount(
        &old.account_id,
        &old_category,
        parse_date(&old.transaction_date)?,
        -old.amount_minor,
        micros(stamp.at),
        uow,
    )
    .await?;
    retire_version(old.version_id, stamp, uow).await?;
    tracing::info!(transaction = %transaction_id, "deleted transaction");
    Ok(())
}

pub async fn delete(
    transaction_id: TransactionId,
    time_source: &TimeSource,
    store: &Store,
) -> Result<(), StoreError> {
    let mut uow = store.begin().await?;
    delete_tx(transaction_id, time_source, &mut uow).await?;
    uow.commit().await?;
    Ok(())
}

/// Status transitions are versioned like any other edit.
pub async fn set_status_tx(
    transaction_id: TransactionId,
    status: TransactionStatus,
    time_source: &TimeSource,
    uow: &mut UnitOfWork<'_>,
) -> Result<responses::LedgerWrite, StoreError> {
    let old = fetch_active_version(transaction_id, uow).await?;
    let details = requests::EditTransaction {
        transaction_id,
        account_id: old.account_id.clone(),
        category_id: old.category_id.clone(),
        transaction_date: parse_date(&old.transaction_date)?,
        amount_minor: old.amount_minor,
        memo: old.memo.clone(),
        status,
    };
    edit_tx(&details, time_source, uow).await
}

pub async fn set_status(
    transaction_id: TransactionId,
    status: TransactionStatus,
    time_source: &TimeSource,
    store: &Store,
) -> Result<responses::LedgerWrite, StoreError> {
    let mut uow = store.begin().await?;
    let write =
        set_status_tx(transaction_id, status, time_source, &mut uow).await?;
    uow.commit().await?;
    Ok(write)
}

/// Two legs in one unit of work, both in the `account_transfer` category
/// with a correlated memo. Net worth is unchanged by construction.
pub async fn create_transfer_tx(
    details: &requests::CreateTransfer,
    time_source: &TimeSource,
    uow: &mut UnitOfWork<'_>,
) -> Result<responses::Transfer, StoreError> {
    if details.source_account == details.destination_account {
        return Err(StoreError::SameAccount);
    }
    if details.amount_minor <= 0 {
        return Err(StoreError::AmountMustBePositive);
    }
    let memo = details.memo.clone().unwrap_or_else(|| {
        format!(
            "Transfer {} -> {}",
            details.source_account, details.destination_account
        )
    });
    validate_memo(Some(&memo))?;

    let leg = |account_id: &AccountId, amount_minor: i64| VersionFields {
        account_id: account_id.clone(),
        category_id: CategoryId::account_transfer(),
        transaction_date: details.transaction_date,
        amount_minor,
        memo: Some(memo.clone()),
        status: TransactionStatus::Cleared,
        source: EntrySource::Transfer,
    };

    let outflow = create_version(
        leg(&details.source_account, -details.amount_minor),
        time_source,
        uow,
    )
    .await?;
    let inflow = create_version(
        leg(&details.destination_account, details.amount_minor),
        time_source,
        uow,
    )
    .await?;

    Ok(responses::Transfer {
        outflow: outflow.transaction,
        inflow: inflow.transaction,
    })
}

pub async fn create_transfer(
    details: &requests::CreateTransfer,
    time_source: &TimeSource,
    store: &Store,
) -> Result<responses::Transfer, StoreError> {
    let mut uow = store.begin().await?;
    let transfer = create_transfer_tx(details, time_source, &mut uow).await?;
    uow.commit().await?;
    Ok(transfer)
}

/// The only way to express a non-zero opening balance.
pub async fn post_opening_balance_tx(
    account_id: &AccountId,
    transaction_date: Date,
    amount_minor: i64,
    time_source: &TimeSource,
    uow: &mut UnitOfWork<'_>,
) -> Result<responses::LedgerWrite, StoreError> {
    create_version(
        VersionFields {
            account_id: account_id.clone(),
            category_id: CategoryId::opening_balance(),
            transaction_date,
            amount_minor,
            memo: Some("Opening balance".into()),
            status: TransactionStatus::Cleared,
            source: EntrySource::System,
        },
        time_source,
        uow,
    )
    .await
}

pub async fn post_opening_balance(
    account_id: &AccountId,
    transaction_date: Date,
    amount_minor: i64,
    time_source: &TimeSource,
    store: &Store,
) -> Result<responses::LedgerWrite, StoreError> {
    let mut uow = store.begin().await?;
    let write = post_opening_balance_tx(
        account_id,
        transaction_date,
        amount_minor,
        time_source,
        &mut uow,
    )
    .await?;
    uow.commit().await?;
    Ok(write)
}

/// System adjustment event for non-cash accounts. Cash discrepancies must be
/// reconciled with real transactions.
pub async fn post_balance_adjustment_tx(
    account_id: &AccountId,
    transaction_date: Date,
    amount_minor: i64,
    memo: Option<String>,
    time_source: &TimeSource,
    uow: &mut UnitOfWork<'_>,
) -> Result<responses::LedgerWrite, StoreError> {
    let account = fetch_account(account_id, uow).await?;
    if account.account_class == AccountClass::Cash {
        return Err(StoreError::AdjustmentOnCashAccount);
    }
    create_version(
        VersionFields {
            account_id: account_id.clone(),
            category_id: CategoryId::balance_adjustment(),
            transaction_date,
            amount_minor,
            memo: memo.or_else(|| Some("Balance adjustment".into())),
            status: TransactionStatus::Cleared,
            source: EntrySource::System,
        },
        time_source,
        uow,
    )
    .await
}

pub async fn post_balance_adjustment(
    account_id: &AccountId,
    transaction_date: Date,
    amount_minor: i64,
    memo: Option<String>,
    time_source: &TimeSource,
    store: &Store,
) -> Result<responses::LedgerWrite, StoreError> {
    let mut uow = store.begin().await?;
    let write = post_balance_adjustment_tx(
        account_id,
        transaction_date,
        amount_minor,
        memo,
        time_source,
        &mut uow,
    )
    .await?;
    uow.commit().await?;
    Ok(write)
}

pub async fn list_recent(
    limit: i64,
    store: &Store,
) -> Result<Vec<responses::TransactionVersion>, StoreError> {
    let rows = sqlx::query_as::<_, TxnRow>(
        "SELECT * FROM transactions
         WHERE is_active = 1
         ORDER BY recorded_at DESC, recorded_seq DESC
         LIMIT ?1",
    )
    .bind(limit)
    .fetch_all(store.pool())
    .await?;
    rows.into_iter().map(TryInto::try_into).collect()
}

pub async fn list_by_account(
    details: &requests::ListByAccount,
    store: &Store,
) -> Result<Vec<responses::TransactionVersion>, StoreError> {
    let cleared_only = details.status == StatusFilter::Cleared;
    let rows = sqlx::query_as::<_, TxnRow>(
        "SELECT * FROM transactions
         WHERE is_active = 1
           AND account_id = ?1
           AND (?2 IS NULL OR transaction_date >= ?2)
           AND (?3 IS NULL OR transaction_date <= ?3)
           AND (?4 = 0 OR status = 'cleared')
         ORDER BY transaction_date DESC, recorded_at DESC,
                  recorded_seq DESC
         LIMIT ?5",
    )
    .bind(&details.account_id)
    .bind(details.start_date.map(|d| d.to_string()))
    .bind(details.end_date.map(|d| d.to_string()))
    .bind(cleared_only)
    .bind(details.limit)
    .fetch_all(store.pool())
    .await?;
    rows.into_iter().map(TryInto::try_into).collect()
}
