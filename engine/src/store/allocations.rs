//! Allocation core: SCD-2 envelope moves.
//!
//! An allocation moves budgeted money between two categories for one month.
//! `from_category_id` is never null; Ready-to-Assign is represented by the
//! `available_to_budget` pseudo-category, whose monthly row tracks net
//! movement symmetrically. Overspending is allowed: `available_minor` may go
//! negative and is surfaced as-is.

use sqlx::FromRow;
use uuid::Uuid;

use payloads::{
    AllocationId, AllocationVersionId, CategoryId, requests, responses,
};

use crate::money::month_start;
use crate::store::categories::fetch_category;
use crate::store::{
    Store, StoreError, UnitOfWork, micros, monthly, opt_ts_from_micros,
    parse_date, ts_from_micros,
};
use crate::time::{RecordStamp, TimeSource};

#[derive(Debug, Clone, FromRow)]
pub(crate) struct AllocRow {
    pub version_id: AllocationVersionId,
    pub allocation_id: AllocationId,
    pub allocation_date: String,
    pub month_start: String,
    pub from_category_id: CategoryId,
    pub to_category_id: CategoryId,
    pub amount_minor: i64,
    pub memo: Option<String>,
    pub recorded_at: i64,
    pub valid_from: i64,
    pub valid_to: Option<i64>,
    pub is_active: bool,
}

impl TryFrom<AllocRow> for responses::AllocationVersion {
    type Error = StoreError;

    fn try_from(row: AllocRow) -> Result<Self, Self::Error> {
        Ok(responses::AllocationVersion {
            version_id: row.version_id,
            allocation_id: row.allocation_id,
            allocation_date: parse_date(&row.allocation_date)?,
            month_start: parse_date(&row.month_start)?,
            from_category_id: row.from_category_id,
            to_category_id: row.to_category_id,
            amount_minor: row.amount_minor,
            memo: row.memo,
            recorded_at: ts_from_micros(row.recorded_at)?,
            valid_from: ts_from_micros(row.valid_from)?,
            valid_to: opt_ts_from_micros(row.valid_to)?,
            is_active: row.is_active,
        })
    }
}

pub(crate) async fn fetch_active_version(
    allocation_id: AllocationId,
    uow: &mut UnitOfWork<'_>,
) -> Result<AllocRow, StoreError> {
    sqlx::query_as::<_, AllocRow>(
        "SELECT * FROM budget_allocations
         WHERE allocation_id = ?1 AND is_active = 1",
    )
    .bind(allocation_id)
    .fetch_optional(&mut **uow)
    .await?
    .ok_or(StoreError::AllocationNotFound)
}

async fn validate_endpoints(
    from: &CategoryId,
    to: &CategoryId,
    amount_minor: i64,
    memo: Option<&str>,
    uow: &mut UnitOfWork<'_>,
) -> Result<(), StoreError> {
    if from == to {
        return Err(StoreError::SameCategory);
    }
    if amount_minor <= 0 {
        return Err(StoreError::AmountMustBePositive);
    }
    if memo.is_some_and(|m| m.len() > requests::MEMO_MAX_LEN) {
        return Err(StoreError::FieldTooLong);
    }
    for category_id in [from, to] {
        let category = fetch_category(category_id, uow).await?;
        if !category.is_active {
            return Err(StoreError::CategoryNotFound);
        }
        if !category.allow_allocations {
            return Err(StoreError::CategoryDisallowsAllocations);
        }
    }
    Ok(())
}

/// Move the allocated amount between the two endpoints' monthly rows. Both
/// sides mirror each other, `available_to_budget` included.
async fn apply_endpoints(
    row: &AllocRow,
    sign: i64,
    uow: &mut UnitOfWork<'_>,
) -> Result<(), StoreError> {
    let month = parse_date(&row.month_start)?;
    let amount = sign * row.amount_minor;
    monthly::apply(&row.to_category_id, month, amount, 0, 0, amount, uow)
        .await?;
    monthly::apply(&row.from_category_id, month, -amount, 0, 0, -amount, uow)
        .await?;
    Ok(())
}

async fn insert_version(
    allocation_id: AllocationId,
    details: &requests::CreateAllocation,
    stamp: RecordStamp,
    uow: &mut UnitOfWork<'_>,
) -> Result<AllocRow, StoreError> {
    let row = sqlx::query_as::<_, AllocRow>(
        "INSERT INTO budget_allocations
            (version_id, allocation_id, allocation_date, month_start,
             from_category_id, to_category_id, amount_minor, memo,
             recorded_at, recorded_seq, valid_from, valid_to, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?9, NULL, 1)
         RETURNING *",
    )
    .bind(AllocationVersionId(Uuid::new_v4()))
    .bind(allocation_id)
    .bind(details.allocation_date.to_string())
    .bind(month_start(details.allocation_date).to_string())
    .bind(&details.from_category_id)
    .bind(&details.to_category_id)
    .bind(details.amount_minor)
    .bind(&details.memo)
    .bind(micros(stamp.at))
    .bind(stamp.seq)
    .fetch_one(&mut **uow)
    .await?;
    Ok(row)
}

async fn retire_version(
    version_id: AllocationVersionId,
    stamp: RecordStamp,
    uow: &mut UnitOfWork<'_>,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE budget_allocations
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

pub async fn allocate_tx(
    details: &requests::CreateAllocation,
    time_source: &TimeSource,
    uow: &mut UnitOfWork<'_>,
) -> Result<responses::AllocationVersion, StoreError> {
    validate_endpoints(
        &details.from_category_id,
        &details.to_category_id,
        details.amount_minor,
        details.memo.as_deref(),
        uow,
    )
    .await?;

    let stamp = time_source.stamp();
    let allocation_id = AllocationId(Uuid::new_v4());
    let row = insert_version(allocation_id, details, stamp, uow).await?;
    apply_endpoints(&row, 1, uow).await?;

    tracing::info!(allocation = %allocation_id,
        from = %details.from_category_id, to = %details.to_category_id,
        amount = details.amount_minor, "created allocation");
    row.try_into()
}

pub async fn allocate(
    details: &requests::CreateAllocation,
    time_source: &TimeSource,
    store: &Store,
) -> Result<responses::AllocationVersion, StoreError> {
    let mut uow = store.begin().await?;
    let allocation = allocate_tx(details, time_source, &mut uow).await?;
    uow.commit().await?;
    Ok(allocation)
}

pub async fn edit_tx(
    details: &requests::EditAllocation,
    time_source: &TimeSource,
    uow: &mut UnitOfWork<'_>,
) -> Result<responses::AllocationVersion, StoreError> {
    validate_endpoints(
        &details.from_category_id,
        &details.to_category_id,
        details.amount_minor,
        details.memo.as_deref(),
        uow,
    )
    .await?;

    let old = fetch_active_version(details.allocation_id, uow).await?;
    let stamp = time_source.stamp();
    apply_endpoints(&old, -1, uow).await?;
    retire_version(old.version_id, stamp, uow).await?;

    let replacement = requests::CreateAllocation {
        allocation_date: details.allocation_date,
        from_category_id: details.from_category_id.clone(),
        to_category_id: details.to_category_id.clone(),
        amount_minor: details.amount_minor,
        memo: details.memo.clone(),
    };
    let row =
        insert_version(details.allocation_id, &replacement, stamp, uow)
            .await?;
    apply_endpoints(&row, 1, uow).await?;

    tracing::info!(allocation = %details.allocation_id,
        amount = details.amount_minor, "edited allocation");
    row.try_into()
}

pub async fn edit(
    details: &requests::EditAllocation,
    time_source: &TimeSource,
    store: &Store,
) -> Result<responses::AllocationVersion, StoreError> {
    let mut uow = store.begin().await?;
    let allocation = edit_tx(details, time_source, &mut uow).await?;
    uow.commit().await?;
    Ok(allocation)
}

pub async fn delete_tx(
    allocation_id: AllocationId,
    time_source: &TimeSource,
    uow: &mut UnitOfWork<'_>,
) -> Result<(), StoreError> {
    let old = fetch_active_version(allocation_id, uow).await?;
    let stamp = time_source.stamp();
    apply_endpoints(&old, -1, uow).await?;
    retire_version(old.version_id, stamp, uow).await?;
    tracing::info!(allocation = %allocation_id, "deleted allocation");
    Ok(())
}

pub async fn delete(
    allocation_id: AllocationId,
    time_source: &TimeSource,
    store: &Store,
) -> Result<(), StoreError> {
    let mut uow = store.begin().await?;
    delete_tx(allocation_id, time_source, &mut uow).await?;
    uow.commit().await?;
    Ok(())
}

/// Active allocations touching a month, newest first.
pub async fn list_for_month(
    month: jiff::civil::Date,
    store: &Store,
) -> Result<Vec<responses::AllocationVersion>, StoreError> {
    let rows = sqlx::query_as::<_, AllocRow>(
        "SELECT * FROM budget_allocations
         WHERE is_active = 1 AND month_start = ?1
         ORDER BY recorded_at DESC, recorded_seq DESC",
    )
    .bind(month_start(month).to_string())
    .fetch_all(store.pool())
    .await?;
    rows.into_iter().map(TryInto::try_into).collect()
}
