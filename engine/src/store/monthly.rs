//! Maintenance of the derived `budget_category_monthly_state` cache.
//!
//! Rows materialize lazily: the first touch of a `(category, month)` seeds
//! `available_minor` from the latest earlier row (rollover). Because later
//! months may already exist when a backdated mutation lands, every
//! `available_minor` delta is propagated to the category's later rows, so
//! the rollover identity holds for every materialized month and incremental
//! maintenance stays equal to a full rebuild.

use jiff::civil::Date;
use sqlx::FromRow;

use payloads::{CategoryId, responses};

use crate::store::categories::CategoryRow;
use crate::store::{StoreError, UnitOfWork, parse_date};

#[derive(Debug, Clone, FromRow)]
pub(crate) struct StateRow {
    pub category_id: CategoryId,
    pub month_start: String,
    pub allocated_minor: i64,
    pub inflow_minor: i64,
    pub activity_minor: i64,
    pub available_minor: i64,
}

impl TryFrom<StateRow> for responses::MonthlyCategoryState {
    type Error = StoreError;

    fn try_from(row: StateRow) -> Result<Self, Self::Error> {
        Ok(responses::MonthlyCategoryState {
            category_id: row.category_id,
            month_start: parse_date(&row.month_start)?,
            allocated_minor: row.allocated_minor,
            inflow_minor: row.inflow_minor,
            activity_minor: row.activity_minor,
            available_minor: row.available_minor,
        })
    }
}

/// How one transaction amount lands in the monthly state. Transactions
/// categorized to `available_to_budget` are income and count as inflow;
/// everything else is activity. Only non-system envelope categories adjust
/// `available_minor`.
pub(crate) fn transaction_deltas(
    category: &CategoryRow,
    amount_minor: i64,
) -> (i64, i64, i64) {
    let is_rta = category.id == CategoryId::available_to_budget();
    let inflow = if is_rta { amount_minor } else { 0 };
    let activity = if is_rta { 0 } else { amount_minor };
    let available = if category.is_envelope && !category.is_system {
        amount_minor
    } else {
        0
    };
    (inflow, activity, available)
}

/// Materialize the row for `(category, month)` if missing, carrying the
/// previous month's `available_minor` forward.
pub(crate) async fn ensure_row(
    category_id: &CategoryId,
    month: Date,
    uow: &mut UnitOfWork<'_>,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO budget_category_monthly_state
            (category_id, month_start, allocated_minor, inflow_minor,
             activity_minor, available_minor)
         SELECT ?1, ?2, 0, 0, 0, COALESCE(
             (SELECT available_minor FROM budget_category_monthly_state
              WHERE category_id = ?1 AND month_start < ?2
              ORDER BY month_start DESC LIMIT 1),
             0)
         WHERE NOT EXISTS (
             SELECT 1 FROM budget_category_monthly_state
             WHERE category_id = ?1 AND month_start = ?2)",
    )
    .bind(category_id)
    .bind(month.to_string())
    .execute(&mut **uow)
    .await?;
    Ok(())
}

/// Apply deltas to the `(category, month)` row, materializing it first and
/// rolling any `available_minor` change into later months.
pub(crate) async fn apply(
    category_id: &CategoryId,
    month: Date,
    allocated_delta: i64,
    inflow_delta: i64,
    activity_delta: i64,
    available_delta: i64,
    uow: &mut UnitOfWork<'_>,
) -> Result<(), StoreError> {
    ensure_row(category_id, month, uow).await?;
    sqlx::query(
        "UPDATE budget_category_monthly_state
         SET allocated_minor = allocated_minor + ?3,
             inflow_minor = inflow_minor + ?4,
             activity_minor = activity_minor + ?5,
             available_minor = available_minor + ?6
         WHERE category_id = ?1 AND month_start = ?2",
    )
    .bind(category_id)
    .bind(month.to_string())
    .bind(allocated_delta)
    .bind(inflow_delta)
    .bind(activity_delta)
    .bind(available_delta)
    .execute(&mut **uow)
    .await?;

    if available_delta != 0 {
        sqlx::query(
            "UPDATE budget_category_monthly_state
             SET available_minor = available_minor + ?3
             WHERE category_id = ?1 AND month_start > ?2",
        )
        .bind(category_id)
        .bind(month.to_string())
        .bind(available_delta)
        .execute(&mut **uow)
        .await?;
    }
    Ok(())
}

/// The exact row for `(category, month)`, if materialized.
pub(crate) async fn get_row(
    category_id: &CategoryId,
    month: Date,
    uow: &mut UnitOfWork<'_>,
) -> Result<Option<responses::MonthlyCategoryState>, StoreError> {
    let row = sqlx::query_as::<_, StateRow>(
        "SELECT * FROM budget_category_monthly_state
         WHERE category_id = ?1 AND month_start = ?2",
    )
    .bind(category_id)
    .bind(month.to_string())
    .fetch_optional(&mut **uow)
    .await?;
    row.map(TryInto::try_into).transpose()
}
