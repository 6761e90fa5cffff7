//! Deterministic recomputation of all derived state from the authoritative
//! ledger: account balance caches and the monthly category state table.
//!
//! The result must equal what step-by-step maintenance would have produced,
//! with one deliberate exception: rows whose every figure has returned to
//! zero (left behind by edits that moved a transaction out of a month) are
//! not rematerialized.

use std::collections::HashMap;

use sqlx::FromRow;

use payloads::CategoryId;

use crate::store::{Store, StoreError, UnitOfWork};

#[derive(Debug, Default, Clone, Copy)]
struct MonthSums {
    allocated_minor: i64,
    inflow_minor: i64,
    activity_minor: i64,
}

#[derive(Debug, FromRow)]
struct CategoryMonthSum {
    category_id: CategoryId,
    month: String,
    total_minor: i64,
}

#[derive(Debug, FromRow)]
struct CategoryFlags {
    id: CategoryId,
    is_system: bool,
    is_envelope: bool,
}

/// Recompute every account's balance cache and the whole monthly-state
/// table inside the given unit of work.
pub async fn rebuild_tx(uow: &mut UnitOfWork<'_>) -> Result<(), StoreError> {
    // Balance caches straight from the active rows.
    sqlx::query(
        "UPDATE accounts
         SET current_balance_minor = COALESCE(
             (SELECT SUM(t.amount_minor) FROM transactions t
              WHERE t.account_id = accounts.id AND t.is_active = 1),
             0)",
    )
    .execute(&mut **uow)
    .await?;

    sqlx::query("DELETE FROM budget_category_monthly_state")
        .execute(&mut **uow)
        .await?;

    let flags = sqlx::query_as::<_, CategoryFlags>(
        "SELECT id, is_system, is_envelope FROM categories",
    )
    .fetch_all(&mut **uow)
    .await?;
    let flags: HashMap<CategoryId, (bool, bool)> = flags
        .into_iter()
        .map(|f| (f.id, (f.is_system, f.is_envelope)))
        .collect();

    fn entry<'a>(
        sums: &'a mut HashMap<CategoryId, HashMap<String, MonthSums>>,
        category_id: &CategoryId,
        month: &str,
    ) -> &'a mut MonthSums {
        sums.entry(category_id.clone())
            .or_default()
            .entry(month.to_string())
            .or_default()
    }

    let mut sums: HashMap<CategoryId, HashMap<String, MonthSums>> =
        HashMap::new();
    let rta = CategoryId::available_to_budget();
    let transaction_sums = sqlx::query_as::<_, CategoryMonthSum>(
        "SELECT category_id,
                substr(transaction_date, 1, 7) || '-01' AS month,
                SUM(amount_minor) AS total_minor
         FROM transactions
         WHERE is_active = 1
         GROUP BY category_id, month",
    )
    .fetch_all(&mut **uow)
    .await?;
    for row in &transaction_sums {
        let cell = entry(&mut sums, &row.category_id, &row.month);
        if row.category_id == rta {
            cell.inflow_minor += row.total_minor;
        } else {
            cell.activity_minor += row.total_minor;
        }
    }

    let incoming = sqlx::query_as::<_, CategoryMonthSum>(
        "SELECT to_category_id AS category_id, month_start AS month,
                SUM(amount_minor) AS total_minor
         FROM budget_allocations
         WHERE is_active = 1
         GROUP BY to_category_id, month_start",
    )
    .fetch_all(&mut **uow)
    .await?;
    for row in &incoming {
        entry(&mut sums, &row.category_id, &row.month).allocated_minor +=
            row.total_minor;
    }
    let outgoing = sqlx::query_as::<_, CategoryMonthSum>(
        "SELECT from_category_id AS category_id, month_start AS month,
                SUM(amount_minor) AS total_minor
         FROM budget_allocations
         WHERE is_active = 1
         GROUP BY from_category_id, month_start",
    )
    .fetch_all(&mut **uow)
    .await?;
    for row in &outgoing {
        entry(&mut sums, &row.category_id, &row.month).allocated_minor -=
            row.total_minor;
    }

    // Walk each category's months in ascending order, carrying the rollover.
    let mut rows_written = 0u64;
    for (category_id, months) in &sums {
        let (is_system, is_envelope) = flags
            .get(category_id)
            .copied()
            .ok_or(StoreError::CategoryNotFound)?;
        let mut months: Vec<_> = months.iter().collect();
        months.sort_by(|a, b| a.0.cmp(b.0));

        let mut available = 0i64;
        for (month, cell) in months {
            available = if is_envelope && !is_system {
                available
                    + cell.allocated_minor
                    + cell.inflow_minor
                    + cell.activity_minor
            } else if *category_id == rta {
                // The pseudo-category tracks net envelope moves only.
                available + cell.allocated_minor
            } else {
                0
            };
            sqlx::query(
                "INSERT INTO budget_category_monthly_state
                    (category_id, month_start, allocated_minor,
                     inflow_minor, activity_minor, available_minor)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(category_id)
            .bind(month)
            .bind(cell.allocated_minor)
            .bind(cell.inflow_minor)
            .bind(cell.activity_minor)
            .bind(available)
            .execute(&mut **uow)
            .await?;
            rows_written += 1;
        }
    }

    tracing::info!(monthly_rows = rows_written, "rebuilt derived state");
    Ok(())
}

/// Replace all derived state atomically.
pub async fn rebuild(store: &Store) -> Result<(), StoreError> {
    let mut uow = store.begin().await?;
    rebuild_tx(&mut uow).await?;
    uow.commit().await?;
    Ok(())
}
