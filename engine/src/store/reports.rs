//! Read models over the ledger: net worth, balance history, Ready-to-Assign,
//! and the budget category listing.
//!
//! These are pure queries. Daily series are absolute balances built from a
//! baseline plus running per-day flows; investment positions use as-of price
//! joins and tangibles their SCD-2 validity windows.

use std::collections::HashMap;

use jiff::civil::Date;
use jiff::tz::TimeZone;
use sqlx::FromRow;
use sqlx::types::Json;

use payloads::{
    AccountClass, AccountDetailFields, AccountId, CategoryId, StatusFilter,
    requests, responses,
};

use crate::money::month_start;
use crate::store::categories::CategoryRow;
use crate::store::monthly::StateRow;
use crate::store::{
    HISTORY_MAX_DAYS, Store, StoreError, parse_date, ts_from_micros,
};

/// Ready-to-Assign for a month: on-budget balances minus everything already
/// committed to envelopes (rollover included).
pub async fn ready_to_assign(
    month: Date,
    store: &Store,
) -> Result<responses::ReadyToAssign, StoreError> {
    let month = month_start(month);
    let on_budget: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(current_balance_minor), 0) FROM accounts
         WHERE is_active = 1 AND account_role = 'on_budget'",
    )
    .fetch_one(store.pool())
    .await?;

    let committed: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(s.available_minor), 0)
         FROM categories c
         JOIN budget_category_monthly_state s
           ON s.category_id = c.id
          AND s.month_start = (
              SELECT MAX(month_start)
              FROM budget_category_monthly_state
              WHERE category_id = c.id AND month_start <= ?1)
         WHERE c.is_envelope = 1 AND c.is_system = 0 AND c.is_active = 1",
    )
    .bind(month.to_string())
    .fetch_one(store.pool())
    .await?;

    Ok(responses::ReadyToAssign {
        month_start: month,
        amount_minor: on_budget - committed,
    })
}

/// Non-system categories with their monthly state for one month. Months
/// without a materialized row carry the latest earlier `available_minor`
/// forward and show zero activity.
pub async fn list_budget_categories(
    month: Date,
    store: &Store,
) -> Result<Vec<responses::CategoryWithState>, StoreError> {
    let month = month_start(month);
    let categories = sqlx::query_as::<_, CategoryRow>(
        "SELECT c.* FROM categories c
         LEFT JOIN category_groups g ON c.group_id = g.id
         WHERE c.is_active = 1 AND c.is_system = 0
         ORDER BY COALESCE(g.sort_order, 0), c.id",
    )
    .fetch_all(store.pool())
    .await?;

    let mut out = Vec::with_capacity(categories.len());
    for category in categories {
        let row = sqlx::query_as::<_, StateRow>(
            "SELECT * FROM budget_category_monthly_state
             WHERE category_id = ?1 AND month_start <= ?2
             ORDER BY month_start DESC
             LIMIT 1",
        )
        .bind(&category.id)
        .bind(month.to_string())
        .fetch_optional(store.pool())
        .await?;

        let state = match row {
            Some(row) if row.month_start == month.to_string() => {
                row.try_into()?
            }
            Some(row) => responses::MonthlyCategoryState {
                category_id: category.id.clone(),
                month_start: month,
                allocated_minor: 0,
                inflow_minor: 0,
                activity_minor: 0,
                available_minor: row.available_minor,
            },
            None => responses::MonthlyCategoryState {
                category_id: category.id.clone(),
                month_start: month,
                allocated_minor: 0,
                inflow_minor: 0,
                activity_minor: 0,
                available_minor: 0,
            },
        };
        out.push(responses::CategoryWithState {
            category: category.try_into()?,
            state,
        });
    }
    Ok(out)
}

#[derive(Debug, FromRow)]
struct ClassBalance {
    account_class: AccountClass,
    total_minor: i64,
}

#[derive(Debug, FromRow)]
struct HoldingWindowRow {
    symbol: String,
    quantity: f64,
    valid_from: i64,
    valid_to: Option<i64>,
}

#[derive(Debug, FromRow)]
struct DetailWindowRow {
    fields: Json<AccountDetailFields>,
    valid_from: i64,
    valid_to: Option<i64>,
}

#[derive(Debug, FromRow)]
struct PriceRow {
    symbol: String,
    quote_date: String,
    close_minor: i64,
}

fn position_value(quantity: f64, close_minor: i64) -> i64 {
    (quantity * close_minor as f64).round() as i64
}

/// Current net worth. Investment accounts are valued from holdings and
/// declared uninvested cash when present, otherwise from their ledger
/// balance; tangibles from the latest active fair-value row.
pub async fn net_worth_current(
    store: &Store,
) -> Result<responses::NetWorthSnapshot, StoreError> {
    let class_balances = sqlx::query_as::<_, ClassBalance>(
        "SELECT account_class,
                COALESCE(SUM(current_balance_minor), 0) AS total_minor
         FROM accounts
         WHERE is_active = 1
         GROUP BY account_class",
    )
    .fetch_all(store.pool())
    .await?;

    let mut assets_minor = 0;
    let mut liabilities_minor = 0;
    for row in &class_balances {
        match row.account_class {
            AccountClass::Investment => {}
            AccountClass::Credit | AccountClass::Loan => {
                liabilities_minor += row.total_minor;
            }
            _ => assets_minor += row.total_minor,
        }
    }

    let mut positions_minor = 0;
    let investment_accounts: Vec<AccountId> = sqlx::query_scalar(
        "SELECT id FROM accounts
         WHERE is_active = 1 AND account_class = 'investment'",
    )
    .fetch_all(store.pool())
    .await?;
    for account_id in &investment_accounts {
        positions_minor +=
            current_position_value(account_id, store).await?;
    }

    let tangibles_minor: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(
             json_extract(d.fields, '$.fair_value_minor')), 0)
         FROM account_details d
         JOIN accounts a ON d.account_id = a.id
         WHERE d.is_active = 1 AND a.is_active = 1
           AND a.account_class = 'tangible'",
    )
    .fetch_one(store.pool())
    .await?;

    Ok(responses::NetWorthSnapshot {
        assets_minor,
        liabilities_minor,
        positions_minor,
        tangibles_minor,
        net_worth_minor: assets_minor
            + liabilities_minor
            + positions_minor
            + tangibles_minor,
    })
}

async fn current_position_value(
    account_id: &AccountId,
    store: &Store,
) -> Result<i64, StoreError> {
    let holdings = sqlx::query_as::<_, HoldingWindowRow>(
        "SELECT symbol, quantity, valid_from, valid_to
         FROM investment_holdings
         WHERE account_id = ?1 AND is_active = 1",
    )
    .bind(account_id)
    .fetch_all(store.pool())
    .await?;

    let uninvested: Option<i64> = sqlx::query_scalar(
        "SELECT json_extract(fields, '$.uninvested_cash_minor')
         FROM account_details
         WHERE account_id = ?1 AND is_active = 1",
    )
    .bind(account_id)
    .fetch_optional(store.pool())
    .await?
    .flatten();

    let declared_cash = uninvested.unwrap_or(0);
    if holdings.is_empty() && declared_cash == 0 {
        // No declared position data: the ledger balance is authoritative.
        let balance: i64 = sqlx::query_scalar(
            "SELECT current_balance_minor FROM accounts WHERE id = ?1",
        )
        .bind(account_id)
        .fetch_one(store.pool())
        .await?;
        return Ok(balance);
    }

    let mut value = declared_cash;
    for holding in &holdings {
        let close: Option<i64> = sqlx::query_scalar(
            "SELECT close_minor FROM market_prices
             WHERE symbol = ?1
             ORDER BY quote_date DESC
             LIMIT 1",
        )
        .bind(&holding.symbol)
        .fetch_optional(store.pool())
        .await?;
        if let Some(close) = close {
            value += position_value(holding.quantity, close);
        }
    }
    Ok(value)
}

fn check_range(start: Date, end: Date) -> Result<i64, StoreError> {
    if end < start {
        return Err(StoreError::EmptyRange);
    }
    let days = start
        .until(end)
        .map_err(|e| {
            StoreError::UnexpectedError(anyhow::anyhow!(
                "date range arithmetic failed: {e}"
            ))
        })?
        .get_days() as i64;
    if days > HISTORY_MAX_DAYS {
        return Err(StoreError::RangeTooLong { days });
    }
    Ok(days)
}

fn days_inclusive(start: Date, end: Date) -> Vec<Date> {
    let mut out = Vec::new();
    let mut day = start;
    while day <= end {
        out.push(day);
        day = match day.tomorrow() {
            Ok(next) => next,
            Err(_) => break,
        };
    }
    out
}

/// Absolute daily balance series for one account: the balance of everything
/// dated before the range start, plus the running sum of per-day net flow.
pub async fn account_history(
    details: &requests::GetAccountHistory,
    store: &Store,
) -> Result<Vec<responses::BalancePoint>, StoreError> {
    check_range(details.start_date, details.end_date)?;
    // Account must exist even if it has no rows in range.
    let exists: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM accounts WHERE id = ?1",
    )
    .bind(&details.account_id)
    .fetch_optional(store.pool())
    .await?;
    if exists.is_none() {
        return Err(StoreError::AccountNotFound);
    }

    let cleared_only = details.status == StatusFilter::Cleared;
    let baseline: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount_minor), 0) FROM transactions
         WHERE account_id = ?1 AND is_active = 1
           AND transaction_date < ?2
           AND (?3 = 0 OR status = 'cleared')",
    )
    .bind(&details.account_id)
    .bind(details.start_date.to_string())
    .bind(cleared_only)
    .fetch_one(store.pool())
    .await?;

    #[derive(FromRow)]
    struct DayFlow {
        transaction_date: String,
        flow_minor: i64,
    }
    let flows = sqlx::query_as::<_, DayFlow>(
        "SELECT transaction_date,
                COALESCE(SUM(amount_minor), 0) AS flow_minor
         FROM transactions
         WHERE account_id = ?1 AND is_active = 1
           AND transaction_date >= ?2 AND transaction_date <= ?3
           AND (?4 = 0 OR status = 'cleared')
         GROUP BY transaction_date",
    )
    .bind(&details.account_id)
    .bind(details.start_date.to_string())
    .bind(details.end_date.to_string())
    .bind(cleared_only)
    .fetch_all(store.pool())
    .await?;
    let mut by_day = HashMap::new();
    for row in flows {
        by_day.insert(parse_date(&row.transaction_date)?, row.flow_minor);
    }

    let mut balance = baseline;
    let mut series = Vec::new();
    for day in days_inclusive(details.start_date, details.end_date) {
        balance += by_day.get(&day).copied().unwrap_or(0);
        series.push(responses::BalancePoint {
            as_of_date: day,
            balance_minor: balance,
        });
    }
    Ok(series)
}

fn window_covers(
    valid_from: i64,
    valid_to: Option<i64>,
    day: Date,
) -> Result<bool, StoreError> {
    let from_date =
        ts_from_micros(valid_from)?.to_zoned(TimeZone::UTC).date();
    if from_date > day {
        return Ok(false);
    }
    match valid_to {
        None => Ok(true),
        Some(to) => {
            let to_date = ts_from_micros(to)?.to_zoned(TimeZone::UTC).date();
            Ok(to_date > day)
        }
    }
}

/// Net worth as an absolute daily series: ledger streams for asset and
/// liability accounts, as-of close prices for investment holdings, and
/// SCD-2 fair-value windows for tangibles.
pub async fn net_worth_history(
    start: Date,
    end: Date,
    store: &Store,
) -> Result<Vec<responses::BalancePoint>, StoreError> {
    check_range(start, end)?;

    // Ledger streams for everything that is not valued via positions;
    // tangible ledger events stay in, matching the current snapshot.
    let baseline: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(t.amount_minor), 0)
         FROM transactions t
         JOIN accounts a ON t.account_id = a.id
         WHERE t.is_active = 1
           AND a.account_class <> 'investment'
           AND t.transaction_date < ?1",
    )
    .bind(start.to_string())
    .fetch_one(store.pool())
    .await?;

    #[derive(FromRow)]
    struct DayFlow {
        transaction_date: String,
        flow_minor: i64,
    }
    let flows = sqlx::query_as::<_, DayFlow>(
        "SELECT t.transaction_date,
                COALESCE(SUM(t.amount_minor), 0) AS flow_minor
         FROM transactions t
         JOIN accounts a ON t.account_id = a.id
         WHERE t.is_active = 1
           AND a.account_class <> 'investment'
           AND t.transaction_date >= ?1 AND t.transaction_date <= ?2
         GROUP BY t.transaction_date",
    )
    .bind(start.to_string())
    .bind(end.to_string())
    .fetch_all(store.pool())
    .await?;
    let mut ledger_by_day = HashMap::new();
    for row in flows {
        ledger_by_day
            .insert(parse_date(&row.transaction_date)?, row.flow_minor);
    }

    // Investment windows: all holding versions plus detail versions, walked
    // per day against the as-of price table.
    let holdings = sqlx::query_as::<_, HoldingWindowRow>(
        "SELECT h.symbol, h.quantity, h.valid_from, h.valid_to
         FROM investment_holdings h
         JOIN accounts a ON h.account_id = a.id
         WHERE a.account_class = 'investment'",
    )
    .fetch_all(store.pool())
    .await?;
    let investment_details = sqlx::query_as::<_, DetailWindowRow>(
        "SELECT d.fields, d.valid_from, d.valid_to
         FROM account_details d
         JOIN accounts a ON d.account_id = a.id
         WHERE a.account_class = 'investment'",
    )
    .fetch_all(store.pool())
    .await?;
    let prices = sqlx::query_as::<_, PriceRow>(
        "SELECT symbol, quote_date, close_minor FROM market_prices
         ORDER BY symbol, quote_date",
    )
    .fetch_all(store.pool())
    .await?;
    let mut price_series: HashMap<String, Vec<(Date, i64)>> = HashMap::new();
    for row in prices {
        price_series
            .entry(row.symbol)
            .or_default()
            .push((parse_date(&row.quote_date)?, row.close_minor));
    }

    let tangible_details = sqlx::query_as::<_, DetailWindowRow>(
        "SELECT d.fields, d.valid_from, d.valid_to
         FROM account_details d
         JOIN accounts a ON d.account_id = a.id
         WHERE a.account_class = 'tangible'",
    )
    .fetch_all(store.pool())
    .await?;

    let as_of_close = |symbol: &str, day: Date| -> Option<i64> {
        let series = price_series.get(symbol)?;
        series
            .iter()
            .take_while(|(quote_date, _)| *quote_date <= day)
            .last()
            .map(|(_, close)| *close)
    };

    let mut ledger_balance = baseline;
    let mut series = Vec::new();
    for day in days_inclusive(start, end) {
        ledger_balance += ledger_by_day.get(&day).copied().unwrap_or(0);

        let mut positions = 0;
        for holding in &holdings {
            if window_covers(holding.valid_from, holding.valid_to, day)? {
                if let Some(close) = as_of_close(&holding.symbol, day) {
                    positions += position_value(holding.quantity, close);
                }
            }
        }
        for detail in &investment_details {
            if window_covers(detail.valid_from, detail.valid_to, day)? {
                if let AccountDetailFields::Investment {
                    uninvested_cash_minor,
                } = &detail.fields.0
                {
                    positions += *uninvested_cash_minor;
                }
            }
        }

        let mut tangibles = 0;
        for detail in &tangible_details {
            if window_covers(detail.valid_from, detail.valid_to, day)? {
                if let AccountDetailFields::Tangible { fair_value_minor } =
                    &detail.fields.0
                {
                    tangibles += *fair_value_minor;
                }
            }
        }

        series.push(responses::BalancePoint {
            as_of_date: day,
            balance_minor: ledger_balance + positions + tangibles,
        });
    }
    Ok(series)
}

/// Monthly state for a single category, rollover-aware.
pub async fn category_month_state(
    category_id: &CategoryId,
    month: Date,
    store: &Store,
) -> Result<responses::MonthlyCategoryState, StoreError> {
    let month = month_start(month);
    let row = sqlx::query_as::<_, StateRow>(
        "SELECT * FROM budget_category_monthly_state
         WHERE category_id = ?1 AND month_start <= ?2
         ORDER BY month_start DESC
         LIMIT 1",
    )
    .bind(category_id)
    .bind(month.to_string())
    .fetch_optional(store.pool())
    .await?;
    Ok(match row {
        Some(row) if row.month_start == month.to_string() => {
            row.try_into()?
        }
        Some(row) => responses::MonthlyCategoryState {
            category_id: category_id.clone(),
            month_start: month,
            allocated_minor: 0,
            inflow_minor: 0,
            activity_minor: 0,
            available_minor: row.available_minor,
        },
        None => responses::MonthlyCategoryState {
            category_id: category_id.clone(),
            month_start: month,
            allocated_minor: 0,
            inflow_minor: 0,
            activity_minor: 0,
            available_minor: 0,
        },
    })
}
