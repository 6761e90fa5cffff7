//! Reconciliation checkpoints.
//!
//! A checkpoint is an immutable assertion that the account's cleared balance
//! equalled the statement balance at commit time. Commits only succeed when
//! the worksheet difference is exactly zero, evaluated inside the same unit
//! of work that appends the row. Backdated changes against an already
//! reconciled period are surfaced as a drift report; history is never
//! rewritten here.

use sqlx::FromRow;
use uuid::Uuid;

use payloads::{AccountId, ReconciliationId, requests, responses};

use crate::store::accounts::fetch_account;
use crate::store::ledger::TxnRow;
use crate::store::{
    Store, StoreError, UnitOfWork, micros, parse_date, ts_from_micros,
};
use crate::time::TimeSource;

#[derive(Debug, Clone, FromRow)]
pub(crate) struct ReconRow {
    pub id: ReconciliationId,
    pub account_id: AccountId,
    pub created_at: i64,
    pub recorded_seq: i64,
    pub statement_date: String,
    pub statement_balance_minor: i64,
    pub previous_reconciliation_id: Option<ReconciliationId>,
}

impl TryFrom<ReconRow> for responses::Reconciliation {
    type Error = StoreError;

    fn try_from(row: ReconRow) -> Result<Self, Self::Error> {
        Ok(responses::Reconciliation {
            reconciliation_id: row.id,
            account_id: row.account_id,
            created_at: ts_from_micros(row.created_at)?,
            statement_date: parse_date(&row.statement_date)?,
            statement_balance_minor: row.statement_balance_minor,
            previous_reconciliation_id: row.previous_reconciliation_id,
        })
    }
}

pub(crate) async fn latest_tx(
    account_id: &AccountId,
    uow: &mut UnitOfWork<'_>,
) -> Result<Option<ReconRow>, StoreError> {
    Ok(sqlx::query_as::<_, ReconRow>(
        "SELECT * FROM account_reconciliations
         WHERE account_id = ?1
         ORDER BY created_at DESC, recorded_seq DESC
         LIMIT 1",
    )
    .bind(account_id)
    .fetch_optional(&mut **uow)
    .await?)
}

/// Most recent checkpoint for the account, if any.
pub async fn latest(
    account_id: &AccountId,
    store: &Store,
) -> Result<Option<responses::Reconciliation>, StoreError> {
    let row = sqlx::query_as::<_, ReconRow>(
        "SELECT * FROM account_reconciliations
         WHERE account_id = ?1
         ORDER BY created_at DESC, recorded_seq DESC
         LIMIT 1",
    )
    .bind(account_id)
    .fetch_optional(store.pool())
    .await?;
    row.map(TryInto::try_into).transpose()
}

/// Sum of active cleared amounts dated on or before the statement date.
async fn cleared_balance(
    account_id: &AccountId,
    statement_date: &str,
    uow: &mut UnitOfWork<'_>,
) -> Result<i64, StoreError> {
    Ok(sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount_minor), 0) FROM transactions
         WHERE account_id = ?1 AND is_active = 1
           AND status = 'cleared' AND transaction_date <= ?2",
    )
    .bind(account_id)
    .bind(statement_date)
    .fetch_one(&mut **uow)
    .await?)
}

pub async fn worksheet_tx(
    details: &requests::CreateReconciliation,
    uow: &mut UnitOfWork<'_>,
) -> Result<responses::ReconciliationWorksheet, StoreError> {
    fetch_account(&details.account_id, uow).await?;
    let statement_date = details.statement_date.to_string();
    let previous = latest_tx(&details.account_id, uow).await?;

    let cleared =
        cleared_balance(&details.account_id, &statement_date, uow).await?;

    // Everything not yet cleared as of the last checkpoint, plus anything
    // recorded since it.
    let (prev_at, prev_seq) = previous
        .as_ref()
        .map(|p| (p.created_at, p.recorded_seq))
        .unwrap_or((i64::MIN, i64::MIN));
    let pending = sqlx::query_as::<_, TxnRow>(
        "SELECT * FROM transactions
         WHERE account_id = ?1 AND is_active = 1
           AND (status = 'pending'
                OR recorded_at > ?2
                OR (recorded_at = ?2 AND recorded_seq > ?3))
         ORDER BY transaction_date, recorded_at, recorded_seq",
    )
    .bind(&details.account_id)
    .bind(prev_at)
    .bind(prev_seq)
    .fetch_all(&mut **uow)
    .await?;

    Ok(responses::ReconciliationWorksheet {
        account_id: details.account_id.clone(),
        statement_date: details.statement_date,
        statement_balance_minor: details.statement_balance_minor,
        cleared_balance_minor: cleared,
        difference_minor: details.statement_balance_minor - cleared,
        pending: pending
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<_, _>>()?,
    })
}

pub async fn worksheet(
    details: &requests::CreateReconciliation,
    store: &Store,
) -> Result<responses::ReconciliationWorksheet, StoreError> {
    let mut uow = store.begin().await?;
    let sheet = worksheet_tx(details, &mut uow).await?;
    // Read-only unit; dropping it rolls back nothing.
    Ok(sheet)
}

/// Append a checkpoint linked to the previous one. The difference is
/// re-evaluated inside this unit of work and must be exactly zero.
pub async fn commit_tx(
    details: &requests::CreateReconciliation,
    time_source: &TimeSource,
    uow: &mut UnitOfWork<'_>,
) -> Result<responses::Reconciliation, StoreError> {
    let sheet = worksheet_tx(details, uow).await?;
    if sheet.difference_minor != 0 {
        return Err(StoreError::DifferenceNotZero {
            difference_minor: sheet.difference_minor,
        });
    }

    let previous = latest_tx(&details.account_id, uow).await?;
    let stamp = time_source.stamp();
    let row = sqlx::query_as::<_, ReconRow>(
        "INSERT INTO account_reconciliations
            (id, account_id, created_at, recorded_seq, statement_date,
             statement_balance_minor, previous_reconciliation_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         RETURNING *",
    )
    .bind(ReconciliationId(Uuid::new_v4()))
    .bind(&details.account_id)
    .bind(micros(stamp.at))
    .bind(stamp.seq)
    .bind(details.statement_date.to_string())
    .bind(details.statement_balance_minor)
    .bind(previous.map(|p| p.id))
    .fetch_one(&mut **uow)
    .await?;

    tracing::info!(account = %details.account_id,
        statement_balance = details.statement_balance_minor,
        "committed reconciliation");
    row.try_into()
}

pub async fn commit(
    details: &requests::CreateReconciliation,
    time_source: &TimeSource,
    store: &Store,
) -> Result<responses::Reconciliation, StoreError> {
    let mut uow = store.begin().await?;
    let reconciliation = commit_tx(details, time_source, &mut uow).await?;
    uow.commit().await?;
    Ok(reconciliation)
}

/// Active versions recorded after the latest checkpoint but dated inside its
/// reconciled period. Returns `None` when the account has no checkpoint.
pub async fn drift_report_tx(
    account_id: &AccountId,
    uow: &mut UnitOfWork<'_>,
) -> Result<Option<responses::DriftReport>, StoreError> {
    let Some(previous) = latest_tx(account_id, uow).await? else {
        return Ok(None);
    };

    let drifted = sqlx::query_as::<_, TxnRow>(
        "SELECT * FROM transactions
         WHERE account_id = ?1 AND is_active = 1
           AND (recorded_at > ?2
                OR (recorded_at = ?2 AND recorded_seq > ?3))
           AND transaction_date <= ?4
         ORDER BY recorded_at, recorded_seq",
    )
    .bind(account_id)
    .bind(previous.created_at)
    .bind(previous.recorded_seq)
    .bind(&previous.statement_date)
    .fetch_all(&mut **uow)
    .await?;

    Ok(Some(responses::DriftReport {
        checkpoint: previous.try_into()?,
        drifted: drifted
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<_, _>>()?,
    }))
}

pub async fn drift_report(
    account_id: &AccountId,
    store: &Store,
) -> Result<Option<responses::DriftReport>, StoreError> {
    let mut uow = store.begin().await?;
    drift_report_tx(account_id, &mut uow).await
}
