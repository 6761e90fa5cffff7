//! Migration runner.
//!
//! Migrations are SQL files embedded in the binary, named `NNNN_name.sql`
//! with strictly sequential numbers starting at 0001. Each unapplied file
//! runs inside its own unit of work and is recorded in `schema_migrations`;
//! gaps, duplicates, or applied files missing from the binary abort the run.

use crate::store::{Store, StoreError, micros};
use crate::time::TimeSource;

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_accounts_and_categories.sql",
        include_str!("../../migrations/0001_accounts_and_categories.sql"),
    ),
    (
        "0002_transactions.sql",
        include_str!("../../migrations/0002_transactions.sql"),
    ),
    ("0003_budget.sql", include_str!("../../migrations/0003_budget.sql")),
    (
        "0004_reconciliations.sql",
        include_str!("../../migrations/0004_reconciliations.sql"),
    ),
    (
        "0005_investments.sql",
        include_str!("../../migrations/0005_investments.sql"),
    ),
];

/// Apply all unapplied migrations in order. Returns the filenames applied by
/// this run.
pub async fn run(
    store: &Store,
    time_source: &TimeSource,
) -> Result<Vec<String>, StoreError> {
    validate_sequence(MIGRATIONS)?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            filename TEXT PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
    )
    .execute(store.pool())
    .await?;

    let applied: Vec<String> = sqlx::query_scalar(
        "SELECT filename FROM schema_migrations ORDER BY filename",
    )
    .fetch_all(store.pool())
    .await?;

    for filename in &applied {
        if !MIGRATIONS.iter().any(|(name, _)| name == filename) {
            return Err(StoreError::MigrationMissing {
                filename: filename.clone(),
            });
        }
    }

    let mut newly_applied = Vec::new();
    for (filename, sql) in MIGRATIONS {
        if applied.iter().any(|a| a == filename) {
            continue;
        }
        let mut uow = store.begin().await?;
        sqlx::raw_sql(sql).execute(&mut *uow).await?;
        sqlx::query(
            "INSERT INTO schema_migrations (filename, applied_at)
             VALUES (?1, ?2)",
        )
        .bind(filename)
        .bind(micros(time_source.now()))
        .execute(&mut *uow)
        .await?;
        uow.commit().await?;
        tracing::info!(migration = filename, "applied migration");
        newly_applied.push(filename.to_string());
    }

    Ok(newly_applied)
}

/// Check the embedded list for strictly sequential numbering.
fn validate_sequence(
    migrations: &[(&str, &str)],
) -> Result<(), StoreError> {
    for (i, (filename, _)) in migrations.iter().enumerate() {
        let expected = i as u32 + 1;
        let number = sequence_number(filename)?;
        if number != expected {
            return Err(StoreError::MigrationOutOfSequence {
                filename: filename.to_string(),
                expected,
            });
        }
    }
    Ok(())
}

fn sequence_number(filename: &str) -> Result<u32, StoreError> {
    let bad = || StoreError::MigrationFilename {
        filename: filename.to_string(),
    };
    let prefix = filename.get(..4).ok_or_else(bad)?;
    if !prefix.bytes().all(|b| b.is_ascii_digit())
        || filename.as_bytes().get(4) != Some(&b'_')
        || !filename.ends_with(".sql")
    {
        return Err(bad());
    }
    prefix.parse().map_err(|_| bad())
}
