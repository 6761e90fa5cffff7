//! Storage gateway and store modules for the ledger engine.
//!
//! ## Design Decisions
//!
//! ### Unit of work
//! - **Explicit transactions**: every mutating operation runs inside one
//!   `UnitOfWork` obtained from [`Store::begin`]. Domain functions take the
//!   unit as an argument instead of reaching for ambient storage; commit and
//!   rollback happen exactly once, at the call site that opened the unit.
//! - **Rollback on drop**: a unit that is not committed rolls back when it
//!   goes out of scope, so every error path releases the connection with
//!   nothing applied.
//!
//! ### Writer serialization
//! - **Pool of one**: the pool holds a single connection, so units of work
//!   are serialized and the store file only ever sees one writer. The engine
//!   assumes at most one process opens the file.
//!
//! ### Persistence conventions
//! - **Timestamps** are stored as integer microseconds since the epoch,
//!   **calendar dates** as ISO-8601 text (both sort correctly), and
//!   **monetary values** as signed integer minor units.
//! - **Row structs** are store-private and convert into payload types with
//!   `TryFrom`, keeping jiff types out of the query layer.
//!
//! ### Time source dependency
//! - Functions that stamp rows accept a [`TimeSource`](crate::time) so time
//!   can be mocked during tests; ordering-sensitive writes use
//!   `TimeSource::stamp()` which never hands out a regressed key.

use std::path::Path;

use jiff::Timestamp;
use jiff::civil::Date;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions,
};
use sqlx::{Sqlite, SqlitePool, Transaction};

use payloads::{AccountClass, AccountType};

pub mod accounts;
pub mod allocations;
pub mod categories;
pub mod ledger;
pub mod migrations;
pub(crate) mod monthly;
pub mod rebuild;
pub mod reconciliation;
pub mod reports;

/// Guardrail for daily-series read models.
pub const HISTORY_MAX_DAYS: i64 = 3650;

/// A single unit of work against the store. All reads inside the unit see
/// prior writes of the same unit; nothing is visible outside until commit.
pub type UnitOfWork<'a> = Transaction<'a, Sqlite>;

/// Owns the embedded store file and hands out units of work.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the store file at `path`.
    pub async fn connect(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)
                .map_err(|e| StoreError::UnexpectedError(e.into()))?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);
        // One connection total: writers are serialized and readers never
        // outlive their unit of work.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Begin a unit of work.
    pub async fn begin(&self) -> Result<UnitOfWork<'static>, StoreError> {
        Ok(self.pool.begin().await?)
    }

    /// Shared read access for pool-level query functions.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Microsecond persistence form of a timestamp.
pub(crate) fn micros(ts: Timestamp) -> i64 {
    ts.as_microsecond()
}

pub(crate) fn ts_from_micros(v: i64) -> Result<Timestamp, StoreError> {
    Timestamp::from_microsecond(v).map_err(|e| {
        StoreError::UnexpectedError(anyhow::anyhow!(
            "corrupt timestamp column {v}: {e}"
        ))
    })
}

pub(crate) fn opt_ts_from_micros(
    v: Option<i64>,
) -> Result<Option<Timestamp>, StoreError> {
    v.map(ts_from_micros).transpose()
}

pub(crate) fn parse_date(text: &str) -> Result<Date, StoreError> {
    text.parse().map_err(|e: jiff::Error| {
        StoreError::UnexpectedError(anyhow::anyhow!(
            "corrupt date column {text:?}: {e}"
        ))
    })
}

pub(crate) fn opt_parse_date(
    text: Option<&str>,
) -> Result<Option<Date>, StoreError> {
    text.map(parse_date).transpose()
}

/// Coarse classification of store errors, mirroring how callers should
/// react. Reconciliation drift is not an error: it is surfaced as a
/// [`payloads::responses::DriftReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input or domain-rule violation; not retried.
    Validation,
    /// SCD-2 race; refetch and retry explicitly.
    Conflict,
    /// Range or limit guardrail.
    Guardrail,
    /// Underlying I/O or integrity failure.
    Storage,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Amount must be non-zero")]
    ZeroAmount,
    #[error("Amount must be positive")]
    AmountMustBePositive,
    #[error("Account not found")]
    AccountNotFound,
    #[error("Account is inactive")]
    AccountInactive,
    #[error("Category not found")]
    CategoryNotFound,
    #[error("Category group not found")]
    GroupNotFound,
    #[error("Category does not allow transactions")]
    CategoryDisallowsTransactions,
    #[error("Category does not allow allocations")]
    CategoryDisallowsAllocations,
    #[error("System categories and groups are managed by the engine")]
    SystemCategoryProtected,
    #[error("Source and destination accounts must differ")]
    SameAccount,
    #[error("Source and destination categories must differ")]
    SameCategory,
    #[error(
        "Accounts are created with a zero balance; post an opening-balance \
         event instead"
    )]
    NonZeroOpeningBalance,
    #[error("Account balances move only through the ledger")]
    CannotMutateBalance,
    #[error(
        "Account class {class} implies type {expected}, got {requested}"
    )]
    ClassTypeMismatch {
        class: AccountClass,
        expected: AccountType,
        requested: AccountType,
    },
    #[error("Balance adjustments are not allowed on cash accounts")]
    AdjustmentOnCashAccount,
    #[error(
        "Account balance must be zero before deactivation, got \
         {balance_minor}"
    )]
    BalanceNotZero { balance_minor: i64 },
    #[error(
        "Tangible accounts need a zero fair-value detail row before \
         deactivation"
    )]
    TangibleValueNotZero,
    #[error("Detail fields are for class {provided}, account is {class}")]
    DetailClassMismatch {
        class: AccountClass,
        provided: AccountClass,
    },
    #[error("Goal is missing required fields for its type")]
    InvalidGoal,
    #[error("Field too long")]
    FieldTooLong,
    #[error("Transaction not found")]
    TransactionNotFound,
    #[error("Allocation not found")]
    AllocationNotFound,
    #[error("No active detail row for this account")]
    DetailNotFound,
    #[error(
        "Statement difference must be zero to commit, got \
         {difference_minor}"
    )]
    DifferenceNotZero { difference_minor: i64 },
    #[error("Active version changed underneath the edit; refetch and retry")]
    VersionConflict,
    #[error(
        "Date range of {days} days exceeds the {HISTORY_MAX_DAYS} day limit"
    )]
    RangeTooLong { days: i64 },
    #[error("End date precedes start date")]
    EmptyRange,
    #[error("Invalid migration filename: {filename}")]
    MigrationFilename { filename: String },
    #[error(
        "Migration {filename} is out of sequence; expected prefix \
         {expected:04}"
    )]
    MigrationOutOfSequence { filename: String, expected: u32 },
    #[error(
        "Migration {filename} is recorded as applied but missing from the \
         binary"
    )]
    MigrationMissing { filename: String },
    #[error("Unique constraint violation")]
    NotUnique(#[source] sqlx::Error),
    #[error("Database error")]
    Database(#[source] sqlx::Error),
    #[error("Unexpected error")]
    UnexpectedError(#[from] anyhow::Error),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        use StoreError::*;
        match self {
            VersionConflict => ErrorKind::Conflict,
            RangeTooLong { .. } => ErrorKind::Guardrail,
            MigrationFilename { .. }
            | MigrationOutOfSequence { .. }
            | MigrationMissing { .. }
            | NotUnique(_)
            | Database(_)
            | UnexpectedError(_) => ErrorKind::Storage,
            _ => ErrorKind::Validation,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e
            && db_err.is_unique_violation()
        {
            return StoreError::NotUnique(e);
        }
        StoreError::Database(e)
    }
}
