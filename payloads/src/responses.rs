use jiff::{Timestamp, civil::Date};
use serde::{Deserialize, Serialize};

use crate::{
    AccountClass, AccountDetailFields, AccountId, AccountRole, AccountType,
    AllocationId, AllocationVersionId, CategoryGoal, CategoryId, DetailId,
    EntrySource, GroupId, ReconciliationId, TransactionId, TransactionStatus,
    TransactionVersionId,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    pub name: String,
    pub account_type: AccountType,
    pub account_class: AccountClass,
    pub account_role: AccountRole,
    /// Derived cache: the sum of active transaction amounts.
    pub current_balance_minor: i64,
    pub currency: String,
    pub is_active: bool,
    pub opened_on: Option<Date>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountDetail {
    pub detail_id: DetailId,
    pub account_id: AccountId,
    pub account_class: AccountClass,
    pub fields: AccountDetailFields,
    pub valid_from: Timestamp,
    pub valid_to: Option<Timestamp>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryGroup {
    pub group_id: GroupId,
    pub name: String,
    pub sort_order: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub category_id: CategoryId,
    pub group_id: Option<GroupId>,
    pub name: String,
    pub is_system: bool,
    pub allow_transactions: bool,
    pub allow_allocations: bool,
    pub is_envelope: bool,
    pub is_payment: bool,
    pub goal: Option<CategoryGoal>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionVersion {
    pub version_id: TransactionVersionId,
    pub transaction_id: TransactionId,
    pub account_id: AccountId,
    pub category_id: CategoryId,
    pub transaction_date: Date,
    pub amount_minor: i64,
    pub memo: Option<String>,
    pub status: TransactionStatus,
    pub source: EntrySource,
    pub recorded_at: Timestamp,
    pub valid_from: Timestamp,
    /// None while the version is active.
    pub valid_to: Option<Timestamp>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationVersion {
    pub version_id: AllocationVersionId,
    pub allocation_id: AllocationId,
    pub allocation_date: Date,
    pub month_start: Date,
    pub from_category_id: CategoryId,
    pub to_category_id: CategoryId,
    pub amount_minor: i64,
    pub memo: Option<String>,
    pub recorded_at: Timestamp,
    pub valid_from: Timestamp,
    pub valid_to: Option<Timestamp>,
    pub is_active: bool,
}

/// One row of the derived monthly cache for a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyCategoryState {
    pub category_id: CategoryId,
    pub month_start: Date,
    pub allocated_minor: i64,
    pub inflow_minor: i64,
    pub activity_minor: i64,
    pub available_minor: i64,
}

/// Snapshot bundle returned by the ledger write path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerWrite {
    pub transaction: TransactionVersion,
    pub account: Account,
    pub month_state: Option<MonthlyCategoryState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub outflow: TransactionVersion,
    pub inflow: TransactionVersion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub reconciliation_id: ReconciliationId,
    pub account_id: AccountId,
    pub created_at: Timestamp,
    pub statement_date: Date,
    pub statement_balance_minor: i64,
    pub previous_reconciliation_id: Option<ReconciliationId>,
}

/// The uncommitted working set for a reconciliation in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationWorksheet {
    pub account_id: AccountId,
    pub statement_date: Date,
    pub statement_balance_minor: i64,
    /// Sum of active cleared amounts dated on or before the statement date.
    pub cleared_balance_minor: i64,
    /// `statement_balance_minor - cleared_balance_minor`; zero is required
    /// for commit.
    pub difference_minor: i64,
    /// Active versions not yet cleared as of the last checkpoint, or
    /// recorded since it.
    pub pending: Vec<TransactionVersion>,
}

/// Backdated changes against an already-reconciled period. Surfaced as a
/// report; history is never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftReport {
    pub checkpoint: Reconciliation,
    pub drifted: Vec<TransactionVersion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetWorthSnapshot {
    pub assets_minor: i64,
    /// Negative by sign convention.
    pub liabilities_minor: i64,
    pub positions_minor: i64,
    pub tangibles_minor: i64,
    pub net_worth_minor: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalancePoint {
    pub as_of_date: Date,
    pub balance_minor: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyToAssign {
    pub month_start: Date,
    pub amount_minor: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryWithState {
    pub category: Category,
    pub state: MonthlyCategoryState,
}
