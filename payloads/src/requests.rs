use jiff::civil::Date;
use serde::{Deserialize, Serialize};

use crate::{
    AccountClass, AccountDetailFields, AccountId, AccountRole, AccountType,
    AllocationId, CategoryGoal, CategoryId, GroupId, StatusFilter,
    TransactionId, TransactionStatus,
};

pub const NAME_MAX_LEN: usize = 255;
pub const MEMO_MAX_LEN: usize = 500;
pub const SLUG_MAX_LEN: usize = 64;

/// New accounts always start at a zero balance; a non-zero opening balance is
/// a separate ledger event in the `opening_balance` system category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccount {
    /// Stable slug; derived from `name` when omitted.
    pub account_id: Option<AccountId>,
    pub name: String,
    pub account_type: AccountType,
    pub account_class: AccountClass,
    pub account_role: AccountRole,
    pub current_balance_minor: i64,
    pub currency: String,
    pub opened_on: Option<Date>,
    /// Class detail fields for the initial SCD-2 detail row; defaults to the
    /// empty payload for the class.
    pub details: Option<AccountDetailFields>,
}

/// Metadata-only update. Balances move exclusively through the ledger; a
/// request carrying one is rejected outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAccount {
    pub account_id: AccountId,
    pub name: Option<String>,
    pub currency: Option<String>,
    pub opened_on: Option<Date>,
    #[serde(default)]
    pub current_balance_minor: Option<i64>,
}

/// Writes a new SCD-2 detail version for the account's class, retiring the
/// prior active row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAccountDetails {
    pub account_id: AccountId,
    pub fields: AccountDetailFields,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCategoryGroup {
    pub group_id: Option<GroupId>,
    pub name: String,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCategory {
    pub category_id: Option<CategoryId>,
    pub group_id: Option<GroupId>,
    pub name: String,
    pub is_envelope: bool,
    pub goal: Option<CategoryGoal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCategory {
    pub category_id: CategoryId,
    pub group_id: Option<GroupId>,
    pub name: Option<String>,
    pub goal: Option<CategoryGoal>,
    /// Clears an existing goal when true.
    #[serde(default)]
    pub clear_goal: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTransaction {
    pub account_id: AccountId,
    pub category_id: CategoryId,
    pub transaction_date: Date,
    /// Signed minor units; negative is an outflow. Zero is rejected.
    pub amount_minor: i64,
    pub memo: Option<String>,
    pub status: TransactionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditTransaction {
    pub transaction_id: TransactionId,
    pub account_id: AccountId,
    pub category_id: CategoryId,
    pub transaction_date: Date,
    pub amount_minor: i64,
    pub memo: Option<String>,
    pub status: TransactionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTransfer {
    pub source_account: AccountId,
    pub destination_account: AccountId,
    /// Strictly positive; the engine signs the two legs.
    pub amount_minor: i64,
    pub transaction_date: Date,
    pub memo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAllocation {
    pub allocation_date: Date,
    /// Never null; `available_to_budget` represents Ready-to-Assign.
    pub from_category_id: CategoryId,
    pub to_category_id: CategoryId,
    /// Strictly positive.
    pub amount_minor: i64,
    pub memo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditAllocation {
    pub allocation_id: AllocationId,
    pub allocation_date: Date,
    pub from_category_id: CategoryId,
    pub to_category_id: CategoryId,
    pub amount_minor: i64,
    pub memo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReconciliation {
    pub account_id: AccountId,
    pub statement_date: Date,
    pub statement_balance_minor: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetAccountHistory {
    pub account_id: AccountId,
    pub start_date: Date,
    pub end_date: Date,
    pub status: StatusFilter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListByAccount {
    pub account_id: AccountId,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
    pub limit: i64,
    pub status: StatusFilter,
}

/// Declares the current position in one symbol for an investment account,
/// retiring any prior active holding row for that symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertHolding {
    pub account_id: AccountId,
    pub symbol: String,
    pub quantity: f64,
}

/// Records a close quote; prices arrive from an external fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordMarketClose {
    pub symbol: String,
    pub quote_date: Date,
    pub close_minor: i64,
}
