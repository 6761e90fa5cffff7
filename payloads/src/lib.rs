pub mod requests;
pub mod responses;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Id type wrappers help ensure we don't mix up ids for different tables.
///
/// Accounts, categories, and category groups use stable text slugs chosen at
/// creation time (`"checking"`, `"groceries"`); version and concept ids are
/// uuids generated by the engine.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type), sqlx(transparent))]
pub struct AccountId(pub String);

#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type), sqlx(transparent))]
pub struct CategoryId(pub String);

#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type), sqlx(transparent))]
pub struct GroupId(pub String);

/// The stable identity of a transaction across its versions.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type), sqlx(transparent))]
pub struct TransactionId(pub Uuid);

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type), sqlx(transparent))]
pub struct TransactionVersionId(pub Uuid);

/// The stable identity of a budget allocation across its versions.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type), sqlx(transparent))]
pub struct AllocationId(pub Uuid);

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type), sqlx(transparent))]
pub struct AllocationVersionId(pub Uuid);

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type), sqlx(transparent))]
pub struct DetailId(pub Uuid);

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type), sqlx(transparent))]
pub struct ReconciliationId(pub Uuid);

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type), sqlx(transparent))]
pub struct HoldingId(pub Uuid);

impl AccountId {
    /// Slug of the payment envelope reserved for a credit account.
    pub fn payment_category(&self) -> CategoryId {
        CategoryId(format!("payment_{}", self.0))
    }
}

impl CategoryId {
    pub fn opening_balance() -> Self {
        Self("opening_balance".into())
    }
    pub fn balance_adjustment() -> Self {
        Self("balance_adjustment".into())
    }
    pub fn account_transfer() -> Self {
        Self("account_transfer".into())
    }
    pub fn available_to_budget() -> Self {
        Self("available_to_budget".into())
    }
}

impl GroupId {
    /// Reserved group holding the credit-card payment envelopes.
    pub fn credit_card_payments() -> Self {
        Self("credit_card_payments".into())
    }
}

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(
    feature = "use-sqlx",
    derive(sqlx::Type),
    sqlx(rename_all = "snake_case")
)]
pub enum AccountType {
    Asset,
    Liability,
}

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(
    feature = "use-sqlx",
    derive(sqlx::Type),
    sqlx(rename_all = "snake_case")
)]
pub enum AccountClass {
    Cash,
    Credit,
    Accessible,
    Investment,
    Loan,
    Tangible,
}

impl AccountClass {
    /// The account type this class implies. Credit and loan accounts are
    /// liabilities; everything else is an asset.
    pub fn account_type(&self) -> AccountType {
        match self {
            AccountClass::Credit | AccountClass::Loan => {
                AccountType::Liability
            }
            _ => AccountType::Asset,
        }
    }
}

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(
    feature = "use-sqlx",
    derive(sqlx::Type),
    sqlx(rename_all = "snake_case")
)]
pub enum AccountRole {
    OnBudget,
    Tracking,
}

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(
    feature = "use-sqlx",
    derive(sqlx::Type),
    sqlx(rename_all = "snake_case")
)]
pub enum TransactionStatus {
    Pending,
    Cleared,
}

/// Filter for listings and the balance-history read model.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    All,
    Cleared,
}

/// Where a transaction version came from.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(
    feature = "use-sqlx",
    derive(sqlx::Type),
    sqlx(rename_all = "snake_case")
)]
pub enum EntrySource {
    /// Entered directly by the user.
    User,
    /// One leg of an account-to-account transfer.
    Transfer,
    /// Written by the engine itself (opening balances, adjustments).
    System,
}

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(
    feature = "use-sqlx",
    derive(sqlx::Type),
    sqlx(rename_all = "snake_case")
)]
pub enum GoalType {
    TargetDate,
    Recurring,
}

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(
    feature = "use-sqlx",
    derive(sqlx::Type),
    sqlx(rename_all = "snake_case")
)]
pub enum GoalCadence {
    Weekly,
    Monthly,
    Yearly,
}

/// Savings goal attached to an envelope category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryGoal {
    pub goal_type: GoalType,
    pub amount_minor: i64,
    /// Required for target-date goals.
    pub target_date: Option<jiff::civil::Date>,
    /// Required for recurring goals.
    pub frequency: Option<GoalCadence>,
}

/// Class-specific account detail fields, versioned as SCD-2 rows and stored
/// as a JSON column. The variant must match the account's class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum AccountDetailFields {
    Cash {},
    Accessible {},
    Credit {
        apr_bps: Option<i64>,
        credit_limit_minor: Option<i64>,
    },
    Loan {
        apr_bps: Option<i64>,
        term_months: Option<i32>,
    },
    Investment {
        uninvested_cash_minor: i64,
    },
    Tangible {
        fair_value_minor: i64,
    },
}

impl AccountDetailFields {
    pub fn class(&self) -> AccountClass {
        match self {
            AccountDetailFields::Cash {} => AccountClass::Cash,
            AccountDetailFields::Accessible {} => AccountClass::Accessible,
            AccountDetailFields::Credit { .. } => AccountClass::Credit,
            AccountDetailFields::Loan { .. } => AccountClass::Loan,
            AccountDetailFields::Investment { .. } => {
                AccountClass::Investment
            }
            AccountDetailFields::Tangible { .. } => AccountClass::Tangible,
        }
    }

    /// The empty detail payload for a class, used when an account is created
    /// without explicit detail fields.
    pub fn default_for(class: AccountClass) -> Self {
        match class {
            AccountClass::Cash => AccountDetailFields::Cash {},
            AccountClass::Accessible => AccountDetailFields::Accessible {},
            AccountClass::Credit => AccountDetailFields::Credit {
                apr_bps: None,
                credit_limit_minor: None,
            },
            AccountClass::Loan => AccountDetailFields::Loan {
                apr_bps: None,
                term_months: None,
            },
            AccountClass::Investment => {
                AccountDetailFields::Investment { uninvested_cash_minor: 0 }
            }
            AccountClass::Tangible => {
                AccountDetailFields::Tangible { fair_value_minor: 0 }
            }
        }
    }
}
