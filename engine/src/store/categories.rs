//! Category and group registry.
//!
//! System categories are a fixed registry seeded by migration; the engine is
//! the only writer allowed to post transactions against them. Credit-card
//! payment envelopes are engine-managed rows in the reserved payments group,
//! upserted from the account registry.

use sqlx::FromRow;

use payloads::{
    AccountId, CategoryGoal, CategoryId, GoalCadence, GoalType, GroupId,
    requests, responses,
};

use crate::store::{Store, StoreError, UnitOfWork, opt_parse_date};

/// The categories the engine itself writes to. User input may never target
/// these directly.
pub fn system_category_ids() -> [CategoryId; 4] {
    [
        CategoryId::opening_balance(),
        CategoryId::balance_adjustment(),
        CategoryId::account_transfer(),
        CategoryId::available_to_budget(),
    ]
}

pub fn is_system_category(id: &CategoryId) -> bool {
    system_category_ids().contains(id)
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct CategoryRow {
    pub id: CategoryId,
    pub group_id: Option<GroupId>,
    pub name: String,
    pub is_system: bool,
    pub allow_transactions: bool,
    pub allow_allocations: bool,
    pub is_envelope: bool,
    pub is_payment: bool,
    pub goal_type: Option<GoalType>,
    pub goal_amount_minor: Option<i64>,
    pub goal_target_date: Option<String>,
    pub goal_frequency: Option<GoalCadence>,
    pub is_active: bool,
}

impl TryFrom<CategoryRow> for responses::Category {
    type Error = StoreError;

    fn try_from(row: CategoryRow) -> Result<Self, Self::Error> {
        let goal = match (row.goal_type, row.goal_amount_minor) {
            (Some(goal_type), Some(amount_minor)) => Some(CategoryGoal {
                goal_type,
                amount_minor,
                target_date: opt_parse_date(row.goal_target_date.as_deref())?,
                frequency: row.goal_frequency,
            }),
            _ => None,
        };
        Ok(responses::Category {
            category_id: row.id,
            group_id: row.group_id,
            name: row.name,
            is_system: row.is_system,
            allow_transactions: row.allow_transactions,
            allow_allocations: row.allow_allocations,
            is_envelope: row.is_envelope,
            is_payment: row.is_payment,
            goal,
            is_active: row.is_active,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
struct GroupRow {
    id: GroupId,
    name: String,
    sort_order: i64,
    is_active: bool,
}

impl From<GroupRow> for responses::CategoryGroup {
    fn from(row: GroupRow) -> Self {
        Self {
            group_id: row.id,
            name: row.name,
            sort_order: row.sort_order,
            is_active: row.is_active,
        }
    }
}

pub(crate) async fn fetch_category(
    id: &CategoryId,
    uow: &mut UnitOfWork<'_>,
) -> Result<CategoryRow, StoreError> {
    sqlx::query_as::<_, CategoryRow>(
        "SELECT * FROM categories WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(&mut **uow)
    .await?
    .ok_or(StoreError::CategoryNotFound)
}

pub async fn get_category(
    id: &CategoryId,
    store: &Store,
) -> Result<responses::Category, StoreError> {
    let row = sqlx::query_as::<_, CategoryRow>(
        "SELECT * FROM categories WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(store.pool())
    .await?
    .ok_or(StoreError::CategoryNotFound)?;
    row.try_into()
}

pub async fn list_groups(
    store: &Store,
) -> Result<Vec<responses::CategoryGroup>, StoreError> {
    let rows = sqlx::query_as::<_, GroupRow>(
        "SELECT * FROM category_groups WHERE is_active = 1
         ORDER BY sort_order, id",
    )
    .fetch_all(store.pool())
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn list_categories(
    store: &Store,
) -> Result<Vec<responses::Category>, StoreError> {
    let rows = sqlx::query_as::<_, CategoryRow>(
        "SELECT c.* FROM categories c
         LEFT JOIN category_groups g ON c.group_id = g.id
         WHERE c.is_active = 1
         ORDER BY COALESCE(g.sort_order, 0), c.id",
    )
    .fetch_all(store.pool())
    .await?;
    rows.into_iter().map(TryInto::try_into).collect()
}

/// Derive a stable slug from a display name.
pub(crate) fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if (c == ' ' || c == '-' || c == '_')
            && !slug.ends_with('_')
            && !slug.is_empty()
        {
            slug.push('_');
        }
    }
    slug.trim_end_matches('_').to_string()
}

fn validate_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() || name.len() > requests::NAME_MAX_LEN {
        return Err(StoreError::FieldTooLong);
    }
    Ok(())
}

fn validate_goal(goal: &CategoryGoal) -> Result<(), StoreError> {
    let complete = match goal.goal_type {
        GoalType::TargetDate => goal.target_date.is_some(),
        GoalType::Recurring => goal.frequency.is_some(),
    };
    if !complete || goal.amount_minor <= 0 {
        return Err(StoreError::InvalidGoal);
    }
    Ok(())
}

pub async fn create_group_tx(
    details: &requests::CreateCategoryGroup,
    uow: &mut UnitOfWork<'_>,
) -> Result<responses::CategoryGroup, StoreError> {
    validate_name(&details.name)?;
    let id = details
        .group_id
        .clone()
        .unwrap_or_else(|| GroupId(slugify(&details.name)));
    if id == GroupId::credit_card_payments() {
        return Err(StoreError::SystemCategoryProtected);
    }
    // User groups sort above the reserved payments group.
    let sort_order = details.sort_order.max(0);

    let row = sqlx::query_as::<_, GroupRow>(
        "INSERT INTO category_groups (id, name, sort_order, is_active)
         VALUES (?1, ?2, ?3, 1)
         RETURNING *",
    )
    .bind(&id)
    .bind(&details.name)
    .bind(sort_order)
    .fetch_one(&mut **uow)
    .await?;
    Ok(row.into())
}

pub async fn create_group(
    details: &requests::CreateCategoryGroup,
    store: &Store,
) -> Result<responses::CategoryGroup, StoreError> {
    let mut uow = store.begin().await?;
    let group = create_group_tx(details, &mut uow).await?;
    uow.commit().await?;
    Ok(group)
}

pub async fn create_category_tx(
    details: &requests::CreateCategory,
    uow: &mut UnitOfWork<'_>,
) -> Result<responses::Category, StoreError> {
    validate_name(&details.name)?;
    if let Some(goal) = &details.goal {
        validate_goal(goal)?;
    }
    let id = details
        .category_id
        .clone()
        .unwrap_or_else(|| CategoryId(slugify(&details.name)));
    if is_system_category(&id) {
        return Err(StoreError::SystemCategoryProtected);
    }
    if let Some(group_id) = &details.group_id {
        if *group_id == GroupId::credit_card_payments() {
            return Err(StoreError::SystemCategoryProtected);
        }
        let exists: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM category_groups WHERE id = ?1 AND is_active = 1",
        )
        .bind(group_id)
        .fetch_optional(&mut **uow)
        .await?;
        if exists.is_none() {
            return Err(StoreError::GroupNotFound);
        }
    }

    let row = sqlx::query_as::<_, CategoryRow>(
        "INSERT INTO categories
            (id, group_id, name, is_system, allow_transactions,
             allow_allocations, is_envelope, is_payment, goal_type,
             goal_amount_minor, goal_target_date, goal_frequency, is_active)
         VALUES (?1, ?2, ?3, 0, 1, 1, ?4, 0, ?5, ?6, ?7, ?8, 1)
         RETURNING *",
    )
    .bind(&id)
    .bind(&details.group_id)
    .bind(&details.name)
    .bind(details.is_envelope)
    .bind(details.goal.as_ref().map(|g| g.goal_type))
    .bind(details.goal.as_ref().map(|g| g.amount_minor))
    .bind(
        details
            .goal
            .as_ref()
            .and_then(|g| g.target_date)
            .map(|d| d.to_string()),
    )
    .bind(details.goal.as_ref().and_then(|g| g.frequency))
    .fetch_one(&mut **uow)
    .await?;
    row.try_into()
}

pub async fn create_category(
    details: &requests::CreateCategory,
    store: &Store,
) -> Result<responses::Category, StoreError> {
    let mut uow = store.begin().await?;
    let category = create_category_tx(details, &mut uow).await?;
    uow.commit().await?;
    Ok(category)
}

pub async fn update_category_tx(
    details: &requests::UpdateCategory,
    uow: &mut UnitOfWork<'_>,
) -> Result<responses::Category, StoreError> {
    let current = fetch_category(&details.category_id, uow).await?;
    if current.is_system || current.is_payment {
        return Err(StoreError::SystemCategoryProtected);
    }
    let name = match &details.name {
        Some(name) => {
            validate_name(name)?;
            name.clone()
        }
        None => current.name.clone(),
    };
    if let Some(goal) = &details.goal {
        validate_goal(goal)?;
    }
    let goal = if details.clear_goal {
        None
    } else {
        match &details.goal {
            Some(goal) => Some(goal.clone()),
            None => responses::Category::try_from(current.clone())?.goal,
        }
    };
    let group_id = details.group_id.clone().or(current.group_id);
    if let Some(group_id) = &group_id {
        if *group_id == GroupId::credit_card_payments() {
            return Err(StoreError::SystemCategoryProtected);
        }
    }

    let row = sqlx::query_as::<_, CategoryRow>(
        "UPDATE categories
         SET group_id = ?2, name = ?3, goal_type = ?4,
             goal_amount_minor = ?5, goal_target_date = ?6,
             goal_frequency = ?7
         WHERE id = ?1
         RETURNING *",
    )
    .bind(&details.category_id)
    .bind(&group_id)
    .bind(&name)
    .bind(goal.as_ref().map(|g| g.goal_type))
    .bind(goal.as_ref().map(|g| g.amount_minor))
    .bind(goal.as_ref().and_then(|g| g.target_date).map(|d| d.to_string()))
    .bind(goal.as_ref().and_then(|g| g.frequency))
    .fetch_one(&mut **uow)
    .await?;
    row.try_into()
}

pub async fn update_category(
    details: &requests::UpdateCategory,
    store: &Store,
) -> Result<responses::Category, StoreError> {
    let mut uow = store.begin().await?;
    let category = update_category_tx(details, &mut uow).await?;
    uow.commit().await?;
    Ok(category)
}

/// Soft-delete a user category. System and payment categories are protected.
pub async fn delete_category_tx(
    id: &CategoryId,
    uow: &mut UnitOfWork<'_>,
) -> Result<(), StoreError> {
    let current = fetch_category(id, uow).await?;
    if current.is_system || current.is_payment {
        return Err(StoreError::SystemCategoryProtected);
    }
    sqlx::query("UPDATE categories SET is_active = 0 WHERE id = ?1")
        .bind(id)
        .execute(&mut **uow)
        .await?;
    Ok(())
}

pub async fn delete_category(
    id: &CategoryId,
    store: &Store,
) -> Result<(), StoreError> {
    let mut uow = store.begin().await?;
    delete_category_tx(id, &mut uow).await?;
    uow.commit().await?;
    Ok(())
}

/// Upsert the payment envelope for a credit account in the reserved group.
/// Reactivates and renames the row if it already exists.
pub(crate) async fn ensure_payment_category(
    account_id: &AccountId,
    account_name: &str,
    uow: &mut UnitOfWork<'_>,
) -> Result<responses::Category, StoreError> {
    let id = account_id.payment_category();
    let name = format!("Payment: {account_name}");
    let row = sqlx::query_as::<_, CategoryRow>(
        "INSERT INTO categories
            (id, group_id, name, is_system, allow_transactions,
             allow_allocations, is_envelope, is_payment, is_active)
         VALUES (?1, ?2, ?3, 0, 0, 1, 1, 1, 1)
         ON CONFLICT (id) DO UPDATE
             SET name = excluded.name, is_active = 1
         RETURNING *",
    )
    .bind(&id)
    .bind(GroupId::credit_card_payments())
    .bind(&name)
    .fetch_one(&mut **uow)
    .await?;
    tracing::debug!(category = %id, "ensured payment category");
    row.try_into()
}
