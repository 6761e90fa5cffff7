use std::path::PathBuf;

use engine::store::{Store, accounts, allocations, categories, ledger};
use engine::store::migrations;
use engine::telemetry;
use engine::time::TimeSource;
use jiff::civil::Date;
use payloads::{
    AccountClass, AccountId, AccountRole, AccountType, CategoryId,
    TransactionStatus, requests, responses,
};
use tracing_log::LogTracer;
use tracing_subscriber::util::SubscriberInitExt;
use uuid::Uuid;

pub struct TestEngine {
    pub store: Store,
    pub time_source: TimeSource,
    #[allow(unused)]
    pub db_path: PathBuf,
}

/// Open a fresh, fully-migrated store in a uuid-named file with the clock
/// pinned at 2025-01-01T00:00:00Z.
pub async fn spawn_engine() -> TestEngine {
    let subscriber = telemetry::get_subscriber("error");
    let _ = LogTracer::init();
    let _ = subscriber.try_init();

    #[cfg(any(feature = "mock-time", test))]
    let time_source = TimeSource::new("2025-01-01T00:00:00Z".parse().unwrap());
    #[cfg(not(any(feature = "mock-time", test)))]
    let time_source = TimeSource::new();

    let db_path = std::env::temp_dir()
        .join("ledger-engine-tests")
        .join(format!("{}.db", Uuid::new_v4()));
    let store = Store::connect(&db_path).await.unwrap();
    migrations::run(&store, &time_source).await.unwrap();

    TestEngine { store, time_source, db_path }
}

/// Functions to populate fixture data.
///
/// Using anyhow::Result lets us get a backtrace from when the error was
/// first converted to anyhow::Result. Run with RUST_BACKTRACE=1 to view.
impl TestEngine {
    pub async fn create_checking(&self) -> anyhow::Result<responses::Account> {
        Ok(accounts::create_account(
            &cash_account_details("checking", "Checking"),
            &self.time_source,
            &self.store,
        )
        .await?)
    }

    pub async fn create_savings(&self) -> anyhow::Result<responses::Account> {
        Ok(accounts::create_account(
            &cash_account_details("savings", "Savings"),
            &self.time_source,
            &self.store,
        )
        .await?)
    }

    /// Credit account; the payment envelope `payment_visa` is upserted as a
    /// side effect.
    pub async fn create_visa(&self) -> anyhow::Result<responses::Account> {
        Ok(accounts::create_account(
            &requests::CreateAccount {
                account_id: Some(AccountId("visa".into())),
                name: "Visa".into(),
                account_type: AccountType::Liability,
                account_class: AccountClass::Credit,
                account_role: AccountRole::OnBudget,
                current_balance_minor: 0,
                currency: "USD".into(),
                opened_on: Some("2025-01-01".parse()?),
                details: None,
            },
            &self.time_source,
            &self.store,
        )
        .await?)
    }

    pub async fn create_groceries_envelope(
        &self,
    ) -> anyhow::Result<responses::Category> {
        categories::create_group(
            &requests::CreateCategoryGroup {
                group_id: None,
                name: "Essentials".into(),
                sort_order: 1,
            },
            &self.store,
        )
        .await?;
        Ok(categories::create_category(
            &requests::CreateCategory {
                category_id: Some(CategoryId("groceries".into())),
                group_id: Some(payloads::GroupId("essentials".into())),
                name: "Groceries".into(),
                is_envelope: true,
                goal: None,
            },
            &self.store,
        )
        .await?)
    }

    /// Opening balance as a ledger event, per the zero-balance-at-create
    /// rule.
    pub async fn fund_checking(
        &self,
        amount_minor: i64,
    ) -> anyhow::Result<responses::LedgerWrite> {
        Ok(ledger::post_opening_balance(
            &AccountId("checking".into()),
            "2025-01-01".parse()?,
            amount_minor,
            &self.time_source,
            &self.store,
        )
        .await?)
    }

    /// Checking funded with 500000 plus a groceries envelope: the pre-state
    /// most budget tests start from.
    pub async fn setup_budget(&self) -> anyhow::Result<()> {
        self.create_checking().await?;
        self.create_groceries_envelope().await?;
        self.fund_checking(500_000).await?;
        Ok(())
    }

    pub async fn allocate(
        &self,
        from: &str,
        to: &str,
        amount_minor: i64,
        date: Date,
    ) -> anyhow::Result<responses::AllocationVersion> {
        Ok(allocations::allocate(
            &requests::CreateAllocation {
                allocation_date: date,
                from_category_id: CategoryId(from.into()),
                to_category_id: CategoryId(to.into()),
                amount_minor,
                memo: None,
            },
            &self.time_source,
            &self.store,
        )
        .await?)
    }

    pub async fn spend(
        &self,
        account: &str,
        category: &str,
        date: Date,
        amount_minor: i64,
    ) -> anyhow::Result<responses::LedgerWrite> {
        Ok(ledger::create(
            &requests::CreateTransaction {
                account_id: AccountId(account.into()),
                category_id: CategoryId(category.into()),
                transaction_date: date,
                amount_minor,
                memo: None,
                status: TransactionStatus::Cleared,
            },
            &self.time_source,
            &self.store,
        )
        .await?)
    }

    pub async fn account_balance(
        &self,
        account: &str,
    ) -> anyhow::Result<i64> {
        let account = accounts::get_account(
            &AccountId(account.into()),
            &self.store,
        )
        .await?;
        Ok(account.current_balance_minor)
    }
}

pub fn cash_account_details(
    account_id: &str,
    name: &str,
) -> requests::CreateAccount {
    requests::CreateAccount {
        account_id: Some(AccountId(account_id.into())),
        name: name.into(),
        account_type: AccountType::Asset,
        account_class: AccountClass::Cash,
        account_role: AccountRole::OnBudget,
        current_balance_minor: 0,
        currency: "USD".into(),
        opened_on: Some(jiff::civil::date(2025, 1, 1)),
        details: None,
    }
}
