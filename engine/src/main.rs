use engine::{
    Config,
    store::{Store, migrations, rebuild, reports},
    telemetry::{get_subscriber, init_subscriber},
    time::TimeSource,
};

/// Ledger engine store preparation.
///
/// Opens the store file, applies pending migrations, and rebuilds the
/// derived caches. The HTTP adapter drives the engine as a library; this
/// binary is the operator entry point.
///
/// Environment variables can be set directly or loaded from a .env file in
/// the project root:
/// - DOJO_DB_PATH: store file path (default data/ledger.db)
/// - DOJO_SKIP_CACHE_REBUILD: set to 1/true to skip the rebuild that
///   normally follows migrations
///
/// Example:
/// DOJO_DB_PATH=data/ledger.db cargo run
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from a .env file if available; silently
    // ignored when the file doesn't exist.
    let _ = dotenvy::dotenv();

    let subscriber = get_subscriber("info");
    init_subscriber(subscriber);

    let config = Config::from_env();

    #[cfg(not(feature = "mock-time"))]
    let time_source = TimeSource::new();
    #[cfg(feature = "mock-time")]
    let time_source = TimeSource::new(jiff::Timestamp::now());

    let store = Store::connect(&config.db_path).await?;

    let applied = migrations::run(&store, &time_source).await?;
    tracing::info!(
        applied = applied.len(),
        path = %config.db_path.display(),
        "migrations up to date"
    );

    if config.skip_cache_rebuild {
        tracing::info!("skipping cache rebuild (DOJO_SKIP_CACHE_REBUILD)");
    } else {
        rebuild::rebuild(&store).await?;
    }

    let net_worth = reports::net_worth_current(&store).await?;
    tracing::info!(
        net_worth_minor = net_worth.net_worth_minor,
        assets_minor = net_worth.assets_minor,
        liabilities_minor = net_worth.liabilities_minor,
        "store ready"
    );

    store.close().await;
    Ok(())
}
