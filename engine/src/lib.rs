pub mod money;
pub mod store;
pub mod telemetry;
pub mod time;

/// Configuration loaded from environment variables at startup.
///
/// Read once during initialization; nothing else consults the environment.
pub struct Config {
    /// Path of the embedded store file.
    pub db_path: std::path::PathBuf,
    /// Suppress the derived-cache rebuild that normally follows migrations.
    pub skip_cache_rebuild: bool,
}

impl Config {
    pub fn from_env() -> Self {
        use std::env::var;

        let db_path = var("DOJO_DB_PATH")
            .unwrap_or_else(|_| "data/ledger.db".to_string())
            .into();
        let skip_cache_rebuild = var("DOJO_SKIP_CACHE_REBUILD")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Config { db_path, skip_cache_rebuild }
    }
}
