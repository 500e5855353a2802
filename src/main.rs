//! Wiring only: load config, start logging, open the store, create missing tables.

use axio_common::adapters::persistence::SqliteRepo;
use axio_common::domain::Registry;
use axio_common::ports::ModelStore;
use axio_common::shared::config::AppConfig;
use axio_common::shared::logging;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = AppConfig::load()?;
    logging::init_logging(&cfg.log_level_or_default())?;

    let db_path = cfg.database_path_or_default();
    info!(
        server = %cfg.server_name_or_default(),
        path = %db_path.display(),
        "initializing database"
    );

    let registry = Registry::with_models()?;
    let repo = SqliteRepo::connect(&db_path, registry)
        .await
        .map_err(|e| anyhow::anyhow!("SQLite connect failed: {}", e))?;
    repo.create_all().await?;

    info!("database initialized with the following tables:");
    for table in repo.table_names() {
        info!("{}", table);
    }
    Ok(())
}
