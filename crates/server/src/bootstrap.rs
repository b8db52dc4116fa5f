use std::sync::Arc;
use std::time::Duration;

use siteline_core::config::{AppConfig, ConfigError, LoadOptions};
use siteline_core::engine::{PreconditionSet, TransitionExecutor};
use siteline_core::history::HistoryService;
use siteline_core::lock::AdminUnlockPolicy;
use siteline_core::LifecycleSink;
use siteline_db::{connect_with_settings, migrations, DbPool, SqlLifecycleStore};
use thiserror::Error;
use tracing::info;

use crate::notify::{FanoutSink, SqlAuditWriter, WebhookSink};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub engine: Arc<TransitionExecutor<SqlLifecycleStore>>,
    pub history: Arc<HistoryService<SqlLifecycleStore>>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let mut sinks: Vec<Arc<dyn LifecycleSink>> = vec![Arc::new(SqlAuditWriter::new(db_pool.clone()))];
    if let Some(webhook) = WebhookSink::from_config(&config.notifier) {
        info!(
            event_name = "system.bootstrap.webhook_notifier_enabled",
            correlation_id = "bootstrap",
            "webhook notifier enabled"
        );
        sinks.push(Arc::new(webhook));
    }

    let store = Arc::new(SqlLifecycleStore::new(db_pool.clone()));
    let engine = Arc::new(TransitionExecutor::new(
        store.clone(),
        // Domain precondition hooks are registered by the surrounding
        // deployment; the engine ships with none of its own.
        PreconditionSet::new(),
        Arc::new(AdminUnlockPolicy),
        Arc::new(FanoutSink::new(sinks)),
        Duration::from_secs(config.engine.precondition_timeout_secs),
    ));
    let history = Arc::new(HistoryService::new(store));

    Ok(Application { config, db_pool, engine, history })
}
