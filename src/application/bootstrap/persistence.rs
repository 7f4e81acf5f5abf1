use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::{PersistenceEnvConfig, StoreBackend};
use crate::domain::ports::{KeyValueStore, PredictionSource};
use crate::infrastructure::persistence::{
    Database, InMemoryKeyValueStore, JsonFileStore, OutputRepository, SqliteKeyValueStore,
    StorePredictionSource,
};

pub struct PersistenceHandle {
    /// Open pool when the SQLite backend is selected.
    pub db: Option<Database>,
    pub store: Arc<dyn KeyValueStore>,
    pub outputs: Arc<OutputRepository>,
    pub predictions: Arc<dyn PredictionSource>,
}

pub struct PersistenceBootstrap;

impl PersistenceBootstrap {
    pub async fn init(config: &PersistenceEnvConfig) -> Result<PersistenceHandle> {
        let (db, store): (Option<Database>, Arc<dyn KeyValueStore>) = match config.backend {
            StoreBackend::Memory => {
                info!("Using in-memory store");
                (None, Arc::new(InMemoryKeyValueStore::new()))
            }
            StoreBackend::Sqlite => {
                info!("Initializing Database at {}", config.database_url);
                let db = Database::new(&config.database_url)
                    .await
                    .context("Failed to initialize database")?;
                let store = Arc::new(SqliteKeyValueStore::new(db.pool.clone()));
                (Some(db), store)
            }
            StoreBackend::Json => {
                let store = JsonFileStore::new(config.data_dir.clone())
                    .await
                    .context("Failed to initialize JSON file store")?;
                (None, Arc::new(store))
            }
        };

        let outputs = Arc::new(OutputRepository::with_retention(
            store.clone(),
            config.history_limit,
            config.retention,
        ));
        let predictions: Arc<dyn PredictionSource> =
            Arc::new(StorePredictionSource::new(store.clone()));

        Ok(PersistenceHandle {
            db,
            store,
            outputs,
            predictions,
        })
    }
}
