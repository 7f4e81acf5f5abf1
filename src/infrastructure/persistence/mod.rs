pub mod database;
pub mod in_memory;
pub mod json_file_store;
pub mod output_repository;
pub mod sqlite_store;

pub use database::Database;
pub use in_memory::{InMemoryKeyValueStore, InMemoryPredictionSource, StorePredictionSource};
pub use json_file_store::JsonFileStore;
pub use output_repository::{AgentRunStats, HistoryRetention, OutputRepository};
pub use sqlite_store::SqliteKeyValueStore;
