use crate::domain::ports::KeyValueStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

/// `KeyValueStore` over the `kv_store` table. Values are JSON text.
pub struct SqliteKeyValueStore {
    pool: SqlitePool,
}

impl SqliteKeyValueStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn save(&self, key: &str, value: Value) -> Result<()> {
        let encoded = serde_json::to_string(&value).context("Failed to encode value")?;
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(encoded)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save key '{}'", key))?;

        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Value>> {
        let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to load key '{}'", key))?;

        match row {
            Some(row) => {
                let raw: String = row.try_get("value")?;
                let value = serde_json::from_str(&raw)
                    .with_context(|| format!("Corrupt JSON stored at '{}'", key))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        // substr() avoids LIKE wildcard escaping for '_' and '%'
        let rows = sqlx::query(
            "SELECT key FROM kv_store WHERE substr(key, 1, length(?)) = ? ORDER BY key ASC",
        )
        .bind(prefix)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list keys")?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("key").map_err(Into::into))
            .collect()
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete key '{}'", key))?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::database::Database;
    use serde_json::json;

    #[tokio::test]
    async fn test_sqlite_store_roundtrip_and_upsert() {
        let db = Database::in_memory().await.unwrap();
        let store = SqliteKeyValueStore::new(db.pool.clone());

        store.save("agents/outputs/dev/history", json!([1])).await.unwrap();
        store.save("agents/outputs/dev/history", json!([1, 2])).await.unwrap();
        assert_eq!(
            store.load("agents/outputs/dev/history").await.unwrap(),
            Some(json!([1, 2]))
        );
        assert!(store.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_store_list_treats_underscore_literally() {
        let db = Database::in_memory().await.unwrap();
        let store = SqliteKeyValueStore::new(db.pool.clone());

        for key in ["agents/outputs/_global/history", "agents/outputs/xglobal/history"] {
            store.save(key, json!(null)).await.unwrap();
        }
        assert_eq!(
            store.list("agents/outputs/_global").await.unwrap(),
            vec!["agents/outputs/_global/history"]
        );
        assert!(store.delete("agents/outputs/_global/history").await.unwrap());
        assert!(!store.delete("agents/outputs/_global/history").await.unwrap());
    }
}
