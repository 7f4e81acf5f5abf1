use crate::domain::ports::KeyValueStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

const EXTENSION: &str = "json";

/// One pretty-printed JSON file per key in a flat directory.
///
/// Key characters outside `[A-Za-z0-9._-]` are percent-escaped in file names.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create store directory {:?}", dir))?;
        info!("JsonFileStore: Using directory {:?}", dir);
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", encode_key(key), EXTENSION))
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn save(&self, key: &str, value: Value) -> Result<()> {
        let content = serde_json::to_string_pretty(&value).context("Failed to serialize value")?;
        let path = self.path_for(key);

        // Atomic write: write to temp file then rename
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, content)
            .await
            .with_context(|| format!("Failed to write temp file for '{}'", key))?;
        fs::rename(&temp_path, &path)
            .await
            .with_context(|| format!("Failed to rename temp file for '{}'", key))?;
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
        };
        let value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON in {:?}", path))?;
        Ok(Some(value))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("Failed to read directory {:?}", self.dir))?;

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(stem) = name
                .to_str()
                .and_then(|n| n.strip_suffix(&format!(".{}", EXTENSION)))
            else {
                continue;
            };
            match decode_key(stem) {
                Some(key) if key.starts_with(prefix) => keys.push(key),
                Some(_) => {}
                None => warn!("JsonFileStore: Skipping undecodable file name {:?}", name),
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to delete '{}'", key)),
        }
    }
}

fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

fn decode_key(encoded: &str) -> Option<String> {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = encoded.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("goahead-{}-{}", name, uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_key_encoding_is_reversible() {
        for key in ["agents/outputs/equity/latest/equities:5D", "plain_key-1.0", "ünï"] {
            assert_eq!(decode_key(&encode_key(key)).as_deref(), Some(key));
        }
        assert!(!encode_key("a/b").contains('/'));
    }

    #[tokio::test]
    async fn test_json_file_store_operations() {
        let dir = temp_dir("store");
        let store = JsonFileStore::new(&dir).await.unwrap();

        store.save("kpi/history/5D/equities", json!([1, 2])).await.unwrap();
        store.save("kpi/history/All/all", json!({"a": 1})).await.unwrap();
        store.save("guards/cooldowns", json!({})).await.unwrap();

        assert_eq!(
            store.load("kpi/history/5D/equities").await.unwrap(),
            Some(json!([1, 2]))
        );
        assert_eq!(store.list("kpi/").await.unwrap().len(), 2);
        assert!(store.delete("guards/cooldowns").await.unwrap());
        assert!(store.load("guards/cooldowns").await.unwrap().is_none());

        // No temp files left behind
        let mut entries = fs::read_dir(&dir).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            assert!(!entry.file_name().to_string_lossy().ends_with(".tmp"));
        }
        let _ = fs::remove_dir_all(&dir).await;
    }
}
