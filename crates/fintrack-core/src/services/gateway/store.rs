//! Document storage layer
//!
//! The gateway persists everything as JSON documents under logical keys.
//! Three backends implement the same `get`/`put` contract:
//!
//! - `MemoryStore`: process-local map, for tests and dry runs
//! - `JsonFileStore`: one JSON file per key, written atomically (tmp + rename)
//! - `SqliteStore`: a `documents` table in SQLite
//!
//! Each `put` replaces the whole document; no partial write is ever visible.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::config::{GatewayConfig, StoreBackend};
use crate::db::Database;
use crate::error::{Error, Result};

// ============================================================================
// Logical Keys
// ============================================================================

/// Logical document keys used by the gateway
pub mod keys {
    /// The credential pool (ordered list of credentials)
    pub const CREDENTIALS: &str = "config/gemini_keys";
    /// Append-only log of AI calls
    pub const AI_CALL_LOG: &str = "data/ai_call_log";
    /// Append-only log of counter resets
    pub const RESET_LOG: &str = "data/reset_log";

    /// Usage ledger of one user
    pub fn ledger(user_id: &str) -> String {
        format!("data/ledgers/{}", user_id)
    }
}

// ============================================================================
// Store Trait
// ============================================================================

/// Key-value document store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Backend name used in logs
    fn backend_id(&self) -> &'static str;

    /// Read a document, `None` if it does not exist
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Replace a document atomically
    async fn put(&self, key: &str, document: &Value) -> Result<()>;
}

/// Read and deserialize a document
pub async fn load<T: DeserializeOwned>(store: &dyn DocumentStore, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Serialize and write a document
pub async fn save<T: Serialize + ?Sized>(store: &dyn DocumentStore, key: &str, document: &T) -> Result<()> {
    let value = serde_json::to_value(document)?;
    store.put(key, &value).await
}

/// Open the store selected by the configuration
pub async fn open_store(config: &GatewayConfig) -> Result<Arc<dyn DocumentStore>> {
    log::info!("[gateway:store] Opening {} store", config.backend);
    let store: Arc<dyn DocumentStore> = match config.backend {
        StoreBackend::Json => Arc::new(JsonFileStore::new(&config.data_dir)),
        StoreBackend::Sqlite => {
            let db = Database::open(config.db_path.clone()).await?;
            Arc::new(SqliteStore::new(db))
        }
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };
    Ok(store)
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::validation("Document key must not be empty"));
    }
    if key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return Err(Error::validation(format!("Invalid document key: {}", key)));
    }
    Ok(())
}

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory document store
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend_id(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        validate_key(key)?;
        Ok(self.documents.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, document: &Value) -> Result<()> {
        validate_key(key)?;
        self.documents
            .write()
            .await
            .insert(key.to_string(), document.clone());
        Ok(())
    }
}

// ============================================================================
// JsonFileStore
// ============================================================================

/// Flat-file document store, one pretty-printed JSON file per key
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing a key; characters outside `[A-Za-z0-9._@-]` are
    /// percent-encoded so user ids cannot escape their directory.
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        let mut path = self.root.clone();
        let segments: Vec<&str> = key.split('/').collect();
        for (i, seg) in segments.iter().enumerate() {
            let mut encoded = encode_segment(seg);
            if i == segments.len() - 1 {
                encoded.push_str(".json");
            }
            path.push(encoded);
        }
        Ok(path)
    }
}

fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b'@' | b'-' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    fn backend_id(&self) -> &'static str {
        "json"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key)?;
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                log::warn!(
                    "[gateway:store] Ignoring unreadable document {}: {}",
                    path.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &str, document: &Value) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_string_pretty(document)?;
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;

        log::debug!("[gateway:store] Wrote {}", path.display());
        Ok(())
    }
}

// ============================================================================
// SqliteStore
// ============================================================================

/// SQLite-backed document store
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    fn backend_id(&self) -> &'static str {
        "sqlite"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        validate_key(key)?;
        let row: Option<(String,)> = sqlx::query_as("SELECT body FROM documents WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.db.pool)
            .await?;

        match row {
            Some((body,)) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, document: &Value) -> Result<()> {
        validate_key(key)?;
        let body = serde_json::to_string(document)?;
        sqlx::query(
            r#"
            INSERT INTO documents (key, body, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(key) DO UPDATE SET body = excluded.body, updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(key)
        .bind(&body)
        .execute(&self.db.pool)
        .await?;

        log::debug!("[gateway:store] Wrote document {}", key);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_store_get_put() {
        let store = MemoryStore::new();
        assert!(store.get("data/x").await.unwrap().is_none());
        store.put("data/x", &json!({"a": 1})).await.unwrap();
        store.put("data/x", &json!({"a": 2})).await.unwrap();
        assert_eq!(store.get("data/x").await.unwrap(), Some(json!({"a": 2})));
    }

    #[tokio::test]
    async fn test_invalid_keys_rejected() {
        let store = MemoryStore::new();
        assert!(matches!(store.get("").await, Err(Error::Validation(_))));
        assert!(matches!(store.get("data/../etc").await, Err(Error::Validation(_))));
        assert!(matches!(store.get("data//x").await, Err(Error::Validation(_))));
    }

    #[test]
    fn test_json_path_encoding() {
        let store = JsonFileStore::new("/srv/ft");
        assert_eq!(
            store.path_for(&keys::ledger("anna@example.com")).unwrap(),
            PathBuf::from("/srv/ft/data/ledgers/anna@example.com.json")
        );
        assert_eq!(
            store.path_for("data/ledgers/a b\\c").unwrap(),
            PathBuf::from("/srv/ft/data/ledgers/a%20b%5Cc.json")
        );
    }

    #[tokio::test]
    async fn test_json_store_roundtrip_leaves_no_tmp() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path());
        store
            .put(keys::CREDENTIALS, &json!([{"key": "k-1"}]))
            .await
            .unwrap();

        let path = store.path_for(keys::CREDENTIALS).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(
            store.get(keys::CREDENTIALS).await.unwrap(),
            Some(json!([{"key": "k-1"}]))
        );
    }

    #[tokio::test]
    async fn test_json_store_corrupt_reads_as_absent() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path());
        let path = store.path_for(keys::RESET_LOG).unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[{\"half\": ").unwrap();
        assert!(store.get(keys::RESET_LOG).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_store_upsert() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open(temp_dir.path().join("test.db")).await.unwrap();
        let store = SqliteStore::new(db);

        assert!(store.get(keys::AI_CALL_LOG).await.unwrap().is_none());
        store.put(keys::AI_CALL_LOG, &json!([1])).await.unwrap();
        store.put(keys::AI_CALL_LOG, &json!([1, 2])).await.unwrap();
        assert_eq!(store.get(keys::AI_CALL_LOG).await.unwrap(), Some(json!([1, 2])));
    }

    #[tokio::test]
    async fn test_typed_helpers() {
        let store = MemoryStore::new();
        save(&store, "data/n", &vec![1u32, 2, 3]).await.unwrap();
        let loaded: Option<Vec<u32>> = load(&store, "data/n").await.unwrap();
        assert_eq!(loaded, Some(vec![1, 2, 3]));
        let missing: Option<Vec<u32>> = load(&store, "data/none").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_open_store_memory() {
        let config = GatewayConfig::with_data_dir("/nonexistent").with_backend(StoreBackend::Memory);
        let store = open_store(&config).await.unwrap();
        assert_eq!(store.backend_id(), "memory");
    }
}
