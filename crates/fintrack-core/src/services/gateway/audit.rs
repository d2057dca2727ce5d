//! Append-only audit logs
//!
//! Each log is a single JSON array document. Appends are read-modify-write
//! under the log's own lock, so concurrent writers through the same
//! `AppendLog` never lose or interleave entries.

use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::store::{self, DocumentStore};
use super::types::{CallLogEntry, CallStatus, CallType, ResetLogEntry};
use crate::error::Result;

/// Append-only sequence of `T` stored under one document key
pub struct AppendLog<T> {
    store: Arc<dyn DocumentStore>,
    key: String,
    lock: Mutex<()>,
    _entry: PhantomData<fn() -> T>,
}

impl<T> AppendLog<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    pub fn new(store: Arc<dyn DocumentStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            lock: Mutex::new(()),
            _entry: PhantomData,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Append one entry
    pub async fn append(&self, entry: T) -> Result<()> {
        self.append_all(vec![entry]).await
    }

    /// Append several entries in one write
    pub async fn append_all(&self, entries: Vec<T>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let _guard = self.lock.lock().await;
        let mut log: Vec<T> = store::load(self.store.as_ref(), &self.key)
            .await?
            .unwrap_or_default();
        let added = entries.len();
        log.extend(entries);
        store::save(self.store.as_ref(), &self.key, &log).await?;

        log::debug!(
            "[gateway:audit] Appended {} entries to {} ({} total)",
            added,
            self.key,
            log.len()
        );
        Ok(())
    }

    /// All entries, oldest first
    pub async fn entries(&self) -> Result<Vec<T>> {
        let _guard = self.lock.lock().await;
        Ok(store::load(self.store.as_ref(), &self.key)
            .await?
            .unwrap_or_default())
    }
}

/// Log of every attempted gateway call
pub type CallLog = AppendLog<CallLogEntry>;

/// Log of every counter rollover
pub type ResetLog = AppendLog<ResetLogEntry>;

// ============================================================================
// Summary
// ============================================================================

/// Aggregate view of the call log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub ai_calls_total: usize,
    pub ai_calls_ok: usize,
    pub ai_calls_error: usize,
    pub voice_calls_total: usize,
    pub distinct_users: usize,
}

impl AuditSummary {
    pub fn from_entries(entries: &[CallLogEntry]) -> Self {
        let mut summary = Self::default();
        let mut users = HashSet::new();

        for entry in entries {
            users.insert(entry.user_id.as_str());
            match entry.call_type {
                CallType::GeneratePlan => {
                    summary.ai_calls_total += 1;
                    match entry.status {
                        CallStatus::Ok => summary.ai_calls_ok += 1,
                        CallStatus::Error => summary.ai_calls_error += 1,
                    }
                }
                CallType::VoiceInput => summary.voice_calls_total += 1,
            }
        }

        summary.distinct_users = users.len();
        summary
    }
}
