//! Persistence service — JSON side-tables and fire-and-forget saves.
//!
//! DESIGN
//! ======
//! A side-table is one named JSON document (a panel snapshot, the tag
//! table). [`SideTableStore`] is the transport seam: memory for tests, a
//! directory of files for the server, HTTP for clients talking to the
//! server. [`Persister`] wraps a store and queues saves so UI-side callers
//! never wait on I/O.
//!
//! WRITE ORDERING
//! ==============
//! A persister owns one writer task at a time. Saves land in a pending map
//! keyed by table; a newer document replaces an older one still waiting,
//! and the writer drains the map in order. Snapshots of one table are
//! therefore written one after another and the last one queued lands last.
//! The file store also writes each save through its own temp file and
//! holds a per-table lock while writing, so concurrent server requests
//! cannot clobber each other's temp files.
//!
//! ERROR HANDLING
//! ==============
//! A failed background save is logged (with its code and whether the
//! transport error is retryable) and published as a transient [`Notice`];
//! it is never retried. The next mutation queues a fresh snapshot anyway.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::services::notify::{Notice, Notifier};

const MAX_TABLE_NAME_LEN: usize = 64;

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("invalid side-table name: {0:?}")]
    InvalidTable(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("side-table server returned status {status}")]
    Status { status: u16 },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed side-table document: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ErrorCode for PersistError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidTable(_) => "E_INVALID_TABLE",
            Self::Request(_) => "E_REQUEST",
            Self::Status { .. } => "E_STATUS",
            Self::Io(_) => "E_IO",
            Self::Decode(_) => "E_DECODE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Status { status: 429 | 500..=599 })
    }
}

/// Reject names that could escape the store directory or the URL path.
///
/// # Errors
///
/// Returns [`PersistError::InvalidTable`] unless `table` is 1–64 characters
/// of ASCII letters, digits, `-` or `_`.
pub fn validate_table_name(table: &str) -> Result<(), PersistError> {
    let valid = !table.is_empty()
        && table.len() <= MAX_TABLE_NAME_LEN
        && table.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid { Ok(()) } else { Err(PersistError::InvalidTable(table.to_owned())) }
}

// =============================================================================
// STORE TRAIT
// =============================================================================

#[async_trait]
pub trait SideTableStore: Send + Sync {
    /// Load a table. `Ok(None)` means it was never saved.
    async fn load(&self, table: &str) -> Result<Option<Value>, PersistError>;

    async fn save(&self, table: &str, document: &Value) -> Result<(), PersistError>;
}

// =============================================================================
// MEMORY STORE
// =============================================================================

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<HashMap<String, Value>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous peek, for assertions and debugging.
    #[must_use]
    pub fn get(&self, table: &str) -> Option<Value> {
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table)
            .cloned()
    }
}

#[async_trait]
impl SideTableStore for MemoryStore {
    async fn load(&self, table: &str) -> Result<Option<Value>, PersistError> {
        validate_table_name(table)?;
        Ok(self.get(table))
    }

    async fn save(&self, table: &str, document: &Value) -> Result<(), PersistError> {
        validate_table_name(table)?;
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(table.to_owned(), document.clone());
        Ok(())
    }
}

// =============================================================================
// FILE STORE
// =============================================================================

type TableLock = Arc<tokio::sync::Mutex<()>>;

/// One `<table>.json` file per side-table under `dir`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    writers: Arc<Mutex<HashMap<String, TableLock>>>,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), writers: Arc::default() }
    }

    fn path_for(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.json"))
    }

    fn writer_for(&self, table: &str) -> TableLock {
        self.writers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(table.to_owned())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl SideTableStore for FileStore {
    async fn load(&self, table: &str) -> Result<Option<Value>, PersistError> {
        validate_table_name(table)?;
        let raw = match tokio::fs::read(self.path_for(table)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    async fn save(&self, table: &str, document: &Value) -> Result<(), PersistError> {
        validate_table_name(table)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let body = serde_json::to_vec_pretty(document)?;
        let writer = self.writer_for(table);
        let _guard = writer.lock().await;

        // Write-then-rename so a reader never sees a half-written document.
        let path = self.path_for(table);
        let tmp = self.dir.join(format!(".{table}.{}.json.tmp", Uuid::new_v4()));
        let written = match tokio::fs::write(&tmp, body).await {
            Ok(()) => tokio::fs::rename(&tmp, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            // EDGE: the temp file may or may not exist depending on where it failed.
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

// =============================================================================
// HTTP STORE
// =============================================================================

/// Client for the side-table server's `/api/sidetables/{table}` routes.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStore {
    /// # Errors
    ///
    /// Returns [`PersistError::Request`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PersistError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PersistError::Request(e.to_string()))?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    #[must_use]
    pub fn table_url(&self, table: &str) -> String {
        format!("{}/api/sidetables/{table}", self.base_url)
    }
}

#[async_trait]
impl SideTableStore for HttpStore {
    async fn load(&self, table: &str) -> Result<Option<Value>, PersistError> {
        validate_table_name(table)?;
        let response = self
            .client
            .get(self.table_url(table))
            .send()
            .await
            .map_err(|e| PersistError::Request(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(PersistError::Status { status: status.as_u16() });
        }
        let document = response
            .json::<Value>()
            .await
            .map_err(|e| PersistError::Request(e.to_string()))?;
        Ok(Some(document))
    }

    async fn save(&self, table: &str, document: &Value) -> Result<(), PersistError> {
        validate_table_name(table)?;
        let response = self
            .client
            .put(self.table_url(table))
            .json(document)
            .send()
            .await
            .map_err(|e| PersistError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PersistError::Status { status: status.as_u16() });
        }
        Ok(())
    }
}

// =============================================================================
// PERSISTER
// =============================================================================

#[derive(Default)]
struct WriteQueue {
    pending: IndexMap<String, Value>,
    draining: bool,
}

/// Store + notifier pair handed to panels and feature modules.
#[derive(Clone)]
pub struct Persister {
    store: Arc<dyn SideTableStore>,
    notifier: Notifier,
    queue: Arc<Mutex<WriteQueue>>,
    idle: Arc<watch::Sender<bool>>,
}

impl Persister {
    pub fn new(store: Arc<dyn SideTableStore>, notifier: Notifier) -> Self {
        let (idle, _) = watch::channel(true);
        Self { store, notifier, queue: Arc::default(), idle: Arc::new(idle) }
    }

    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Queue `document` for `table` and return immediately. A document still
    /// waiting for the same table is replaced. Failures become a notice.
    ///
    /// Returns `false` (after logging) when called outside a tokio runtime.
    pub fn save(&self, table: impl Into<String>, document: Value) -> bool {
        let table = table.into();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(%table, "no tokio runtime; side-table save skipped");
            return false;
        };

        let start_writer = {
            let mut queue = self.lock_queue();
            queue.pending.insert(table, document);
            let start = !queue.draining;
            if start {
                queue.draining = true;
                self.idle.send_replace(false);
            }
            start
        };
        if start_writer {
            let this = self.clone();
            runtime.spawn(async move { this.drain().await });
        }
        true
    }

    /// Wait until every queued save has been attempted.
    pub async fn flush(&self) {
        let mut idle = self.idle.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = idle.wait_for(|idle| *idle).await;
    }

    async fn drain(self) {
        loop {
            let next = {
                let mut queue = self.lock_queue();
                let next = queue.pending.shift_remove_index(0);
                if next.is_none() {
                    queue.draining = false;
                    self.idle.send_replace(true);
                }
                next
            };
            let Some((table, document)) = next else {
                return;
            };
            // Result is reported through the notifier.
            let _ = self.save_now(&table, &document).await;
        }
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, WriteQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Save and wait, bypassing the queue. Failures are reported the same way
    /// as [`Persister::save`].
    ///
    /// # Errors
    ///
    /// Returns the store's error after publishing it as a notice.
    pub async fn save_now(&self, table: &str, document: &Value) -> Result<(), PersistError> {
        match self.store.save(table, document).await {
            Ok(()) => {
                debug!(table, "side-table saved");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, code = e.error_code(), retryable = e.retryable(), table, "side-table save failed");
                self.notifier.notify(Notice::error("Save failed", format!("{table}: {e}")));
                Err(e)
            }
        }
    }

    /// # Errors
    ///
    /// Returns the store's error after publishing it as a notice.
    pub async fn load(&self, table: &str) -> Result<Option<Value>, PersistError> {
        match self.store.load(table).await {
            Ok(document) => Ok(document),
            Err(e) => {
                warn!(error = %e, code = e.error_code(), retryable = e.retryable(), table, "side-table load failed");
                self.notifier.notify(Notice::error("Load failed", format!("{table}: {e}")));
                Err(e)
            }
        }
    }
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;
