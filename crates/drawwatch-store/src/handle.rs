//! Lazily opened, explicitly owned store connection.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;
use tracing::{info, warn};

use drawwatch_core::{Alert, AlertType, ResultDocument};

use crate::{AlertStore, DocumentQuery, DuckStore, ResultStore, StoreError};

/// Owns the DuckDB connection for the life of the process.
///
/// Nothing is opened until the first store call. The open store is reused
/// for every later call; it is only reopened when a liveness probe fails.
/// `path = None` selects an in-memory database.
pub struct StoreHandle {
    path: Option<PathBuf>,
    store: Mutex<Option<DuckStore>>,
}

impl StoreHandle {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            store: Mutex::new(None),
        }
    }

    pub async fn is_open(&self) -> bool {
        self.store.lock().await.is_some()
    }

    /// The open store, opening or reopening it if needed.
    pub async fn get(&self) -> Result<DuckStore, StoreError> {
        let mut slot = self.store.lock().await;
        if let Some(store) = slot.as_ref() {
            let probe = store.clone();
            match tokio::task::spawn_blocking(move || probe.ping()).await? {
                Ok(()) => return Ok(store.clone()),
                Err(e) => warn!(error = %e, "store connection lost, reopening"),
            }
        }
        let path = self.path.clone();
        let store = tokio::task::spawn_blocking(move || match &path {
            Some(path) => DuckStore::open_persistent(path),
            None => DuckStore::open(),
        })
        .await??;
        info!(persistent = self.path.is_some(), "store opened");
        *slot = Some(store.clone());
        Ok(store)
    }

    /// Drop the open store; the next call reopens it.
    pub async fn close(&self) {
        self.store.lock().await.take();
    }
}

#[async_trait]
impl ResultStore for StoreHandle {
    async fn find_one(
        &self,
        source_id: &str,
        draw_date: NaiveDate,
    ) -> Result<Option<ResultDocument>, StoreError> {
        self.get().await?.find_one(source_id, draw_date).await
    }

    async fn upsert_one(&self, doc: &ResultDocument) -> Result<(), StoreError> {
        self.get().await?.upsert_one(doc).await
    }

    async fn merge_slots(&self, doc: &ResultDocument) -> Result<ResultDocument, StoreError> {
        self.get().await?.merge_slots(doc).await
    }

    async fn query(&self, query: &DocumentQuery) -> Result<Vec<ResultDocument>, StoreError> {
        self.get().await?.query(query).await
    }
}

#[async_trait]
impl AlertStore for StoreHandle {
    async fn find_active(
        &self,
        kind: AlertType,
        message: &str,
    ) -> Result<Option<Alert>, StoreError> {
        self.get().await?.find_active(kind, message).await
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<i64, StoreError> {
        self.get().await?.insert_alert(alert).await
    }

    async fn active_alerts(&self) -> Result<Vec<Alert>, StoreError> {
        self.get().await?.active_alerts().await
    }
}
