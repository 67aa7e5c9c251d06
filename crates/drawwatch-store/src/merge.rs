//! Merge-upsert of observed draws into the per-(source, day) document.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use drawwatch_core::{DrawRecord, ResultDocument, merge_records};

use crate::{ResultStore, StoreError, within};

/// Descriptive fields copied onto every document a source writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMeta {
    pub source_id: String,
    pub lottery_name: String,
    pub draw_name: String,
    pub country: String,
}

/// Reconciles newly observed draws with what is already stored.
///
/// Merges for the same `(source_id, draw_date)` are serialized through a
/// per-key lock held across the read, merge, and write; merges for
/// different keys proceed independently. Each store call is bounded by
/// `timeout`.
pub struct MergeUpsert {
    store: Arc<dyn ResultStore>,
    timeout: Duration,
    inflight: Mutex<HashMap<(String, NaiveDate), Arc<Mutex<()>>>>,
}

impl MergeUpsert {
    pub fn new(store: Arc<dyn ResultStore>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ResultStore> {
        &self.store
    }

    async fn acquire_key_lock(&self, source_id: &str, date: NaiveDate) -> OwnedMutexGuard<()> {
        let lock = {
            let mut inflight = self.inflight.lock().await;
            // Forget locks nobody is holding or waiting on.
            inflight.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(
                inflight
                    .entry((source_id.to_string(), date))
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    /// Overlay `records` onto the stored document for `(meta.source_id,
    /// date)` and write the result back.
    ///
    /// A failed or timed-out read of the existing document degrades to a
    /// store-side slot merge of `records` alone, so stored slots survive.
    /// A failed or timed-out write is returned as an error.
    pub async fn merge_and_persist(
        &self,
        meta: &SourceMeta,
        date: NaiveDate,
        records: &[DrawRecord],
    ) -> Result<ResultDocument, StoreError> {
        let guard = self.acquire_key_lock(&meta.source_id, date).await;

        let read = within(self.timeout, self.store.find_one(&meta.source_id, date)).await;
        let (existing, degraded) = match read {
            Ok(Some(doc)) => (doc.draws, false),
            Ok(None) => (Vec::new(), false),
            Err(e) => {
                warn!(
                    source = %meta.source_id,
                    date = %date,
                    error = %e,
                    "could not read existing document, merging slots in the store"
                );
                (Vec::new(), true)
            }
        };
        let before = existing.len();

        let doc = ResultDocument {
            source_id: meta.source_id.clone(),
            draw_date: date,
            lottery_name: meta.lottery_name.clone(),
            draw_name: meta.draw_name.clone(),
            country: meta.country.clone(),
            draws: merge_records(existing, records),
            scraped_at: Utc::now(),
        };
        let doc = self.write(guard, doc, degraded).await?;

        if degraded || doc.draws.len() > before {
            info!(
                source = %meta.source_id,
                date = %date,
                added = doc.draws.len().saturating_sub(before),
                total = doc.draws.len(),
                degraded,
                "stored new draws"
            );
        } else {
            debug!(
                source = %meta.source_id,
                date = %date,
                total = doc.draws.len(),
                "draws unchanged"
            );
        }
        Ok(doc)
    }

    /// Run the write on its own task, holding the key lock until the store
    /// call settles. A write that outlives `timeout` is reported as a
    /// timeout but still finishes before the next merge for the key reads.
    async fn write(
        &self,
        guard: OwnedMutexGuard<()>,
        doc: ResultDocument,
        degraded: bool,
    ) -> Result<ResultDocument, StoreError> {
        let store = Arc::clone(&self.store);
        let task = tokio::spawn(async move {
            let _guard = guard;
            if degraded {
                store.merge_slots(&doc).await
            } else {
                store.upsert_one(&doc).await.map(|()| doc)
            }
        });
        match tokio::time::timeout(self.timeout, task).await {
            Ok(joined) => joined?,
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }
}
