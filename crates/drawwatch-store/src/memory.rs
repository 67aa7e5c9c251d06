//! Process-local store. Nothing survives the process.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::NaiveDate;

use drawwatch_core::{Alert, AlertType, ResultDocument, merge_records};

use crate::{AlertStore, DocumentQuery, ResultStore, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    results: Mutex<BTreeMap<(String, NaiveDate), ResultDocument>>,
    alerts: Mutex<Vec<Alert>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    m.lock()
        .map_err(|_| StoreError::Other("memory store lock poisoned".into()))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every read fail until reset.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every write fail until reset.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn document_count(&self) -> usize {
        self.results.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// All alerts ever inserted, active or not.
    pub fn all_alerts(&self) -> Vec<Alert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    fn check_read(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Other("injected read failure".into()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Other("injected write failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn find_one(
        &self,
        source_id: &str,
        draw_date: NaiveDate,
    ) -> Result<Option<ResultDocument>, StoreError> {
        self.check_read()?;
        let results = lock(&self.results)?;
        Ok(results.get(&(source_id.to_string(), draw_date)).cloned())
    }

    async fn upsert_one(&self, doc: &ResultDocument) -> Result<(), StoreError> {
        self.check_write()?;
        let mut results = lock(&self.results)?;
        results.insert((doc.source_id.clone(), doc.draw_date), doc.clone());
        Ok(())
    }

    /// Not subject to read-fault injection: the read happens under the
    /// same lock as the write.
    async fn merge_slots(&self, doc: &ResultDocument) -> Result<ResultDocument, StoreError> {
        self.check_write()?;
        let mut results = lock(&self.results)?;
        let key = (doc.source_id.clone(), doc.draw_date);
        let existing = results.get(&key).map(|d| d.draws.clone()).unwrap_or_default();
        let merged = ResultDocument {
            draws: merge_records(existing, &doc.draws),
            ..doc.clone()
        };
        results.insert(key, merged.clone());
        Ok(merged)
    }

    async fn query(&self, query: &DocumentQuery) -> Result<Vec<ResultDocument>, StoreError> {
        self.check_read()?;
        let results = lock(&self.results)?;
        let mut docs: Vec<ResultDocument> = results
            .values()
            .filter(|doc| query.matches(doc))
            .cloned()
            .collect();
        docs.sort_by(|a, b| {
            b.draw_date
                .cmp(&a.draw_date)
                .then_with(|| a.source_id.cmp(&b.source_id))
        });
        Ok(docs)
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn find_active(
        &self,
        kind: AlertType,
        message: &str,
    ) -> Result<Option<Alert>, StoreError> {
        self.check_read()?;
        let alerts = lock(&self.alerts)?;
        Ok(alerts
            .iter()
            .find(|a| a.active && a.kind == kind && a.message == message)
            .cloned())
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<i64, StoreError> {
        self.check_write()?;
        let mut alerts = lock(&self.alerts)?;
        let id = alerts.len() as i64 + 1;
        let mut stored = alert.clone();
        stored.id = Some(id);
        alerts.push(stored);
        Ok(id)
    }

    async fn active_alerts(&self) -> Result<Vec<Alert>, StoreError> {
        self.check_read()?;
        let alerts = lock(&self.alerts)?;
        Ok(alerts.iter().rev().filter(|a| a.active).cloned().collect())
    }
}
