//! Storage layer: persisted result documents and alerts.
//!
//! [`ResultStore`] and [`AlertStore`] are the storage capability the pipeline
//! consumes. [`DuckStore`] backs them with DuckDB (in-memory or file-backed);
//! [`MemoryStore`] is a process-local implementation with failure injection.
//! [`MergeUpsert`] and [`AlertSink`] sit on top and own the merge and alert
//! policies.

mod alerts;
mod error;
mod memory;
mod merge;

pub use alerts::AlertSink;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use merge::{MergeUpsert, SourceMeta};

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
mod handle;
#[cfg(feature = "duckdb")]
pub use duck::DuckStore;
#[cfg(feature = "duckdb")]
pub use handle::StoreHandle;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use drawwatch_core::{Alert, AlertType, ResultDocument, merge_records};

/// Filter for the administrative read path.
///
/// `source_pattern` uses SQL `LIKE` syntax (`%` and `_`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentQuery {
    pub source_pattern: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DocumentQuery {
    pub fn matches(&self, doc: &ResultDocument) -> bool {
        self.source_pattern
            .as_deref()
            .is_none_or(|p| like_match(p, &doc.source_id))
            && self.from.is_none_or(|d| doc.draw_date >= d)
            && self.to.is_none_or(|d| doc.draw_date <= d)
    }
}

/// Persisted (source, day) result documents.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn find_one(
        &self,
        source_id: &str,
        draw_date: NaiveDate,
    ) -> Result<Option<ResultDocument>, StoreError>;

    /// Insert or replace the document for `(doc.source_id, doc.draw_date)`.
    async fn upsert_one(&self, doc: &ResultDocument) -> Result<(), StoreError>;

    /// Overlay `doc.draws` onto whatever is stored for the same key and
    /// write the result, leaving stored slots that `doc` does not carry
    /// untouched. Returns the document as written.
    ///
    /// The default reads then writes; stores that can do both under one
    /// lock override it.
    async fn merge_slots(&self, doc: &ResultDocument) -> Result<ResultDocument, StoreError> {
        let existing = self
            .find_one(&doc.source_id, doc.draw_date)
            .await?
            .map(|d| d.draws)
            .unwrap_or_default();
        let merged = ResultDocument {
            draws: merge_records(existing, &doc.draws),
            ..doc.clone()
        };
        self.upsert_one(&merged).await?;
        Ok(merged)
    }

    /// Documents matching `query`, newest day first.
    async fn query(&self, query: &DocumentQuery) -> Result<Vec<ResultDocument>, StoreError>;
}

/// Persisted operator alerts.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn find_active(
        &self,
        kind: AlertType,
        message: &str,
    ) -> Result<Option<Alert>, StoreError>;

    /// Returns the id assigned to the new alert.
    async fn insert_alert(&self, alert: &Alert) -> Result<i64, StoreError>;

    /// Active alerts, newest first.
    async fn active_alerts(&self) -> Result<Vec<Alert>, StoreError>;
}

/// Bound a store call by `limit`.
pub async fn within<T, F>(limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| StoreError::Timeout(limit))?
}

/// SQL `LIKE` matching: `%` is any run, `_` is one character.
pub(crate) fn like_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '_' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '%' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if let Some((bp, bt)) = backtrack {
            pi = bp + 1;
            ti = bt + 1;
            backtrack = Some((bp, bt + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '%')
}
