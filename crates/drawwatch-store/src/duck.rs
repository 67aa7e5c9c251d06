//! DuckDB storage for result documents and alerts.

use std::path::Path;
use std::sync::{Arc, Mutex};

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use duckdb::{Connection, Row, params, params_from_iter};
use tracing::{info, warn};

use drawwatch_core::{
    Alert, AlertType, ResultDocument, decode_draws, encode_draws, merge_records,
};

use crate::{AlertStore, DocumentQuery, ResultStore, StoreError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS results (
    source_id    VARCHAR NOT NULL,
    draw_date    VARCHAR NOT NULL,
    lottery_name VARCHAR NOT NULL,
    draw_name    VARCHAR NOT NULL,
    country      VARCHAR NOT NULL,
    draws        VARCHAR NOT NULL,
    scraped_at   VARCHAR NOT NULL,
    PRIMARY KEY (source_id, draw_date)
);
CREATE SEQUENCE IF NOT EXISTS alert_ids START 1;
CREATE TABLE IF NOT EXISTS alerts (
    id         BIGINT PRIMARY KEY DEFAULT nextval('alert_ids'),
    alert_type VARCHAR NOT NULL,
    severity   VARCHAR NOT NULL,
    message    VARCHAR NOT NULL,
    metadata   VARCHAR NOT NULL,
    active     BOOLEAN NOT NULL,
    created_at VARCHAR NOT NULL
);
";

const RESULT_COLUMNS: &str =
    "source_id, draw_date, lottery_name, draw_name, country, draws, scraped_at";

const ALERT_COLUMNS: &str = "id, alert_type, severity, message, metadata, active, created_at";

/// DuckDB-backed [`ResultStore`] and [`AlertStore`].
///
/// Dates are stored as ISO 8601 strings (`YYYY-MM-DD`) and timestamps as
/// RFC 3339 UTC strings with fixed microsecond precision, so lexical order
/// is chronological order. `draws` holds the canonical JSON encoding.
///
/// Use [`open`](Self::open) for an in-memory database and
/// [`open_persistent`](Self::open_persistent) for a file that survives
/// restarts. The connection is shared behind a mutex; async callers run
/// statements on the blocking pool.
#[derive(Clone)]
pub struct DuckStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckStore {
    /// Open an in-memory DuckDB database.
    pub fn open() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Open or create a persistent DuckDB database at the given path.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let store = Self::init(Connection::open(path)?)?;
        info!(path = %path.display(), results = store.result_count()?, "opened result store");
        Ok(store)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::Other("duckdb connection lock poisoned".into()))?;
        f(&conn)
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&DuckStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store)).await?
    }

    /// Cheap liveness probe.
    pub fn ping(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute_batch("SELECT 1")?;
            Ok(())
        })
    }

    // ── Counts ──

    pub fn result_count(&self) -> Result<usize, StoreError> {
        self.count_table("results")
    }

    pub fn alert_count(&self) -> Result<usize, StoreError> {
        self.count_table("alerts")
    }

    fn count_table(&self, table: &str) -> Result<usize, StoreError> {
        let sql = format!("SELECT count(*)::BIGINT FROM {table}");
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            Ok(n as usize)
        })
    }

    // ── Results ──

    pub fn find_one_sync(
        &self,
        source_id: &str,
        draw_date: NaiveDate,
    ) -> Result<Option<ResultDocument>, StoreError> {
        self.with_conn(|conn| read_document(conn, source_id, draw_date))
    }

    /// Atomic insert-or-update keyed on `(source_id, draw_date)`.
    pub fn upsert_one_sync(&self, doc: &ResultDocument) -> Result<(), StoreError> {
        self.with_conn(|conn| write_document(conn, doc))
    }

    /// Overlay `doc.draws` onto the stored draws for the same key, read and
    /// written under one hold of the connection. A stored row that no
    /// longer decodes is replaced.
    pub fn merge_slots_sync(&self, doc: &ResultDocument) -> Result<ResultDocument, StoreError> {
        self.with_conn(|conn| {
            let existing = match read_document(conn, &doc.source_id, doc.draw_date) {
                Ok(found) => found.map(|d| d.draws).unwrap_or_default(),
                Err(e @ (StoreError::Corrupt(_) | StoreError::Json(_))) => {
                    warn!(
                        source = %doc.source_id,
                        date = %doc.draw_date,
                        error = %e,
                        "stored document unreadable, replacing"
                    );
                    Vec::new()
                }
                Err(e) => return Err(e),
            };
            let merged = ResultDocument {
                draws: merge_records(existing, &doc.draws),
                ..doc.clone()
            };
            write_document(conn, &merged)?;
            Ok(merged)
        })
    }

    pub fn query_sync(&self, query: &DocumentQuery) -> Result<Vec<ResultDocument>, StoreError> {
        let (filter, args) = where_clause(query);
        let sql = format!(
            "SELECT {RESULT_COLUMNS} FROM results{filter} ORDER BY draw_date DESC, source_id"
        );
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(args.iter().map(String::as_str)))?;
            let mut docs = Vec::new();
            while let Some(row) = rows.next()? {
                docs.push(document_from_row(row)?);
            }
            Ok(docs)
        })
    }

    /// Per-source day counts and date span for the documents matching
    /// `query`, as Arrow batches with columns
    /// `(source_id, days, first_day, last_day, last_scraped)`.
    pub fn coverage(&self, query: &DocumentQuery) -> Result<Vec<RecordBatch>, StoreError> {
        let (filter, args) = where_clause(query);
        let sql = format!(
            "SELECT source_id,
                    count(*)::BIGINT AS days,
                    min(draw_date) AS first_day,
                    max(draw_date) AS last_day,
                    max(scraped_at) AS last_scraped
             FROM results{filter}
             GROUP BY source_id
             ORDER BY source_id"
        );
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let batches: Vec<RecordBatch> = stmt
                .query_arrow(params_from_iter(args.iter().map(String::as_str)))?
                .collect();
            Ok(batches)
        })
    }

    // ── Alerts ──

    pub fn insert_alert_sync(&self, alert: &Alert) -> Result<i64, StoreError> {
        let metadata = serde_json::to_string(&alert.metadata)?;
        self.with_conn(|conn| {
            let id: i64 = conn.query_row(
                "INSERT INTO alerts (alert_type, severity, message, metadata, active, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)
                 RETURNING id",
                params![
                    alert.kind.as_str(),
                    alert.severity.as_str(),
                    alert.message,
                    metadata,
                    alert.active,
                    iso_timestamp(alert.created_at),
                ],
                |row| row.get(0),
            )?;
            Ok(id)
        })
    }

    fn alerts_where(&self, filter: &str, args: &[&str]) -> Result<Vec<Alert>, StoreError> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE {filter} ORDER BY created_at DESC, id DESC"
        );
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(args.iter().copied()))?;
            let mut alerts = Vec::new();
            while let Some(row) = rows.next()? {
                alerts.push(alert_from_row(row)?);
            }
            Ok(alerts)
        })
    }

    /// Mark an alert as dismissed. Returns whether a row changed.
    pub fn dismiss_alert(&self, id: i64) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE alerts SET active = false WHERE id = ? AND active",
                params![id],
            )?;
            Ok(changed > 0)
        })
    }
}

#[async_trait]
impl ResultStore for DuckStore {
    async fn find_one(
        &self,
        source_id: &str,
        draw_date: NaiveDate,
    ) -> Result<Option<ResultDocument>, StoreError> {
        let source_id = source_id.to_string();
        self.blocking(move |s| s.find_one_sync(&source_id, draw_date))
            .await
    }

    async fn upsert_one(&self, doc: &ResultDocument) -> Result<(), StoreError> {
        let doc = doc.clone();
        self.blocking(move |s| s.upsert_one_sync(&doc)).await
    }

    async fn merge_slots(&self, doc: &ResultDocument) -> Result<ResultDocument, StoreError> {
        let doc = doc.clone();
        self.blocking(move |s| s.merge_slots_sync(&doc)).await
    }

    async fn query(&self, query: &DocumentQuery) -> Result<Vec<ResultDocument>, StoreError> {
        let query = query.clone();
        self.blocking(move |s| s.query_sync(&query)).await
    }
}

#[async_trait]
impl AlertStore for DuckStore {
    async fn find_active(
        &self,
        kind: AlertType,
        message: &str,
    ) -> Result<Option<Alert>, StoreError> {
        let message = message.to_string();
        self.blocking(move |s| {
            let filter = "active AND alert_type = ? AND message = ?";
            let found = s.alerts_where(filter, &[kind.as_str(), message.as_str()])?;
            Ok(found.into_iter().next())
        })
        .await
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<i64, StoreError> {
        let alert = alert.clone();
        self.blocking(move |s| s.insert_alert_sync(&alert)).await
    }

    async fn active_alerts(&self) -> Result<Vec<Alert>, StoreError> {
        self.blocking(|s| s.alerts_where("active", &[])).await
    }
}

// ── Row mapping ──

fn iso_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn iso_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_date(raw: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| StoreError::Corrupt(format!("date {raw:?}: {e}")))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {raw:?}: {e}")))
}

fn where_clause(query: &DocumentQuery) -> (String, Vec<String>) {
    let mut conditions = Vec::new();
    let mut args = Vec::new();
    if let Some(pattern) = &query.source_pattern {
        conditions.push("source_id LIKE ?");
        args.push(pattern.clone());
    }
    if let Some(from) = query.from {
        conditions.push("draw_date >= ?");
        args.push(iso_date(from));
    }
    if let Some(to) = query.to {
        conditions.push("draw_date <= ?");
        args.push(iso_date(to));
    }
    if conditions.is_empty() {
        (String::new(), args)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), args)
    }
}

fn read_document(
    conn: &Connection,
    source_id: &str,
    draw_date: NaiveDate,
) -> Result<Option<ResultDocument>, StoreError> {
    let sql = format!("SELECT {RESULT_COLUMNS} FROM results WHERE source_id = ? AND draw_date = ?");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![source_id, iso_date(draw_date)])?;
    match rows.next()? {
        Some(row) => Ok(Some(document_from_row(row)?)),
        None => Ok(None),
    }
}

fn write_document(conn: &Connection, doc: &ResultDocument) -> Result<(), StoreError> {
    let draws = encode_draws(&doc.draws)?;
    conn.execute(
        "INSERT INTO results (source_id, draw_date, lottery_name, draw_name, country, draws, scraped_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (source_id, draw_date) DO UPDATE SET
             lottery_name = EXCLUDED.lottery_name,
             draw_name = EXCLUDED.draw_name,
             country = EXCLUDED.country,
             draws = EXCLUDED.draws,
             scraped_at = EXCLUDED.scraped_at",
        params![
            doc.source_id,
            iso_date(doc.draw_date),
            doc.lottery_name,
            doc.draw_name,
            doc.country,
            draws,
            iso_timestamp(doc.scraped_at),
        ],
    )?;
    Ok(())
}

fn document_from_row(row: &Row<'_>) -> Result<ResultDocument, StoreError> {
    let source_id: String = row.get(0)?;
    let draw_date: String = row.get(1)?;
    let draws: String = row.get(5)?;
    let scraped_at: String = row.get(6)?;

    let decoded = decode_draws(&draws)?;
    if decoded.skipped > 0 {
        warn!(
            source = %source_id,
            date = %draw_date,
            skipped = decoded.skipped,
            "stored document has unreadable draws"
        );
    }

    Ok(ResultDocument {
        draw_date: parse_date(&draw_date)?,
        lottery_name: row.get(2)?,
        draw_name: row.get(3)?,
        country: row.get(4)?,
        draws: decoded.records,
        scraped_at: parse_timestamp(&scraped_at)?,
        source_id,
    })
}

fn alert_from_row(row: &Row<'_>) -> Result<Alert, StoreError> {
    let kind: String = row.get(1)?;
    let severity: String = row.get(2)?;
    let metadata: String = row.get(4)?;
    let created_at: String = row.get(6)?;
    Ok(Alert {
        id: Some(row.get(0)?),
        kind: kind
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("alert type: {e}")))?,
        severity: severity
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("alert severity: {e}")))?,
        message: row.get(3)?,
        metadata: serde_json::from_str(&metadata)?,
        active: row.get(5)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use drawwatch_core::{DrawRecord, Payload, Severity, TimeLabel};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    fn pick3(time: &str, digits: &str) -> DrawRecord {
        let mut payload = Payload::new();
        payload.insert("Pick 3".into(), digits.into());
        DrawRecord::new(TimeLabel::parse(time).unwrap(), payload)
    }

    fn doc(source_id: &str, d: u32, draws: Vec<DrawRecord>) -> ResultDocument {
        ResultDocument {
            source_id: source_id.into(),
            draw_date: day(d),
            lottery_name: "Florida Lottery".into(),
            draw_name: "Pick 3".into(),
            country: "US".into(),
            draws,
            scraped_at: Utc::now(),
        }
    }

    #[test]
    fn open_in_memory() {
        let store = DuckStore::open().unwrap();
        assert_eq!(store.result_count().unwrap(), 0);
        assert_eq!(store.alert_count().unwrap(), 0);
        store.ping().unwrap();
    }

    #[test]
    fn upsert_then_find() {
        let store = DuckStore::open().unwrap();
        let original = doc("us/fl/pick3", 8, vec![pick3("2:00 PM", "427")]);
        store.upsert_one_sync(&original).unwrap();

        let found = store.find_one_sync("us/fl/pick3", day(8)).unwrap().unwrap();
        assert_eq!(found.draws, original.draws);
        assert_eq!(found.draw_date, day(8));
        assert_eq!(found.lottery_name, "Florida Lottery");
        assert!(store.find_one_sync("us/fl/pick3", day(9)).unwrap().is_none());
    }

    #[test]
    fn upsert_updates_in_place() {
        let store = DuckStore::open().unwrap();
        store
            .upsert_one_sync(&doc("s", 8, vec![pick3("2:00 PM", "111")]))
            .unwrap();
        store
            .upsert_one_sync(&doc("s", 8, vec![pick3("2:00 PM", "222")]))
            .unwrap();
        assert_eq!(store.result_count().unwrap(), 1);
        let found = store.find_one_sync("s", day(8)).unwrap().unwrap();
        assert_eq!(found.draws[0].payload["Pick 3"], "222");
    }

    #[test]
    fn merge_slots_keeps_stored_draws() {
        let store = DuckStore::open().unwrap();
        store
            .upsert_one_sync(&doc("s", 8, vec![pick3("10:00 AM", "100"), pick3("2:00 PM", "111")]))
            .unwrap();
        let merged = store
            .merge_slots_sync(&doc("s", 8, vec![pick3("2:00 PM", "222"), pick3("8:00 PM", "800")]))
            .unwrap();
        let times: Vec<String> = merged.draws.iter().map(|r| r.time.to_string()).collect();
        assert_eq!(times, ["8:00 PM", "2:00 PM", "10:00 AM"]);
        assert_eq!(merged.draws[1].payload["Pick 3"], "222");

        let found = store.find_one_sync("s", day(8)).unwrap().unwrap();
        assert_eq!(found.draws, merged.draws);
    }

    #[test]
    fn merge_slots_replaces_undecodable_row() {
        let store = DuckStore::open().unwrap();
        store.upsert_one_sync(&doc("s", 8, Vec::new())).unwrap();
        store
            .with_conn(|conn| {
                conn.execute("UPDATE results SET draws = 'not json'", [])?;
                Ok(())
            })
            .unwrap();
        assert!(store.find_one_sync("s", day(8)).is_err());

        let merged = store
            .merge_slots_sync(&doc("s", 8, vec![pick3("10:00 AM", "100")]))
            .unwrap();
        assert_eq!(merged.draws.len(), 1);
        let found = store.find_one_sync("s", day(8)).unwrap().unwrap();
        assert_eq!(found.draws, merged.draws);
    }

    #[test]
    fn stored_draws_use_canonical_encoding() {
        let store = DuckStore::open().unwrap();
        store
            .upsert_one_sync(&doc("s", 8, vec![pick3("2:00 PM", "427")]))
            .unwrap();
        let raw: String = store
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT draws FROM results", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(raw, r#"[{"time":"2:00 PM","draws":{"Pick 3":"427"}}]"#);
    }

    #[test]
    fn query_by_pattern_and_range() {
        let store = DuckStore::open().unwrap();
        let keys = [
            ("us/fl/pick3", 6),
            ("us/fl/pick3", 8),
            ("us/ny/numbers", 7),
            ("do/loteka", 7),
        ];
        for (id, d) in keys {
            store.upsert_one_sync(&doc(id, d, Vec::new())).unwrap();
        }
        let docs = store
            .query_sync(&DocumentQuery {
                source_pattern: Some("us/%".into()),
                from: Some(day(7)),
                to: None,
            })
            .unwrap();
        let keys: Vec<(&str, NaiveDate)> = docs
            .iter()
            .map(|d| (d.source_id.as_str(), d.draw_date))
            .collect();
        assert_eq!(keys, [("us/fl/pick3", day(8)), ("us/ny/numbers", day(7))]);

        let all = store.query_sync(&DocumentQuery::default()).unwrap();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn coverage_groups_by_source() {
        let store = DuckStore::open().unwrap();
        for d in [5, 6, 8] {
            store.upsert_one_sync(&doc("a", d, Vec::new())).unwrap();
        }
        store.upsert_one_sync(&doc("b", 7, Vec::new())).unwrap();
        let batches = store.coverage(&DocumentQuery::default()).unwrap();
        let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(rows, 2);
        let schema = batches[0].schema();
        assert_eq!(schema.field(0).name(), "source_id");
        assert_eq!(schema.field(1).name(), "days");
        let days = batches[0]
            .column(1)
            .as_any()
            .downcast_ref::<arrow::array::Int64Array>()
            .unwrap();
        assert_eq!(days.value(0), 3);
    }

    #[test]
    fn alerts_roundtrip_and_dismiss() {
        let store = DuckStore::open().unwrap();
        let alert = Alert::new(
            AlertType::MissingData,
            Severity::High,
            "Missing draws for us/fl/pick3 on 2026-01-08",
            serde_json::json!({"missingDraws": ["11:00 AM"], "date": "2026-01-08"}),
        );
        let first = store.insert_alert_sync(&alert).unwrap();
        let second = store.insert_alert_sync(&alert).unwrap();
        assert!(second > first);

        let active = store.alerts_where("active", &[]).unwrap();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].kind, AlertType::MissingData);
        assert_eq!(active[0].metadata["missingDraws"][0], "11:00 AM");

        assert!(store.dismiss_alert(first).unwrap());
        assert!(!store.dismiss_alert(first).unwrap());
        assert_eq!(store.alerts_where("active", &[]).unwrap().len(), 1);
        assert_eq!(store.alert_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn async_traits_run_on_blocking_pool() {
        let store = DuckStore::open().unwrap();
        store
            .upsert_one(&doc("s", 8, vec![pick3("10:00 AM", "123")]))
            .await
            .unwrap();
        let found = store.find_one("s", day(8)).await.unwrap().unwrap();
        assert_eq!(found.draws.len(), 1);

        let alert = Alert::new(
            AlertType::ScraperFailure,
            Severity::High,
            "fetch failed",
            serde_json::Value::Null,
        );
        let id = store.insert_alert(&alert).await.unwrap();
        let active = store
            .find_active(AlertType::ScraperFailure, "fetch failed")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.id, Some(id));
        assert!(
            store
                .find_active(AlertType::MissingData, "fetch failed")
                .await
                .unwrap()
                .is_none()
        );
    }

    // ── Persistent storage tests ──

    #[test]
    fn open_persistent_creates_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let db_path = tmp.path().join("test.duckdb");
        assert!(!db_path.exists());

        let store = DuckStore::open_persistent(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(store.result_count().unwrap(), 0);
    }

    #[test]
    fn persistent_reopen_keeps_documents() {
        let tmp = tempfile::TempDir::new().unwrap();
        let db_path = tmp.path().join("test.duckdb");

        let store = DuckStore::open_persistent(&db_path).unwrap();
        store
            .upsert_one_sync(&doc(
                "s",
                8,
                vec![pick3("8:00 PM", "999"), pick3("2:00 PM", "427")],
            ))
            .unwrap();
        drop(store);

        let store = DuckStore::open_persistent(&db_path).unwrap();
        let found = store.find_one_sync("s", day(8)).unwrap().unwrap();
        let times: Vec<String> = found.draws.iter().map(|r| r.time.to_string()).collect();
        assert_eq!(times, ["8:00 PM", "2:00 PM"]);
    }
}
