//! Scrape cycle: fetch, extract, merge-upsert, then completeness check.
//!
//! Every failure inside one source's cycle ends at the per-source boundary
//! as a log line, an alert, or both. Nothing here returns an error to the
//! scheduler loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use futures::future::join_all;
use serde_json::json;
use tracing::{debug, info, warn};

use drawwatch_core::{AlertType, DayStatus, Severity, find_missing_slots};
use drawwatch_extract::{DrawExtractor, Extraction};
use drawwatch_fetch::{FetchSpec, Fetcher, RawContent, RetryPolicy};
use drawwatch_store::{AlertSink, MergeUpsert, ResultStore, StoreError, within};

use crate::config::{ConfigError, SourceConfig};

/// A configured source with its extractor built and time zone resolved.
pub struct Source {
    pub config: SourceConfig,
    pub tz: Tz,
    extractor: Box<dyn DrawExtractor>,
}

impl Source {
    pub fn new(config: SourceConfig) -> Result<Self, ConfigError> {
        let tz = config.tz()?;
        let extractor = config.build_extractor()?;
        Ok(Self {
            config,
            tz,
            extractor,
        })
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Wall-clock reading in the source's time zone.
    pub fn local_now(&self, now: DateTime<Utc>) -> NaiveDateTime {
        now.with_timezone(&self.tz).naive_local()
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.local_now(now).date()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed {
        date: NaiveDate,
        /// Draw records handed to the store this cycle.
        written: usize,
        /// `None` when the source has no schedule or the check could not run.
        status: Option<DayStatus>,
    },
    Failed {
        stage: &'static str,
        error: String,
    },
}

#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source_id: String,
    pub outcome: CycleOutcome,
    pub elapsed: Duration,
}

impl SourceReport {
    pub fn failed(&self) -> bool {
        matches!(self.outcome, CycleOutcome::Failed { .. })
    }
}

pub struct Pipeline {
    fetcher: Arc<dyn Fetcher>,
    retry: RetryPolicy,
    merger: MergeUpsert,
    alerts: AlertSink,
    store_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        retry: RetryPolicy,
        results: Arc<dyn ResultStore>,
        alerts: AlertSink,
        store_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            retry,
            merger: MergeUpsert::new(results, store_timeout),
            alerts,
            store_timeout,
        }
    }

    /// One cycle for every source, concurrently. A failing source does not
    /// affect the others.
    pub async fn run_all(
        &self,
        sources: &[Source],
        target: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> Vec<SourceReport> {
        let reports = join_all(sources.iter().map(|s| self.run_source(s, target, now))).await;
        let failed = reports.iter().filter(|r| r.failed()).count();
        info!(sources = reports.len(), failed, "cycle finished");
        reports
    }

    /// One cycle for one source. `target` defaults to today in the source's
    /// time zone.
    pub async fn run_source(
        &self,
        source: &Source,
        target: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> SourceReport {
        let started = Instant::now();
        let date = target.unwrap_or_else(|| source.today(now));
        let outcome = self.cycle(source, date, now).await;
        match &outcome {
            CycleOutcome::Completed {
                written, status, ..
            } => info!(
                source = %source.id(),
                date = %date,
                written,
                status = ?status,
                "source cycle done"
            ),
            CycleOutcome::Failed { stage, error } => warn!(
                source = %source.id(),
                date = %date,
                stage,
                error = %error,
                "source cycle failed"
            ),
        }
        SourceReport {
            source_id: source.id().to_string(),
            outcome,
            elapsed: started.elapsed(),
        }
    }

    async fn cycle(&self, source: &Source, date: NaiveDate, now: DateTime<Utc>) -> CycleOutcome {
        let spec = &source.config.fetch;
        let fetched = self
            .retry
            .run(source.id(), || self.fetcher.fetch(spec, date))
            .await;
        let contents = match fetched {
            Ok(contents) => contents,
            Err(e) => {
                let error = e.to_string();
                self.scraper_failure(source, date, "fetch", &error).await;
                return CycleOutcome::Failed {
                    stage: "fetch",
                    error,
                };
            }
        };

        let extraction = self.extract(source, date, &contents);
        let today = source.today(now);
        let mut written = 0;
        for (bucket_date, records) in &extraction.by_date {
            if records.is_empty() {
                continue;
            }
            if *bucket_date > today {
                warn!(
                    source = %source.id(),
                    date = %bucket_date,
                    today = %today,
                    "skipping draws dated in the future"
                );
                continue;
            }
            let meta = source.config.meta();
            if let Err(e) = self.merger.merge_and_persist(&meta, *bucket_date, records).await {
                let error = e.to_string();
                self.scraper_failure(source, *bucket_date, "persist", &error)
                    .await;
                return CycleOutcome::Failed {
                    stage: "persist",
                    error,
                };
            }
            written += records.len();
        }

        let status = self.validate(source, date, now).await;
        CycleOutcome::Completed {
            date,
            written,
            status,
        }
    }

    fn extract(&self, source: &Source, date: NaiveDate, contents: &[RawContent]) -> Extraction {
        let mut merged = Extraction::default();
        for content in contents {
            if content.is_empty() {
                debug!(source = %source.id(), "empty document");
                continue;
            }
            match source.extractor.extract_draws(&content.text(), date) {
                Ok(extraction) => merged.absorb(extraction),
                Err(e) => warn!(source = %source.id(), error = %e, "extraction failed"),
            }
        }
        // Form endpoints are asked for one day; rows for other days on the
        // landing page are not trusted.
        if matches!(source.config.fetch, FetchSpec::Form { .. }) {
            merged.retain_date(date);
        }

        let diag = merged.diagnostics;
        let produced = merged.record_count();
        info!(
            source = %source.id(),
            documents = contents.len(),
            draws = produced,
            days = merged.by_date.len(),
            times_without_date = diag.times_without_date,
            times_without_payload = diag.times_without_payload,
            invalid_dates = diag.invalid_dates,
            invalid_times = diag.invalid_times,
            duplicate_times = diag.duplicate_times,
            short_games = diag.short_games,
            "extracted"
        );
        if diag.looks_like_regression(produced) {
            warn!(
                source = %source.id(),
                times = diag.times_without_payload,
                "times found but no draws read; page layout may have changed"
            );
        }
        merged
    }

    /// Completeness of the stored document for `date`, without alerting.
    /// `None` when the source has no schedule.
    pub async fn day_status(
        &self,
        source: &Source,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<DayStatus>, StoreError> {
        let Some(schedule) = source.config.schedule.as_ref() else {
            return Ok(None);
        };
        let stored = within(
            self.store_timeout,
            self.merger.store().find_one(source.id(), date),
        )
        .await?;
        let observed: Vec<String> = stored
            .map(|doc| doc.draws.iter().map(|r| r.time.to_string()).collect())
            .unwrap_or_default();
        let missing = find_missing_slots(
            schedule,
            date,
            &observed,
            source.local_now(now),
            source.config.grace(),
        );
        Ok(Some(DayStatus::evaluate(observed.len(), missing)))
    }

    /// Evaluate the stored document for `date` against the source's
    /// schedule, raising `MISSING_DATA` when due slots are absent.
    async fn validate(
        &self,
        source: &Source,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Option<DayStatus> {
        let status = match self.day_status(source, date, now).await {
            Ok(status) => status?,
            Err(e) => {
                warn!(
                    source = %source.id(),
                    date = %date,
                    error = %e,
                    "completeness check skipped"
                );
                return None;
            }
        };
        if status.needs_alert() {
            let missing: Vec<String> = status.missing().iter().map(ToString::to_string).collect();
            self.alerts
                .raise(
                    AlertType::MissingData,
                    format!(
                        "Missing {} draws for {} on {}: {}",
                        missing.len(),
                        source.id(),
                        date,
                        missing.join(", ")
                    ),
                    json!({
                        "sourceId": source.id(),
                        "date": date.to_string(),
                        "missingDraws": missing,
                    }),
                    Severity::High,
                )
                .await;
        }
        Some(status)
    }

    async fn scraper_failure(&self, source: &Source, date: NaiveDate, stage: &str, error: &str) {
        self.alerts
            .raise(
                AlertType::ScraperFailure,
                format!("Scraper failure for {} ({stage})", source.id()),
                json!({
                    "sourceId": source.id(),
                    "date": date.to_string(),
                    "stage": stage,
                    "error": error,
                }),
                Severity::High,
            )
            .await;
    }
}
