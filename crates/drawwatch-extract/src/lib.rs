//! Draw extraction: turns fetched page content into per-day draw records.
//!
//! Two strategies share one interface. [`TextScanExtractor`] reads the
//! visible text of rendered pages; [`TableExtractor`] walks label/data row
//! pairs in markup. Each source's configuration names the strategy it uses,
//! so the content itself is never sniffed.

pub mod table;
pub mod text;
pub mod tokenizer;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use drawwatch_core::{ALL_GAMES, DrawRecord};

pub use table::{GameMarker, TableExtractor, TableLayout};
pub use text::{DEFAULT_MIN_DIGITS, TextScanExtractor};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },
    #[error("invalid pattern {pattern:?}: {reason}")]
    Pattern { pattern: String, reason: String },
    #[error("extractor configuration: {0}")]
    Config(String),
}

/// Counters for tokens that did not become draws.
///
/// A time with no payload may be a slot that has not been drawn yet or a
/// page whose layout changed; the counters keep the two visible in logs
/// even though neither is an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanDiagnostics {
    pub times_without_date: usize,
    pub times_without_payload: usize,
    pub invalid_dates: usize,
    pub invalid_times: usize,
    pub duplicate_times: usize,
    pub short_games: usize,
}

impl ScanDiagnostics {
    /// True when times were seen but none of them produced a draw.
    pub fn looks_like_regression(&self, produced: usize) -> bool {
        produced == 0 && self.times_without_payload > 0
    }

    fn absorb(&mut self, other: &ScanDiagnostics) {
        self.times_without_date += other.times_without_date;
        self.times_without_payload += other.times_without_payload;
        self.invalid_dates += other.invalid_dates;
        self.invalid_times += other.invalid_times;
        self.duplicate_times += other.duplicate_times;
        self.short_games += other.short_games;
    }
}

/// Draws found in one piece of content, bucketed by calendar day.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Days seen in the content. A day may map to an empty list when its
    /// header was found but none of its draws were readable.
    pub by_date: BTreeMap<NaiveDate, Vec<DrawRecord>>,
    pub diagnostics: ScanDiagnostics,
}

impl Extraction {
    pub fn record_count(&self) -> usize {
        self.by_date.values().map(Vec::len).sum()
    }

    /// Fold another extraction into this one. Slots already present keep
    /// their first observation.
    pub fn absorb(&mut self, other: Extraction) {
        self.diagnostics.absorb(&other.diagnostics);
        for (date, records) in other.by_date {
            let bucket = self.by_date.entry(date).or_default();
            for record in records {
                if bucket.iter().any(|r| r.time == record.time) {
                    self.diagnostics.duplicate_times += 1;
                } else {
                    bucket.push(record);
                }
            }
        }
    }

    /// Drop every day except `date`.
    pub fn retain_date(&mut self, date: NaiveDate) {
        self.by_date.retain(|d, _| *d == date);
    }
}

/// A per-source strategy for reading draws out of fetched content.
pub trait DrawExtractor: Send + Sync {
    /// `reference_date` is the day the cycle is working on, in the source's
    /// time zone. It supplies the year for dates printed without one.
    fn extract_draws(
        &self,
        content: &str,
        reference_date: NaiveDate,
    ) -> Result<Extraction, ExtractError>;
}

fn default_payload_key() -> String {
    ALL_GAMES.to_string()
}

fn default_min_digits() -> usize {
    DEFAULT_MIN_DIGITS
}

/// Extraction strategy as written in a source's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractorSpec {
    Text {
        #[serde(default = "default_payload_key")]
        payload_key: String,
        #[serde(default = "default_min_digits")]
        min_digits: usize,
    },
    Table(TableLayout),
}

impl ExtractorSpec {
    pub fn build(&self) -> Result<Box<dyn DrawExtractor>, ExtractError> {
        match self {
            Self::Text {
                payload_key,
                min_digits,
            } => Ok(Box::new(TextScanExtractor::new(payload_key.clone(), *min_digits)?)),
            Self::Table(layout) => Ok(Box::new(TableExtractor::new(layout.clone())?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drawwatch_core::TimeLabel;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    fn record(time: &str, digits: &str) -> DrawRecord {
        DrawRecord::undifferentiated(TimeLabel::parse(time).unwrap(), digits)
    }

    #[test]
    fn absorb_keeps_first_observation() {
        let mut first = Extraction::default();
        first.by_date.insert(day(8), vec![record("10:00 AM", "1-2")]);
        let mut second = Extraction::default();
        second
            .by_date
            .insert(day(8), vec![record("10:00 AM", "9-9"), record("11:00 AM", "3-4")]);
        second.diagnostics.invalid_dates = 2;

        first.absorb(second);
        let bucket = &first.by_date[&day(8)];
        assert_eq!(bucket.len(), 2);
        assert_eq!(bucket[0].payload["All"], "1-2");
        assert_eq!(first.diagnostics.duplicate_times, 1);
        assert_eq!(first.diagnostics.invalid_dates, 2);
    }

    #[test]
    fn retain_date_filters_other_days() {
        let mut ex = Extraction::default();
        ex.by_date.insert(day(7), vec![record("10:00 PM", "1-1")]);
        ex.by_date.insert(day(8), vec![record("10:00 AM", "2-2")]);
        ex.retain_date(day(8));
        assert_eq!(ex.by_date.keys().copied().collect::<Vec<_>>(), [day(8)]);
    }

    #[test]
    fn spec_selects_strategy_by_kind() {
        let text: ExtractorSpec =
            serde_json::from_str(r#"{"kind": "text", "min_digits": 4}"#).unwrap();
        assert_eq!(
            text,
            ExtractorSpec::Text {
                payload_key: "All".into(),
                min_digits: 4
            }
        );
        let extractor = text.build().unwrap();
        let ex = extractor
            .extract_draws("Jan 8, 2026 10:00 AM 1 2 3 4", day(8))
            .unwrap();
        assert_eq!(ex.record_count(), 1);

        let bad: ExtractorSpec =
            serde_json::from_str(r#"{"kind": "text", "min_digits": 0}"#).unwrap();
        assert!(bad.build().is_err());
    }

    #[test]
    fn regression_heuristic() {
        let diag = ScanDiagnostics {
            times_without_payload: 3,
            ..Default::default()
        };
        assert!(diag.looks_like_regression(0));
        assert!(!diag.looks_like_regression(1));
        assert!(!ScanDiagnostics::default().looks_like_regression(0));
    }
}
