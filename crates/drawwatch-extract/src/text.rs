//! Free-text draw reconstruction.
//!
//! Rendered single-page apps give us nothing but visible text, something
//! like:
//!
//! ```text
//! Jan 8, 2026  10:00 AM  4, 2, 7, 1, 8, 8, 0, 3, 5, 6  10:30 AM  ...
//! ```
//!
//! The scanner walks the token stream in order. A date token sets the
//! current day; each time token takes the text up to the next token as its
//! window and looks there for a long enough run of digits.

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use tracing::debug;

use drawwatch_core::{DrawRecord, TimeLabel};

use crate::tokenizer::{self, EventKind};
use crate::{DrawExtractor, ExtractError, Extraction};

/// Digit-run threshold that matches multi-game number boards.
pub const DEFAULT_MIN_DIGITS: usize = 10;

/// Reconstructs draws from unstructured page text.
#[derive(Debug, Clone)]
pub struct TextScanExtractor {
    payload_key: String,
    min_digits: usize,
    digit_run: Regex,
}

impl TextScanExtractor {
    /// `min_digits` is the shortest digit run accepted as a payload;
    /// separators (commas, whitespace) between digits do not count.
    pub fn new(payload_key: impl Into<String>, min_digits: usize) -> Result<Self, ExtractError> {
        if min_digits == 0 {
            return Err(ExtractError::Config("min_digits must be positive".into()));
        }
        let pattern = format!(r"\d(?:[\s,]*\d){{{},}}", min_digits - 1);
        let digit_run = Regex::new(&pattern).map_err(|e| ExtractError::Pattern {
            pattern,
            reason: e.to_string(),
        })?;
        Ok(Self {
            payload_key: payload_key.into(),
            min_digits,
            digit_run,
        })
    }

    pub fn min_digits(&self) -> usize {
        self.min_digits
    }

    /// Find the payload in a time token's window and join its digit groups
    /// with `-`.
    fn payload_in(&self, window: &str) -> Option<String> {
        let run = self.digit_run.find(window)?;
        let groups: Vec<&str> = run
            .as_str()
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|g| !g.is_empty())
            .collect();
        Some(groups.join("-"))
    }
}

impl DrawExtractor for TextScanExtractor {
    fn extract_draws(
        &self,
        content: &str,
        reference_date: NaiveDate,
    ) -> Result<Extraction, ExtractError> {
        let events = tokenizer::tokenize(content);
        let mut out = Extraction::default();
        let mut current: Option<NaiveDate> = None;

        for (i, event) in events.iter().enumerate() {
            match event.kind {
                EventKind::Date => {
                    match tokenizer::resolve_date(&event.value, reference_date.year()) {
                        Some(date) => {
                            current = Some(date);
                            out.by_date.entry(date).or_default();
                        }
                        None => out.diagnostics.invalid_dates += 1,
                    }
                }
                EventKind::Time => {
                    let Some(date) = current else {
                        out.diagnostics.times_without_date += 1;
                        continue;
                    };
                    let Ok(label) = TimeLabel::parse(&event.value) else {
                        out.diagnostics.invalid_times += 1;
                        continue;
                    };
                    let window_end = events
                        .get(i + 1)
                        .map(|next| next.offset)
                        .unwrap_or(content.len());
                    let window = &content[event.end()..window_end];
                    let Some(digits) = self.payload_in(window) else {
                        out.diagnostics.times_without_payload += 1;
                        continue;
                    };
                    let bucket = out.by_date.entry(date).or_default();
                    if bucket.iter().any(|r| r.time == label) {
                        out.diagnostics.duplicate_times += 1;
                        continue;
                    }
                    let mut record = DrawRecord::new(label, Default::default());
                    record.payload.insert(self.payload_key.clone(), digits);
                    bucket.push(record);
                }
            }
        }

        debug!(
            dates = out.by_date.len(),
            draws = out.record_count(),
            "text scan finished"
        );
        Ok(out)
    }
}
