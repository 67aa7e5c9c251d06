//! Draw records and the per-(source, day) result document.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::TimeLabel;

/// Payload key used by sources that publish one undifferentiated number run.
pub const ALL_GAMES: &str = "All";

/// Game name → digit string, e.g. `"Pick 3" -> "427"` or `"All" -> "4-2-7-1"`.
pub type Payload = BTreeMap<String, String>;

/// One observed draw.
///
/// Serialises as `{"time": "2:00 PM", "draws": {"Pick 3": "427"}}`. Admin
/// tooling reads that shape directly, so the field names are fixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawRecord {
    pub time: TimeLabel,
    #[serde(rename = "draws")]
    pub payload: Payload,
}

impl DrawRecord {
    pub fn new(time: TimeLabel, payload: Payload) -> Self {
        Self { time, payload }
    }

    /// A record whose payload is a single `"All"` entry.
    pub fn undifferentiated(time: TimeLabel, digits: impl Into<String>) -> Self {
        let mut payload = Payload::new();
        payload.insert(ALL_GAMES.to_string(), digits.into());
        Self { time, payload }
    }
}

/// One persisted (source, day) aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultDocument {
    pub source_id: String,
    /// Calendar day in the source's own time zone.
    pub draw_date: NaiveDate,
    pub lottery_name: String,
    pub draw_name: String,
    pub country: String,
    /// Most recent draw first.
    pub draws: Vec<DrawRecord>,
    pub scraped_at: DateTime<Utc>,
}

/// Draws decoded from a stored document, plus the count of entries that
/// could not be read back.
#[derive(Debug, Default)]
pub struct DecodedDraws {
    pub records: Vec<DrawRecord>,
    pub skipped: usize,
}

/// Encode draws as the JSON array stored in the `draws` column.
pub fn encode_draws(records: &[DrawRecord]) -> Result<String, serde_json::Error> {
    serde_json::to_string(records)
}

/// Decode a stored `draws` column.
///
/// Entries are decoded one at a time so that a single malformed slot
/// (e.g. a legacy label like `"Noon"`) does not discard its neighbours.
pub fn decode_draws(raw: &str) -> Result<DecodedDraws, serde_json::Error> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(raw)?;
    let mut decoded = DecodedDraws::default();
    for entry in entries {
        match serde_json::from_value::<DrawRecord>(entry) {
            Ok(record) => decoded.records.push(record),
            Err(e) => {
                warn!(error = %e, "skipping unreadable stored draw");
                decoded.skipped += 1;
            }
        }
    }
    Ok(decoded)
}

/// Sort draws most recent first.
pub fn sort_descending(records: &mut [DrawRecord]) {
    records.sort_by(|a, b| b.time.cmp(&a.time));
}

/// Overlay `incoming` onto `existing`, keyed by time label.
///
/// An incoming record replaces any existing record for the same slot; slots
/// only present in `existing` are kept untouched. Neither input needs to be
/// ordered. The result is sorted most recent first.
pub fn merge_records(existing: Vec<DrawRecord>, incoming: &[DrawRecord]) -> Vec<DrawRecord> {
    let mut by_slot: HashMap<TimeLabel, DrawRecord> = existing
        .into_iter()
        .map(|record| (record.time, record))
        .collect();
    for record in incoming {
        by_slot.insert(record.time, record.clone());
    }
    let mut merged: Vec<DrawRecord> = by_slot.into_values().collect();
    sort_descending(&mut merged);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TimeLabel {
        TimeLabel::parse(s).unwrap()
    }

    fn pick3(time: &str, digits: &str) -> DrawRecord {
        let mut payload = Payload::new();
        payload.insert("Pick 3".into(), digits.into());
        DrawRecord::new(t(time), payload)
    }

    fn times(records: &[DrawRecord]) -> Vec<String> {
        records.iter().map(|r| r.time.to_string()).collect()
    }

    #[test]
    fn encoding_shape_is_time_and_draws() {
        let json = encode_draws(&[pick3("2:00 PM", "427")]).unwrap();
        assert_eq!(json, r#"[{"time":"2:00 PM","draws":{"Pick 3":"427"}}]"#);
    }

    #[test]
    fn undifferentiated_payload_uses_all_key() {
        let record = DrawRecord::undifferentiated(t("10:00 AM"), "4-2-7-1");
        let json = encode_draws(&[record]).unwrap();
        assert_eq!(json, r#"[{"time":"10:00 AM","draws":{"All":"4-2-7-1"}}]"#);
    }

    #[test]
    fn decode_skips_unreadable_entries() {
        let raw = r#"[
            {"time": "01:00 PM", "draws": {"All": "1-2-3"}},
            {"time": "Noon", "draws": {"All": "9-9-9"}},
            {"time": "10:00 AM", "draws": {"All": "4-5-6"}}
        ]"#;
        let decoded = decode_draws(raw).unwrap();
        assert_eq!(decoded.skipped, 1);
        assert_eq!(times(&decoded.records), ["1:00 PM", "10:00 AM"]);
    }

    #[test]
    fn decode_rejects_non_array() {
        assert!(decode_draws(r#"{"time": "1:00 PM"}"#).is_err());
    }

    #[test]
    fn merge_preserves_foreign_slots() {
        let existing = vec![pick3("10:00 AM", "111"), pick3("11:00 AM", "222")];
        let merged = merge_records(existing, &[pick3("12:00 PM", "333")]);
        assert_eq!(times(&merged), ["12:00 PM", "11:00 AM", "10:00 AM"]);
        assert_eq!(merged[1].payload["Pick 3"], "222");
        assert_eq!(merged[2].payload["Pick 3"], "111");
    }

    #[test]
    fn merge_latest_wins_on_conflict() {
        let merged = merge_records(vec![pick3("2:00 PM", "111")], &[pick3("2:00 PM", "222")]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].payload["Pick 3"], "222");
    }

    #[test]
    fn merge_is_idempotent() {
        let batch = vec![pick3("8:00 PM", "555"), pick3("10:00 AM", "444")];
        let once = merge_records(vec![pick3("2:00 PM", "111")], &batch);
        let twice = merge_records(once.clone(), &batch);
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_orders_strictly_descending() {
        let merged = merge_records(
            vec![pick3("10:00 AM", "1"), pick3("12:30 AM", "2")],
            &[pick3("8:00 PM", "3"), pick3("12:00 PM", "4")],
        );
        assert_eq!(
            times(&merged),
            ["8:00 PM", "12:00 PM", "10:00 AM", "12:30 AM"]
        );
        for pair in merged.windows(2) {
            assert!(pair[0].time.minute_of_day() > pair[1].time.minute_of_day());
        }
    }

    #[test]
    fn result_document_json_roundtrip() {
        let doc = ResultDocument {
            source_id: "special/top-pick".into(),
            draw_date: NaiveDate::from_ymd_opt(2026, 1, 8).unwrap(),
            lottery_name: "Top Pick Lotto".into(),
            draw_name: "All Day".into(),
            country: "SPECIAL".into(),
            draws: vec![pick3("2:00 PM", "427")],
            scraped_at: "2026-01-08T19:05:00Z".parse().unwrap(),
        };
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains(r#""draw_date":"2026-01-08""#));
        let parsed: ResultDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, doc);
    }
}
