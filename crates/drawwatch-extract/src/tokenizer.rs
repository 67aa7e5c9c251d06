//! Date and time token scanning over free text.
//!
//! The scanner only finds candidates. "Feb 31" is a perfectly good `Date`
//! token here; whether it names a real day is decided later by
//! [`resolve_date`].

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

/// English and Spanish month names, full or abbreviated, followed by a day
/// number, an optional ordinal suffix, and an optional four-digit year.
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember|iembre)?|dec(?:ember)?|ene(?:ro)?|febrero|marzo|abr(?:il)?|mayo|junio|julio|ago(?:sto)?|set(?:iembre)?|septiembre|octubre|dic(?:iembre)?)\.?\s+(\d{1,2})(?:st|nd|rd|th)?\b(?:,?\s+(\d{4})\b)?",
    )
    .expect("static regex compiles")
});

/// `H:MM` or `HH:MM` followed by AM/PM, any case, optional spaces and dots.
static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d{1,2}:\d{2}\s*[ap]\.?\s*m\b\.?").expect("static regex compiles")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Date,
    Time,
}

/// One token found in the scanned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub value: String,
    /// Byte offset of the token's first character.
    pub offset: usize,
}

impl Event {
    /// Byte offset just past the token.
    pub fn end(&self) -> usize {
        self.offset + self.value.len()
    }
}

/// Scan `text` for date and time tokens, ordered by offset.
pub fn tokenize(text: &str) -> Vec<Event> {
    let mut events: Vec<Event> = DATE_RE
        .find_iter(text)
        // "Jan 10:00 AM" is a time, not the 10th of January.
        .filter(|m| !text[m.end()..].starts_with(':'))
        .map(|m| Event {
            kind: EventKind::Date,
            value: m.as_str().to_string(),
            offset: m.start(),
        })
        .collect();

    events.extend(TIME_RE.find_iter(text).map(|m| Event {
        kind: EventKind::Time,
        value: m.as_str().to_string(),
        offset: m.start(),
    }));

    events.sort_by_key(|e| e.offset);
    events
}

/// First time token inside `text`, if any.
pub fn find_time(text: &str) -> Option<&str> {
    TIME_RE.find(text).map(|m| m.as_str())
}

/// First date token inside `text`, if any.
pub fn find_date(text: &str) -> Option<&str> {
    DATE_RE
        .find_iter(text)
        .find(|m| !text[m.end()..].starts_with(':'))
        .map(|m| m.as_str())
}

/// Convert a date token to a calendar day.
///
/// Tokens without a year take `reference_year`. Returns `None` for tokens
/// that name no real day ("Feb 31").
pub fn resolve_date(token: &str, reference_year: i32) -> Option<NaiveDate> {
    let caps = DATE_RE.captures(token)?;
    let month = month_number(caps.get(1)?.as_str())?;
    let day: u32 = caps.get(2)?.as_str().parse().ok()?;
    let year = match caps.get(3) {
        Some(y) => y.as_str().parse().ok()?,
        None => reference_year,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

fn month_number(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    let prefix = lower.get(..3)?;
    let month = match prefix {
        "jan" | "ene" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" | "abr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" | "ago" => 8,
        "sep" | "set" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" | "dic" => 12,
        _ => return None,
    };
    Some(month)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(events: &[Event]) -> Vec<(EventKind, &str)> {
        events.iter().map(|e| (e.kind, e.value.as_str())).collect()
    }

    #[test]
    fn finds_dates_and_times_in_offset_order() {
        let text = "Results Jan 8, 2026 draws 10:00 AM 4 2 7 1 then 11:00am 9 9 0 2";
        let events = tokenize(text);
        assert_eq!(
            kinds(&events),
            [
                (EventKind::Date, "Jan 8, 2026"),
                (EventKind::Time, "10:00 AM"),
                (EventKind::Time, "11:00am"),
            ]
        );
        for pair in events.windows(2) {
            assert!(pair[0].offset < pair[1].offset);
        }
        assert_eq!(&text[events[1].offset..events[1].end()], "10:00 AM");
    }

    #[test]
    fn time_variants() {
        for raw in ["9:05 PM", "09:05PM", "9:05 p.m.", "9:05  pm", "12:00 Am"] {
            let events = tokenize(raw);
            assert_eq!(events.len(), 1, "expected one token in {raw:?}");
            assert_eq!(events[0].kind, EventKind::Time);
        }
        assert!(tokenize("10:00").is_empty());
        assert!(tokenize("110:00 AM").is_empty());
    }

    #[test]
    fn invalid_calendar_dates_still_tokenize() {
        let events = tokenize("Feb 31, 2026");
        assert_eq!(kinds(&events), [(EventKind::Date, "Feb 31, 2026")]);
        assert_eq!(resolve_date("Feb 31, 2026", 2026), None);
    }

    #[test]
    fn month_followed_by_clock_is_not_a_date() {
        let events = tokenize("Jan 10:00 AM");
        assert_eq!(kinds(&events), [(EventKind::Time, "10:00 AM")]);
    }

    #[test]
    fn resolves_full_and_abbreviated_months() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day);
        assert_eq!(resolve_date("Jan 8, 2026", 2000), d(2026, 1, 8));
        assert_eq!(resolve_date("January 8 2026", 2000), d(2026, 1, 8));
        assert_eq!(resolve_date("Sept. 3rd, 2025", 2000), d(2025, 9, 3));
        assert_eq!(resolve_date("DEC 31", 2025), d(2025, 12, 31));
    }

    #[test]
    fn resolves_spanish_months() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day);
        assert_eq!(resolve_date("enero 8, 2026", 2000), d(2026, 1, 8));
        assert_eq!(resolve_date("Ago 15 2025", 2000), d(2025, 8, 15));
        assert_eq!(resolve_date("septiembre 2", 2026), d(2026, 9, 2));
        assert_eq!(resolve_date("dic 24", 2026), d(2026, 12, 24));
    }

    #[test]
    fn find_helpers_pick_first_token() {
        let label = "Jan 7 2026 11:00 PM";
        assert_eq!(find_date(label), Some("Jan 7 2026"));
        assert_eq!(find_time(label), Some("11:00 PM"));
        assert_eq!(find_time("no clock here"), None);
    }
}
