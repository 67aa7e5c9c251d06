//! Canonical time-of-day labels for draw slots.
//!
//! Sources print draw times in many shapes ("10:00 AM", "09:30pm",
//! "1:00 P.M."). Every one of them is parsed into a [`TimeLabel`], which
//! stores minutes since midnight and always renders as `H:MM AM|PM`:
//! no leading zero on the hour, two-digit minute, one space, upper-case
//! meridiem.
//!
//! # Minute-of-day convention
//!
//! - `12:xx AM` is minute `0 + xx`
//! - `1:00 AM` .. `11:59 AM` map to minutes 60 .. 719
//! - `12:xx PM` is minute `720 + xx`
//! - `1:00 PM` .. `11:59 PM` map to minutes 780 .. 1439

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

const MINUTES_PER_DAY: u16 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LabelError {
    #[error("missing ':' in time label {0:?}")]
    MissingColon(String),
    #[error("invalid hour in time label {0:?}")]
    Hour(String),
    #[error("invalid minute in time label {0:?}")]
    Minute(String),
    #[error("missing AM/PM in time label {0:?}")]
    Meridiem(String),
    #[error("minute of day out of range: {0}")]
    OutOfRange(u16),
}

/// A draw slot's time of day, ordered by minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeLabel {
    minute: u16,
}

impl TimeLabel {
    /// Build a label from minutes since midnight (0..1440).
    pub fn from_minute_of_day(minute: u16) -> Result<Self, LabelError> {
        if minute >= MINUTES_PER_DAY {
            return Err(LabelError::OutOfRange(minute));
        }
        Ok(Self { minute })
    }

    /// Build a label from a 24-hour clock reading.
    pub fn from_hm(hour: u8, minute: u8) -> Result<Self, LabelError> {
        if minute >= 60 {
            return Err(LabelError::OutOfRange(u16::from(hour) * 60 + u16::from(minute)));
        }
        Self::from_minute_of_day(u16::from(hour) * 60 + u16::from(minute))
    }

    /// Parse a 12-hour clock label, tolerating a leading zero on the hour,
    /// missing or repeated whitespace, lower case, and dotted meridiems.
    pub fn parse(raw: &str) -> Result<Self, LabelError> {
        let s = raw.trim();
        let (hour_part, rest) = s
            .split_once(':')
            .ok_or_else(|| LabelError::MissingColon(raw.to_string()))?;

        let hour_part = hour_part.trim();
        if hour_part.is_empty()
            || hour_part.len() > 2
            || !hour_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(LabelError::Hour(raw.to_string()));
        }
        let hour: u16 = hour_part
            .parse()
            .map_err(|_| LabelError::Hour(raw.to_string()))?;
        if !(1..=12).contains(&hour) {
            return Err(LabelError::Hour(raw.to_string()));
        }

        let minute_digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if minute_digits.len() != 2 {
            return Err(LabelError::Minute(raw.to_string()));
        }
        let minute: u16 = minute_digits
            .parse()
            .map_err(|_| LabelError::Minute(raw.to_string()))?;
        if minute >= 60 {
            return Err(LabelError::Minute(raw.to_string()));
        }

        let meridiem: String = rest[minute_digits.len()..]
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '.')
            .collect::<String>()
            .to_ascii_uppercase();
        let pm = match meridiem.as_str() {
            "AM" => false,
            "PM" => true,
            _ => return Err(LabelError::Meridiem(raw.to_string())),
        };

        let hour24 = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, false) => h,
            (h, true) => h + 12,
        };
        Ok(Self {
            minute: hour24 * 60 + minute,
        })
    }

    /// Minutes since midnight, used for ordering draws within a day.
    pub fn minute_of_day(&self) -> u16 {
        self.minute
    }

    pub fn hour(&self) -> u8 {
        (self.minute / 60) as u8
    }

    pub fn minute(&self) -> u8 {
        (self.minute % 60) as u8
    }
}

impl fmt::Display for TimeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hour24 = self.minute / 60;
        let minute = self.minute % 60;
        let meridiem = if hour24 >= 12 { "PM" } else { "AM" };
        let hour12 = match hour24 % 12 {
            0 => 12,
            h => h,
        };
        write!(f, "{hour12}:{minute:02} {meridiem}")
    }
}

impl FromStr for TimeLabel {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for TimeLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeLabel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(s: &str) -> TimeLabel {
        TimeLabel::parse(s).unwrap()
    }

    #[test]
    fn canonical_rendering() {
        assert_eq!(label("10:00 AM").to_string(), "10:00 AM");
        assert_eq!(label("09:05 pm").to_string(), "9:05 PM");
        assert_eq!(label("1:00PM").to_string(), "1:00 PM");
        assert_eq!(label("  7:30  a.m. ").to_string(), "7:30 AM");
    }

    #[test]
    fn midnight_and_noon() {
        assert_eq!(label("12:00 AM").minute_of_day(), 0);
        assert_eq!(label("12:45 AM").minute_of_day(), 45);
        assert_eq!(label("12:00 PM").minute_of_day(), 720);
        assert_eq!(label("12:30 PM").minute_of_day(), 750);
        assert_eq!(label("11:59 PM").minute_of_day(), 1439);
    }

    #[test]
    fn leading_zero_is_the_same_slot() {
        assert_eq!(label("09:00 AM"), label("9:00 AM"));
        assert_eq!(label("01:00 PM"), label("1:00 PM"));
    }

    #[test]
    fn ordering_follows_the_clock() {
        let mut labels = vec![
            label("2:00 PM"),
            label("12:00 AM"),
            label("10:00 AM"),
            label("12:00 PM"),
        ];
        labels.sort();
        let rendered: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        assert_eq!(rendered, ["12:00 AM", "10:00 AM", "12:00 PM", "2:00 PM"]);
    }

    #[test]
    fn rejects_malformed_labels() {
        assert!(matches!(
            TimeLabel::parse("1000 AM"),
            Err(LabelError::MissingColon(_))
        ));
        assert!(matches!(TimeLabel::parse("13:00 PM"), Err(LabelError::Hour(_))));
        assert!(matches!(TimeLabel::parse("0:15 AM"), Err(LabelError::Hour(_))));
        assert!(matches!(TimeLabel::parse("10:7 AM"), Err(LabelError::Minute(_))));
        assert!(matches!(TimeLabel::parse("10:75 AM"), Err(LabelError::Minute(_))));
        assert!(matches!(TimeLabel::parse("10:00"), Err(LabelError::Meridiem(_))));
    }

    #[test]
    fn from_hm_matches_parse() {
        assert_eq!(TimeLabel::from_hm(0, 0).unwrap(), label("12:00 AM"));
        assert_eq!(TimeLabel::from_hm(13, 30).unwrap(), label("1:30 PM"));
        assert!(TimeLabel::from_hm(24, 0).is_err());
        assert!(TimeLabel::from_hm(10, 60).is_err());
    }

    #[test]
    fn serde_uses_canonical_string() {
        let json = serde_json::to_string(&label("08:00 pm")).unwrap();
        assert_eq!(json, "\"8:00 PM\"");
        let back: TimeLabel = serde_json::from_str("\"08:00 PM\"").unwrap();
        assert_eq!(back.to_string(), "8:00 PM");
        assert!(serde_json::from_str::<TimeLabel>("\"noon\"").is_err());
    }
}
