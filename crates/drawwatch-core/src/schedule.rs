//! Expected draw cadence and the same-day completeness check.
//!
//! A [`SlotSchedule`] describes the slots a source should publish over one
//! day: `start_hour:00`, then every `interval_minutes`, up to and including
//! `end_hour:00`. [`find_missing_slots`] compares that schedule with what
//! was actually observed, but only for the current day and only for slots
//! older than the grace window.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::TimeLabel;

/// Trailing window during which an absent slot is not yet reported.
pub const DEFAULT_GRACE_MINUTES: i64 = 15;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("hour {0} outside 0..=23")]
    Hour(u8),
    #[error("interval must be positive")]
    ZeroInterval,
    #[error("end hour {end} precedes start hour {start}")]
    Inverted { start: u8, end: u8 },
}

/// Per-source draw cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSchedule {
    pub start_hour: u8,
    pub end_hour: u8,
    pub interval_minutes: u16,
}

impl SlotSchedule {
    pub fn new(start_hour: u8, end_hour: u8, interval_minutes: u16) -> Result<Self, ScheduleError> {
        let schedule = Self {
            start_hour,
            end_hour,
            interval_minutes,
        };
        schedule.validate()?;
        Ok(schedule)
    }

    pub fn validate(&self) -> Result<(), ScheduleError> {
        for hour in [self.start_hour, self.end_hour] {
            if hour > 23 {
                return Err(ScheduleError::Hour(hour));
            }
        }
        if self.interval_minutes == 0 {
            return Err(ScheduleError::ZeroInterval);
        }
        if self.end_hour < self.start_hour {
            return Err(ScheduleError::Inverted {
                start: self.start_hour,
                end: self.end_hour,
            });
        }
        Ok(())
    }

    /// Every slot of the day, in increasing order.
    pub fn slots(&self) -> Vec<TimeLabel> {
        if self.validate().is_err() {
            return Vec::new();
        }
        let end = u32::from(self.end_hour) * 60;
        let step = u32::from(self.interval_minutes);
        // Widened so a step larger than the day cannot overflow.
        (u32::from(self.start_hour) * 60..=end)
            .step_by(step as usize)
            .filter_map(|minute| u16::try_from(minute).ok())
            .filter_map(|minute| TimeLabel::from_minute_of_day(minute).ok())
            .collect()
    }

    /// Slots of `date` whose scheduled time is at or before `threshold`.
    pub fn due_slots(&self, date: NaiveDate, threshold: NaiveDateTime) -> Vec<TimeLabel> {
        self.slots()
            .into_iter()
            .take_while(|slot| slot_datetime(date, *slot) <= threshold)
            .collect()
    }
}

fn slot_datetime(date: NaiveDate, slot: TimeLabel) -> NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN) + Duration::minutes(i64::from(slot.minute_of_day()))
}

/// Due-but-unobserved slots for `observed_date`.
///
/// `now` is the wall-clock reading in the source's own time zone. Only the
/// current day is evaluated: a past day is closed and a future day has
/// nothing due, so both return an empty list. Observed labels are compared
/// by clock value, so `"09:00 AM"` satisfies `"9:00 AM"`; labels that do not
/// parse as times never satisfy anything.
pub fn find_missing_slots<I, S>(
    schedule: &SlotSchedule,
    observed_date: NaiveDate,
    observed_slots: I,
    now: NaiveDateTime,
    grace: Duration,
) -> Vec<TimeLabel>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    if observed_date != now.date() {
        return Vec::new();
    }
    let observed: std::collections::HashSet<TimeLabel> = observed_slots
        .into_iter()
        .filter_map(|raw| TimeLabel::parse(raw.as_ref()).ok())
        .collect();

    schedule
        .due_slots(observed_date, now - grace)
        .into_iter()
        .filter(|slot| !observed.contains(slot))
        .collect()
}

/// Where a (source, day) stands after one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DayStatus {
    /// Nothing stored for the day yet.
    NoData { missing: Vec<TimeLabel> },
    /// Some slots stored, some due slots absent.
    Partial { missing: Vec<TimeLabel> },
    /// Every due slot stored.
    Complete,
}

impl DayStatus {
    pub fn evaluate(observed: usize, missing: Vec<TimeLabel>) -> Self {
        if observed == 0 {
            Self::NoData { missing }
        } else if missing.is_empty() {
            Self::Complete
        } else {
            Self::Partial { missing }
        }
    }

    /// Due slots that were not observed.
    pub fn missing(&self) -> &[TimeLabel] {
        match self {
            Self::NoData { missing } | Self::Partial { missing } => missing,
            Self::Complete => &[],
        }
    }

    pub fn needs_alert(&self) -> bool {
        !self.missing().is_empty()
    }
}
