pub mod alert;
pub mod draw;
pub mod schedule;
pub mod time_label;

pub use alert::{Alert, AlertType, Severity};
pub use draw::{
    ALL_GAMES, DecodedDraws, DrawRecord, Payload, ResultDocument, decode_draws, encode_draws,
    merge_records, sort_descending,
};
pub use schedule::{DEFAULT_GRACE_MINUTES, DayStatus, ScheduleError, SlotSchedule, find_missing_slots};
pub use time_label::{LabelError, TimeLabel};
