use chrono::NaiveDate;
use thiserror::Error;

/// Failures raised by the aggregation stages.
///
/// Absent dates on individual referrals are not errors; these variants cover
/// empty inputs and broken invariants between stages.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("no referral has a sent date, so the measurement calendar is empty")]
    EmptyCalendar,

    #[error("calendar spans {days} days ({start} to {end}), limit is {limit}")]
    CalendarTooLong {
        start: NaiveDate,
        end: NaiveDate,
        days: i64,
        limit: i64,
    },

    #[error("clinic name {clinic:?} is reserved for the cross-clinic aggregate")]
    ReservedClinic { clinic: String },

    #[error("daily table is not sorted by (clinic, date) at row {index}")]
    UnsortedDailyTable { index: usize },

    #[error("window length must be at least one day, got {window_days}")]
    InvalidWindow { window_days: u32 },

    #[error("{window_days}d window has no measure for ({clinic}, {date})")]
    MissingWindowKey {
        window_days: u32,
        clinic: String,
        date: NaiveDate,
    },

    #[error("{window_days}d window has an extra measure for ({clinic}, {date})")]
    UnexpectedWindowKey {
        window_days: u32,
        clinic: String,
        date: NaiveDate,
    },
}
