use chrono::NaiveDate;
use tracing::debug;

use crate::error::EngineError;

/// Longest measurement period accepted, in days. A span beyond this almost
/// always means a mistyped sent date.
pub const MAX_CALENDAR_DAYS: i64 = 36_600;

/// Every date from the earliest to the latest aging date, inclusive.
pub fn build_calendar<I>(ages_at: I) -> Result<Vec<NaiveDate>, EngineError>
where
    I: IntoIterator<Item = NaiveDate>,
{
    let (start, end) = ages_at
        .into_iter()
        .fold(None, |bounds: Option<(NaiveDate, NaiveDate)>, date| match bounds {
            None => Some((date, date)),
            Some((start, end)) => Some((start.min(date), end.max(date))),
        })
        .ok_or(EngineError::EmptyCalendar)?;

    let days = (end - start).num_days() + 1;
    if days > MAX_CALENDAR_DAYS {
        return Err(EngineError::CalendarTooLong {
            start,
            end,
            days,
            limit: MAX_CALENDAR_DAYS,
        });
    }

    let calendar: Vec<NaiveDate> = start.iter_days().take_while(|date| *date <= end).collect();
    debug!(%start, %end, days = calendar.len(), "built measurement calendar");
    Ok(calendar)
}
