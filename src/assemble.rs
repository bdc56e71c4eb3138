use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use tracing::debug;

use crate::error::EngineError;
use crate::models::{
    DailyCount, MeasureRow, MeasureTable, RollingMeasure, WindowMeasure, WindowSeries, ALL_CLINICS,
};

/// Joins every window's measures onto the daily rows, keeping daily order.
///
/// All windows derive from the same daily table, so a key missing from (or
/// extra in) any one of them is a broken invariant and fails the merge.
pub fn assemble(
    daily: &[DailyCount],
    windows: &[WindowSeries],
) -> Result<MeasureTable, EngineError> {
    let (Some(start), Some(end)) = (
        daily.iter().map(|row| row.date).min(),
        daily.iter().map(|row| row.date).max(),
    ) else {
        return Err(EngineError::EmptyCalendar);
    };

    let daily_keys: HashSet<(&str, NaiveDate)> = daily
        .iter()
        .map(|row| (row.clinic.as_str(), row.date))
        .collect();
    let mut lookups = Vec::with_capacity(windows.len());
    for series in windows {
        let mut by_key: HashMap<(&str, NaiveDate), &RollingMeasure> =
            HashMap::with_capacity(series.measures.len());
        for measure in &series.measures {
            by_key.insert((measure.clinic.as_str(), measure.date), measure);
        }
        if by_key.len() != daily.len() {
            if let Some(extra) = series
                .measures
                .iter()
                .find(|m| !daily_keys.contains(&(m.clinic.as_str(), m.date)))
            {
                return Err(EngineError::UnexpectedWindowKey {
                    window_days: series.window_days,
                    clinic: extra.clinic.clone(),
                    date: extra.date,
                });
            }
        }
        lookups.push((series.window_days, by_key));
    }

    let mut rows = Vec::with_capacity(daily.len());
    for row in daily {
        let mut measures = Vec::with_capacity(lookups.len());
        for (window_days, by_key) in &lookups {
            let measure = by_key
                .get(&(row.clinic.as_str(), row.date))
                .ok_or_else(|| EngineError::MissingWindowKey {
                    window_days: *window_days,
                    clinic: row.clinic.clone(),
                    date: row.date,
                })?;
            measures.push(WindowMeasure {
                window_days: *window_days,
                aged: measure.aged,
                seen_in_30d: measure.seen_in_30d,
                pct_seen_in_30d: measure.pct_seen_in_30d,
            });
        }
        rows.push(MeasureRow {
            clinic: row.clinic.clone(),
            date: row.date,
            aged: row.aged,
            seen_in_30d: row.seen_in_30d,
            windows: measures,
        });
    }

    debug!(
        rows = rows.len(),
        windows = lookups.len(),
        "assembled measure table"
    );
    Ok(MeasureTable {
        start,
        end,
        all_clinics_key: ALL_CLINICS,
        rows,
    })
}
