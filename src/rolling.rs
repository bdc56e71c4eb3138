use chrono::Duration;
use rayon::prelude::*;
use tracing::debug;

use crate::error::EngineError;
use crate::models::{DailyCount, RollingMeasure, WindowSeries, WINDOW_LENGTHS};

/// Trailing sums for every window length in [`WINDOW_LENGTHS`].
///
/// Windows are independent of one another and run in parallel; each reads the
/// same daily table.
pub fn compute_rolling(daily: &[DailyCount]) -> Result<Vec<WindowSeries>, EngineError> {
    ensure_sorted(daily)?;
    WINDOW_LENGTHS
        .par_iter()
        .map(|window_days| compute_window(daily, *window_days))
        .collect()
}

/// Trailing `window_days` calendar-day sums per clinic.
///
/// The daily table must be sorted by (clinic, date). Near the start of a
/// clinic's series the window truncates instead of going undefined.
pub fn compute_window(daily: &[DailyCount], window_days: u32) -> Result<WindowSeries, EngineError> {
    if window_days == 0 {
        return Err(EngineError::InvalidWindow { window_days });
    }
    ensure_sorted(daily)?;

    let span = Duration::days(i64::from(window_days));
    let mut measures = Vec::with_capacity(daily.len());

    for group in daily.chunk_by(|a, b| a.clinic == b.clinic) {
        let mut start = 0;
        let mut aged: u32 = 0;
        let mut seen: u32 = 0;

        for row in group {
            aged += row.aged;
            seen += row.seen_in_30d;
            // Drop days that fell out of (date - w, date].
            while group[start].date + span <= row.date {
                aged -= group[start].aged;
                seen -= group[start].seen_in_30d;
                start += 1;
            }
            measures.push(RollingMeasure {
                clinic: row.clinic.clone(),
                date: row.date,
                window_days,
                aged,
                seen_in_30d: seen,
                pct_seen_in_30d: seen_ratio(seen, aged),
            });
        }
    }

    debug!(
        window_days,
        rows = measures.len(),
        "computed trailing window"
    );
    Ok(WindowSeries {
        window_days,
        measures,
    })
}

/// Share seen within 30 days, rounded to three places; `None` when nothing aged.
pub fn seen_ratio(seen: u32, aged: u32) -> Option<f64> {
    if aged == 0 {
        return None;
    }
    let ratio = f64::from(seen) / f64::from(aged);
    Some((ratio * 1000.0).round_ties_even() / 1000.0)
}

fn ensure_sorted(daily: &[DailyCount]) -> Result<(), EngineError> {
    for (index, pair) in daily.windows(2).enumerate() {
        let previous = (pair[0].clinic.as_str(), pair[0].date);
        let current = (pair[1].clinic.as_str(), pair[1].date);
        if previous >= current {
            return Err(EngineError::UnsortedDailyTable { index: index + 1 });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use proptest::prelude::*;

    use super::*;

    fn series(clinic: &str, counts: &[(u32, u32)]) -> Vec<DailyCount> {
        let origin = NaiveDate::from_ymd_opt(2022, 1, 1).expect("valid date");
        counts
            .iter()
            .enumerate()
            .map(|(offset, (aged, seen))| DailyCount {
                clinic: clinic.to_string(),
                date: origin + Duration::days(offset as i64),
                aged: *aged,
                seen_in_30d: *seen,
            })
            .collect()
    }

    #[test]
    fn partial_windows_at_series_start() {
        let daily = series("North", &[(1, 1), (2, 0), (3, 3), (4, 2)]);
        let result = compute_window(&daily, 3).expect("window");
        let aged: Vec<u32> = result.measures.iter().map(|m| m.aged).collect();
        let seen: Vec<u32> = result.measures.iter().map(|m| m.seen_in_30d).collect();
        assert_eq!(aged, vec![1, 3, 6, 9]);
        assert_eq!(seen, vec![1, 1, 4, 5]);
    }

    #[test]
    fn clinics_do_not_share_windows() {
        let mut daily = series("North", &[(5, 5), (0, 0)]);
        daily.extend(series("South", &[(1, 0), (1, 1)]));
        let result = compute_window(&daily, 28).expect("window");
        assert_eq!(result.measures[2].clinic, "South");
        assert_eq!(result.measures[2].aged, 1);
        assert_eq!(result.measures[3].aged, 2);
        assert_eq!(result.measures[3].seen_in_30d, 1);
        assert_eq!(result.measures[3].pct_seen_in_30d, Some(0.5));
    }

    #[test]
    fn zero_denominator_is_undefined_not_zero() {
        let daily = series("Quiet", &[(0, 0), (0, 0)]);
        let result = compute_window(&daily, 28).expect("window");
        assert!(result.measures.iter().all(|m| m.pct_seen_in_30d.is_none()));
    }

    #[test]
    fn ratio_returns_to_undefined_once_window_drains() {
        let daily = series("North", &[(2, 1), (0, 0), (0, 0), (0, 0)]);
        let result = compute_window(&daily, 2).expect("window");
        let aged: Vec<u32> = result.measures.iter().map(|m| m.aged).collect();
        let pct: Vec<Option<f64>> = result.measures.iter().map(|m| m.pct_seen_in_30d).collect();
        assert_eq!(aged, vec![2, 2, 0, 0]);
        assert_eq!(pct, vec![Some(0.5), Some(0.5), None, None]);
    }

    #[test]
    fn ratio_rounds_to_three_places() {
        assert_eq!(seen_ratio(1, 3), Some(0.333));
        assert_eq!(seen_ratio(2, 3), Some(0.667));
        assert_eq!(seen_ratio(3, 3), Some(1.0));
        assert_eq!(seen_ratio(0, 0), None);
    }

    #[test]
    fn unsorted_input_is_rejected() {
        let mut daily = series("North", &[(1, 0), (1, 0)]);
        daily.swap(0, 1);
        assert_eq!(
            compute_window(&daily, 28).map(|s| s.window_days),
            Err(EngineError::UnsortedDailyTable { index: 1 })
        );
    }

    #[test]
    fn zero_length_window_is_rejected() {
        let daily = series("North", &[(1, 0)]);
        assert!(matches!(
            compute_window(&daily, 0),
            Err(EngineError::InvalidWindow { window_days: 0 })
        ));
    }

    #[test]
    fn all_window_lengths_are_computed_in_order() {
        let daily = series("North", &[(1, 1); 10]);
        let windows = compute_rolling(&daily).expect("rolling");
        let lengths: Vec<u32> = windows.iter().map(|w| w.window_days).collect();
        assert_eq!(lengths, WINDOW_LENGTHS.to_vec());
        assert!(windows.iter().all(|w| w.measures.len() == 10));
    }

    proptest! {
        #[test]
        fn trailing_sums_match_brute_force(
            counts in prop::collection::vec((0u32..5, 0u32..5), 1..60),
            window_days in 1u32..40,
        ) {
            let counts: Vec<(u32, u32)> = counts
                .into_iter()
                .map(|(aged, seen)| (aged, seen.min(aged)))
                .collect();
            let daily = series("North", &counts);
            let result = compute_window(&daily, window_days).expect("window");

            for (index, measure) in result.measures.iter().enumerate() {
                let from = (index + 1).saturating_sub(window_days as usize);
                let expected_aged: u32 = counts[from..=index].iter().map(|c| c.0).sum();
                let expected_seen: u32 = counts[from..=index].iter().map(|c| c.1).sum();
                prop_assert_eq!(measure.aged, expected_aged);
                prop_assert_eq!(measure.seen_in_30d, expected_seen);
                prop_assert!(measure.seen_in_30d <= measure.aged);
                prop_assert_eq!(measure.pct_seen_in_30d.is_none(), measure.aged == 0);
                if let Some(pct) = measure.pct_seen_in_30d {
                    prop_assert!((0.0..=1.0).contains(&pct));
                }
            }
        }
    }
}
