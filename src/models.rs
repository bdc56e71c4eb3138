use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Synthetic clinic key that carries the cross-clinic aggregate.
pub const ALL_CLINICS: &str = "*ALL*";

/// Trailing window lengths, in calendar days.
pub const WINDOW_LENGTHS: [u32; 4] = [28, 91, 182, 364];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ReferralStatus {
    Sent,
    Accepted,
    Rejected,
    Cancelled,
    Closed,
    Completed,
    Held,
    PendingReschedule,
    Scheduled,
    Written,
    Other(String),
}

impl ReferralStatus {
    /// Exact, case-sensitive match on the extract's status labels.
    ///
    /// Spelling or case variants (`canceled`, `REJECTED`) are kept as `Other`
    /// and therefore are not treated as withdrawn or closed out.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let status = match trimmed {
            "Sent" => Self::Sent,
            "Accepted" => Self::Accepted,
            "Rejected" => Self::Rejected,
            "Cancelled" => Self::Cancelled,
            "Closed" => Self::Closed,
            "Completed" => Self::Completed,
            "Held" => Self::Held,
            "Pending Reschedule" => Self::PendingReschedule,
            "Scheduled" => Self::Scheduled,
            "Written" => Self::Written,
            _ => Self::Other(trimmed.to_string()),
        };
        Some(status)
    }

    /// Rejected and cancelled referrals never age.
    pub fn is_withdrawn(&self) -> bool {
        matches!(self, Self::Rejected | Self::Cancelled)
    }

    /// Closed and completed referrals only age when an encounter was recorded.
    pub fn is_closed_out(&self) -> bool {
        matches!(self, Self::Closed | Self::Completed)
    }
}

impl fmt::Display for ReferralStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Sent => "Sent",
            Self::Accepted => "Accepted",
            Self::Rejected => "Rejected",
            Self::Cancelled => "Cancelled",
            Self::Closed => "Closed",
            Self::Completed => "Completed",
            Self::Held => "Held",
            Self::PendingReschedule => "Pending Reschedule",
            Self::Scheduled => "Scheduled",
            Self::Written => "Written",
            Self::Other(value) => value,
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub struct ReferralRecord {
    pub referral_id: String,
    pub clinic: String,
    pub status: ReferralStatus,
    pub sub_status: Option<String>,
    pub priority: Option<String>,
    pub sent_at: Option<NaiveDateTime>,
    pub seen_at: Option<NaiveDateTime>,
    pub checked_in_at: Option<NaiveDateTime>,
    /// Remaining named event timestamps carried through from the extract.
    pub other_events: BTreeMap<String, NaiveDateTime>,
}

#[derive(Debug, Clone)]
pub struct ClassifiedReferral {
    pub referral_id: String,
    pub clinic: String,
    pub status: ReferralStatus,
    pub sent_at: Option<NaiveDateTime>,
    pub seen_or_checked_in_at: Option<NaiveDateTime>,
    pub ages_at: Option<NaiveDate>,
    pub days_to_seen: Option<f64>,
    pub is_aged: bool,
    pub is_seen: bool,
}

impl ClassifiedReferral {
    /// Aged referral whose patient was seen or checked in before day 31.
    pub fn is_seen_within_30d(&self) -> bool {
        self.is_aged && self.is_seen && self.days_to_seen.is_some_and(|days| days < 31.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub clinic: String,
    pub date: NaiveDate,
    pub aged: u32,
    pub seen_in_30d: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollingMeasure {
    pub clinic: String,
    pub date: NaiveDate,
    pub window_days: u32,
    pub aged: u32,
    pub seen_in_30d: u32,
    pub pct_seen_in_30d: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct WindowSeries {
    pub window_days: u32,
    pub measures: Vec<RollingMeasure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowMeasure {
    pub window_days: u32,
    pub aged: u32,
    pub seen_in_30d: u32,
    pub pct_seen_in_30d: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasureRow {
    pub clinic: String,
    pub date: NaiveDate,
    pub aged: u32,
    pub seen_in_30d: u32,
    pub windows: Vec<WindowMeasure>,
}

impl MeasureRow {
    pub fn window(&self, window_days: u32) -> Option<&WindowMeasure> {
        self.windows.iter().find(|w| w.window_days == window_days)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassificationSummary {
    pub total: usize,
    pub aged: usize,
    pub seen_in_30d: usize,
    pub missing_sent_date: usize,
    pub withdrawn: usize,
    pub closed_without_encounter: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MeasureTable {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub all_clinics_key: &'static str,
    pub rows: Vec<MeasureRow>,
}

impl MeasureTable {
    pub fn date_range(&self) -> (NaiveDate, NaiveDate) {
        (self.start, self.end)
    }

    /// Clinic keys in table order, `*ALL*` included.
    pub fn clinics(&self) -> Vec<&str> {
        let mut clinics: Vec<&str> = Vec::new();
        for row in &self.rows {
            if clinics.last() != Some(&row.clinic.as_str()) {
                clinics.push(row.clinic.as_str());
            }
        }
        clinics
    }

    pub fn for_clinic<'a>(&'a self, clinic: &'a str) -> impl Iterator<Item = &'a MeasureRow> + 'a {
        self.rows.iter().filter(move |row| row.clinic == clinic)
    }

    /// Last calendar date's row for every clinic.
    pub fn latest(&self) -> Vec<&MeasureRow> {
        self.rows
            .iter()
            .filter(|row| row.date == self.end)
            .collect()
    }

    /// Last calendar date's measure for one window, per clinic.
    pub fn latest_for(&self, window_days: u32) -> Vec<(&MeasureRow, &WindowMeasure)> {
        self.latest()
            .into_iter()
            .filter_map(|row| row.window(window_days).map(|window| (row, window)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels_match_exactly() {
        assert_eq!(
            ReferralStatus::parse(" Cancelled "),
            Some(ReferralStatus::Cancelled)
        );
        assert_eq!(
            ReferralStatus::parse("Pending Reschedule"),
            Some(ReferralStatus::PendingReschedule)
        );
        assert_eq!(
            ReferralStatus::parse("canceled"),
            Some(ReferralStatus::Other("canceled".to_string()))
        );
        assert_eq!(
            ReferralStatus::parse("REJECTED"),
            Some(ReferralStatus::Other("REJECTED".to_string()))
        );
        assert_eq!(ReferralStatus::parse("  "), None);
    }

    #[test]
    fn variant_spellings_are_not_withdrawn() {
        let status = ReferralStatus::parse("rejected").expect("status");
        assert!(!status.is_withdrawn());
        assert!(!status.is_closed_out());
    }

    #[test]
    fn latest_for_pairs_rows_with_window() {
        let date = NaiveDate::from_ymd_opt(2022, 1, 1).expect("valid date");
        let row = |clinic: &str, date: NaiveDate| MeasureRow {
            clinic: clinic.to_string(),
            date,
            aged: 1,
            seen_in_30d: 0,
            windows: vec![WindowMeasure {
                window_days: 28,
                aged: 1,
                seen_in_30d: 0,
                pct_seen_in_30d: Some(0.0),
            }],
        };
        let table = MeasureTable {
            start: date,
            end: date.succ_opt().expect("valid date"),
            all_clinics_key: ALL_CLINICS,
            rows: vec![
                row(ALL_CLINICS, date),
                row(ALL_CLINICS, date.succ_opt().expect("valid date")),
            ],
        };

        let latest = table.latest_for(28);
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].0.date, table.end);
        assert!(table.latest_for(91).is_empty());
    }
}
