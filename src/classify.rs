use chrono::{Duration, NaiveDate, NaiveDateTime};
use tracing::{info, trace};

use crate::models::{ClassificationSummary, ClassifiedReferral, ReferralRecord};

/// A referral becomes measurable on the 31st day after it was sent.
pub const AGING_DAYS: i64 = 31;

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Copy)]
pub struct ClassifyConfig {
    /// Reference instant used to censor elapsed time on referrals not yet seen.
    pub as_of: NaiveDateTime,
}

impl ClassifyConfig {
    pub fn as_of_date(date: NaiveDate) -> Self {
        Self {
            as_of: date.and_time(chrono::NaiveTime::MIN),
        }
    }
}

pub fn classify(record: &ReferralRecord, config: &ClassifyConfig) -> ClassifiedReferral {
    // Seen takes precedence; check-in is only a fallback.
    let seen_or_checked_in_at = record.seen_at.or(record.checked_in_at);
    let ages_at = record
        .sent_at
        .map(|sent| (sent + Duration::days(AGING_DAYS)).date());
    let days_to_seen = record.sent_at.map(|sent| {
        let until = seen_or_checked_in_at.unwrap_or(config.as_of);
        elapsed_days(sent, until)
    });

    let is_aged = record.sent_at.is_some()
        && !record.status.is_withdrawn()
        && (!record.status.is_closed_out() || seen_or_checked_in_at.is_some());
    if !is_aged {
        trace!(
            referral = %record.referral_id,
            status = %record.status,
            sub_status = ?record.sub_status,
            priority = ?record.priority,
            "referral excluded from aging"
        );
    }

    ClassifiedReferral {
        referral_id: record.referral_id.clone(),
        clinic: record.clinic.clone(),
        status: record.status.clone(),
        sent_at: record.sent_at,
        seen_or_checked_in_at,
        ages_at,
        days_to_seen,
        is_aged,
        is_seen: seen_or_checked_in_at.is_some(),
    }
}

pub fn classify_all(
    records: &[ReferralRecord],
    config: &ClassifyConfig,
) -> Vec<ClassifiedReferral> {
    let classified: Vec<ClassifiedReferral> = records
        .iter()
        .map(|record| classify(record, config))
        .collect();
    let summary = summarize(&classified);
    info!(
        total = summary.total,
        aged = summary.aged,
        seen_in_30d = summary.seen_in_30d,
        missing_sent_date = summary.missing_sent_date,
        withdrawn = summary.withdrawn,
        closed_without_encounter = summary.closed_without_encounter,
        as_of = %config.as_of,
        "classified referrals"
    );
    classified
}

pub fn summarize(classified: &[ClassifiedReferral]) -> ClassificationSummary {
    let mut summary = ClassificationSummary {
        total: classified.len(),
        aged: 0,
        seen_in_30d: 0,
        missing_sent_date: 0,
        withdrawn: 0,
        closed_without_encounter: 0,
    };

    for referral in classified {
        if referral.is_aged {
            summary.aged += 1;
        }
        if referral.is_seen_within_30d() {
            summary.seen_in_30d += 1;
        }
        if referral.sent_at.is_none() {
            summary.missing_sent_date += 1;
        } else if referral.status.is_withdrawn() {
            summary.withdrawn += 1;
        } else if referral.status.is_closed_out() && !referral.is_seen {
            summary.closed_without_encounter += 1;
        }
    }

    summary
}

fn elapsed_days(from: NaiveDateTime, until: NaiveDateTime) -> f64 {
    (until - from).num_seconds() as f64 / SECONDS_PER_DAY
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    use crate::models::ReferralStatus;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 1, 1)
            .map(|date| date + Duration::days(i64::from(d) - 1))
            .map(|date| date.and_time(chrono::NaiveTime::MIN))
            .expect("valid date")
    }

    fn config() -> ClassifyConfig {
        ClassifyConfig::as_of_date(NaiveDate::from_ymd_opt(2022, 6, 1).expect("valid date"))
    }

    fn record(
        status: ReferralStatus,
        sent: Option<u32>,
        seen: Option<u32>,
        checked_in: Option<u32>,
    ) -> ReferralRecord {
        ReferralRecord {
            referral_id: "R1".to_string(),
            clinic: "Cardiology".to_string(),
            status,
            sub_status: None,
            priority: None,
            sent_at: sent.map(day),
            seen_at: seen.map(day),
            checked_in_at: checked_in.map(day),
            other_events: BTreeMap::new(),
        }
    }

    fn classified(
        status: ReferralStatus,
        sent: Option<u32>,
        seen: Option<u32>,
        checked_in: Option<u32>,
    ) -> ClassifiedReferral {
        classify(&record(status, sent, seen, checked_in), &config())
    }

    #[test]
    fn ages_thirty_one_days_after_sending() {
        let referral = classified(ReferralStatus::Sent, Some(1), Some(5), None);
        assert_eq!(referral.ages_at, Some(day(32).date()));
        assert_eq!(referral.days_to_seen, Some(4.0));
        assert!(referral.is_aged);
        assert!(referral.is_seen_within_30d());
    }

    #[test]
    fn seen_date_wins_over_check_in() {
        let referral = classified(ReferralStatus::Sent, Some(1), Some(20), Some(3));
        assert_eq!(referral.seen_or_checked_in_at, Some(day(20)));
        assert_eq!(referral.days_to_seen, Some(19.0));
    }

    #[test]
    fn check_in_used_when_never_seen() {
        let referral = classified(ReferralStatus::Accepted, Some(1), None, Some(8));
        assert_eq!(referral.seen_or_checked_in_at, Some(day(8)));
        assert!(referral.is_seen);
    }

    #[test]
    fn unseen_referrals_are_censored_at_as_of() {
        let referral = classified(ReferralStatus::Sent, Some(1), None, None);
        let expected = elapsed_days(day(1), config().as_of);
        assert_eq!(referral.days_to_seen, Some(expected));
        assert!(!referral.is_seen);
        assert!(referral.is_aged);
    }

    #[test]
    fn withdrawn_referrals_never_age() {
        for status in [ReferralStatus::Rejected, ReferralStatus::Cancelled] {
            let referral = classified(status, Some(1), Some(4), None);
            assert!(!referral.is_aged);
        }
    }

    #[test]
    fn closed_referrals_age_only_when_seen() {
        let unseen = classified(ReferralStatus::Closed, Some(1), None, None);
        assert!(!unseen.is_aged);

        let seen = classified(ReferralStatus::Closed, Some(1), Some(10), None);
        assert!(seen.is_aged);
        assert_eq!(seen.days_to_seen, Some(9.0));
        assert!(seen.is_seen_within_30d());

        let completed = classified(ReferralStatus::Completed, Some(1), None, Some(2));
        assert!(completed.is_aged);
    }

    #[test]
    fn missing_sent_date_is_excluded_without_failing() {
        let referral = classified(ReferralStatus::Sent, None, Some(3), None);
        assert!(!referral.is_aged);
        assert!(referral.ages_at.is_none());
        assert!(referral.days_to_seen.is_none());
    }

    #[test]
    fn thirty_one_days_is_not_within_thirty() {
        let referral = classified(ReferralStatus::Sent, Some(1), Some(32), None);
        assert_eq!(referral.days_to_seen, Some(31.0));
        assert!(!referral.is_seen_within_30d());
    }

    #[test]
    fn summary_counts_exclusion_reasons() {
        let records = vec![
            record(ReferralStatus::Sent, Some(1), Some(2), None),
            record(ReferralStatus::Rejected, Some(1), None, None),
            record(ReferralStatus::Closed, Some(1), None, None),
            record(ReferralStatus::Sent, None, None, None),
        ];
        let summary = summarize(&classify_all(&records, &config()));
        assert_eq!(summary.total, 4);
        assert_eq!(summary.aged, 1);
        assert_eq!(summary.seen_in_30d, 1);
        assert_eq!(summary.withdrawn, 1);
        assert_eq!(summary.closed_without_encounter, 1);
        assert_eq!(summary.missing_sent_date, 1);
    }
}
