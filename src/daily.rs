use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use tracing::{debug, info, trace};

use crate::error::EngineError;
use crate::models::{ClassifiedReferral, DailyCount, ALL_CLINICS};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Tally {
    aged: u32,
    seen_in_30d: u32,
}

impl Tally {
    fn add(&mut self, referral: &ClassifiedReferral) {
        self.aged += 1;
        if referral.is_seen_within_30d() {
            self.seen_in_30d += 1;
        }
    }
}

/// Zero-filled daily counts for every (clinic, date), `*ALL*` included.
///
/// Rows come back sorted by clinic and then date. Every clinic that appears on
/// any referral gets a row for every calendar day, whether or not anything aged
/// there that day.
pub fn aggregate_daily(
    calendar: &[NaiveDate],
    classified: &[ClassifiedReferral],
) -> Result<Vec<DailyCount>, EngineError> {
    let mut clinics: BTreeSet<&str> = BTreeSet::new();
    for referral in classified {
        if referral.clinic == ALL_CLINICS {
            return Err(EngineError::ReservedClinic {
                clinic: referral.clinic.clone(),
            });
        }
        clinics.insert(referral.clinic.as_str());
    }
    clinics.insert(ALL_CLINICS);

    let mut tallies: BTreeMap<(&str, NaiveDate), Tally> = BTreeMap::new();
    let mut counted = 0usize;
    for referral in classified.iter().filter(|r| r.is_aged) {
        let Some(date) = referral.ages_at else {
            continue;
        };
        trace!(
            referral = %referral.referral_id,
            clinic = %referral.clinic,
            %date,
            seen_or_checked_in_at = ?referral.seen_or_checked_in_at,
            "referral aged"
        );
        for key in [(referral.clinic.as_str(), date), (ALL_CLINICS, date)] {
            tallies.entry(key).or_default().add(referral);
        }
        counted += 1;
    }

    let mut rows = Vec::with_capacity(clinics.len() * calendar.len());
    for clinic in &clinics {
        for date in calendar {
            let tally = tallies.get(&(*clinic, *date)).copied().unwrap_or_default();
            rows.push(DailyCount {
                clinic: (*clinic).to_string(),
                date: *date,
                aged: tally.aged,
                seen_in_30d: tally.seen_in_30d,
            });
        }
    }

    let placed: u32 = rows
        .iter()
        .filter(|row| row.clinic != ALL_CLINICS)
        .map(|row| row.aged)
        .sum();
    debug!(counted, placed, "placed aged referrals on calendar");
    info!(
        clinics = clinics.len() - 1,
        days = calendar.len(),
        rows = rows.len(),
        "aggregated daily counts"
    );
    Ok(rows)
}
