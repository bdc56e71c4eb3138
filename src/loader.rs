use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use tracing::{debug, info};

use crate::models::{ReferralRecord, ReferralStatus};

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Referral ID")]
    referral_id: Option<String>,
    #[serde(rename = "Clinic")]
    clinic: Option<String>,
    #[serde(rename = "Referral Status")]
    status: Option<String>,
    #[serde(rename = "Referral Sub-Status")]
    sub_status: Option<String>,
    #[serde(rename = "Referral Priority")]
    priority: Option<String>,
    #[serde(rename = "Date Referral Sent")]
    sent: Option<String>,
    #[serde(rename = "Date Referral Seen")]
    seen: Option<String>,
    #[serde(rename = "Date Patient Checked In")]
    checked_in: Option<String>,
    #[serde(rename = "Date Held")]
    held: Option<String>,
    #[serde(rename = "Date Pending Reschedule")]
    pending_reschedule: Option<String>,
    #[serde(rename = "Date Last Referral Update")]
    last_update: Option<String>,
    #[serde(rename = "Date Similar Appt Scheduled")]
    similar_appt_scheduled: Option<String>,
    #[serde(rename = "Date Accepted")]
    accepted: Option<String>,
    #[serde(rename = "Date Referral Written")]
    written: Option<String>,
    #[serde(rename = "Date Referral Completed")]
    completed: Option<String>,
    #[serde(rename = "Date Referral Scheduled")]
    scheduled: Option<String>,
}

pub fn load_referrals(csv_path: &Path) -> anyhow::Result<Vec<ReferralRecord>> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let records = read_referrals(file)
        .with_context(|| format!("failed to load referrals from {}", csv_path.display()))?;
    info!(path = %csv_path.display(), records = records.len(), "loaded referral extract");
    Ok(records)
}

pub fn read_referrals<R: Read>(source: R) -> anyhow::Result<Vec<ReferralRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(source);
    let mut records = Vec::new();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        // Header occupies line 1.
        let line = index + 2;
        let row = result.with_context(|| format!("malformed row at line {line}"))?;
        let record = convert_row(row).with_context(|| format!("invalid referral at line {line}"))?;
        records.push(record);
    }

    if records.is_empty() {
        bail!("referral extract contains no records");
    }
    let other_events: usize = records.iter().map(|r| r.other_events.len()).sum();
    debug!(
        records = records.len(),
        other_events,
        "parsed referral rows"
    );
    Ok(records)
}

fn convert_row(row: CsvRow) -> anyhow::Result<ReferralRecord> {
    let referral_id = required(row.referral_id, "Referral ID")?;
    let clinic = required(row.clinic, "Clinic")?;
    let raw_status = required(row.status, "Referral Status")?;
    let status = ReferralStatus::parse(&raw_status).context("missing value for Referral Status")?;

    let mut other_events = BTreeMap::new();
    let optional_events = [
        ("Date Held", row.held),
        ("Date Pending Reschedule", row.pending_reschedule),
        ("Date Last Referral Update", row.last_update),
        ("Date Similar Appt Scheduled", row.similar_appt_scheduled),
        ("Date Accepted", row.accepted),
        ("Date Referral Written", row.written),
        ("Date Referral Completed", row.completed),
        ("Date Referral Scheduled", row.scheduled),
    ];
    for (column, value) in optional_events {
        if let Some(timestamp) = timestamp_field(value.as_deref(), column)? {
            other_events.insert(column.to_string(), timestamp);
        }
    }

    Ok(ReferralRecord {
        referral_id,
        clinic,
        status,
        sub_status: optional(row.sub_status),
        priority: optional(row.priority),
        sent_at: timestamp_field(row.sent.as_deref(), "Date Referral Sent")?,
        seen_at: timestamp_field(row.seen.as_deref(), "Date Referral Seen")?,
        checked_in_at: timestamp_field(row.checked_in.as_deref(), "Date Patient Checked In")?,
        other_events,
    })
}

fn required(value: Option<String>, column: &str) -> anyhow::Result<String> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
        _ => bail!("missing value for {column}"),
    }
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn timestamp_field(value: Option<&str>, column: &str) -> anyhow::Result<Option<NaiveDateTime>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => parse_timestamp(text)
            .map(Some)
            .with_context(|| format!("unparseable {column}: {text:?}")),
    }
}

pub fn parse_timestamp(text: &str) -> anyhow::Result<NaiveDateTime> {
    for format in DATETIME_FORMATS {
        if let Ok(value) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(value);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Ok(date.and_time(chrono::NaiveTime::MIN));
        }
    }
    bail!("unrecognised date format")
}
