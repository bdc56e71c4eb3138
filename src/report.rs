use std::fmt::Write;
use std::io;

use chrono::NaiveDate;

use crate::models::{ClassificationSummary, MeasureRow, MeasureTable, ALL_CLINICS, WINDOW_LENGTHS};

/// Window used for the per-clinic section of the markdown report.
pub const REPORT_WINDOW: u32 = 91;

#[derive(Debug, Clone, PartialEq)]
pub struct ClinicRate {
    pub clinic: String,
    pub aged: u32,
    pub seen_in_30d: u32,
    pub pct_seen_in_30d: Option<f64>,
}

/// Latest-date measures per real clinic for one window, best rate first.
///
/// Clinics with no aged referrals in the window sort last.
pub fn rank_clinics(table: &MeasureTable, window_days: u32) -> Vec<ClinicRate> {
    let mut rates: Vec<ClinicRate> = table
        .latest_for(window_days)
        .into_iter()
        .filter(|(row, _)| row.clinic != table.all_clinics_key)
        .map(|(row, window)| ClinicRate {
            clinic: row.clinic.clone(),
            aged: window.aged,
            seen_in_30d: window.seen_in_30d,
            pct_seen_in_30d: window.pct_seen_in_30d,
        })
        .collect();

    rates.sort_by(|a, b| match (a.pct_seen_in_30d, b.pct_seen_in_30d) {
        (Some(x), Some(y)) => y
            .partial_cmp(&x)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.aged.cmp(&a.aged)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.clinic.cmp(&b.clinic),
    });
    rates
}

pub fn format_pct(pct: Option<f64>) -> String {
    match pct {
        Some(value) => format!("{:.1}%", value * 100.0),
        None => "n/a".to_string(),
    }
}

pub fn build_report(
    source: &str,
    as_of: NaiveDate,
    summary: &ClassificationSummary,
    table: &MeasureTable,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Referrals Seen in 30 Days");
    let _ = writeln!(
        output,
        "Generated from {} (as of {}), measured {} through {}",
        source, as_of, table.start, table.end
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Classification");
    let _ = writeln!(output, "- {} referrals loaded", summary.total);
    let _ = writeln!(
        output,
        "- {} aged, {} seen within 30 days",
        summary.aged, summary.seen_in_30d
    );
    let excluded = [
        ("without a sent date", summary.missing_sent_date),
        ("as rejected or cancelled", summary.withdrawn),
        ("as closed without an encounter", summary.closed_without_encounter),
    ];
    for (reason, count) in excluded {
        let _ = writeln!(output, "- {count} excluded {reason}");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## All Clinics on {}", table.end);
    let network = table
        .for_clinic(ALL_CLINICS)
        .find(|row| row.date == table.end);
    match network {
        Some(row) => write_window_lines(&mut output, row),
        None => {
            let _ = writeln!(output, "No measures for this period.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Clinics, Moving {REPORT_WINDOW}d");
    let rates = rank_clinics(table, REPORT_WINDOW);
    if rates.is_empty() {
        let _ = writeln!(output, "No clinics in this extract.");
    } else {
        let _ = writeln!(
            output,
            "| Clinic | # Aged | # Seen in 30d | % Seen in 30d |"
        );
        let _ = writeln!(output, "|---|---:|---:|---:|");
        for rate in &rates {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} |",
                rate.clinic,
                rate.aged,
                rate.seen_in_30d,
                format_pct(rate.pct_seen_in_30d)
            );
        }
    }

    output
}

fn write_window_lines(output: &mut String, row: &MeasureRow) {
    for window in &row.windows {
        let _ = writeln!(
            output,
            "- Moving {}d: {} of {} seen in 30d ({})",
            window.window_days,
            window.seen_in_30d,
            window.aged,
            format_pct(window.pct_seen_in_30d)
        );
    }
}

pub fn csv_header() -> Vec<String> {
    let mut header = vec![
        "Clinic".to_string(),
        "Date".to_string(),
        "# Aged".to_string(),
        "# Seen in 30d".to_string(),
    ];
    for window_days in WINDOW_LENGTHS {
        header.push(format!("Moving {window_days}d # Aged"));
        header.push(format!("Moving {window_days}d # Seen in 30d"));
        header.push(format!("Moving {window_days}d % Seen in 30d"));
    }
    header
}

pub fn write_csv<W: io::Write>(writer: W, rows: &[&MeasureRow]) -> anyhow::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(csv_header())?;

    for row in rows {
        let mut record = vec![
            row.clinic.clone(),
            row.date.to_string(),
            row.aged.to_string(),
            row.seen_in_30d.to_string(),
        ];
        for window_days in WINDOW_LENGTHS {
            match row.window(window_days) {
                Some(window) => {
                    record.push(window.aged.to_string());
                    record.push(window.seen_in_30d.to_string());
                    let pct = window.pct_seen_in_30d.map(|pct| pct.to_string());
                    record.push(pct.unwrap_or_default());
                }
                None => record.extend([String::new(), String::new(), String::new()]),
            }
        }
        csv_writer.write_record(&record)?;
    }

    csv_writer.flush()?;
    Ok(())
}

pub fn write_json<W: io::Write>(
    mut writer: W,
    table: &MeasureTable,
    rows: &[&MeasureRow],
) -> anyhow::Result<()> {
    let document = serde_json::json!({
        "start": table.start,
        "end": table.end,
        "all_clinics_key": table.all_clinics_key,
        "rows": rows,
    });
    serde_json::to_writer_pretty(&mut writer, &document)?;
    writer.flush()?;
    Ok(())
}
