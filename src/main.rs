use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;

mod assemble;
mod calendar;
mod classify;
mod daily;
mod error;
mod loader;
mod logging;
mod models;
mod pipeline;
mod report;
mod rolling;

use crate::classify::ClassifyConfig;
use crate::logging::{LogConfig, LogFormat};
use crate::models::{MeasureRow, WINDOW_LENGTHS};
use crate::pipeline::PipelineOutput;

/// Date the referral extract was pulled; unseen referrals are censored here.
const DEFAULT_AS_OF: &str = "2023-03-01";

#[derive(Parser)]
#[command(name = "referral-moving-rates")]
#[command(
    about = "Moving rates of referrals seen within 30 days, by clinic",
    long_about = None
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Referral extract with a header row
    #[arg(long)]
    csv: PathBuf,
    /// Reference date for censoring referrals not yet seen (YYYY-MM-DD)
    #[arg(long, default_value = DEFAULT_AS_OF)]
    as_of: NaiveDate,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the full (clinic, date) table of moving measures
    Compute {
        #[command(flatten)]
        source: SourceArgs,
        /// Write to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,
        /// Only emit rows for this clinic (use *ALL* for the aggregate)
        #[arg(long)]
        clinic: Option<String>,
    },
    /// Print latest-date rates per clinic for one window
    Summary {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long, default_value_t = 91)]
        window: u32,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn compute(source: &SourceArgs) -> anyhow::Result<PipelineOutput> {
    let records = loader::load_referrals(&source.csv)?;
    let config = ClassifyConfig::as_of_date(source.as_of);
    let output = pipeline::run(&records, &config).context("failed to compute rolling measures")?;
    Ok(output)
}

fn write_table(
    output: &PipelineOutput,
    rows: &[&MeasureRow],
    format: OutputFormat,
    out: Option<&Path>,
) -> anyhow::Result<()> {
    let writer: Box<dyn std::io::Write> = match out {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(std::io::stdout().lock()),
    };
    match format {
        OutputFormat::Csv => report::write_csv(writer, rows),
        OutputFormat::Json => report::write_json(writer, &output.table, rows),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(&LogConfig::from_verbosity(cli.verbose, cli.log_format))?;

    match cli.command {
        Commands::Compute {
            source,
            out,
            format,
            clinic,
        } => {
            let output = compute(&source)?;
            let rows: Vec<&MeasureRow> = match clinic.as_deref() {
                Some(name) if !output.table.clinics().contains(&name) => {
                    bail!("clinic {name:?} does not appear in the extract");
                }
                Some(name) => output.table.for_clinic(name).collect(),
                None => output.table.rows.iter().collect(),
            };
            write_table(&output, &rows, format, out.as_deref())?;
            if let Some(path) = out {
                info!(rows = rows.len(), path = %path.display(), "wrote measure table");
            }
        }
        Commands::Summary {
            source,
            window,
            limit,
        } => {
            if !WINDOW_LENGTHS.contains(&window) {
                bail!("window must be one of {WINDOW_LENGTHS:?}, got {window}");
            }
            let output = compute(&source)?;
            let table = &output.table;
            let rates = report::rank_clinics(table, window);

            if rates.is_empty() {
                println!("No clinics found in this extract.");
                return Ok(());
            }

            let (start, end) = table.date_range();
            println!(
                "Moving {window}d % seen in 30d on {end} (measured from {start}):"
            );
            let network = table
                .latest_for(window)
                .into_iter()
                .find(|(row, _)| row.clinic == table.all_clinics_key);
            if let Some((_, measure)) = network {
                println!(
                    "- {} {} of {} ({})",
                    table.all_clinics_key,
                    measure.seen_in_30d,
                    measure.aged,
                    report::format_pct(measure.pct_seen_in_30d)
                );
            }
            for rate in rates.iter().take(limit) {
                println!(
                    "- {} {} of {} ({})",
                    rate.clinic,
                    rate.seen_in_30d,
                    rate.aged,
                    report::format_pct(rate.pct_seen_in_30d)
                );
            }
        }
        Commands::Report { source, out } => {
            let output = compute(&source)?;
            let report = report::build_report(
                &source.csv.display().to_string(),
                source.as_of,
                &output.summary,
                &output.table,
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
