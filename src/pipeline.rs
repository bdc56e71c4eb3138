use tracing::{info, info_span};

use crate::assemble::assemble;
use crate::calendar::build_calendar;
use crate::classify::{classify_all, summarize, ClassifyConfig};
use crate::daily::aggregate_daily;
use crate::error::EngineError;
use crate::models::{ClassificationSummary, MeasureTable, ReferralRecord};
use crate::rolling::compute_rolling;

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub summary: ClassificationSummary,
    pub table: MeasureTable,
}

/// Classify, bind to calendar, count daily, roll, and assemble.
pub fn run(
    records: &[ReferralRecord],
    config: &ClassifyConfig,
) -> Result<PipelineOutput, EngineError> {
    let _span = info_span!("moving_rates", records = records.len()).entered();

    let classified = classify_all(records, config);
    let calendar = build_calendar(classified.iter().filter_map(|r| r.ages_at))?;
    let daily = aggregate_daily(&calendar, &classified)?;
    let windows = compute_rolling(&daily)?;
    let table = assemble(&daily, &windows)?;

    info!(
        start = %table.start,
        end = %table.end,
        rows = table.rows.len(),
        "computed rolling measures"
    );
    Ok(PipelineOutput {
        summary: summarize(&classified),
        table,
    })
}
