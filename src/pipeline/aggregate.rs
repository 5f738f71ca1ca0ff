//! Per (legal name, region) expense statistics.

use crate::constants::{AGGREGATE_COLUMNS, COL_AMOUNT, COL_LEGAL_NAME, COL_REGION};
use crate::error::Result;
use crate::metrics;
use crate::pipeline::table::{self, cell, format_number, format_optional, parse_number, Table};
use crate::types::Aggregate;
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, instrument};

/// Sum, mean and sample standard deviation of every group, ordered by
/// (legal name, region). Amounts that do not parse are dropped.
pub fn aggregate(validated: &Table) -> Result<Vec<Aggregate>> {
    let name_col = validated.require(COL_LEGAL_NAME, "validated")?;
    let region_col = validated.require(COL_REGION, "validated")?;
    let amount_col = validated.require(COL_AMOUNT, "validated")?;

    let mut groups: BTreeMap<(String, String), Vec<f64>> = BTreeMap::new();
    let mut dropped = 0usize;
    for row in &validated.rows {
        let Some(amount) = parse_number(cell(row, amount_col)).filter(|v| v.is_finite()) else {
            dropped += 1;
            continue;
        };
        let key = (cell(row, name_col).trim().to_string(), cell(row, region_col).trim().to_string());
        groups.entry(key).or_default().push(amount);
    }
    if dropped > 0 {
        debug!(dropped, "Dropped rows without a numeric amount");
    }

    let aggregates: Vec<Aggregate> = groups
        .into_iter()
        .map(|((legal_name, region), amounts)| {
            let stddev = if amounts.len() < 2 {
                None
            } else {
                Some(amounts.iter().std_dev()).filter(|s| !s.is_nan())
            };
            Aggregate {
                legal_name,
                region,
                total: amounts.iter().sum(),
                mean: amounts.iter().mean(),
                stddev,
            }
        })
        .collect();

    info!("Aggregated {} rows into {} groups", validated.len() - dropped, aggregates.len());
    metrics::rows("aggregate", aggregates.len());
    Ok(aggregates)
}

pub fn aggregate_table(aggregates: &[Aggregate]) -> Table {
    let mut out = Table::new(AGGREGATE_COLUMNS);
    for a in aggregates {
        out.push_row(vec![
            a.legal_name.clone(),
            a.region.clone(),
            format_number(a.total),
            format_number(a.mean),
            format_optional(a.stddev),
        ]);
    }
    out
}

#[instrument]
pub fn aggregate_file(input: &Path, output: &Path) -> Result<Vec<Aggregate>> {
    let validated = table::read_stage_csv(input)?;
    let aggregates = aggregate(&validated)?;
    table::write_csv(output, &aggregate_table(&aggregates))?;
    Ok(aggregates)
}
