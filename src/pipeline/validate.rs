//! Row validation: CNPJ checksum, legal name, positive amount.

use crate::constants::{COL_AMOUNT, COL_LEGAL_NAME, COL_TAX_ID};
use crate::error::Result;
use crate::metrics;
use crate::pipeline::table::{self, cell, parse_number, Table};
use std::path::Path;
use tracing::{info, instrument};

const FIRST_WEIGHTS: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
const SECOND_WEIGHTS: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

fn check_digit(digits: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = digits.iter().zip(weights).map(|(d, w)| d * w).sum();
    match sum % 11 {
        r if r < 2 => 0,
        r => 11 - r,
    }
}

/// Mod-11 CNPJ validation over the digits of `raw`.
pub fn is_valid_cnpj(raw: &str) -> bool {
    let digits: Vec<u32> = raw.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 14 {
        return false;
    }
    if digits.iter().all(|d| *d == digits[0]) {
        return false;
    }
    let first = check_digit(&digits[..12], &FIRST_WEIGHTS);
    let mut with_first = digits[..12].to_vec();
    with_first.push(first);
    let second = check_digit(&with_first, &SECOND_WEIGHTS);
    digits[12] == first && digits[13] == second
}

fn is_positive_amount(raw: &str) -> bool {
    matches!(parse_number(raw), Some(v) if v.is_finite() && v > 0.0)
}

/// Keep rows with a valid CNPJ, a non-empty legal name and a positive
/// finite amount. A table without rows passes through untouched.
pub fn validate(input: &Table) -> Result<Table> {
    if input.is_empty() {
        return Ok(input.clone());
    }
    let tax_col = input.require(COL_TAX_ID, "enriched")?;
    let name_col = input.require(COL_LEGAL_NAME, "enriched")?;
    let amount_col = input.require(COL_AMOUNT, "enriched")?;

    let mut out = Table::new(input.headers.clone());
    for row in &input.rows {
        let tax_id = cell(row, tax_col).trim();
        let name = cell(row, name_col).trim();
        if !is_valid_cnpj(tax_id) || name.is_empty() || !is_positive_amount(cell(row, amount_col)) {
            continue;
        }
        let mut kept = row.clone();
        kept[tax_col] = tax_id.to_string();
        kept[name_col] = name.to_string();
        out.push_row(kept);
    }

    info!("Validated {} of {} rows", out.len(), input.len());
    metrics::rows("validate", out.len());
    Ok(out)
}

#[instrument]
pub fn validate_file(input: &Path, output: &Path) -> Result<Table> {
    let table = table::read_stage_csv(input)?;
    let validated = validate(&table)?;
    table::write_csv(output, &validated)?;
    Ok(validated)
}
