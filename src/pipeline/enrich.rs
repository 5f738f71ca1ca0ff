//! Left join of the consolidated disclosures against the operator registry.

use crate::constants::{
    COL_AMOUNT, COL_QUARTER, COL_REGISTRY_ID, COL_YEAR, ENRICHED_COLUMNS, SRC_CATEGORY, SRC_LEGAL_NAME, SRC_REGION,
    SRC_REGISTRY_KEY, SRC_TAX_ID,
};
use crate::error::Result;
use crate::metrics;
use crate::pipeline::table::{self, cell, normalize_column_name, Table};
use std::collections::HashMap;
use std::fmt::Display;
use std::path::Path;
use tracing::{info, instrument};

/// The single place join keys are normalized: string form, trimmed.
/// A numeric `123` and a textual `" 123 "` compare equal.
pub fn normalize_join_key<K: Display + ?Sized>(key: &K) -> String {
    key.to_string().trim().to_string()
}

/// Registry attributes carried into the enriched table, in output order.
const REGISTRY_FIELDS: [&str; 4] = [SRC_TAX_ID, SRC_LEGAL_NAME, SRC_CATEGORY, SRC_REGION];

/// Registry rows indexed by normalized key; the first row for a key wins.
pub struct RegistryIndex<'a> {
    table: &'a Table,
    field_cols: [Option<usize>; 4],
    by_key: HashMap<String, usize>,
}

impl<'a> RegistryIndex<'a> {
    /// `registry` must already have normalized headers.
    pub fn build(registry: &'a Table) -> Result<Self> {
        let key_col = registry.require(SRC_REGISTRY_KEY, "registry")?;
        let mut by_key = HashMap::new();
        for (i, row) in registry.rows.iter().enumerate() {
            by_key.entry(normalize_join_key(cell(row, key_col))).or_insert(i);
        }
        Ok(Self {
            table: registry,
            field_cols: REGISTRY_FIELDS.map(|name| registry.column(name)),
            by_key,
        })
    }

    /// Registry values for `key`; empty strings when unmatched or when the
    /// registry lacks the column.
    pub fn lookup(&self, key: &str) -> [String; 4] {
        let row = self.by_key.get(key).map(|&i| &self.table.rows[i]);
        self.field_cols.map(|col| match (row, col) {
            (Some(row), Some(col)) => cell(row, col).to_string(),
            _ => String::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

/// Join `consolidated` (stage output headers) with `registry` (raw headers).
pub fn enrich(consolidated: &Table, registry: &Table) -> Result<Table> {
    let mut consolidated = consolidated.clone();
    consolidated.normalize_headers();
    let mut registry = registry.clone();
    registry.normalize_headers();

    let key_col = consolidated.require(&normalize_column_name(COL_REGISTRY_ID), "consolidated")?;
    let measure_cols = [COL_YEAR, COL_QUARTER, COL_AMOUNT].map(|c| consolidated.column(&normalize_column_name(c)));
    let index = RegistryIndex::build(&registry)?;

    let mut out = Table::new(ENRICHED_COLUMNS);
    let mut matched = 0usize;
    for row in &consolidated.rows {
        let key = normalize_join_key(cell(row, key_col));
        if index.by_key.contains_key(&key) {
            matched += 1;
        }
        let [tax_id, legal_name, category, region] = index.lookup(&key);
        let [year, quarter, amount] = measure_cols.map(|col| col.map(|c| cell(row, c).to_string()).unwrap_or_default());
        out.push_row(vec![key, tax_id, legal_name, category, region, year, quarter, amount]);
    }

    info!(
        "Enriched {} rows, {} matched the registry ({} distinct keys)",
        out.len(),
        matched,
        index.len()
    );
    metrics::rows("enrich", out.len());
    Ok(out)
}

/// File-to-file form of [`enrich`]. The registry is read with the candidate
/// list and any failure is fatal.
#[instrument]
pub fn enrich_files(consolidated: &Path, registry: &Path, output: &Path) -> Result<Table> {
    let consolidated = table::read_stage_csv(consolidated)?;
    let registry = table::read_delimited(registry)?;
    let enriched = enrich(&consolidated, &registry)?;
    table::write_csv(output, &enriched)?;
    Ok(enriched)
}
