use std::collections::{HashMap, HashSet};

use crate::application::use_cases::worksheet_indexer::ColumnIndex;
use crate::domain::error::{AppError, Result};
use crate::domain::worksheet::SheetData;
use crate::infrastructure::db::categories::CategoryRepository;

/// Immutable snapshot of (reference value -> persisted id). Built once by
/// the resolver before batching; batches only read it, so the hot loop needs
/// no locking and no hidden cross-batch state.
#[derive(Debug, Clone, Default)]
pub struct ReferenceMap {
    by_value: HashMap<String, i64>,
}

impl ReferenceMap {
    pub fn from_pairs(by_value: HashMap<String, i64>) -> Self {
        Self { by_value }
    }

    pub fn id_for(&self, value: &str) -> Option<i64> {
        self.by_value.get(value.trim()).copied()
    }

    pub fn len(&self) -> usize {
        self.by_value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_value.is_empty()
    }
}

/// Scan the reference column across all data rows, reduce to unique values
/// and find-or-create a record per value. Committed in its own transaction:
/// reference records persist even when a later batch fails.
pub async fn resolve_references(
    categories: &CategoryRepository,
    sheet: &SheetData,
    index: &ColumnIndex,
    reference_field: &str,
) -> Result<ReferenceMap> {
    let col = index.col_for(reference_field).ok_or_else(|| {
        AppError::SchemaMismatch(format!(
            "Reference field {} is not mapped to a column",
            reference_field
        ))
    })?;

    let mut seen = HashSet::new();
    let mut values = Vec::new();
    for row in sheet.range().data_rows() {
        let Some(cell) = sheet.cell(row, col) else {
            continue;
        };
        let value = cell.as_text();
        if value.is_empty() {
            continue;
        }
        if seen.insert(value.clone()) {
            values.push(value);
        }
    }

    let by_value = categories.find_or_create_all(&values).await?;
    tracing::info!(
        distinct_values = by_value.len(),
        "Resolved reference column"
    );

    Ok(ReferenceMap { by_value })
}
