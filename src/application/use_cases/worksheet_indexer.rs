use std::collections::HashMap;

use crate::domain::error::{AppError, Result};
use crate::domain::worksheet::{parse_column_letter, ColumnMapping, WorksheetRange};

/// Validated (logical field -> zero-based column) table plus the reverse
/// lookup. The single source of truth for which columns are "known" versus
/// "other" during row materialization.
#[derive(Debug, Clone)]
pub struct ColumnIndex {
    by_field: HashMap<String, u32>,
    by_col: HashMap<u32, String>,
}

impl ColumnIndex {
    pub fn col_for(&self, field: &str) -> Option<u32> {
        self.by_field.get(field).copied()
    }

    pub fn field_for(&self, col: u32) -> Option<&str> {
        self.by_col.get(&col).map(|f| f.as_str())
    }

    pub fn is_mapped(&self, col: u32) -> bool {
        self.by_col.contains_key(&col)
    }
}

/// Resolve the declared mapping against the worksheet bounds. Runs once per
/// job before any row is processed: a malformed mapping aborts the whole
/// import instead of failing row by row.
pub fn index_columns(
    mapping: &ColumnMapping,
    range: WorksheetRange,
    required_fields: &[String],
) -> Result<ColumnIndex> {
    for field in required_fields {
        if !mapping.fields().any(|f| f == field) {
            return Err(AppError::SchemaMismatch(format!(
                "Required field {} is missing from the column mapping",
                field
            )));
        }
    }

    let mut by_field = HashMap::new();
    let mut by_col = HashMap::new();

    for (field, letter) in mapping.iter() {
        let col = parse_column_letter(letter).ok_or_else(|| {
            AppError::SchemaMismatch(format!(
                "Field {} maps to invalid column letter {:?}",
                field, letter
            ))
        })?;
        if !range.contains_col(col) {
            return Err(AppError::SchemaMismatch(format!(
                "Field {} maps to column {} outside the worksheet range",
                field, letter
            )));
        }
        if let Some(previous) = by_col.insert(col, field.to_string()) {
            return Err(AppError::SchemaMismatch(format!(
                "Fields {} and {} both map to column {}",
                previous, field, letter
            )));
        }
        by_field.insert(field.to_string(), col);
    }

    Ok(ColumnIndex { by_field, by_col })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::worksheet::CellRef;

    fn range() -> WorksheetRange {
        WorksheetRange::new(CellRef::new(0, 0), CellRef::new(10, 3)).unwrap()
    }

    fn mapping(entries: &[(&str, &str)]) -> ColumnMapping {
        ColumnMapping::new(
            entries
                .iter()
                .map(|(f, c)| (f.to_string(), c.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_valid_mapping_resolves_indices() {
        let index = index_columns(
            &mapping(&[("code", "A"), ("name", "B"), ("quantity", "D")]),
            range(),
            &["code".to_string(), "name".to_string()],
        )
        .unwrap();

        assert_eq!(index.col_for("code"), Some(0));
        assert_eq!(index.col_for("quantity"), Some(3));
        assert_eq!(index.field_for(1), Some("name"));
        assert!(!index.is_mapped(2));
    }

    #[test]
    fn test_column_outside_range_is_rejected() {
        let err = index_columns(&mapping(&[("code", "Z")]), range(), &[]).unwrap_err();
        assert!(matches!(err, AppError::SchemaMismatch(_)));
    }

    #[test]
    fn test_missing_required_field_is_rejected() {
        let err = index_columns(
            &mapping(&[("code", "A")]),
            range(),
            &["code".to_string(), "name".to_string()],
        )
        .unwrap_err();
        assert!(matches!(err, AppError::SchemaMismatch(_)));
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn test_duplicate_column_is_rejected() {
        let err = index_columns(&mapping(&[("code", "A"), ("name", "A")]), range(), &[])
            .unwrap_err();
        assert!(matches!(err, AppError::SchemaMismatch(_)));
    }

    #[test]
    fn test_invalid_letter_is_rejected() {
        let err = index_columns(&mapping(&[("code", "7")]), range(), &[]).unwrap_err();
        assert!(matches!(err, AppError::SchemaMismatch(_)));
    }
}
