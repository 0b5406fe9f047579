use std::path::Path;

use crate::application::use_cases::reference_resolver::ReferenceMap;
use crate::application::use_cases::worksheet_indexer::ColumnIndex;
use crate::domain::asset::PendingRecord;
use crate::domain::error::Result;
use crate::domain::worksheet::{column_letter, CellRef, ImageCellIndex, SheetData};
use crate::infrastructure::storage;

/// Assemble one row into a candidate record. Mapped columns land under their
/// logical field names, images anchored in the row are written to the job
/// staging area, and every unmapped column folds into the ordered
/// other-fields payload under its header-row title.
pub fn materialize_row(
    row: u32,
    sheet: &SheetData,
    index: &ColumnIndex,
    references: &ReferenceMap,
    reference_field: &str,
    images: &mut ImageCellIndex,
    staging_dir: &Path,
) -> Result<PendingRecord> {
    let mut record = PendingRecord::new(row);

    for col in sheet.range().cols() {
        let cell = CellRef::new(row, col);
        if let Some(payloads) = images.take(cell) {
            let staged = storage::write_staged_images(staging_dir, &payloads)?;
            record.staged_images.extend(staged);
        }

        let value = sheet.cell(row, col).map(|v| v.as_text());

        match index.field_for(col) {
            Some(field) => {
                let value = value.unwrap_or_default();
                // An unmatched or empty reference value leaves the id unset;
                // the gate rejects the row as incomplete later.
                if field == reference_field && !value.is_empty() {
                    record.category_id = references.id_for(&value);
                }
                record.fields.insert(field.to_string(), value);
            }
            None => {
                let Some(value) = value.filter(|v| !v.is_empty()) else {
                    continue;
                };
                let title = sheet
                    .header(col)
                    .map(|h| h.as_text())
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| column_letter(col));
                record.other_fields.push((title, value));
            }
        }
    }

    Ok(record)
}
