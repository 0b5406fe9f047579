use calamine::{open_workbook, Data, Reader, Xlsx};
use std::path::Path;

use crate::domain::error::{AppError, Result};
use crate::domain::worksheet::{CellRef, CellValue, SheetData, WorksheetRange};

/// Read the first worksheet of an XLSX file into a sparse sheet. Only the
/// first sheet participates in an import job.
pub fn read_first_sheet(path: &Path) -> Result<SheetData> {
    let mut workbook: Xlsx<_> = open_workbook(path).map_err(|e| {
        AppError::Parse(format!("Failed to open Excel file {}: {}", path.display(), e))
    })?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::Parse("No worksheet found in Excel file".to_string()))?
        .map_err(|e| AppError::Parse(format!("Failed to read Excel range: {}", e)))?;

    let (start_row, start_col) = range
        .start()
        .ok_or_else(|| AppError::Parse("Worksheet is empty".to_string()))?;
    let (end_row, end_col) = range
        .end()
        .ok_or_else(|| AppError::Parse("Worksheet is empty".to_string()))?;

    let bounds = WorksheetRange::new(
        CellRef::new(start_row, start_col),
        CellRef::new(end_row, end_col),
    )?;
    let mut sheet = SheetData::new(bounds);

    for (r, row) in range.rows().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            let Some(value) = convert_cell(cell) else {
                continue;
            };
            sheet.insert(start_row + r as u32, start_col + c as u32, value);
        }
    }

    Ok(sheet)
}

fn convert_cell(cell: &Data) -> Option<CellValue> {
    match cell {
        Data::Empty => None,
        Data::Error(_) => None,
        Data::String(s) => {
            if s.trim().is_empty() {
                None
            } else {
                Some(CellValue::Text(s.clone()))
            }
        }
        Data::Int(i) => Some(CellValue::Number(*i as f64)),
        Data::Float(f) => Some(CellValue::Number(*f)),
        Data::Bool(b) => Some(CellValue::Bool(*b)),
        // Dates and durations keep their display form.
        other => Some(CellValue::Text(format!("{}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_cell_skips_empty_and_error() {
        assert_eq!(convert_cell(&Data::Empty), None);
        assert_eq!(convert_cell(&Data::String("  ".to_string())), None);
        assert_eq!(
            convert_cell(&Data::Int(7)),
            Some(CellValue::Number(7.0))
        );
        assert_eq!(
            convert_cell(&Data::String("bolt".to_string())),
            Some(CellValue::Text("bolt".to_string()))
        );
    }
}
