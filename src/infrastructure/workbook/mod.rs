pub mod csv;
pub mod images;
pub mod xlsx;

use std::path::Path;

use crate::domain::error::{AppError, Result};
use crate::domain::worksheet::{ImageCellIndex, SheetData};

/// A parsed import file: the first worksheet plus whatever images were
/// embedded in it (always empty for CSV).
#[derive(Debug)]
pub struct ParsedWorkbook {
    pub sheet: SheetData,
    pub images: ImageCellIndex,
}

pub fn open(path: &Path) -> Result<ParsedWorkbook> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "xlsx" => Ok(ParsedWorkbook {
            sheet: xlsx::read_first_sheet(path)?,
            images: images::extract(path)?,
        }),
        "csv" => Ok(ParsedWorkbook {
            sheet: csv::read_sheet(path)?,
            images: ImageCellIndex::default(),
        }),
        other => Err(AppError::Validation(format!(
            "Unsupported file type: {}",
            other
        ))),
    }
}
