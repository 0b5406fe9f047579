use csv::{ReaderBuilder, Trim};
use std::fs;
use std::path::Path;

use crate::domain::error::{AppError, Result};
use crate::domain::worksheet::{CellRef, CellValue, SheetData, WorksheetRange};

/// Read a CSV file into a sheet. The first record is kept as the header row
/// so the import pipeline addresses CSV and XLSX uniformly.
pub fn read_sheet(path: &Path) -> Result<SheetData> {
    let raw = fs::read(path)
        .map_err(|e| AppError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
    parse_content(&decode(&raw))
}

pub fn parse_content(content: &str) -> Result<SheetData> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows: Vec<Vec<String>> = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let record = result
            .map_err(|e| AppError::Parse(format!("Failed to parse CSV row {}: {}", index + 1, e)))?;
        rows.push(record.iter().map(|f| f.to_string()).collect());
    }

    if rows.is_empty() {
        return Err(AppError::Parse("CSV file is empty".to_string()));
    }

    let max_cols = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    if max_cols == 0 {
        return Err(AppError::Parse("CSV file has no columns".to_string()));
    }

    let bounds = WorksheetRange::new(
        CellRef::new(0, 0),
        CellRef::new(rows.len() as u32 - 1, max_cols as u32 - 1),
    )?;
    let mut sheet = SheetData::new(bounds);

    for (r, row) in rows.iter().enumerate() {
        for (c, field) in row.iter().enumerate() {
            if field.trim().is_empty() {
                continue;
            }
            sheet.insert(r as u32, c as u32, CellValue::Text(field.clone()));
        }
    }

    Ok(sheet)
}

/// UTF-8 with a Windows-1252 fallback; exports from older spreadsheet tools
/// regularly arrive in the latter.
fn decode(raw: &[u8]) -> String {
    match std::str::from_utf8(raw) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(raw);
            decoded.into_owned()
        }
    }
}
