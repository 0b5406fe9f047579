use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::RangeInclusive;

use crate::domain::error::{AppError, Result};

/// Zero-based (row, column) address of one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

/// Rectangular bounds of the populated sheet area. Immutable once parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorksheetRange {
    start: CellRef,
    end: CellRef,
}

impl WorksheetRange {
    pub fn new(start: CellRef, end: CellRef) -> Result<Self> {
        if start.row > end.row || start.col > end.col {
            return Err(AppError::Parse(format!(
                "Invalid worksheet range: start ({},{}) past end ({},{})",
                start.row, start.col, end.row, end.col
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> CellRef {
        self.start
    }

    pub fn end(&self) -> CellRef {
        self.end
    }

    /// The header row is the first populated row.
    pub fn header_row(&self) -> u32 {
        self.start.row
    }

    /// Data rows start one past the header row. Empty when the sheet only
    /// holds a header.
    pub fn data_rows(&self) -> RangeInclusive<u32> {
        (self.start.row + 1)..=self.end.row
    }

    pub fn cols(&self) -> RangeInclusive<u32> {
        self.start.col..=self.end.col
    }

    pub fn contains_col(&self, col: u32) -> bool {
        col >= self.start.col && col <= self.end.col
    }
}

/// Typed value read from one cell. Absent cells are simply not stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    /// Canonical text form. Integral numbers drop the trailing ".0" so a
    /// quantity cell holding 12 reads back as "12".
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            CellValue::Bool(b) => b.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

/// Parse a sheet column letter ("A", "BC") into a zero-based index.
pub fn parse_column_letter(letters: &str) -> Option<u32> {
    let letters = letters.trim();
    if letters.is_empty() {
        return None;
    }
    let mut index: u32 = 0;
    for ch in letters.chars() {
        let ch = ch.to_ascii_uppercase();
        if !ch.is_ascii_uppercase() {
            return None;
        }
        index = index.checked_mul(26)?.checked_add(ch as u32 - 'A' as u32 + 1)?;
    }
    Some(index - 1)
}

/// Zero-based column index back to its sheet letter.
pub fn column_letter(mut index: u32) -> String {
    let mut out = Vec::new();
    loop {
        out.push((b'A' + (index % 26) as u8) as char);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    out.iter().rev().collect()
}

/// Caller-declared (logical field name -> sheet column letter) mapping.
/// Declaration order is preserved; the Worksheet Indexer derives the
/// validated zero-based lookup from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMapping {
    entries: Vec<(String, String)>,
}

impl ColumnMapping {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(f, c)| (f.as_str(), c.as_str()))
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(f, _)| f.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// In-memory worksheet: the populated range plus a sparse cell map.
/// Both the XLSX and CSV readers produce this, and tests build it directly.
#[derive(Debug, Clone)]
pub struct SheetData {
    range: WorksheetRange,
    cells: HashMap<CellRef, CellValue>,
}

impl SheetData {
    pub fn new(range: WorksheetRange) -> Self {
        Self {
            range,
            cells: HashMap::new(),
        }
    }

    pub fn range(&self) -> WorksheetRange {
        self.range
    }

    pub fn insert(&mut self, row: u32, col: u32, value: CellValue) {
        self.cells.insert(CellRef::new(row, col), value);
    }

    pub fn cell(&self, row: u32, col: u32) -> Option<&CellValue> {
        self.cells.get(&CellRef::new(row, col))
    }

    /// Header-row cell for a column (supplies titles for unmapped columns).
    pub fn header(&self, col: u32) -> Option<&CellValue> {
        self.cell(self.range.header_row(), col)
    }
}

/// One raw image payload extracted from the workbook.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub name: String,
    pub extension: String,
    pub bytes: Vec<u8>,
}

/// Cell address -> ordered image payloads anchored at that cell. Built once
/// per job by the extractor; rows take their entries during materialization.
#[derive(Debug, Clone, Default)]
pub struct ImageCellIndex {
    by_cell: HashMap<CellRef, Vec<ImagePayload>>,
}

impl ImageCellIndex {
    pub fn insert(&mut self, cell: CellRef, payload: ImagePayload) {
        self.by_cell.entry(cell).or_default().push(payload);
    }

    /// Remove and return the payloads anchored at a cell, if any.
    pub fn take(&mut self, cell: CellRef) -> Option<Vec<ImagePayload>> {
        self.by_cell.remove(&cell)
    }

    pub fn contains(&self, cell: CellRef) -> bool {
        self.by_cell.contains_key(&cell)
    }

    pub fn len(&self) -> usize {
        self.by_cell.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_cell.is_empty()
    }
}
