// Tabular source - read-only access to named sheets by A1-style range
//
// The reconciliation engine only ever sees this trait. The concrete source
// shipped here is a workbook directory (one CSV file per sheet); the range
// grammar matches what a spreadsheet API accepts, so swapping in a remote
// client is a drop-in replacement.

use std::fs::File;
use std::path::PathBuf;

use anyhow::anyhow;

use crate::error::SourceError;

// ============================================================================
// RANGE EXPRESSIONS
// ============================================================================

/// A parsed A1-style range: a sheet name plus a column/row rectangle.
///
/// Two forms are supported:
/// - bounded rectangle: `Facility!A2:E51`
/// - open column range: `Facility!A:A` (whole columns, used for the
///   identifier/universe pass)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRef {
    pub sheet: String,
    /// Zero-based first column index (`A` = 0).
    pub start_col: usize,
    /// Zero-based last column index, inclusive.
    pub end_col: usize,
    /// One-based first row; `None` means "from the top".
    pub start_row: Option<usize>,
    /// One-based last row, inclusive; `None` means "to the bottom".
    pub end_row: Option<usize>,
}

impl RangeRef {
    /// Parse a range expression like `Facility!A2:E51` or `Facility!A:A`.
    pub fn parse(expr: &str) -> Result<Self, SourceError> {
        let bad = |reason: &str| SourceError::BadRange {
            expr: expr.to_string(),
            reason: reason.to_string(),
        };

        let (sheet, rect) = expr
            .split_once('!')
            .ok_or_else(|| bad("missing '!' separator"))?;
        if sheet.is_empty() {
            return Err(bad("empty sheet name"));
        }

        let (from, to) = rect
            .split_once(':')
            .ok_or_else(|| bad("missing ':' separator"))?;

        let (start_col, start_row) = split_cell(from).ok_or_else(|| bad("invalid start cell"))?;
        let (end_col, end_row) = split_cell(to).ok_or_else(|| bad("invalid end cell"))?;

        if end_col < start_col {
            return Err(bad("end column precedes start column"));
        }
        if let (Some(s), Some(e)) = (start_row, end_row) {
            if e < s {
                return Err(bad("end row precedes start row"));
            }
        }

        Ok(RangeRef {
            sheet: sheet.to_string(),
            start_col,
            end_col,
            start_row,
            end_row,
        })
    }

    /// Clip a sheet's full row set down to this rectangle.
    ///
    /// Mirrors spreadsheet-API semantics: rows past the end of the data are
    /// not materialized, trailing empty cells are omitted, and trailing
    /// all-empty rows are dropped.
    pub fn apply(&self, rows: &[Vec<String>]) -> Vec<Vec<String>> {
        let first = self.start_row.unwrap_or(1).saturating_sub(1);
        let last = self.end_row.unwrap_or(rows.len()).min(rows.len());
        if first >= last {
            return Vec::new();
        }

        let mut out: Vec<Vec<String>> = rows[first..last]
            .iter()
            .map(|row| {
                let mut cells: Vec<String> = row
                    .iter()
                    .skip(self.start_col)
                    .take(self.end_col - self.start_col + 1)
                    .cloned()
                    .collect();
                while cells.last().is_some_and(|c| c.is_empty()) {
                    cells.pop();
                }
                cells
            })
            .collect();

        while out.last().is_some_and(|row| row.is_empty()) {
            out.pop();
        }
        out
    }
}

/// Split `E51` into (column index, Some(51)) and `E` into (column index, None).
fn split_cell(cell: &str) -> Option<(usize, Option<usize>)> {
    let letters: String = cell.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let digits = &cell[letters.len()..];

    let col = column_index(&letters)?;
    if digits.is_empty() {
        return Some((col, None));
    }
    let row: usize = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((col, Some(row)))
}

/// Convert column letters to a zero-based index (`A` = 0, `Z` = 25, `AA` = 26).
pub fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    let mut index = 0usize;
    for c in letters.chars() {
        let c = c.to_ascii_uppercase();
        if !c.is_ascii_uppercase() {
            return None;
        }
        index = index * 26 + (c as usize - 'A' as usize + 1);
    }
    Some(index - 1)
}

/// Convert a zero-based column index back to letters (0 = `A`).
pub fn column_letters(mut index: usize) -> String {
    let mut out = String::new();
    loop {
        out.insert(0, (b'A' + (index % 26) as u8) as char);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    out
}

// ============================================================================
// SOURCE TRAIT
// ============================================================================

/// Read-only access to an external tabular document.
///
/// Returns rows top-to-bottom, columns left-to-right. Trailing empty cells
/// may be absent, so row width is at most (not exactly) the rectangle width.
pub trait TabularSource: Send + Sync {
    fn read_range(&self, expr: &str) -> Result<Vec<Vec<String>>, SourceError>;
}

// ============================================================================
// CSV WORKBOOK
// ============================================================================

/// A workbook backed by a directory of CSV files, one per sheet
/// (`<dir>/Facility.csv` answers ranges on sheet `Facility`).
pub struct CsvWorkbook {
    dir: PathBuf,
}

impl CsvWorkbook {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CsvWorkbook { dir: dir.into() }
    }

    fn sheet_path(&self, sheet: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", sheet))
    }

    fn load_sheet(&self, sheet: &str) -> Result<Vec<Vec<String>>, SourceError> {
        let path = self.sheet_path(sheet);
        if !path.exists() {
            return Err(SourceError::NoSuchSheet {
                sheet: sheet.to_string(),
            });
        }

        let file = File::open(&path).map_err(|e| SourceError::Read {
            sheet: sheet.to_string(),
            cause: anyhow!(e).context(format!("opening {:?}", path)),
        })?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(file);

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| SourceError::Read {
                sheet: sheet.to_string(),
                cause: anyhow!(e),
            })?;
            rows.push(record.iter().map(|cell| cell.to_string()).collect());
        }
        Ok(rows)
    }
}

impl TabularSource for CsvWorkbook {
    fn read_range(&self, expr: &str) -> Result<Vec<Vec<String>>, SourceError> {
        let range = RangeRef::parse(expr)?;
        let rows = self.load_sheet(&range.sheet)?;
        Ok(range.apply(&rows))
    }
}

// ============================================================================
// TEST FIXTURE
// ============================================================================

/// In-memory source used by engine and orchestrator tests.
#[cfg(test)]
pub(crate) struct StaticSource {
    sheets: std::collections::HashMap<String, Vec<Vec<String>>>,
}

#[cfg(test)]
impl StaticSource {
    pub fn new() -> Self {
        StaticSource {
            sheets: std::collections::HashMap::new(),
        }
    }

    /// Replace a sheet's contents. Rows are `&str` cells for test brevity.
    pub fn set_sheet(&mut self, name: &str, rows: Vec<Vec<&str>>) {
        self.sheets.insert(
            name.to_string(),
            rows.into_iter()
                .map(|row| row.into_iter().map(|c| c.to_string()).collect())
                .collect(),
        );
    }
}

#[cfg(test)]
impl TabularSource for StaticSource {
    fn read_range(&self, expr: &str) -> Result<Vec<Vec<String>>, SourceError> {
        let range = RangeRef::parse(expr)?;
        let rows = self
            .sheets
            .get(&range.sheet)
            .ok_or_else(|| SourceError::NoSuchSheet {
                sheet: range.sheet.clone(),
            })?;
        Ok(range.apply(rows))
    }
}

// ============================================================================
// TESTS
// ============================================================================
