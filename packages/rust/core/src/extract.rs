//! RecordExtractor: sheet rows → flat records.
//!
//! Records travel through the vertical flat-text format:
//!
//! ```text
//! ========== REGISTRO 1 ==========
//! DESCRICAO: Sofa
//! CUSTO: 1.500,00
//!
//! ```
//!
//! [`render_flat_text`] and [`parse_flat_text`] are inverse on records whose
//! column names contain no `:` and whose values contain no newline; the
//! extractor guarantees the latter.

use std::collections::BTreeSet;

use tracing::{debug, instrument};

use catalogbuilder_shared::{CatalogError, PageSpec, Result};
use catalogbuilder_sheets::Sheet;

use crate::text::{is_empty_like, normalize_column};

const RECORD_PREFIX: &str = "========== REGISTRO ";
const RECORD_SUFFIX: &str = " ==========";

// ---------------------------------------------------------------------------
// RawRecord
// ---------------------------------------------------------------------------

/// One extracted row: ordered `(column, value)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    pub fields: Vec<(String, String)>,
}

impl RawRecord {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    /// Value of the first column whose normalized name matches `column`.
    pub fn get(&self, column: &str) -> Option<&str> {
        let wanted = normalize_column(column);
        self.fields
            .iter()
            .find(|(name, _)| normalize_column(name) == wanted)
            .map(|(_, value)| value.as_str())
    }

    /// Value of `column`, or `""` when absent.
    pub fn value(&self, column: &str) -> &str {
        self.get(column).unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// Page layout
// ---------------------------------------------------------------------------

/// Where the table sits in a sheet and what its columns are called.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLayout {
    /// 0-based index of the header row.
    pub header_row: usize,
    /// 0-based index of the first table column.
    pub first_column: usize,
    /// Declared column names; empty means "use the sheet's header".
    pub columns: Vec<String>,
    /// Last row to read, 1-based and inclusive.
    pub stop_row: Option<usize>,
}

impl PageLayout {
    /// Layout from a Config page, with `fallback_columns` used when the page
    /// declares none.
    pub fn from_page(page: &PageSpec, fallback_columns: &[String]) -> Result<Self> {
        let (header_row, first_column) = parse_cell(&page.start_cell)?;
        let columns = if page.columns.is_empty() {
            fallback_columns.to_vec()
        } else {
            page.columns.clone()
        };
        Ok(Self {
            header_row,
            first_column,
            columns,
            stop_row: page.stop_row,
        })
    }
}

/// Parse an A1-style anchor into 0-based `(row, column)`.
pub fn parse_cell(cell: &str) -> Result<(usize, usize)> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Ok((0, 0));
    }
    let split = cell
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| CatalogError::config(format!("invalid start cell: {cell:?}")))?;
    let (letters, digits) = cell.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(CatalogError::config(format!("invalid start cell: {cell:?}")));
    }

    let row: usize = digits
        .parse()
        .map_err(|_| CatalogError::config(format!("invalid start cell: {cell:?}")))?;
    if row == 0 {
        return Err(CatalogError::config(format!("invalid start cell: {cell:?}")));
    }

    let column = letters
        .chars()
        .try_fold(0usize, |acc, c| {
            acc.checked_mul(26)?
                .checked_add(c.to_ascii_uppercase() as usize - 'A' as usize + 1)
        })
        .ok_or_else(|| CatalogError::config(format!("start cell column out of range: {cell:?}")))?;

    Ok((row - 1, column - 1))
}

/// Excel column letter for a 0-based index (`0` → `A`, `26` → `AA`).
fn column_letter(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push((b'A' + (index % 26) as u8) as char);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.iter().rev().collect()
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Turn a sheet into records according to `layout`.
///
/// Entirely empty rows and columns are dropped.
#[instrument(skip_all, fields(sheet = %sheet.name))]
pub fn extract_records(sheet: &Sheet, layout: &PageLayout) -> Vec<RawRecord> {
    let Some(header) = sheet.rows.get(layout.header_row) else {
        debug!(header_row = layout.header_row + 1, "header row beyond sheet");
        return Vec::new();
    };

    let names: Vec<String> = if layout.columns.is_empty() {
        header
            .iter()
            .skip(layout.first_column)
            .enumerate()
            .map(|(i, cell)| {
                let name = cell.replace('\n', " ").trim().to_string();
                if name.is_empty() {
                    column_letter(layout.first_column + i)
                } else {
                    name
                }
            })
            .collect()
    } else {
        layout.columns.clone()
    };

    let end = layout
        .stop_row
        .map_or(sheet.rows.len(), |stop| stop.min(sheet.rows.len()));

    let rows: Vec<Vec<String>> = sheet
        .rows
        .iter()
        .take(end)
        .skip(layout.header_row + 1)
        .map(|row| {
            (0..names.len())
                .map(|i| {
                    row.get(layout.first_column + i)
                        .map(|v| v.replace(['\r', '\n'], " ").trim().to_string())
                        .unwrap_or_default()
                })
                .collect::<Vec<String>>()
        })
        .filter(|cells| cells.iter().any(|c| !c.is_empty()))
        .collect();

    let keep: Vec<usize> = (0..names.len())
        .filter(|&i| rows.iter().any(|row| !row[i].is_empty()))
        .collect();

    let records: Vec<RawRecord> = rows
        .into_iter()
        .map(|row| {
            RawRecord::new(
                keep.iter()
                    .map(|&i| (names[i].clone(), row[i].clone()))
                    .collect(),
            )
        })
        .collect();

    debug!(records = records.len(), columns = keep.len(), "sheet extracted");
    records
}

// ---------------------------------------------------------------------------
// Header detection
// ---------------------------------------------------------------------------

/// Whether a record is a repeated header rather than data.
///
/// `sources` holds the normalized names of the mapped source columns.
pub fn is_header_record(record: &RawRecord, sources: &BTreeSet<String>) -> bool {
    if sources.is_empty() {
        return false;
    }

    let mut found = 0usize;
    let mut populated = Vec::new();
    for (column, value) in &record.fields {
        if sources.contains(&normalize_column(column)) {
            found += 1;
            if !is_empty_like(value) {
                populated.push(value.as_str());
            }
        } else if !is_empty_like(value) {
            return false;
        }
    }

    if found == 0 {
        return false;
    }
    if populated.is_empty() {
        return true;
    }

    populated.iter().all(|value| {
        let name = normalize_column(value);
        sources.contains(&name)
            || record
                .fields
                .iter()
                .any(|(column, _)| normalize_column(column) == name)
    })
}

/// Drop header repeats, returning the data records and the number dropped.
pub fn discard_headers(
    records: Vec<RawRecord>,
    sources: &BTreeSet<String>,
) -> (Vec<RawRecord>, usize) {
    let total = records.len();
    let data: Vec<RawRecord> = records
        .into_iter()
        .filter(|r| !is_header_record(r, sources))
        .collect();
    let skipped = total - data.len();
    if skipped > 0 {
        debug!(skipped, "header records discarded");
    }
    (data, skipped)
}

// ---------------------------------------------------------------------------
// Flat text
// ---------------------------------------------------------------------------

/// Serialize records in the vertical flat-text format.
pub fn render_flat_text(records: &[RawRecord]) -> String {
    let mut out = String::new();
    for (i, record) in records.iter().enumerate() {
        out.push_str(&format!("{RECORD_PREFIX}{}{RECORD_SUFFIX}\n", i + 1));
        for (column, value) in &record.fields {
            out.push_str(&format!("{column}: {value}\n"));
        }
        out.push('\n');
    }
    out
}

/// Parse the vertical flat-text format. Lines outside a record, or without
/// a `:`, are ignored.
pub fn parse_flat_text(text: &str) -> Vec<RawRecord> {
    let mut records = Vec::new();
    let mut current: Option<RawRecord> = None;

    for line in text.lines() {
        if line.starts_with(RECORD_PREFIX) {
            if let Some(record) = current.take() {
                records.push(record);
            }
            current = Some(RawRecord::default());
            continue;
        }
        let Some(record) = current.as_mut() else {
            continue;
        };
        if let Some((column, value)) = line.split_once(':') {
            record
                .fields
                .push((column.trim().to_string(), value.trim().to_string()));
        }
    }

    if let Some(record) = current {
        records.push(record);
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn sources(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| normalize_column(n)).collect()
    }

    fn record(fields: &[(&str, &str)]) -> RawRecord {
        RawRecord::new(
            fields
                .iter()
                .map(|(c, v)| (c.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn parses_start_cells() {
        assert_eq!(parse_cell("A1").unwrap(), (0, 0));
        assert_eq!(parse_cell("A5").unwrap(), (4, 0));
        assert_eq!(parse_cell("c12").unwrap(), (11, 2));
        assert_eq!(parse_cell("AA3").unwrap(), (2, 26));
        assert_eq!(parse_cell("").unwrap(), (0, 0));
        assert!(parse_cell("5A").is_err());
        assert!(parse_cell("A0").is_err());
        assert!(parse_cell("AB").is_err());
        assert!(parse_cell("ZZZZZZZZZZZZZZZZ1").is_err());
    }

    #[test]
    fn column_letters() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(27), "AB");
    }

    #[test]
    fn declared_columns_replace_sheet_header() {
        let sheet = Sheet::from_rows(
            "Página 1",
            0,
            vec![
                row(&["TABELA 2024"]),
                row(&[]),
                row(&["", "Produto", "Valor", "Obs"]),
                row(&["", "Sofa", "1500", "x"]),
                row(&["", "", "", ""]),
                row(&["", "Mesa", "800"]),
            ],
        );
        let layout = PageLayout {
            header_row: 2,
            first_column: 1,
            columns: vec!["PRODUTO".into(), "VALOR".into()],
            stop_row: None,
        };

        let records = extract_records(&sheet, &layout);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], record(&[("PRODUTO", "Sofa"), ("VALOR", "1500")]));
        assert_eq!(records[1].value("valor"), "800");
    }

    #[test]
    fn sheet_header_used_when_nothing_declared() {
        let sheet = Sheet::from_rows(
            "s",
            0,
            vec![
                row(&["Descrição\ndo produto", "", "Preço"]),
                row(&["Sofa", "", "10"]),
                row(&["Mesa", "", "20"]),
            ],
        );
        let records = extract_records(&sheet, &PageLayout::default());
        // The empty middle column is dropped.
        assert_eq!(
            records[0],
            record(&[("Descrição do produto", "Sofa"), ("Preço", "10")])
        );
    }

    #[test]
    fn extra_declared_columns_pad_and_stop_row_bounds() {
        let sheet = Sheet::from_rows(
            "s",
            0,
            vec![
                row(&["a", "b"]),
                row(&["1", "2"]),
                row(&["3", "4"]),
                row(&["TOTAL", "99"]),
            ],
        );
        let layout = PageLayout {
            header_row: 0,
            first_column: 0,
            columns: vec!["A".into(), "B".into(), "C".into()],
            stop_row: Some(3),
        };
        let records = extract_records(&sheet, &layout);
        assert_eq!(records.len(), 2);
        // Column C never holds data, so it is dropped.
        assert_eq!(records[1], record(&[("A", "3"), ("B", "4")]));
    }

    #[test]
    fn header_beyond_sheet_yields_nothing() {
        let sheet = Sheet::from_rows("s", 0, vec![row(&["a"])]);
        let layout = PageLayout {
            header_row: 10,
            ..PageLayout::default()
        };
        assert!(extract_records(&sheet, &layout).is_empty());
    }

    #[test]
    fn repeated_header_is_detected() {
        let src = sources(&["PRODUTO", "VALOR"]);
        let header = record(&[("PRODUTO", "PRODUTO"), ("VALOR", "VALOR"), ("OBS", "")]);
        assert!(is_header_record(&header, &src));

        let blank = record(&[("PRODUTO", ""), ("VALOR", "0")]);
        assert!(is_header_record(&blank, &src));
    }

    #[test]
    fn data_records_are_not_headers() {
        let src = sources(&["PRODUTO", "VALOR"]);
        assert!(!is_header_record(
            &record(&[("PRODUTO", "Sofa"), ("VALOR", "1500")]),
            &src
        ));
        // Another column carries data.
        assert!(!is_header_record(
            &record(&[("PRODUTO", ""), ("VALOR", ""), ("REF", "A-1")]),
            &src
        ));
        // No source column present at all.
        assert!(!is_header_record(&record(&[("REF", "")]), &src));
        // No declared sources disables detection.
        assert!(!is_header_record(
            &record(&[("PRODUTO", "PRODUTO")]),
            &BTreeSet::new()
        ));
    }

    #[test]
    fn discard_headers_counts() {
        let src = sources(&["PRODUTO"]);
        let (data, skipped) = discard_headers(
            vec![
                record(&[("PRODUTO", "PRODUTO")]),
                record(&[("PRODUTO", "Sofa")]),
                record(&[("PRODUTO", "produto ")]),
            ],
            &src,
        );
        assert_eq!(skipped, 2);
        assert_eq!(data, vec![record(&[("PRODUTO", "Sofa")])]);
    }

    #[test]
    fn flat_text_round_trip() {
        let records = vec![
            record(&[("DESCRICAO", "Sofa 3 lugares"), ("CUSTO", "1.500,00")]),
            record(&[("DESCRICAO", "Mesa"), ("CUSTO", "")]),
        ];
        let text = render_flat_text(&records);
        assert!(text.starts_with("========== REGISTRO 1 ==========\nDESCRICAO: Sofa 3 lugares\n"));
        assert!(text.contains("========== REGISTRO 2 =========="));
        assert_eq!(parse_flat_text(&text), records);
    }

    #[test]
    fn parse_ignores_preamble_and_keeps_colons_in_values() {
        let text = "junk line\n========== REGISTRO 7 ==========\nHORA: 10:30\nsem separador\n";
        let records = parse_flat_text(text);
        assert_eq!(records, vec![record(&[("HORA", "10:30")])]);
    }
}
