//! Final catalog writer: one worksheet, bold header, text cells, no merged
//! cells, autofit column widths.

use std::path::Path;

use rust_xlsxwriter::{Format, Workbook, XlsxError};
use tracing::{info, instrument};

use catalogbuilder_shared::{CatalogError, Result, fs};

/// Excel sheet name maximum length.
const SHEET_NAME_MAX_LEN: usize = 31;

/// Characters not allowed in sheet names.
const SHEET_NAME_ILLEGAL: [char; 7] = ['*', ':', '?', '/', '\\', '[', ']'];

/// Rows to write, already in Template column order.
#[derive(Debug, Clone)]
pub struct CatalogSheet<'a> {
    pub sheet_name: &'a str,
    pub columns: &'a [String],
    pub rows: &'a [Vec<String>],
    /// Upper bound for autofit widths (in characters).
    pub max_column_width: usize,
}

/// Write the catalog workbook to `path`, replacing it atomically.
#[instrument(skip_all, fields(path = %path.display(), rows = sheet.rows.len()))]
pub fn write_catalog(path: &Path, sheet: &CatalogSheet<'_>) -> Result<()> {
    let buffer = render_catalog(sheet).map_err(xlsx_error)?;
    fs::write_atomic(path, buffer)?;
    info!(columns = sheet.columns.len(), "catalog workbook written");
    Ok(())
}

/// Build the workbook in memory.
fn render_catalog(sheet: &CatalogSheet<'_>) -> std::result::Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sanitize_sheet_name(sheet.sheet_name))?;

    let mut widths: Vec<usize> = sheet.columns.iter().map(|c| c.chars().count()).collect();

    for (c, name) in sheet.columns.iter().enumerate() {
        worksheet.write_string_with_format(0, col_num(c)?, name.as_str(), &header_format)?;
    }

    for (r, row) in sheet.rows.iter().enumerate() {
        let row_num = u32::try_from(r + 1).map_err(|_| XlsxError::RowColumnLimitError)?;
        for (c, value) in row.iter().enumerate().take(sheet.columns.len()) {
            if value.is_empty() {
                continue;
            }
            worksheet.write_string(row_num, col_num(c)?, value.as_str())?;
            widths[c] = widths[c].max(value.chars().count());
        }
    }

    for (c, width) in widths.iter().enumerate() {
        let fitted = (width + 2).min(sheet.max_column_width.max(1));
        worksheet.set_column_width(col_num(c)?, fitted as f64)?;
    }

    workbook.save_to_buffer()
}

fn col_num(index: usize) -> std::result::Result<u16, XlsxError> {
    u16::try_from(index).map_err(|_| XlsxError::RowColumnLimitError)
}

fn xlsx_error(e: XlsxError) -> CatalogError {
    CatalogError::Spreadsheet(e.to_string())
}

/// Replace characters Excel rejects and clamp to the 31-character limit.
pub fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if SHEET_NAME_ILLEGAL.contains(&c) { '_' } else { c })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        return "Sheet".to_string();
    }
    trimmed.chars().take(SHEET_NAME_MAX_LEN).collect()
}
