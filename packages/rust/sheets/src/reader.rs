//! Workbook and template reading via calamine.
//!
//! Every cell is rendered to text; sheets are returned as a dense grid
//! anchored at A1 so that Config anchors such as `"A5"` address the same
//! cells the user sees in Excel.

use std::path::Path;

use calamine::{Data, Range, Reader, open_workbook_auto};
use tracing::{debug, info, instrument};

use catalogbuilder_shared::{CatalogError, Result, Template, fs};

/// One worksheet as rows of text cells, anchored at A1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    /// Sheet tab name.
    pub name: String,
    /// 0-based position of the sheet in the workbook.
    pub index: usize,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    /// Build a sheet from literal cells (used by callers that already hold data).
    pub fn from_rows(name: impl Into<String>, index: usize, rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            index,
            rows,
        }
    }
}

/// Read every worksheet of an `.xlsx`/`.xls`/`.ods` workbook.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_workbook(path: &Path) -> Result<Vec<Sheet>> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| CatalogError::Spreadsheet(format!("{}: {e}", path.display())))?;

    let names = workbook.sheet_names().to_vec();
    let mut sheets = Vec::with_capacity(names.len());

    for (index, name) in names.iter().enumerate() {
        let range = workbook
            .worksheet_range(name)
            .map_err(|e| CatalogError::Spreadsheet(format!("{}[{name}]: {e}", path.display())))?;
        let rows = range_to_rows(&range);
        debug!(sheet = %name, rows = rows.len(), "read worksheet");
        sheets.push(Sheet {
            name: name.clone(),
            index,
            rows,
        });
    }

    info!(sheets = sheets.len(), "workbook loaded");
    Ok(sheets)
}

/// Load the Template from the first workbook (by name) in `dir`.
///
/// Row 1 holds the column names, row 2 the default values.
pub fn read_template(dir: &Path) -> Result<Template> {
    if !dir.is_dir() {
        return Err(CatalogError::template(format!(
            "template directory not found: {}",
            dir.display()
        )));
    }

    let path = fs::list_files(dir, &["xlsx"])?
        .into_iter()
        .next()
        .ok_or_else(|| {
            CatalogError::template(format!("no .xlsx template found in {}", dir.display()))
        })?;

    read_template_file(&path)
}

/// Load the Template from a specific workbook.
pub fn read_template_file(path: &Path) -> Result<Template> {
    let sheets = read_workbook(path)?;
    let sheet = sheets
        .into_iter()
        .next()
        .ok_or_else(|| CatalogError::template(format!("{} has no sheets", path.display())))?;

    let mut rows = sheet.rows.into_iter();
    let header = rows
        .next()
        .ok_or_else(|| CatalogError::template(format!("{} has no header row", path.display())))?;

    // Trailing blank header cells are padding, not columns.
    let width = header
        .iter()
        .rposition(|c| !c.trim().is_empty())
        .map(|i| i + 1)
        .unwrap_or(0);
    if width == 0 {
        return Err(CatalogError::template(format!(
            "{} has an empty header row",
            path.display()
        )));
    }

    let columns: Vec<String> = header[..width]
        .iter()
        .map(|c| c.replace('\n', " ").trim().to_string())
        .collect();
    let defaults: Vec<String> = rows
        .next()
        .map(|row| row.into_iter().take(width).collect())
        .unwrap_or_default();

    info!(path = %path.display(), columns = columns.len(), "template loaded");
    Ok(Template::new(columns, defaults))
}

/// Expand a calamine range into a dense grid starting at A1.
fn range_to_rows(range: &Range<Data>) -> Vec<Vec<String>> {
    let (row_offset, col_offset) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));

    let mut rows = vec![Vec::new(); row_offset];
    for row in range.rows() {
        let mut cells = vec![String::new(); col_offset];
        cells.extend(row.iter().map(cell_to_string));
        rows.push(cells);
    }
    rows
}

/// Render a cell as the text a user would read in the sheet.
pub fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => format_float(*f),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::Error(_) => String::new(),
        other => other.to_string(),
    }
}

/// Integral floats print without a fractional part (`1500.0` → `"1500"`).
fn format_float(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
