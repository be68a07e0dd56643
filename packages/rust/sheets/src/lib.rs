//! Spreadsheet adapters for catalogbuilder.
//!
//! - [`read_workbook`]: workbook → sheets of text cells (calamine)
//! - [`read_template`]: Template columns + defaults from the gabarito workbook
//! - [`write_catalog`]: Template-ordered rows → xlsx (rust_xlsxwriter), atomic

pub mod reader;
pub mod writer;

pub use reader::{Sheet, cell_to_string, read_template, read_template_file, read_workbook};
pub use writer::{CatalogSheet, sanitize_sheet_name, write_catalog};
