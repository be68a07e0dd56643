//! ValueNormalizer: price filter, Template conformance, Brazilian numbers.

use tracing::{debug, instrument};

use catalogbuilder_shared::{CanonicalProduct, Template, columns};

use crate::price::{format_brl, parse_price};

/// Values treated as missing when conforming to the Template.
const INVALID_VALUES: [&str; 7] = ["", "NaN", "nan", "undefined", "null", "NULL", "None"];

/// Keep rows with a positive `CUSTO` or `PRECO1`. Returns the kept rows and
/// the number dropped.
pub fn filter_priced(rows: Vec<CanonicalProduct>) -> (Vec<CanonicalProduct>, usize) {
    let total = rows.len();
    let kept: Vec<CanonicalProduct> = rows.into_iter().filter(has_positive_price).collect();
    let dropped = total - kept.len();
    if dropped > 0 {
        debug!(dropped, "rows without a positive price dropped");
    }
    (kept, dropped)
}

fn has_positive_price(row: &CanonicalProduct) -> bool {
    [columns::COST, columns::PRICE].iter().any(|column| {
        row.text(column)
            .and_then(parse_price)
            .is_some_and(|n| n > 0.0)
    })
}

/// Render `rows` as Template-ordered text cells.
///
/// Missing or invalid values take the Template default (verbatim); present
/// values in `numeric_columns` are shown Brazilian style. Extra fields are
/// dropped.
#[instrument(skip_all, fields(rows = rows.len(), columns = template.columns.len()))]
pub fn conform(
    rows: &[CanonicalProduct],
    template: &Template,
    numeric_columns: &[String],
) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| {
            template
                .columns
                .iter()
                .enumerate()
                .map(|(i, column)| match row.text(column) {
                    Some(value) if !INVALID_VALUES.contains(&value.trim()) => {
                        if numeric_columns.iter().any(|c| c == column) {
                            format_numeric(value)
                        } else {
                            value.to_string()
                        }
                    }
                    _ => template.defaults.get(i).cloned().unwrap_or_default(),
                })
                .collect()
        })
        .collect()
}

/// Brazilian rendering of a number written either as `1234.5` or in any
/// notation [`parse_price`] accepts; other text is returned unchanged.
pub fn format_numeric(value: &str) -> String {
    let trimmed = value.trim();
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .or_else(|| parse_price(trimmed))
        .map(format_brl)
        .unwrap_or_else(|| value.to_string())
}
