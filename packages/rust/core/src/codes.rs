//! CodeAssigner: fiscal, product and color codes for merged rows.
//!
//! Fiscal codes and product codes continue across runs through the stores in
//! `catalogbuilder-storage`; color codes are recomputed for every batch.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, instrument};

use catalogbuilder_shared::{CanonicalProduct, columns};
use catalogbuilder_storage::{FiscalCodeCache, ProductCodeCounter};

use crate::text::{normalize_key_part, strip_counter_suffix};

/// Fiscal classification values that never get a code.
const INVALID_FISCAL: [&str; 5] = ["", "NAN", "NONE", "NULL", "NA"];

/// Color values that never get a code.
const INVALID_COLORS: [&str; 4] = ["", "NAN", "NONE", "NULL"];

/// Counts produced by one [`CodeAssigner::assign`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodeSummary {
    pub new_fiscal_codes: usize,
    pub product_codes: usize,
    pub color_codes: usize,
}

/// Assigns codes using the run's persisted stores.
#[derive(Debug)]
pub struct CodeAssigner<'a> {
    fiscal: &'a mut FiscalCodeCache,
    products: &'a mut ProductCodeCounter,
}

impl<'a> CodeAssigner<'a> {
    pub fn new(fiscal: &'a mut FiscalCodeCache, products: &'a mut ProductCodeCounter) -> Self {
        Self { fiscal, products }
    }

    /// Fiscal, product and color codes for one output batch.
    #[instrument(skip_all, fields(rows = rows.len()))]
    pub fn assign(&mut self, rows: &mut [CanonicalProduct]) -> CodeSummary {
        let summary = CodeSummary {
            new_fiscal_codes: self.assign_fiscal_codes(rows),
            product_codes: self.assign_product_codes(rows),
            color_codes: assign_color_codes(rows),
        };
        debug!(?summary, "codes assigned");
        summary
    }

    /// Normalize `CLASSIFICACAO_FIS` and fill `COD_CLASSIFICACAO_FIS`.
    /// Returns how many new cache keys were added.
    pub fn assign_fiscal_codes(&mut self, rows: &mut [CanonicalProduct]) -> usize {
        let before = self.fiscal.added();
        for row in rows.iter_mut() {
            let Some(raw) = row.text(columns::FISCAL_CLASS) else {
                continue;
            };
            let value = raw.trim().to_uppercase();
            let code = if INVALID_FISCAL.contains(&value.as_str()) {
                String::new()
            } else {
                self.fiscal.code_for(&value)
            };
            row.set_text(columns::FISCAL_CLASS, value);
            row.set_text(columns::FISCAL_CODE, code);
        }
        self.fiscal.added() - before
    }

    /// One `COD_PRODUTO` per base description, in first-seen order.
    /// Returns how many codes were drawn from the counter.
    pub fn assign_product_codes(&mut self, rows: &mut [CanonicalProduct]) -> usize {
        let mut codes: HashMap<String, String> = HashMap::new();
        for row in rows.iter_mut() {
            let base = normalize_key_part(strip_counter_suffix(
                row.text(columns::DESCRIPTION).unwrap_or(""),
            ));
            let code = codes
                .entry(base)
                .or_insert_with(|| format!("{:06}", self.products.advance()))
                .clone();
            row.set_text(columns::PRODUCT_CODE, code);
        }
        codes.len()
    }
}

/// Upper-case `COR` and number the distinct colors of the batch in sorted
/// order. Blank or null-like colors get an empty `COD_COR`. Returns the distinct count.
pub fn assign_color_codes(rows: &mut [CanonicalProduct]) -> usize {
    let mut distinct = BTreeSet::new();
    for row in rows.iter_mut() {
        if let Some(color) = row.text(columns::COLOR) {
            let color = color.trim().to_uppercase();
            if !INVALID_COLORS.contains(&color.as_str()) {
                distinct.insert(color.clone());
            }
            row.set_text(columns::COLOR, color);
        }
    }

    let codes: BTreeMap<String, String> = distinct
        .into_iter()
        .enumerate()
        .map(|(i, color)| (color, format!("{:03}", i + 1)))
        .collect();

    for row in rows.iter_mut() {
        let code = row
            .text(columns::COLOR)
            .and_then(|c| codes.get(c))
            .cloned()
            .unwrap_or_default();
        row.set_text(columns::COLOR_CODE, code);
    }
    codes.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(fields: &[(&str, &str)]) -> CanonicalProduct {
        fields.iter().copied().collect()
    }

    #[test]
    fn fiscal_codes_are_cached_and_normalized() {
        let mut cache = FiscalCodeCache::in_memory(BTreeMap::from([(
            "9401.61.00".to_string(),
            "0003".to_string(),
        )]));
        let mut counter = ProductCodeCounter::in_memory(1);
        let mut assigner = CodeAssigner::new(&mut cache, &mut counter);

        let mut rows = vec![
            product(&[("CLASSIFICACAO_FIS", " 9401.61.00 ")]),
            product(&[("CLASSIFICACAO_FIS", "9403.60.00")]),
            product(&[("CLASSIFICACAO_FIS", "nan")]),
            product(&[("CLASSIFICACAO_FIS", "9403.60.00")]),
            product(&[("DESCRICAO", "sem ncm")]),
        ];
        let added = assigner.assign_fiscal_codes(&mut rows);

        assert_eq!(added, 1);
        assert_eq!(rows[0].text("CLASSIFICACAO_FIS"), Some("9401.61.00"));
        assert_eq!(rows[0].text("COD_CLASSIFICACAO_FIS"), Some("0003"));
        assert_eq!(rows[1].text("COD_CLASSIFICACAO_FIS"), Some("0004"));
        assert_eq!(rows[2].text("CLASSIFICACAO_FIS"), Some("NAN"));
        assert_eq!(rows[2].text("COD_CLASSIFICACAO_FIS"), Some(""));
        assert_eq!(rows[3].text("COD_CLASSIFICACAO_FIS"), Some("0004"));
        assert!(!rows[4].contains("COD_CLASSIFICACAO_FIS"));
        assert_eq!(cache.get("9403.60.00"), Some("0004"));
    }

    #[test]
    fn disambiguated_descriptions_share_a_product_code() {
        let mut cache = FiscalCodeCache::in_memory(BTreeMap::new());
        let mut counter = ProductCodeCounter::in_memory(41);
        let mut assigner = CodeAssigner::new(&mut cache, &mut counter);

        let mut rows = vec![
            product(&[("DESCRICAO", "SOFA")]),
            product(&[("DESCRICAO", "MESA")]),
            product(&[("DESCRICAO", "SOFA (1)")]),
        ];
        assert_eq!(assigner.assign_product_codes(&mut rows), 2);
        assert_eq!(rows[0].text("COD_PRODUTO"), Some("000041"));
        assert_eq!(rows[1].text("COD_PRODUTO"), Some("000042"));
        assert_eq!(rows[2].text("COD_PRODUTO"), Some("000041"));
        assert_eq!(counter.peek(), 43);
    }

    #[test]
    fn counter_continues_across_batches() {
        let mut cache = FiscalCodeCache::in_memory(BTreeMap::new());
        let mut counter = ProductCodeCounter::in_memory(1);

        let mut first = vec![product(&[("DESCRICAO", "A")])];
        let mut second = vec![product(&[("DESCRICAO", "A")]), product(&[("DESCRICAO", "B")])];
        {
            let mut assigner = CodeAssigner::new(&mut cache, &mut counter);
            assigner.assign(&mut first);
            assigner.assign(&mut second);
        }
        assert_eq!(first[0].text("COD_PRODUTO"), Some("000001"));
        // Product codes are per batch; the counter is shared.
        assert_eq!(second[0].text("COD_PRODUTO"), Some("000002"));
        assert_eq!(second[1].text("COD_PRODUTO"), Some("000003"));
    }

    #[test]
    fn color_codes_are_sorted_per_batch() {
        let mut rows = vec![
            product(&[("COR", "verde ")]),
            product(&[("COR", "AZUL")]),
            product(&[("COR", "  ")]),
            product(&[("DESCRICAO", "sem cor")]),
            product(&[("COR", "Verde")]),
            product(&[("COR", "nan")]),
            product(&[("COR", "None")]),
        ];
        assert_eq!(assign_color_codes(&mut rows), 2);
        assert_eq!(rows[0].text("COR"), Some("VERDE"));
        assert_eq!(rows[0].text("COD_COR"), Some("002"));
        assert_eq!(rows[1].text("COD_COR"), Some("001"));
        assert_eq!(rows[2].text("COD_COR"), Some(""));
        assert_eq!(rows[3].text("COD_COR"), Some(""));
        assert_eq!(rows[4].text("COD_COR"), Some("002"));
        assert_eq!(rows[5].text("COR"), Some("NAN"));
        assert_eq!(rows[5].text("COD_COR"), Some(""));
        assert_eq!(rows[6].text("COD_COR"), Some(""));
    }
}
