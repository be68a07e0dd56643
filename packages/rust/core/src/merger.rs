//! CatalogMerger: strict inner join of cost-side and sale-side products.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, info, instrument};

use catalogbuilder_shared::{
    CanonicalProduct, ColumnMappingSpec, FieldValue, LineConfig, MergeSpec, Role, SourceColumn,
    columns,
};

use crate::price::format_price;
use crate::text::{normalize_column, normalize_key_part};

/// Separator between merge-key parts; never appears in sheet text.
pub const KEY_SEPARATOR: char = '\u{1f}';

/// Field values dropped by the post-merge cleanup.
const NULL_VALUES: [&str; 3] = ["", "null", "NULL"];

// ---------------------------------------------------------------------------
// MergeKeyGenerator
// ---------------------------------------------------------------------------

/// Builds the join key for one side of a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeKeyGenerator {
    key_field: String,
    include_variation: bool,
    additional: Vec<String>,
}

impl MergeKeyGenerator {
    /// Resolve `key` (a template column or a raw source column) for `role`.
    ///
    /// `seen` holds the columns present on that side's products.
    pub fn new(
        key: &str,
        role: Role,
        config: &LineConfig,
        merge: &MergeSpec,
        seen: &BTreeSet<String>,
    ) -> Self {
        let key_field = resolve_key_column(key, role, config, seen)
            .unwrap_or_else(|| columns::DESCRIPTION.to_string());
        let additional = merge
            .additional_keys
            .iter()
            .filter(|k| !k.trim().is_empty())
            .map(|k| resolve_key_column(k, role, config, seen).unwrap_or_else(|| k.trim().to_string()))
            .collect();

        Self {
            key_field,
            include_variation: merge.include_variation_key,
            additional,
        }
    }

    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    /// Normalized key parts joined by [`KEY_SEPARATOR`].
    pub fn key(&self, product: &CanonicalProduct) -> String {
        let part = |column: &str| normalize_key_part(product.text(column).unwrap_or(""));

        let mut parts = vec![part(&self.key_field)];
        if self.include_variation {
            parts.push(part(columns::COLOR));
        }
        parts.extend(self.additional.iter().map(|c| part(c)));
        parts.join(&KEY_SEPARATOR.to_string())
    }
}

/// Map a merge key name onto the template column it designates.
fn resolve_key_column(
    key: &str,
    role: Role,
    config: &LineConfig,
    seen: &BTreeSet<String>,
) -> Option<String> {
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    if seen.contains(key)
        || config
            .column_mapping
            .iter()
            .any(|m| m.gabarito_column.trim() == key)
    {
        return Some(key.to_string());
    }

    let wanted = normalize_column(key);
    let reads_key = |m: &&ColumnMappingSpec| match &m.source_column {
        SourceColumn::One(source) => normalize_column(source) == wanted,
        SourceColumn::Many(sources) => sources.iter().any(|s| normalize_column(s) == wanted),
    };

    config
        .column_mapping
        .iter()
        .filter(reads_key)
        .find(|m| m.role() == Some(role))
        .or_else(|| config.column_mapping.iter().find(reads_key))
        .map(|m| m.gabarito_column.trim().to_string())
}

/// Columns present on any product of a batch.
pub fn seen_columns(products: &[CanonicalProduct]) -> BTreeSet<String> {
    products
        .iter()
        .flat_map(|p| p.iter().map(|(k, _)| k.clone()))
        .collect()
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Result of merging one Config group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    pub rows: Vec<CanonicalProduct>,
    pub unmatched_cost: usize,
    pub unmatched_sale: usize,
}

/// Join cost products to sale products on their merge keys.
///
/// Only cost products with a sale match are kept. The sale side's `PRECO1`
/// is copied onto the cost product; both prices are formatted.
#[instrument(skip_all, fields(cost = cost.len(), sale = sale.len()))]
pub fn merge_group(
    cost: &[CanonicalProduct],
    sale: &[CanonicalProduct],
    config: &LineConfig,
) -> MergeOutcome {
    let merge = &config.merge_config;
    let cost_keys = MergeKeyGenerator::new(
        &merge.left_key,
        Role::Cost,
        config,
        merge,
        &seen_columns(cost),
    );
    let sale_keys = MergeKeyGenerator::new(
        &merge.right_key,
        Role::Sale,
        config,
        merge,
        &seen_columns(sale),
    );
    debug!(
        left = cost_keys.key_field(),
        right = sale_keys.key_field(),
        "merge keys resolved"
    );

    let sale_with_keys: Vec<(String, &CanonicalProduct)> =
        sale.iter().map(|p| (sale_keys.key(p), p)).collect();
    let mut index: HashMap<&str, &CanonicalProduct> = HashMap::new();
    for (key, product) in &sale_with_keys {
        index.entry(key.as_str()).or_insert(*product);
    }

    let mut outcome = MergeOutcome::default();
    let mut matched_keys: HashSet<String> = HashSet::new();

    for product in cost {
        let key = cost_keys.key(product);
        let Some(sale_product) = index.get(key.as_str()) else {
            outcome.unmatched_cost += 1;
            continue;
        };

        let mut merged = product.clone();
        if let Some(price) = sale_product.text(columns::PRICE).filter(|p| !p.trim().is_empty()) {
            merged.set_text(columns::PRICE, format_price(price));
        }
        if let Some(cost_price) = merged.text(columns::COST).map(format_price) {
            merged.set_text(columns::COST, cost_price);
        }
        outcome.rows.push(merged);
        matched_keys.insert(key);
    }

    outcome.unmatched_sale = sale_with_keys
        .iter()
        .filter(|(key, _)| !matched_keys.contains(key))
        .count();

    info!(
        merged = outcome.rows.len(),
        unmatched_cost = outcome.unmatched_cost,
        unmatched_sale = outcome.unmatched_sale,
        "group merged"
    );
    outcome
}

/// Upper-case text values (when asked) and drop empty or null fields.
pub fn clean_merged(rows: &mut [CanonicalProduct], uppercase: bool) {
    for row in rows.iter_mut() {
        if uppercase {
            row.map_text(str::to_uppercase);
        }
        row.retain(|_, value| match value {
            FieldValue::Text(text) => !NULL_VALUES.contains(&text.as_str()),
            FieldValue::Variations(list) => !list.is_empty(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(fields: &[(&str, &str)]) -> CanonicalProduct {
        fields.iter().copied().collect()
    }

    fn config(json: &str) -> LineConfig {
        LineConfig::from_json(json).unwrap()
    }

    #[test]
    fn inner_join_keeps_only_matches() {
        let cfg = config(r#"{"mergeConfig": {"includeVariationKey": false}}"#);
        let cost = vec![
            product(&[("DESCRICAO", "Sofa A"), ("CUSTO", "1.500,00")]),
            product(&[("DESCRICAO", "Sofa B"), ("CUSTO", "900")]),
        ];
        let sale = vec![product(&[("DESCRICAO", "sofa  a"), ("PRECO1", "2.000,00")])];

        let outcome = merge_group(&cost, &sale, &cfg);
        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(outcome.rows[0].text("DESCRICAO"), Some("Sofa A"));
        assert_eq!(outcome.rows[0].text("CUSTO"), Some("1500.00"));
        assert_eq!(outcome.rows[0].text("PRECO1"), Some("2000.00"));
        assert_eq!(outcome.unmatched_cost, 1);
        assert_eq!(outcome.unmatched_sale, 0);
    }

    #[test]
    fn variation_key_separates_colors() {
        let cfg = config("{}");
        let cost = vec![
            product(&[("DESCRICAO", "Sofa"), ("COR", "AZUL"), ("CUSTO", "10")]),
            product(&[("DESCRICAO", "Sofa"), ("COR", "VERDE"), ("CUSTO", "11")]),
        ];
        let sale = vec![
            product(&[("DESCRICAO", "Sofa"), ("COR", "verde"), ("PRECO1", "20")]),
            product(&[("DESCRICAO", "Sofa"), ("COR", "ROSA"), ("PRECO1", "21")]),
        ];
        let outcome = merge_group(&cost, &sale, &cfg);
        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(outcome.rows[0].text("COR"), Some("VERDE"));
        assert_eq!(outcome.rows[0].text("PRECO1"), Some("20.00"));
        assert_eq!(outcome.unmatched_sale, 1);
    }

    #[test]
    fn first_sale_product_wins_on_duplicate_keys() {
        let cfg = config(r#"{"mergeConfig": {"includeVariationKey": false}}"#);
        let cost = vec![product(&[("DESCRICAO", "Mesa")])];
        let sale = vec![
            product(&[("DESCRICAO", "Mesa"), ("PRECO1", "100")]),
            product(&[("DESCRICAO", "MESA"), ("PRECO1", "999")]),
        ];
        let outcome = merge_group(&cost, &sale, &cfg);
        assert_eq!(outcome.rows[0].text("PRECO1"), Some("100.00"));
        assert!(!outcome.rows[0].contains("CUSTO"));
    }

    #[test]
    fn source_column_keys_resolve_to_template_columns() {
        let cfg = config(
            r#"{
                "columnMapping": [
                    {"gabaritoColumn": "REFERENCIA", "sourceColumn": "Cód.", "sourceFile": "custo"},
                    {"gabaritoColumn": "CODIGO_FORN", "sourceColumn": "Código", "sourceFile": "venda"}
                ],
                "mergeConfig": {"leftKey": "cód.", "rightKey": "Código", "includeVariationKey": false}
            }"#,
        );
        let merge = &cfg.merge_config;
        let left = MergeKeyGenerator::new(&merge.left_key, Role::Cost, &cfg, merge, &BTreeSet::new());
        let right = MergeKeyGenerator::new(&merge.right_key, Role::Sale, &cfg, merge, &BTreeSet::new());
        assert_eq!(left.key_field(), "REFERENCIA");
        assert_eq!(right.key_field(), "CODIGO_FORN");

        let cost = vec![product(&[("DESCRICAO", "Sofa X"), ("REFERENCIA", "123")])];
        let sale = vec![product(&[("DESCRICAO", "Outro nome"), ("CODIGO_FORN", "123"), ("PRECO1", "5")])];
        assert_eq!(merge_group(&cost, &sale, &cfg).rows.len(), 1);
    }

    #[test]
    fn unknown_keys_fall_back_to_description() {
        let cfg = config(r#"{"mergeConfig": {"leftKey": "NOPE", "additionalKeys": ["MARCA"]}}"#);
        let merge = &cfg.merge_config;
        let keys = MergeKeyGenerator::new(&merge.left_key, Role::Cost, &cfg, merge, &BTreeSet::new());
        assert_eq!(keys.key_field(), "DESCRICAO");

        let p = product(&[("DESCRICAO", " Sofa  Cama "), ("COR", "Azul"), ("MARCA", "Lui")]);
        assert_eq!(keys.key(&p), "sofa cama\u{1f}azul\u{1f}lui");
    }

    #[test]
    fn cleanup_uppercases_and_drops_nulls() {
        let mut rows = vec![product(&[
            ("DESCRICAO", "Sofa"),
            ("OBS", ""),
            ("MARCA", "null"),
            ("COR", "azul"),
        ])];
        clean_merged(&mut rows, true);
        assert_eq!(rows[0], product(&[("DESCRICAO", "SOFA"), ("COR", "AZUL")]));

        let mut rows = vec![product(&[("DESCRICAO", "Sofa"), ("OBS", "NULL")])];
        clean_merged(&mut rows, false);
        assert_eq!(rows[0], product(&[("DESCRICAO", "Sofa")]));
    }
}
