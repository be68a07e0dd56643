//! FieldMapper: flat records → canonical products.
//!
//! A Config's `columnMapping` is resolved once per (Config, role) into a
//! [`MappingPlan`] of typed [`MappingRule`]s; records are then mapped without
//! re-inspecting the JSON shape.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, instrument};

use catalogbuilder_shared::{
    CanonicalProduct, ColumnMappingSpec, EMPTY_SOURCE, LineConfig, Role, SKIPPED_LITERALS,
    SourceColumn, UNNAMED_PRODUCT, Variation, columns,
};

use crate::extract::RawRecord;
use crate::text::{collapse_whitespace, normalize_column, normalize_key_part};

/// Cell value that means "take nothing".
const MERGE_MARKER: &str = "MERGE";

// ---------------------------------------------------------------------------
// MappingRule / MappingPlan
// ---------------------------------------------------------------------------

/// One resolved `columnMapping` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingRule {
    /// Fixed text for every product.
    Literal { column: String, value: String },
    /// Value of one source column.
    SingleColumn { column: String, source: String },
    /// First usable value among several source columns.
    FallbackColumnList { column: String, sources: Vec<String> },
    /// Variation list built from the plan's color columns.
    ColorColumns { column: String },
}

impl MappingRule {
    fn resolve(spec: &ColumnMappingSpec) -> Option<Self> {
        let column = spec.gabarito_column.trim().to_string();
        if column.is_empty() {
            return None;
        }
        match &spec.source_column {
            SourceColumn::One(source) if source == EMPTY_SOURCE => {
                let value = spec.name.as_deref()?;
                if SKIPPED_LITERALS.contains(&value) {
                    return None;
                }
                Some(MappingRule::Literal {
                    column,
                    value: value.to_string(),
                })
            }
            SourceColumn::One(source) if source.trim().is_empty() => None,
            SourceColumn::One(source) => Some(MappingRule::SingleColumn {
                column,
                source: source.clone(),
            }),
            SourceColumn::Many(_) if column == columns::COLOR => {
                Some(MappingRule::ColorColumns { column })
            }
            SourceColumn::Many(sources) => Some(MappingRule::FallbackColumnList {
                column,
                sources: sources.clone(),
            }),
        }
    }
}

/// Everything the mapper needs for one side of a Config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingPlan {
    pub rules: Vec<MappingRule>,
    /// Source columns read into the `COR` variation list.
    pub color_columns: Vec<String>,
    /// Normalized names of every source column the plan reads.
    pub source_columns: BTreeSet<String>,
}

impl MappingPlan {
    /// Build the plan for `role`.
    ///
    /// Mappings for the role are used; if there are none, the opposite
    /// role's; if there are still none (or the role is unknown), all of
    /// them. Color columns fall back the same way, ending with any `COR`
    /// list in the Config.
    pub fn for_role(config: &LineConfig, role: Option<Role>) -> Self {
        let specs = select_mappings(&config.column_mapping, role);
        let color_columns = select_color_columns(&config.column_mapping, role);

        let rules: Vec<MappingRule> = specs.iter().filter_map(|s| MappingRule::resolve(s)).collect();

        let mut source_columns = BTreeSet::new();
        for rule in &rules {
            match rule {
                MappingRule::SingleColumn { source, .. } => {
                    source_columns.insert(normalize_column(source));
                }
                MappingRule::FallbackColumnList { sources, .. } => {
                    source_columns.extend(sources.iter().map(|s| normalize_column(s)));
                }
                MappingRule::Literal { .. } | MappingRule::ColorColumns { .. } => {}
            }
        }
        source_columns.extend(color_columns.iter().map(|c| normalize_column(c)));
        source_columns.remove("");

        debug!(
            role = role.map(|r| r.as_str()).unwrap_or("?"),
            rules = rules.len(),
            colors = color_columns.len(),
            "mapping plan resolved"
        );

        Self {
            rules,
            color_columns,
            source_columns,
        }
    }
}

fn select_mappings(all: &[ColumnMappingSpec], role: Option<Role>) -> Vec<&ColumnMappingSpec> {
    let Some(role) = role else {
        return all.iter().collect();
    };
    for wanted in [role, role.opposite()] {
        let picked: Vec<&ColumnMappingSpec> =
            all.iter().filter(|m| m.role() == Some(wanted)).collect();
        if !picked.is_empty() {
            return picked;
        }
    }
    all.iter().collect()
}

fn select_color_columns(all: &[ColumnMappingSpec], role: Option<Role>) -> Vec<String> {
    let color_list = |m: &ColumnMappingSpec| match &m.source_column {
        SourceColumn::Many(list) if m.gabarito_column.trim() == columns::COLOR => {
            Some(list.clone())
        }
        _ => None,
    };

    if let Some(role) = role {
        for wanted in [role, role.opposite()] {
            if let Some(list) = all
                .iter()
                .filter(|m| m.role() == Some(wanted))
                .find_map(color_list)
            {
                return list;
            }
        }
    }
    all.iter().find_map(color_list).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// FieldMapper
// ---------------------------------------------------------------------------

/// Maps one extraction batch, numbering repeated descriptions.
#[derive(Debug)]
pub struct FieldMapper<'a> {
    plan: &'a MappingPlan,
    seen: HashMap<String, usize>,
}

impl<'a> FieldMapper<'a> {
    pub fn new(plan: &'a MappingPlan) -> Self {
        Self {
            plan,
            seen: HashMap::new(),
        }
    }

    /// Map one record. The first product with a given description keeps it;
    /// later ones get `" (1)"`, `" (2)"`, ...
    pub fn map(&mut self, record: &RawRecord) -> CanonicalProduct {
        let mut product = CanonicalProduct::new();

        for rule in &self.plan.rules {
            match rule {
                MappingRule::Literal { column, value } => product.set_text(column, value),
                MappingRule::SingleColumn { column, source } => {
                    let value = record.value(source);
                    if !value.is_empty() && value != MERGE_MARKER {
                        product.set_text(column, value);
                    }
                }
                MappingRule::FallbackColumnList { column, sources } => {
                    if let Some(value) = sources
                        .iter()
                        .map(|s| record.value(s))
                        .find(|v| !v.is_empty() && *v != "0" && *v != MERGE_MARKER)
                    {
                        product.set_text(column, value);
                    }
                }
                MappingRule::ColorColumns { column } => {
                    let variations = self.variations(record);
                    if !variations.is_empty() {
                        product.set_variations(column, variations);
                    }
                }
            }
        }

        let description = product
            .text(columns::DESCRIPTION)
            .map(collapse_whitespace)
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| UNNAMED_PRODUCT.to_string());

        let count = self.seen.entry(normalize_key_part(&description)).or_insert(0);
        let description = if *count == 0 {
            description
        } else {
            format!("{description} ({count})")
        };
        *count += 1;

        product.set_text(columns::DESCRIPTION, description);
        product
    }

    /// Map a whole batch in order.
    #[instrument(skip_all, fields(records = records.len()))]
    pub fn map_all(&mut self, records: &[RawRecord]) -> Vec<CanonicalProduct> {
        records.iter().map(|r| self.map(r)).collect()
    }

    fn variations(&self, record: &RawRecord) -> Vec<Variation> {
        self.plan
            .color_columns
            .iter()
            .filter_map(|column| {
                let price = record.value(column);
                (!price.is_empty() && price != "0").then(|| Variation {
                    name: column.replace('\n', " ").trim().to_string(),
                    price: price.to_string(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "columnMapping": [
            {"gabaritoColumn": "DESCRICAO", "sourceColumn": "Produto", "sourceFile": "custo"},
            {"gabaritoColumn": "CUSTO", "sourceColumn": ["Valor Promo", "Valor"], "sourceFile": "custo"},
            {"gabaritoColumn": "COR", "sourceColumn": ["AZUL", "VERDE\nESCURO"], "sourceFile": "custo"},
            {"gabaritoColumn": "MARCA", "sourceColumn": "__EMPTY__", "name": "LUI HOME", "sourceFile": "custo"},
            {"gabaritoColumn": "OBS", "sourceColumn": "__EMPTY__", "name": "VAZIO", "sourceFile": "custo"},
            {"gabaritoColumn": "DESCRICAO", "sourceColumn": "Nome", "sourceFile": "venda"},
            {"gabaritoColumn": "PRECO1", "sourceColumn": "Preço", "sourceFile": "venda"}
        ]
    }"#;

    fn config() -> LineConfig {
        LineConfig::from_json(CONFIG).unwrap()
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
    fn rules_are_resolved_per_role() {
        let plan = MappingPlan::for_role(&config(), Some(Role::Cost));
        assert_eq!(
            plan.rules,
            vec![
                MappingRule::SingleColumn {
                    column: "DESCRICAO".into(),
                    source: "Produto".into()
                },
                MappingRule::FallbackColumnList {
                    column: "CUSTO".into(),
                    sources: vec!["Valor Promo".into(), "Valor".into()]
                },
                MappingRule::ColorColumns {
                    column: "COR".into()
                },
                MappingRule::Literal {
                    column: "MARCA".into(),
                    value: "LUI HOME".into()
                },
            ]
        );
        assert!(plan.source_columns.contains("valor promo"));
        assert!(plan.source_columns.contains("verde escuro"));
        assert!(!plan.source_columns.contains("nome"));
    }

    #[test]
    fn sale_side_falls_back_to_cost_colors() {
        let plan = MappingPlan::for_role(&config(), Some(Role::Sale));
        assert_eq!(plan.rules.len(), 2);
        assert_eq!(plan.color_columns, vec!["AZUL", "VERDE\nESCURO"]);
    }

    #[test]
    fn missing_role_mappings_fall_back_to_opposite_then_all() {
        let only_cost = LineConfig::from_json(
            r#"{"columnMapping": [{"gabaritoColumn": "DESCRICAO", "sourceColumn": "A", "sourceFile": "custo"}]}"#,
        )
        .unwrap();
        assert_eq!(MappingPlan::for_role(&only_cost, Some(Role::Sale)).rules.len(), 1);

        let untagged = LineConfig::from_json(
            r#"{"columnMapping": [{"gabaritoColumn": "DESCRICAO", "sourceColumn": "A"}]}"#,
        )
        .unwrap();
        assert_eq!(MappingPlan::for_role(&untagged, Some(Role::Cost)).rules.len(), 1);
        assert_eq!(MappingPlan::for_role(&untagged, None).rules.len(), 1);
    }

    #[test]
    fn maps_columns_literals_and_colors() {
        let plan = MappingPlan::for_role(&config(), Some(Role::Cost));
        let mut mapper = FieldMapper::new(&plan);

        let product = mapper.map(&record(&[
            ("PRODUTO", "  Sofa   Retrátil "),
            ("Valor Promo", "0"),
            ("Valor", "1.500,00"),
            ("azul", "1.600,00"),
            ("Verde Escuro", "0"),
        ]));

        assert_eq!(product.text("DESCRICAO"), Some("Sofa Retrátil"));
        assert_eq!(product.text("CUSTO"), Some("1.500,00"));
        assert_eq!(product.text("MARCA"), Some("LUI HOME"));
        assert!(!product.contains("OBS"));
        assert_eq!(
            product.variations("COR").unwrap(),
            &[Variation {
                name: "AZUL".into(),
                price: "1.600,00".into()
            }]
        );
    }

    #[test]
    fn merge_marker_and_blanks_are_skipped() {
        let plan = MappingPlan::for_role(&config(), Some(Role::Cost));
        let mut mapper = FieldMapper::new(&plan);

        let product = mapper.map(&record(&[("Produto", "MERGE"), ("Valor", "MERGE")]));
        assert_eq!(product.text("DESCRICAO"), Some(UNNAMED_PRODUCT));
        assert!(!product.contains("CUSTO"));
        assert!(!product.contains("COR"));
    }

    #[test]
    fn duplicate_descriptions_are_numbered() {
        let plan = MappingPlan::for_role(&config(), Some(Role::Cost));
        let mut mapper = FieldMapper::new(&plan);

        let products = mapper.map_all(&[
            record(&[("Produto", "Sofa")]),
            record(&[("Produto", "Mesa")]),
            record(&[("Produto", "Sofa ")]),
            record(&[("Produto", "Sofa")]),
        ]);
        let names: Vec<_> = products.iter().map(|p| p.text("DESCRICAO").unwrap()).collect();
        assert_eq!(names, vec!["Sofa", "Mesa", "Sofa (1)", "Sofa (2)"]);
    }
}
