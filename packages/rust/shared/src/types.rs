//! Core domain types for catalogbuilder runs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current schema version for the run report format.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Well-known Template column names the pipeline reads or writes.
pub mod columns {
    pub const DESCRIPTION: &str = "DESCRICAO";
    pub const COLOR: &str = "COR";
    pub const COST: &str = "CUSTO";
    pub const PRICE: &str = "PRECO1";
    pub const NOTES: &str = "OBS";
    pub const FISCAL_CLASS: &str = "CLASSIFICACAO_FIS";
    pub const FISCAL_CODE: &str = "COD_CLASSIFICACAO_FIS";
    pub const PRODUCT_CODE: &str = "COD_PRODUTO";
    pub const COLOR_CODE: &str = "COD_COR";
}

/// Description used when the mapping produced none.
pub const UNNAMED_PRODUCT: &str = "SEM NOME";

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Which side of a product line a source file represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "custo")]
    Cost,
    #[serde(rename = "venda")]
    Sale,
}

impl Role {
    /// Name used in Config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Cost => "custo",
            Role::Sale => "venda",
        }
    }

    /// The other side.
    pub fn opposite(&self) -> Self {
        match self {
            Role::Cost => Role::Sale,
            Role::Sale => Role::Cost,
        }
    }

    /// Parse a Config role name (`custo`/`venda`, English aliases accepted).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "custo" | "cost" => Some(Role::Cost),
            "venda" | "sale" => Some(Role::Sale),
            _ => None,
        }
    }

    /// Price column this side contributes to a merged entry.
    pub fn price_column(&self) -> &'static str {
        match self {
            Role::Cost => columns::COST,
            Role::Sale => columns::PRICE,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CanonicalProduct
// ---------------------------------------------------------------------------

/// One color/variation column value and its price, before expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variation {
    #[serde(alias = "nome_cor")]
    pub name: String,
    #[serde(alias = "preco")]
    pub price: String,
}

/// A canonical field value: plain text, or the pre-expansion variation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Variations(Vec<Variation>),
}

/// Template column name → value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalProduct {
    fields: BTreeMap<String, FieldValue>,
}

impl CanonicalProduct {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text value of `column`, if present and textual.
    pub fn text(&self, column: &str) -> Option<&str> {
        match self.fields.get(column) {
            Some(FieldValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Variation list of `column`, if present and not yet expanded.
    pub fn variations(&self, column: &str) -> Option<&[Variation]> {
        match self.fields.get(column) {
            Some(FieldValue::Variations(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields.get(column)
    }

    pub fn set_text(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.fields
            .insert(column.into(), FieldValue::Text(value.into()));
    }

    pub fn set_variations(&mut self, column: impl Into<String>, variations: Vec<Variation>) {
        self.fields
            .insert(column.into(), FieldValue::Variations(variations));
    }

    pub fn remove(&mut self, column: &str) -> Option<FieldValue> {
        self.fields.remove(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    /// Keep only the fields for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &FieldValue) -> bool) {
        self.fields.retain(|k, v| keep(k, v));
    }

    /// Apply `f` to every text value in place.
    pub fn map_text(&mut self, mut f: impl FnMut(&str) -> String) {
        for value in self.fields.values_mut() {
            if let FieldValue::Text(s) = value {
                *s = f(s);
            }
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CanonicalProduct {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut product = CanonicalProduct::new();
        for (k, v) in iter {
            product.set_text(k, v);
        }
        product
    }
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

/// The output schema: ordered column names plus one default value per column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub columns: Vec<String>,
    pub defaults: Vec<String>,
}

impl Template {
    /// Build a template, padding missing defaults with empty strings.
    pub fn new(columns: Vec<String>, mut defaults: Vec<String>) -> Self {
        defaults.resize(columns.len(), String::new());
        Self { columns, defaults }
    }

    /// Declared default for `column` (empty when the column is unknown).
    pub fn default_for(&self, column: &str) -> &str {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.defaults.get(i))
            .map(String::as_str)
            .unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// RunId / RunReport
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Extraction statistics for one sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetStats {
    pub workbook: String,
    pub sheet: String,
    pub config: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub records: usize,
    pub headers_skipped: usize,
    pub products: usize,
}

/// Merge and output statistics for one Config group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupStats {
    pub config: String,
    pub cost_products: usize,
    pub sale_products: usize,
    pub merged: usize,
    pub unmatched_cost: usize,
    pub unmatched_sale: usize,
    pub rows_written: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// The `run_report.json` written at the end of every pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub schema_version: u32,
    pub id: RunId,
    pub tool_version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sheets: Vec<SheetStats>,
    pub groups: Vec<GroupStats>,
    /// Files or groups skipped because of an error.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
    pub new_fiscal_codes: usize,
    pub next_product_code: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_is_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }

    #[test]
    fn role_names() {
        assert_eq!(Role::from_name(" Custo "), Some(Role::Cost));
        assert_eq!(Role::from_name("sale"), Some(Role::Sale));
        assert_eq!(Role::from_name("gabarito"), None);
        assert_eq!(Role::Cost.opposite(), Role::Sale);
        assert_eq!(
            serde_json::to_string(&Role::Sale).expect("serialize"),
            "\"venda\""
        );
    }

    #[test]
    fn product_json_keeps_variation_lists() {
        let json = r#"{"DESCRICAO":"Sofa","COR":[{"nome_cor":"AZUL","preco":"10,00"}]}"#;
        let product: CanonicalProduct = serde_json::from_str(json).expect("deserialize");
        assert_eq!(product.text("DESCRICAO"), Some("Sofa"));
        let variations = product.variations("COR").expect("variations");
        assert_eq!(variations[0].name, "AZUL");
        assert_eq!(variations[0].price, "10,00");

        let back = serde_json::to_string(&product).expect("serialize");
        assert!(back.contains(r#""name":"AZUL""#));
    }

    #[test]
    fn template_defaults_are_padded() {
        let template = Template::new(
            vec!["A".into(), "B".into(), "C".into()],
            vec!["1".into()],
        );
        assert_eq!(template.default_for("A"), "1");
        assert_eq!(template.default_for("C"), "");
        assert_eq!(template.default_for("missing"), "");

        let short: Template =
            serde_json::from_str(r#"{"columns": ["A", "B"], "defaults": ["1"]}"#).expect("deserialize");
        assert_eq!(short.default_for("A"), "1");
        assert_eq!(short.default_for("B"), "");
    }
}
