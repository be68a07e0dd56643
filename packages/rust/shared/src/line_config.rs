//! Product-line Config: the JSON descriptor that drives extraction, mapping,
//! merge and variation splitting for one cost/sale pair of price lists.
//!
//! Keys are camelCase as written by the config editor; unknown keys (such as
//! the editor's `gabarito` block) are ignored.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};
use crate::types::Role;

/// Marker for mapping entries that do not read any sheet column.
pub const EMPTY_SOURCE: &str = "__EMPTY__";

/// Literal names that mean "no value" on an [`EMPTY_SOURCE`] mapping.
pub const SKIPPED_LITERALS: [&str; 2] = ["VAZIO", "MERGE"];

/// One product-line Config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineConfig {
    /// Role name (`custo`/`venda`) → declared source workbook.
    #[serde(default)]
    pub files: BTreeMap<String, FileSpec>,

    /// Per-sheet extraction settings.
    #[serde(default)]
    pub pages: Vec<PageSpec>,

    #[serde(default)]
    pub column_mapping: Vec<ColumnMappingSpec>,

    #[serde(default)]
    pub merge_config: MergeSpec,

    #[serde(default, alias = "separadores")]
    pub separators: Vec<SeparatorSpec>,
}

/// `files.<role>` entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileSpec {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub columns: Vec<String>,
}

/// `pages[]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSpec {
    #[serde(default)]
    pub page_name: String,
    #[serde(default)]
    pub page_index: usize,
    /// Header anchor, e.g. `"A5"`.
    #[serde(default = "default_start_cell")]
    pub start_cell: String,
    #[serde(default = "default_true")]
    pub is_approved: bool,
    /// Declared column names, in sheet order.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Editor-side mappings; only their `sourceFile` is used, to tell which
    /// role the page belongs to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub column_mappings: Vec<ColumnMappingSpec>,
    /// Last sheet row (1-based) to read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_row: Option<usize>,
}

fn default_start_cell() -> String {
    "A1".into()
}

fn default_true() -> bool {
    true
}

impl PageSpec {
    /// Role the page belongs to, taken from its editor-side mappings.
    pub fn role(&self) -> Option<Role> {
        self.column_mappings
            .iter()
            .find_map(|m| m.source_file.as_deref().and_then(Role::from_name))
    }
}

/// `sourceColumn`: one column name or an ordered list of names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceColumn {
    One(String),
    Many(Vec<String>),
}

impl Default for SourceColumn {
    fn default() -> Self {
        SourceColumn::One(String::new())
    }
}

/// `columnMapping[]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMappingSpec {
    pub gabarito_column: String,
    #[serde(default)]
    pub source_column: SourceColumn,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ColumnMappingSpec {
    /// Role named by `sourceFile`, if any.
    pub fn role(&self) -> Option<Role> {
        self.source_file.as_deref().and_then(Role::from_name)
    }
}

/// `mergeConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeSpec {
    #[serde(default)]
    pub left_key: String,
    #[serde(default)]
    pub right_key: String,
    #[serde(default = "default_true")]
    pub include_variation_key: bool,
    #[serde(default)]
    pub additional_keys: Vec<String>,
}

impl Default for MergeSpec {
    fn default() -> Self {
        Self {
            left_key: String::new(),
            right_key: String::new(),
            include_variation_key: true,
            additional_keys: Vec::new(),
        }
    }
}

/// `separators[]` / `separadores[]` entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeparatorSpec {
    /// Target template column.
    #[serde(rename = "coluna", alias = "column", default)]
    pub column: String,
    /// Optional filter text that must appear in the target value.
    #[serde(rename = "valorOriginal", alias = "originalValue", default)]
    pub original_value: String,
    /// Tokens to split the target value into.
    #[serde(rename = "itensSeparados", alias = "items", default)]
    pub items: Vec<String>,
}

impl LineConfig {
    /// Parse a Config from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| CatalogError::parse(format!("invalid config: {e}")))
    }

    /// Load a Config file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CatalogError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| {
            CatalogError::config(format!("failed to parse {}: {e}", path.display()))
        })
    }

    /// Declared file spec for `role`.
    pub fn file(&self, role: Role) -> Option<&FileSpec> {
        self.files
            .iter()
            .find(|(name, _)| Role::from_name(name) == Some(role))
            .map(|(_, spec)| spec)
    }

    /// Page settings for a sheet, matched by role and index, then by name.
    pub fn page_for(&self, role: Option<Role>, index: usize, name: &str) -> Option<&PageSpec> {
        let role_fits = |p: &&PageSpec| match (role, p.role()) {
            (Some(r), Some(pr)) => r == pr,
            _ => true,
        };
        self.pages
            .iter()
            .filter(role_fits)
            .find(|p| p.page_index == index)
            .or_else(|| {
                self.pages
                    .iter()
                    .filter(role_fits)
                    .find(|p| !p.page_name.is_empty() && p.page_name.trim() == name.trim())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "gabarito": {"allColumns": ["DESCRICAO"]},
        "files": {
            "custo": {"path": "Custo.xlsx", "columns": ["PRODUTO", "VALOR"]},
            "venda": {"path": "Venda.xlsx", "columns": ["PRODUTO", "PRECO"]}
        },
        "pages": [
            {"pageName": "Página 1", "pageIndex": 0, "startCell": "A5", "isApproved": true,
             "columns": ["PRODUTO", "VALOR"],
             "columnMappings": [{"gabaritoColumn": "DESCRICAO", "sourceColumn": "PRODUTO", "sourceFile": "custo"}]}
        ],
        "columnMapping": [
            {"gabaritoColumn": "DESCRICAO", "sourceColumn": "PRODUTO", "sourceFile": "custo"},
            {"gabaritoColumn": "COR", "sourceColumn": ["AZUL", "VERDE"], "sourceFile": "custo"},
            {"gabaritoColumn": "MARCA", "sourceColumn": "__EMPTY__", "name": "LUI HOME"}
        ],
        "mergeConfig": {"leftKey": "PRODUTO", "rightKey": "PRODUTO", "includeVariationKey": false},
        "separadores": [{"coluna": "DESCRICAO", "valorOriginal": "", "itensSeparados": ["MESA", "CADEIRA"]}]
    }"#;

    #[test]
    fn parses_editor_config() {
        let config = LineConfig::from_json(SAMPLE).expect("parse");
        assert_eq!(config.files.len(), 2);
        assert_eq!(config.file(Role::Sale).map(|f| f.path.as_str()), Some("Venda.xlsx"));
        assert_eq!(config.column_mapping.len(), 3);
        assert_eq!(
            config.column_mapping[1].source_column,
            SourceColumn::Many(vec!["AZUL".into(), "VERDE".into()])
        );
        assert!(!config.merge_config.include_variation_key);
        assert_eq!(config.separators[0].items, vec!["MESA", "CADEIRA"]);
    }

    #[test]
    fn merge_spec_defaults_include_variation() {
        let config = LineConfig::from_json("{}").expect("parse");
        assert!(config.merge_config.include_variation_key);
        assert!(config.merge_config.left_key.is_empty());
    }

    #[test]
    fn page_lookup_respects_role() {
        let config = LineConfig::from_json(SAMPLE).expect("parse");
        let page = config.page_for(Some(Role::Cost), 0, "whatever").expect("page");
        assert_eq!(page.start_cell, "A5");
        assert!(config.page_for(Some(Role::Sale), 0, "Página 1").is_none());
    }

    #[test]
    fn malformed_config_is_parse_error() {
        let err = LineConfig::from_json("{\"files\": 3}").unwrap_err();
        assert!(err.to_string().starts_with("parse error"));
    }
}
