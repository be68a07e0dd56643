//! Application configuration for catalogbuilder.
//!
//! User config lives at `~/.catalogbuilder/catalogbuilder.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "catalogbuilder.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".catalogbuilder";

// ---------------------------------------------------------------------------
// Config structs (matching catalogbuilder.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Working directories.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Pipeline switches.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Final catalog output settings.
    #[serde(default)]
    pub output: OutputConfig,
}

/// `[paths]` section. Relative paths resolve against the working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Product-line Config JSON files.
    #[serde(default = "default_configs_dir")]
    pub configs_dir: String,

    /// Input cost/sale workbooks.
    #[serde(default = "default_sheets_dir")]
    pub sheets_dir: String,

    /// Vertical flat-text artifacts (one per sheet).
    #[serde(default = "default_flat_dir")]
    pub flat_dir: String,

    /// Canonical product JSON (one per sheet).
    #[serde(default = "default_canonical_dir")]
    pub canonical_dir: String,

    /// Merged catalog JSON (one per Config group).
    #[serde(default = "default_merged_dir")]
    pub merged_dir: String,

    /// Template workbook directory.
    #[serde(default = "default_template_dir")]
    pub template_dir: String,

    /// Final catalog workbooks and the run report.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Persisted fiscal-code cache and product-code counter.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            configs_dir: default_configs_dir(),
            sheets_dir: default_sheets_dir(),
            flat_dir: default_flat_dir(),
            canonical_dir: default_canonical_dir(),
            merged_dir: default_merged_dir(),
            template_dir: default_template_dir(),
            output_dir: default_output_dir(),
            cache_dir: default_cache_dir(),
        }
    }
}

fn default_configs_dir() -> String {
    "configs".into()
}
fn default_sheets_dir() -> String {
    "planilhas".into()
}
fn default_flat_dir() -> String {
    "txt_bruto".into()
}
fn default_canonical_dir() -> String {
    "json_final".into()
}
fn default_merged_dir() -> String {
    "jsons_mesclados".into()
}
fn default_template_dir() -> String {
    "gabarito".into()
}
fn default_output_dir() -> String {
    "saidas".into()
}
fn default_cache_dir() -> String {
    "cache".into()
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Persist flat text, canonical JSON and merged JSON between stages.
    #[serde(default = "default_true")]
    pub write_intermediates: bool,

    /// Upper-case every text value of merged entries.
    #[serde(default = "default_true")]
    pub uppercase_values: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            write_intermediates: true,
            uppercase_values: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Worksheet name of the final catalog.
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,

    /// Upper bound for autofit column widths.
    #[serde(default = "default_max_column_width")]
    pub max_column_width: usize,

    /// Template columns rendered with Brazilian number formatting.
    #[serde(default = "default_numeric_columns")]
    pub numeric_columns: Vec<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sheet_name: default_sheet_name(),
            max_column_width: default_max_column_width(),
            numeric_columns: default_numeric_columns(),
        }
    }
}

fn default_sheet_name() -> String {
    "Dados".into()
}
fn default_max_column_width() -> usize {
    50
}
fn default_numeric_columns() -> Vec<String> {
    [
        "CUSTO",
        "PRECO1",
        "PRECO2",
        "PRECO3",
        "PRECO4",
        "PRECO5",
        "PESO",
        "ALTURA",
        "LARGURA",
        "PROFUNDIDADE",
        "COMPRIMENTO",
        "QTDE_MAX_VENDA",
        "FATOR_CA",
        "FATOR_AU",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

// ---------------------------------------------------------------------------
// Resolved working directories
// ---------------------------------------------------------------------------

/// Absolute working directories, resolved from [`PathsConfig`] against a root.
#[derive(Debug, Clone)]
pub struct WorkDirs {
    pub configs: PathBuf,
    pub sheets: PathBuf,
    pub flat: PathBuf,
    pub canonical: PathBuf,
    pub merged: PathBuf,
    pub template: PathBuf,
    pub output: PathBuf,
    pub cache: PathBuf,
}

impl WorkDirs {
    /// Resolve every configured directory against `root`.
    pub fn resolve(paths: &PathsConfig, root: &Path) -> Self {
        let join = |p: &str| {
            let path = Path::new(p);
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                root.join(path)
            }
        };
        Self {
            configs: join(&paths.configs_dir),
            sheets: join(&paths.sheets_dir),
            flat: join(&paths.flat_dir),
            canonical: join(&paths.canonical_dir),
            merged: join(&paths.merged_dir),
            template: join(&paths.template_dir),
            output: join(&paths.output_dir),
            cache: join(&paths.cache_dir),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.catalogbuilder/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| CatalogError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.catalogbuilder/catalogbuilder.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CatalogError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| CatalogError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CatalogError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CatalogError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CatalogError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
