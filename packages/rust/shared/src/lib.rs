//! Shared types, error model, and configuration for catalogbuilder.
//!
//! This crate is the foundation depended on by all other catalogbuilder crates.
//! It provides:
//! - [`CatalogError`], the unified error type
//! - Domain types ([`CanonicalProduct`], [`Role`], [`Template`], [`RunReport`])
//! - The product-line Config model ([`LineConfig`])
//! - Application configuration ([`AppConfig`], config loading)
//! - Atomic file helpers ([`fs`])

pub mod config;
pub mod error;
pub mod fs;
pub mod line_config;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, OutputConfig, PathsConfig, PipelineConfig, WorkDirs, config_dir, config_file_path,
    init_config, load_config, load_config_from,
};
pub use error::{CatalogError, Result};
pub use line_config::{
    ColumnMappingSpec, EMPTY_SOURCE, FileSpec, LineConfig, MergeSpec, PageSpec, SKIPPED_LITERALS,
    SeparatorSpec, SourceColumn,
};
pub use types::{
    CURRENT_SCHEMA_VERSION, CanonicalProduct, FieldValue, GroupStats, Role, RunId, RunReport,
    SheetStats, Template, UNNAMED_PRODUCT, Variation, columns,
};
