//! Pipeline stages and orchestration for catalogbuilder.
//!
//! Each stage lives in its own module; [`pipeline::run_catalog`] chains them
//! from raw price-list workbooks to Template-conformant catalog workbooks.

pub mod codes;
pub mod expander;
pub mod extract;
pub mod mapper;
pub mod merger;
pub mod normalize;
pub mod pipeline;
pub mod price;
pub mod resolver;
pub mod text;

pub use pipeline::{ProgressReporter, RunConfig, SilentProgress, export_flat_text, run_catalog};
pub use resolver::{ConfigPool, NamedConfig, Resolution};
