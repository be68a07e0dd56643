//! Persisted code stores shared across pipeline runs.
//!
//! - [`FiscalCodeCache`]: fiscal classification text → 4-digit code (`ncm_codes.json`)
//! - [`ProductCodeCounter`]: next sequential product code (`cod_produto.txt`)
//!
//! **Lifecycle:** the pipeline driver loads both stores once at the start of a
//! run, hands them by `&mut` to the code assigner, and saves them once at the
//! end. A damaged file is logged and treated as an empty/initial store so a
//! corrupt cache never blocks a run. Both stores encode monotonically
//! increasing sequences and must have a single writer.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use catalogbuilder_shared::{CatalogError, Result, fs};
use tracing::{debug, info, warn};

/// File name of the fiscal-code cache inside the cache directory.
pub const FISCAL_CACHE_FILE: &str = "ncm_codes.json";

/// File name of the product-code counter inside the cache directory.
pub const PRODUCT_COUNTER_FILE: &str = "cod_produto.txt";

/// First product code handed out by a fresh counter.
pub const FIRST_PRODUCT_CODE: u64 = 1;

// ---------------------------------------------------------------------------
// FiscalCodeCache
// ---------------------------------------------------------------------------

/// Append-only mapping of fiscal classification text to a zero-padded code.
#[derive(Debug, Clone)]
pub struct FiscalCodeCache {
    path: Option<PathBuf>,
    codes: BTreeMap<String, String>,
    added: usize,
}

impl FiscalCodeCache {
    /// Load the cache from `path`; missing or corrupt files yield an empty cache.
    pub fn load(path: &Path) -> Self {
        let codes = if path.exists() {
            match fs::read_json::<BTreeMap<String, String>>(path) {
                Ok(codes) => {
                    info!(entries = codes.len(), path = %path.display(), "fiscal code cache loaded");
                    codes
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "fiscal code cache unreadable, starting empty");
                    BTreeMap::new()
                }
            }
        } else {
            debug!(path = %path.display(), "no fiscal code cache yet");
            BTreeMap::new()
        };

        Self {
            path: Some(path.to_path_buf()),
            codes,
            added: 0,
        }
    }

    /// A cache that is never persisted.
    pub fn in_memory(codes: BTreeMap<String, String>) -> Self {
        Self {
            path: None,
            codes,
            added: 0,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.codes.get(key).map(String::as_str)
    }

    /// Highest numeric code currently stored (0 when none).
    pub fn max_code(&self) -> u32 {
        self.codes
            .values()
            .filter_map(|v| v.trim().parse::<u32>().ok())
            .max()
            .unwrap_or(0)
    }

    /// Code for `key`, assigning `max + 1` when the key is new.
    pub fn code_for(&mut self, key: &str) -> String {
        if let Some(code) = self.codes.get(key) {
            return code.clone();
        }
        let max = self.max_code();
        if max == u32::MAX {
            warn!(key, "fiscal code space exhausted, reusing the highest code");
        }
        let code = format!("{:04}", max.saturating_add(1));
        debug!(key, code = %code, "new fiscal code");
        self.codes.insert(key.to_string(), code.clone());
        self.added += 1;
        code
    }

    /// Number of keys added since load.
    pub fn added(&self) -> usize {
        self.added
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Persist the cache if keys were added. Returns whether a write happened.
    pub fn save(&mut self) -> Result<bool> {
        if self.added == 0 {
            return Ok(false);
        }
        let Some(path) = &self.path else {
            return Ok(false);
        };
        fs::write_json(path, &self.codes)
            .map_err(|e| CatalogError::Cache(format!("saving fiscal codes: {e}")))?;
        info!(entries = self.codes.len(), added = self.added, "fiscal code cache saved");
        self.added = 0;
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// ProductCodeCounter
// ---------------------------------------------------------------------------

/// The next sequential product code, continued across runs.
#[derive(Debug, Clone)]
pub struct ProductCodeCounter {
    path: Option<PathBuf>,
    next: u64,
}

impl ProductCodeCounter {
    /// Load the counter from `path`; missing or corrupt files start at 1.
    pub fn load(path: &Path) -> Self {
        let next = if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(text) => match text.trim().parse::<u64>() {
                    Ok(n) if n >= FIRST_PRODUCT_CODE => n,
                    _ => {
                        warn!(path = %path.display(), content = %text.trim(), "product code counter corrupt, restarting");
                        FIRST_PRODUCT_CODE
                    }
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "product code counter unreadable, restarting");
                    FIRST_PRODUCT_CODE
                }
            }
        } else {
            FIRST_PRODUCT_CODE
        };

        debug!(next, "product code counter loaded");
        Self {
            path: Some(path.to_path_buf()),
            next,
        }
    }

    /// A counter that is never persisted.
    pub fn in_memory(next: u64) -> Self {
        Self {
            path: None,
            next: next.max(FIRST_PRODUCT_CODE),
        }
    }

    /// The code the next call to [`Self::advance`] will return.
    pub fn peek(&self) -> u64 {
        self.next
    }

    /// Take the next code.
    pub fn advance(&mut self) -> u64 {
        let code = self.next;
        self.next += 1;
        code
    }

    /// Overwrite the counter file with the next code to assign.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        fs::write_atomic(path, format!("{}\n", self.next))
            .map_err(|e| CatalogError::Cache(format!("saving product counter: {e}")))?;
        info!(next = self.next, "product code counter saved");
        Ok(())
    }
}
