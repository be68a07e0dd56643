//! ConfigResolver: pick the product-line Config (and role) for an input file
//! by fuzzy comparison of file stems.
//!
//! Scoring is an ordered list of pure strategies; the first one that applies
//! to a (candidate, declared) pair decides its score.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use catalogbuilder_shared::{CatalogError, LineConfig, Result, Role, fs};

use crate::text::normalize_stem;

// ---------------------------------------------------------------------------
// Config pool
// ---------------------------------------------------------------------------

/// A Config together with the file it was loaded from.
#[derive(Debug, Clone)]
pub struct NamedConfig {
    /// File name without extension, used to label outputs and logs.
    pub name: String,
    pub path: PathBuf,
    pub config: LineConfig,
}

/// Every Config available to a run, sorted by file name.
#[derive(Debug, Clone, Default)]
pub struct ConfigPool {
    configs: Vec<NamedConfig>,
}

impl ConfigPool {
    /// Load every `*.json` Config in `dir`. Malformed files are skipped.
    #[instrument(skip_all, fields(dir = %dir.display()))]
    pub fn load(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(CatalogError::config(format!(
                "configs directory not found: {}",
                dir.display()
            )));
        }

        let mut configs = Vec::new();
        for path in fs::list_files(dir, &["json"])? {
            match LineConfig::load(&path) {
                Ok(config) => configs.push(NamedConfig {
                    name: fs::file_stem(&path),
                    path,
                    config,
                }),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping malformed config"),
            }
        }

        if configs.is_empty() {
            return Err(CatalogError::config(format!(
                "no usable config in {}",
                dir.display()
            )));
        }

        info!(configs = configs.len(), "config pool loaded");
        Ok(Self { configs })
    }

    pub fn from_configs(configs: Vec<NamedConfig>) -> Self {
        Self { configs }
    }

    pub fn get(&self, index: usize) -> Option<&NamedConfig> {
        self.configs.get(index)
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NamedConfig> {
        self.configs.iter()
    }

    /// Resolve the Config for an input file name.
    pub fn resolve(&self, file_name: &str) -> Option<Resolution> {
        resolve(&self.configs, file_name)
    }
}

// ---------------------------------------------------------------------------
// Scoring strategies
// ---------------------------------------------------------------------------

/// One way a candidate stem can relate to a declared stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    Exact,
    CandidatePrefix,
    DeclaredPrefix,
    Contained,
}

/// Strategies in priority order.
pub const STRATEGIES: [MatchStrategy; 4] = [
    MatchStrategy::Exact,
    MatchStrategy::CandidatePrefix,
    MatchStrategy::DeclaredPrefix,
    MatchStrategy::Contained,
];

/// Below this share of the candidate, a contained match scores a flat 30.
const CONTAINED_MIN_COVERAGE: f64 = 0.3;

impl MatchStrategy {
    /// Score for normalized, non-empty stems, or `None` if the strategy does
    /// not apply.
    pub fn score(self, candidate: &str, declared: &str) -> Option<f64> {
        let c = candidate.len() as f64;
        let d = declared.len() as f64;
        match self {
            MatchStrategy::Exact => (candidate == declared).then_some(100.0),
            MatchStrategy::CandidatePrefix => {
                candidate.starts_with(declared).then(|| 90.0 + 10.0 * d / c)
            }
            MatchStrategy::DeclaredPrefix => {
                declared.starts_with(candidate).then(|| 70.0 + 10.0 * c / d)
            }
            MatchStrategy::Contained => candidate.contains(declared).then(|| {
                let coverage = d / c;
                if coverage < CONTAINED_MIN_COVERAGE {
                    30.0
                } else {
                    50.0 + 20.0 * coverage
                }
            }),
        }
    }
}

/// Similarity of two raw file stems; 0 means unrelated.
pub fn score_names(candidate: &str, declared: &str) -> f64 {
    let candidate = normalize_stem(candidate);
    let declared = normalize_stem(declared);
    if candidate.is_empty() || declared.is_empty() {
        return 0.0;
    }
    STRATEGIES
        .iter()
        .find_map(|s| s.score(&candidate, &declared))
        .unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// The Config chosen for one input file.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Index into the pool.
    pub index: usize,
    pub role: Option<Role>,
    pub score: f64,
    /// True when nothing matched and the first Config was used.
    pub fallback: bool,
}

struct Candidate {
    index: usize,
    role: Option<Role>,
    score: f64,
    declared_len: usize,
}

/// Pick the best (Config, role) pair for `file_name` from `configs`.
///
/// Highest score wins; ties prefer the longer declared name, then the
/// earlier Config. With no match the first Config is returned as a fallback.
pub fn resolve(configs: &[NamedConfig], file_name: &str) -> Option<Resolution> {
    if configs.is_empty() {
        return None;
    }
    let stem = stem_of(file_name);

    let mut best: Option<Candidate> = None;
    for (index, named) in configs.iter().enumerate() {
        for (role_name, spec) in &named.config.files {
            let declared = stem_of(&spec.path);
            let score = score_names(&stem, &declared);
            if score <= 0.0 {
                continue;
            }
            let declared_len = normalize_stem(&declared).len();
            debug!(config = %named.name, role = %role_name, score, "config candidate");

            let better = match &best {
                None => true,
                Some(b) => {
                    score > b.score || (score == b.score && declared_len > b.declared_len)
                }
            };
            if better {
                best = Some(Candidate {
                    index,
                    role: Role::from_name(role_name),
                    score,
                    declared_len,
                });
            }
        }
    }

    match best {
        Some(b) => {
            info!(file = file_name, config = %configs[b.index].name, score = b.score, "config resolved");
            Some(Resolution {
                index: b.index,
                role: b.role,
                score: b.score,
                fallback: false,
            })
        }
        None => {
            warn!(file = file_name, config = %configs[0].name, "no config matches, using fallback");
            Some(Resolution {
                index: 0,
                role: infer_role(&stem),
                score: 0.0,
                fallback: true,
            })
        }
    }
}

/// Role guessed from the file name alone.
pub fn infer_role(name: &str) -> Option<Role> {
    let normalized = normalize_stem(name);
    if normalized.contains("custo") {
        Some(Role::Cost)
    } else if normalized.contains("venda") {
        Some(Role::Sale)
    } else {
        None
    }
}

fn stem_of(name: &str) -> String {
    Path::new(name.trim())
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
