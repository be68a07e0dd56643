//! Text normalization helpers shared by the pipeline stages.

use std::sync::LazyLock;

use regex::Regex;

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Trailing disambiguation counter such as `" (2)"`.
static COUNTER_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\(\d+\)\s*$").expect("valid regex"));

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_whitespace(value: &str) -> String {
    WHITESPACE.replace_all(value.trim(), " ").into_owned()
}

/// File stem as compared by the config resolver: ASCII alphanumerics, lowercase.
pub fn normalize_stem(stem: &str) -> String {
    stem.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Column name as compared by lookups: trimmed, whitespace-collapsed, case-folded.
pub fn normalize_column(name: &str) -> String {
    collapse_whitespace(name).to_lowercase()
}

/// One merge-key component.
pub fn normalize_key_part(value: &str) -> String {
    collapse_whitespace(value).to_lowercase()
}

/// Remove a trailing `" (N)"` counter.
pub fn strip_counter_suffix(value: &str) -> &str {
    match COUNTER_SUFFIX.find(value) {
        Some(m) => &value[..m.start()],
        None => value,
    }
}

/// Lowercase and strip Latin diacritics (Portuguese/Spanish range).
pub fn fold_accents(value: &str) -> String {
    value
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            'ñ' => 'n',
            'ý' | 'ÿ' => 'y',
            other => other,
        })
        .collect()
}

/// True for values that carry no data: `""`, `"0"`, `"0.0"`.
pub fn is_empty_like(value: &str) -> bool {
    matches!(value.trim(), "" | "0" | "0.0")
}
