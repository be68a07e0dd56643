//! Price text parsing and formatting.
//!
//! Source sheets mix `1.500,00`, `1500.5`, `R$ 900,10` and plain numbers.
//! Parsing keeps digits and separators only: a single comma is the decimal
//! separator (dots are thousands), otherwise commas are dropped and one dot
//! is decimal while several dots are thousands.

/// Parse price text into a number. `None` when nothing numeric remains.
pub fn parse_price(value: &str) -> Option<f64> {
    let cleaned: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let commas = cleaned.matches(',').count();
    let dots = cleaned.matches('.').count();
    let canonical = if commas == 1 {
        cleaned.replace('.', "").replace(',', ".")
    } else if dots > 1 {
        cleaned.replace([',', '.'], "")
    } else {
        cleaned.replace(',', "")
    };

    canonical.parse::<f64>().ok()
}

/// Price with two decimals and a dot separator (`"1234,5"` → `"1234.50"`).
///
/// Empty input stays empty; unparsable input is returned unchanged.
pub fn format_price(value: &str) -> String {
    if value.trim().is_empty() {
        return String::new();
    }
    match parse_price(value) {
        Some(n) => format!("{n:.2}"),
        None => value.to_string(),
    }
}

/// Brazilian display format: `.` thousands, `,` decimal, two decimals.
pub fn format_brl(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }

    let sign = if value < 0.0 && !fixed.trim_matches(['0', '.']).is_empty() {
        "-"
    } else {
        ""
    };
    format!("{sign}{grouped},{frac_part}")
}
