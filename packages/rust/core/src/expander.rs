//! VariationExpander: one canonical product → one or more.
//!
//! Two passes, in order:
//! 1. the `COR` variation list becomes one product per `{name, price}`;
//! 2. separator rules split compound attribute text into tokens, with a
//!    cartesian product when several columns split at once.

use tracing::debug;

use catalogbuilder_shared::{CanonicalProduct, Role, SeparatorSpec, columns};

use crate::price::format_price;
use crate::text::{fold_accents, strip_counter_suffix};

// ---------------------------------------------------------------------------
// Color flattening
// ---------------------------------------------------------------------------

/// Replace a `COR` variation list with one product per variation.
///
/// Each variation's price is formatted into `CUSTO` (cost side) or `PRECO1`
/// (sale side). Products without a list come back unchanged.
pub fn flatten_colors(product: CanonicalProduct, role: Option<Role>) -> Vec<CanonicalProduct> {
    let Some(variations) = product.variations(columns::COLOR).map(<[_]>::to_vec) else {
        return vec![product];
    };

    if variations.is_empty() {
        let mut product = product;
        product.remove(columns::COLOR);
        return vec![product];
    }

    variations
        .into_iter()
        .map(|variation| {
            let mut flat = product.clone();
            flat.set_text(columns::COLOR, variation.name);
            if let Some(role) = role {
                flat.set_text(role.price_column(), format_price(&variation.price));
            }
            flat
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Separators
// ---------------------------------------------------------------------------

/// Split `product` by every applicable separator rule.
pub fn apply_separators(
    product: CanonicalProduct,
    separators: &[SeparatorSpec],
) -> Vec<CanonicalProduct> {
    let mut matched: Vec<(&str, Vec<&str>)> = Vec::new();
    let mut decided: Vec<&str> = Vec::new();

    for rule in separators {
        let column = rule.column.trim();
        if column.is_empty() || rule.items.is_empty() || decided.contains(&column) {
            continue;
        }
        let Some(value) = applicable_value(&product, rule) else {
            continue;
        };
        decided.push(column);

        let mut tokens: Vec<&str> = Vec::new();
        for item in &rule.items {
            let token = item.trim();
            if token_matches(value, token) && !tokens.contains(&token) {
                tokens.push(token);
            }
        }
        if !tokens.is_empty() {
            matched.push((column, tokens));
        }
    }

    if matched.is_empty() {
        return vec![product];
    }

    let lists: Vec<Vec<&str>> = matched.iter().map(|(_, tokens)| tokens.clone()).collect();
    let combinations = cartesian(&lists);
    debug!(
        columns = matched.len(),
        products = combinations.len(),
        "separator expansion"
    );

    combinations
        .into_iter()
        .map(|combination| {
            let mut expanded = product.clone();
            for ((column, _), token) in matched.iter().zip(combination) {
                if *column == columns::DESCRIPTION {
                    expanded.set_text(columns::NOTES, token);
                } else {
                    expanded.set_text(*column, token);
                }
            }
            expanded
        })
        .collect()
}

/// The rule's target value, if the rule applies to this product.
fn applicable_value<'p>(product: &'p CanonicalProduct, rule: &SeparatorSpec) -> Option<&'p str> {
    let value = product.text(rule.column.trim())?;
    if value.trim().is_empty() {
        return None;
    }
    let filter = rule.original_value.trim();
    if filter.is_empty() || fold_accents(value).contains(&fold_accents(filter)) {
        Some(value)
    } else {
        None
    }
}

/// Accent- and case-insensitive containment, tolerant of `" (N)"` counters.
fn token_matches(value: &str, token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    let value = fold_accents(value);
    let token = fold_accents(token);
    if value.contains(&token) {
        return true;
    }
    let bare_token = strip_counter_suffix(&token);
    !bare_token.is_empty() && strip_counter_suffix(&value).contains(bare_token)
}

/// Every combination taking one element from each list, in list order.
///
/// An empty input yields one empty combination; any empty list yields none.
pub fn cartesian<T: Clone>(lists: &[Vec<T>]) -> Vec<Vec<T>> {
    lists.iter().fold(vec![Vec::new()], |acc, list| {
        acc.iter()
            .flat_map(|prefix| {
                list.iter().map(move |item| {
                    let mut next = prefix.clone();
                    next.push(item.clone());
                    next
                })
            })
            .collect()
    })
}

/// Both expansion passes for one product.
pub fn expand_product(
    product: CanonicalProduct,
    role: Option<Role>,
    separators: &[SeparatorSpec],
) -> Vec<CanonicalProduct> {
    flatten_colors(product, role)
        .into_iter()
        .flat_map(|p| apply_separators(p, separators))
        .collect()
}

/// Expand a batch in order.
pub fn expand_all(
    products: Vec<CanonicalProduct>,
    role: Option<Role>,
    separators: &[SeparatorSpec],
) -> Vec<CanonicalProduct> {
    let before = products.len();
    let expanded: Vec<CanonicalProduct> = products
        .into_iter()
        .flat_map(|p| expand_product(p, role, separators))
        .collect();
    debug!(before, after = expanded.len(), "variations expanded");
    expanded
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalogbuilder_shared::Variation;

    fn product(fields: &[(&str, &str)]) -> CanonicalProduct {
        fields.iter().copied().collect()
    }

    fn rule(column: &str, filter: &str, items: &[&str]) -> SeparatorSpec {
        SeparatorSpec {
            column: column.into(),
            original_value: filter.into(),
            items: items.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn cartesian_counts() {
        let lists = vec![vec![1, 2, 3], vec![10, 20]];
        let combos = cartesian(&lists);
        assert_eq!(combos.len(), 6);
        assert_eq!(combos[0], vec![1, 10]);
        assert_eq!(combos[5], vec![3, 20]);
        assert_eq!(cartesian::<u8>(&[]), vec![Vec::<u8>::new()]);
        assert!(cartesian(&[vec![1], vec![]]).is_empty());
    }

    #[test]
    fn colors_flatten_with_side_price() {
        let mut sofa = product(&[("DESCRICAO", "Sofa")]);
        sofa.set_variations(
            "COR",
            vec![
                Variation {
                    name: "AZUL".into(),
                    price: "1.500,00".into(),
                },
                Variation {
                    name: "VERDE".into(),
                    price: "1600".into(),
                },
            ],
        );

        let cost = flatten_colors(sofa.clone(), Some(Role::Cost));
        assert_eq!(cost.len(), 2);
        assert_eq!(cost[0].text("COR"), Some("AZUL"));
        assert_eq!(cost[0].text("CUSTO"), Some("1500.00"));
        assert_eq!(cost[1].text("CUSTO"), Some("1600.00"));

        let sale = flatten_colors(sofa, Some(Role::Sale));
        assert_eq!(sale[1].text("PRECO1"), Some("1600.00"));
        assert!(!sale[1].contains("CUSTO"));
    }

    #[test]
    fn products_without_colors_pass_through() {
        let mesa = product(&[("DESCRICAO", "Mesa"), ("COR", "PRETO")]);
        assert_eq!(flatten_colors(mesa.clone(), Some(Role::Cost)), vec![mesa]);
    }

    #[test]
    fn description_tokens_go_to_notes() {
        let kit = product(&[("DESCRICAO", "Kit Mesa + Cadeira")]);
        let out = apply_separators(kit, &[rule("DESCRICAO", "", &["MESA", "CADEIRA", "BANCO"])]);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].text("DESCRICAO"), Some("Kit Mesa + Cadeira"));
        assert_eq!(out[0].text("OBS"), Some("MESA"));
        assert_eq!(out[1].text("OBS"), Some("CADEIRA"));
    }

    #[test]
    fn other_columns_are_overwritten_by_token() {
        let p = product(&[("DESCRICAO", "Poltrona"), ("COR", "Camurça Bege/Marrom")]);
        let out = apply_separators(p, &[rule("COR", "", &["CAMURCA BEGE", "MARROM"])]);
        let colors: Vec<_> = out.iter().map(|p| p.text("COR").unwrap()).collect();
        assert_eq!(colors, vec!["CAMURCA BEGE", "MARROM"]);
    }

    #[test]
    fn two_columns_expand_cartesian() {
        let p = product(&[("DESCRICAO", "Sofa"), ("COR", "Azul, Verde, Cinza"), ("TAMANHO", "P/M")]);
        let rules = [
            rule("COR", "", &["AZUL", "VERDE", "CINZA"]),
            rule("TAMANHO", "", &["P", "M"]),
        ];
        let out = apply_separators(p, &rules);
        assert_eq!(out.len(), 6);

        assert_eq!(out[0].text("COR"), Some("AZUL"));
        assert_eq!(out[0].text("TAMANHO"), Some("P"));
        let pairs: std::collections::BTreeSet<(&str, &str)> = out
            .iter()
            .map(|p| (p.text("COR").unwrap(), p.text("TAMANHO").unwrap()))
            .collect();
        assert_eq!(pairs.len(), 6);
    }

    #[test]
    fn filter_and_first_rule_per_column() {
        let p = product(&[("DESCRICAO", "Conjunto Jantar")]);
        // Filter does not match → rule ignored.
        assert_eq!(
            apply_separators(p.clone(), &[rule("DESCRICAO", "KIT", &["JANTAR"])]).len(),
            1
        );
        assert!(!apply_separators(p.clone(), &[rule("DESCRICAO", "KIT", &["JANTAR"])])[0].contains("OBS"));

        // Second rule for the same column is ignored.
        let out = apply_separators(
            p,
            &[
                rule("DESCRICAO", "conjunto", &["JANTAR"]),
                rule("DESCRICAO", "", &["CONJUNTO", "JANTAR"]),
            ],
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text("OBS"), Some("JANTAR"));
    }

    #[test]
    fn counter_suffix_does_not_block_match() {
        assert!(token_matches("Sofa Azul (2)", "azul"));
        assert!(token_matches("AZUL", "Azul (3)"));
        assert!(!token_matches("Verde", "azul"));
        assert!(!token_matches("Verde", ""));
    }

    #[test]
    fn expand_product_runs_both_passes() {
        let mut p = product(&[("DESCRICAO", "Kit Mesa Cadeira")]);
        p.set_variations(
            "COR",
            vec![
                Variation {
                    name: "PRETO".into(),
                    price: "100".into(),
                },
                Variation {
                    name: "BRANCO".into(),
                    price: "110".into(),
                },
            ],
        );
        let out = expand_product(p, Some(Role::Cost), &[rule("DESCRICAO", "", &["MESA", "CADEIRA"])]);
        assert_eq!(out.len(), 4);
        assert_eq!(out[3].text("COR"), Some("BRANCO"));
        assert_eq!(out[3].text("OBS"), Some("CADEIRA"));
        assert_eq!(out[3].text("CUSTO"), Some("110.00"));
    }
}
