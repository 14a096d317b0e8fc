//! Report data for formula exports
//!
//! These functions resolve a balanced formula against ingredient reference
//! data and produce the figures a printed report shows. Rendering itself is
//! done elsewhere.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{normalize_code, Allergen, FormulaLine, IfraLimit, Ingredient, IFRA_CATEGORIES};
use crate::validation::parse_decimal;

/// Share of one INCI component in the formula
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InciEntry {
    pub inci: String,
    pub percent: Decimal,
}

/// One raw material bringing an allergen into the formula
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllergenSource {
    pub material: String,
    pub percent_in_formula: Decimal,
    pub allergen_percent: Decimal,
}

/// Concentration of one allergen in the finished formula
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllergenEntry {
    pub allergen: String,
    pub total_percent: Decimal,
    pub sources: Vec<AllergenSource>,
}

/// Maximum use level of the formula for one IFRA category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfraEntry {
    pub category: String,
    pub description: Option<String>,
    /// `None` when no ingredient of the formula is restricted in this category
    pub max_concentration: Option<Decimal>,
}

/// IFRA certificate data for a formula
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfraReport {
    /// Ingredient codes of the formula found in the IFRA table
    pub restricted_codes: Vec<String>,
    pub categories: Vec<IfraEntry>,
}

/// Map ingredient codes to their INCI name, skipping ingredients without one
pub fn inci_index(ingredients: &[Ingredient]) -> HashMap<String, String> {
    ingredients
        .iter()
        .filter_map(|i| {
            let inci = i.inci.as_deref()?.trim();
            (!inci.is_empty()).then(|| (i.code.trim().to_string(), inci.to_string()))
        })
        .collect()
}

/// One component of a raw material's INCI declaration
#[derive(Debug, Clone, PartialEq)]
pub struct InciComponent {
    pub name: String,
    /// Share of the raw material, 0-100
    pub percent: Decimal,
}

/// Split an INCI declaration into components.
///
/// Components are separated by line breaks or by commas (a comma between two
/// digits is a decimal separator). Each may carry its share as `Name (30%)`,
/// `Name: 30%` or `Name 30%`. A lone name is the whole material. When no
/// component states a share, the material is split evenly.
pub fn parse_inci(declaration: &str) -> Vec<InciComponent> {
    let parts: Vec<&str> = declaration
        .lines()
        .flat_map(split_components)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let mut components: Vec<InciComponent> = parts
        .iter()
        .map(|part| match component_share(part) {
            Some((name, percent)) => InciComponent {
                name: name.to_string(),
                percent,
            },
            None => InciComponent {
                name: part.to_string(),
                percent: Decimal::ZERO,
            },
        })
        .collect();

    if !components.is_empty() && components.iter().all(|c| c.percent.is_zero()) {
        let share = Decimal::ONE_HUNDRED / Decimal::from(components.len());
        for component in &mut components {
            component.percent = share;
        }
    }
    components
}

fn split_components(line: &str) -> Vec<&str> {
    let bytes = line.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    for (i, &b) in bytes.iter().enumerate() {
        let decimal_comma = i > 0
            && bytes[i - 1].is_ascii_digit()
            && bytes.get(i + 1).is_some_and(u8::is_ascii_digit);
        if b == b',' && !decimal_comma {
            parts.push(&line[start..i]);
            start = i + 1;
        }
    }
    parts.push(&line[start..]);
    parts
}

/// `(name, share)` of `Name (30%)`, `Name: 30%` or `Name 30%`
fn component_share(part: &str) -> Option<(&str, Decimal)> {
    let (head, number) = if let Some(inner) = part.strip_suffix(')') {
        let open = inner.rfind('(')?;
        let number = inner[open + 1..].trim().strip_suffix('%')?;
        (&inner[..open], number)
    } else {
        let body = part.strip_suffix('%')?.trim_end();
        let split = body
            .char_indices()
            .rev()
            .find(|(_, c)| !(c.is_ascii_digit() || *c == '.' || *c == ','))
            .map(|(i, c)| i + c.len_utf8())?;
        let (head, number) = body.split_at(split);
        if !head.ends_with(|c: char| c.is_whitespace() || c == ':') {
            return None;
        }
        (head, number)
    };

    let name = head.trim().trim_end_matches(':').trim();
    let number = number.trim();
    if name.is_empty()
        || number.is_empty()
        || !number.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',')
    {
        return None;
    }
    let percent = parse_decimal(number)?;
    Some((name, percent))
}

/// INCI composition of the formula, largest first.
///
/// `inci_by_code` maps ingredient codes to their INCI declaration. QSP and
/// zero-percent lines are left out, as are lines whose ingredient has no
/// INCI. A component's share of the formula is
/// `component% * line% / 100`; identical names are merged.
pub fn inci_breakdown(lines: &[FormulaLine], inci_by_code: &HashMap<String, String>) -> Vec<InciEntry> {
    let mut entries: Vec<InciEntry> = Vec::new();

    for line in lines.iter().filter(|l| !l.is_qsp && l.percent > Decimal::ZERO) {
        let Some(declaration) = inci_by_code.get(line.ingredient_code.trim()) else {
            continue;
        };

        for component in parse_inci(declaration) {
            let percent = if component.percent > Decimal::ZERO {
                component
                    .percent
                    .checked_mul(line.percent)
                    .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
                    .unwrap_or(Decimal::ZERO)
            } else {
                line.percent
            };
            if percent <= Decimal::ZERO {
                continue;
            }

            match entries.iter_mut().find(|e| e.inci == component.name) {
                Some(entry) => entry.percent = entry.percent.saturating_add(percent),
                None => entries.push(InciEntry {
                    inci: component.name,
                    percent,
                }),
            }
        }
    }

    entries.sort_by(|a, b| b.percent.cmp(&a.percent));
    entries
}

/// Allergen concentrations in the formula, largest first.
///
/// Each non-QSP line contributes `line.percent * allergen.percentage / 100`.
pub fn allergen_breakdown(lines: &[FormulaLine], allergens: &[Allergen]) -> Vec<AllergenEntry> {
    let mut entries: Vec<AllergenEntry> = Vec::new();

    for line in lines.iter().filter(|l| !l.is_qsp) {
        let code = line.ingredient_code.trim();
        if code.is_empty() {
            continue;
        }
        let material = if line.ingredient_name.trim().is_empty() {
            code.to_string()
        } else {
            line.ingredient_name.clone()
        };

        for allergen in allergens.iter().filter(|a| a.ingredient_code.trim() == code) {
            let contribution = line
                .percent
                .checked_mul(allergen.percentage)
                .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
                .unwrap_or(Decimal::ZERO);
            let source = AllergenSource {
                material: material.clone(),
                percent_in_formula: line.percent,
                allergen_percent: allergen.percentage,
            };

            match entries.iter_mut().find(|e| e.allergen == allergen.allergen_name) {
                Some(entry) => {
                    entry.total_percent = entry.total_percent.saturating_add(contribution);
                    entry.sources.push(source);
                }
                None => entries.push(AllergenEntry {
                    allergen: allergen.allergen_name.clone(),
                    total_percent: contribution,
                    sources: vec![source],
                }),
            }
        }
    }

    entries.sort_by(|a, b| b.total_percent.cmp(&a.total_percent));
    entries
}

/// Maximum concentration of the formula per IFRA category.
///
/// For each category the limit is the lowest `limit_percent` among the
/// formula's non-QSP ingredients. Codes match case-insensitively. Every
/// category is listed, restricted or not.
pub fn ifra_report(lines: &[FormulaLine], limits: &[IfraLimit]) -> IfraReport {
    let mut codes: Vec<String> = Vec::new();
    for line in lines.iter().filter(|l| !l.is_qsp) {
        let code = normalize_code(&line.ingredient_code);
        if !code.is_empty() && !codes.contains(&code) {
            codes.push(code);
        }
    }

    let relevant: Vec<&IfraLimit> = limits
        .iter()
        .filter(|l| codes.contains(&normalize_code(&l.ingredient_code)))
        .collect();

    let restricted_codes = lines
        .iter()
        .filter(|l| !l.is_qsp)
        .map(|l| l.ingredient_code.trim().to_string())
        .filter(|c| {
            relevant
                .iter()
                .any(|l| normalize_code(&l.ingredient_code) == normalize_code(c))
        })
        .fold(Vec::new(), |mut acc: Vec<String>, code| {
            if !acc.contains(&code) {
                acc.push(code);
            }
            acc
        });

    let categories = IFRA_CATEGORIES
        .iter()
        .map(|category| {
            let in_category = relevant
                .iter()
                .filter(|l| l.category_number.trim() == *category);
            IfraEntry {
                category: category.to_string(),
                description: in_category
                    .clone()
                    .map(|l| l.description.trim())
                    .find(|d| !d.is_empty())
                    .map(String::from),
                max_concentration: in_category.map(|l| l.limit_percent).min(),
            }
        })
        .collect();

    IfraReport {
        restricted_codes,
        categories,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn allergen(code: &str, name: &str, pct: &str) -> Allergen {
        Allergen {
            ingredient_code: code.to_string(),
            allergen_name: name.to_string(),
            percentage: dec(pct),
        }
    }

    fn limit(category: &str, code: &str, pct: &str) -> IfraLimit {
        IfraLimit {
            category_number: category.to_string(),
            description: format!("Category {}", category),
            ingredient_code: code.to_string(),
            limit_percent: dec(pct),
        }
    }

    #[test]
    fn test_inci_breakdown_merges_and_sorts() {
        let lines = vec![
            FormulaLine::new("1", "MP1", "Huile", dec("5")),
            FormulaLine::new("1", "MP2", "Eau florale", dec("20")),
            FormulaLine::new("2", "MP3", "Huile bis", dec("10")),
            FormulaLine::new("2", "MP4", "Sans INCI", dec("3")),
        ];
        let inci: HashMap<String, String> = [
            ("MP1", "Simmondsia Chinensis Seed Oil"),
            ("MP2", "Rosa Damascena Flower Water"),
            ("MP3", "Simmondsia Chinensis Seed Oil"),
            ("MP4", "  "),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let entries = inci_breakdown(&lines, &inci);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].inci, "Rosa Damascena Flower Water");
        assert_eq!(entries[1].percent, dec("15"));
    }

    #[test]
    fn test_inci_breakdown_skips_qsp_and_empty_lines() {
        let lines = vec![
            FormulaLine::new("1", "MP1", "Glycérine", dec("10")),
            FormulaLine::new("1", "MP2", "Gomme", Decimal::ZERO),
            FormulaLine {
                percent: dec("90"),
                ..FormulaLine::qsp("1", "EAU", "Eau")
            },
        ];
        let inci: HashMap<String, String> = [("MP1", "Glycerin"), ("MP2", "Xanthan Gum"), ("EAU", "Aqua")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let entries = inci_breakdown(&lines, &inci);
        assert_eq!(
            entries,
            vec![InciEntry {
                inci: "Glycerin".to_string(),
                percent: dec("10"),
            }]
        );
    }

    #[test]
    fn test_inci_breakdown_weights_composite_declarations() {
        let lines = vec![
            FormulaLine::new("1", "MP1", "Hydrolat", dec("20")),
            FormulaLine::new("2", "MP2", "Conservateur", dec("1")),
            FormulaLine::new("2", "MP3", "Glycérine", dec("5")),
        ];
        let inci: HashMap<String, String> = [
            ("MP1", "Rosa Damascena Flower Water (99%)\nSodium Benzoate (1%)"),
            ("MP2", "Sodium Benzoate, Potassium Sorbate"),
            ("MP3", "Glycerin"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let entries = inci_breakdown(&lines, &inci);
        let percent = |name: &str| entries.iter().find(|e| e.inci == name).unwrap().percent;

        assert_eq!(entries[0].inci, "Rosa Damascena Flower Water");
        assert_eq!(percent("Rosa Damascena Flower Water"), dec("19.8"));
        // 1% of 20% from the hydrolat, half of 1% from the preservative blend
        assert_eq!(percent("Sodium Benzoate"), dec("0.7"));
        assert_eq!(percent("Potassium Sorbate"), dec("0.5"));
        assert_eq!(percent("Glycerin"), dec("5"));
    }

    #[test]
    fn test_parse_inci_formats() {
        let parsed = parse_inci("Aqua (70%)\nGlycerin: 25,5 %\nCitric Acid 4.5%");
        let pairs: Vec<(&str, Decimal)> = parsed.iter().map(|c| (c.name.as_str(), c.percent)).collect();
        assert_eq!(
            pairs,
            vec![
                ("Aqua", dec("70")),
                ("Glycerin", dec("25.5")),
                ("Citric Acid", dec("4.5")),
            ]
        );

        let parsed = parse_inci("Aqua (1,5%), Glycerin (98,5%)");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].percent, dec("1.5"));
        assert_eq!(parsed[1].name, "Glycerin");
    }

    #[test]
    fn test_parse_inci_without_shares() {
        let single = parse_inci(" Parfum (Fragrance) ");
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].name, "Parfum (Fragrance)");
        assert_eq!(single[0].percent, dec("100"));

        let even = parse_inci("Caprylyl Glycol, Ethylhexylglycerin, Tocopherol, Helianthus Oil");
        assert_eq!(even.len(), 4);
        assert!(even.iter().all(|c| c.percent == dec("25")));

        assert!(parse_inci("  \n ").is_empty());
        // No separator between name and number: the whole text is the name
        assert_eq!(parse_inci("Glycerin30%")[0].name, "Glycerin30%");
        assert_eq!(parse_inci("Huile d'olive\u{a0}30%")[0].percent, dec("30"));
    }

    #[test]
    fn test_inci_index_skips_missing_inci() {
        let ingredient = |code: &str, inci: Option<&str>| Ingredient {
            code: code.to_string(),
            name: code.to_string(),
            main_supplier: None,
            inci: inci.map(String::from),
            category: None,
            price_per_kilo: None,
            in_stock: true,
            cas_number: None,
        };
        let index = inci_index(&[
            ingredient("MP1", Some("Glycerin")),
            ingredient("MP2", None),
            ingredient("MP3", Some(" ")),
        ]);
        assert_eq!(index.len(), 1);
        assert_eq!(index["MP1"], "Glycerin");
    }

    #[test]
    fn test_allergen_breakdown() {
        let lines = vec![
            FormulaLine::new("1", "HE1", "Lavande", dec("2")),
            FormulaLine::new("1", "HE2", "Citron", dec("1")),
            FormulaLine::qsp("", "HE1", "Lavande"),
        ];
        let allergens = vec![
            allergen("HE1", "Linalool", "30"),
            allergen("HE2", "Limonene", "60"),
            allergen("HE2", "Linalool", "10"),
        ];

        let entries = allergen_breakdown(&lines, &allergens);
        assert_eq!(entries.len(), 2);
        // Linalool: 2 * 30% + 1 * 10% = 0.7
        assert_eq!(entries[0].allergen, "Linalool");
        assert_eq!(entries[0].total_percent, dec("0.7"));
        assert_eq!(entries[0].sources.len(), 2);
        assert_eq!(entries[1].allergen, "Limonene");
        assert_eq!(entries[1].total_percent, dec("0.6"));
    }

    #[test]
    fn test_allergen_breakdown_skips_lines_without_code() {
        let lines = vec![FormulaLine::new("1", "", "Inconnu", dec("50"))];
        let allergens = vec![allergen("", "Citral", "10")];
        assert!(allergen_breakdown(&lines, &allergens).is_empty());
    }

    #[test]
    fn test_ifra_report_takes_minimum_per_category() {
        let lines = vec![
            FormulaLine::new("1", "mp501b", "Rose", dec("1")),
            FormulaLine::new("1", "MP600", "Jasmin", dec("1")),
            FormulaLine::new("1", "MP700", "Non restreint", dec("1")),
        ];
        let limits = vec![
            limit("4", "MP501B", "2.5"),
            limit("4", "MP600", "1.2"),
            limit("5A", "MP600", "0.8"),
            limit("4", "OTHER", "0.1"),
        ];

        let report = ifra_report(&lines, &limits);
        assert_eq!(report.restricted_codes, vec!["mp501b", "MP600"]);
        assert_eq!(report.categories.len(), IFRA_CATEGORIES.len());

        let cat4 = report.categories.iter().find(|c| c.category == "4").unwrap();
        assert_eq!(cat4.max_concentration, Some(dec("1.2")));
        let cat5a = report.categories.iter().find(|c| c.category == "5A").unwrap();
        assert_eq!(cat5a.max_concentration, Some(dec("0.8")));
        let cat1 = report.categories.iter().find(|c| c.category == "1").unwrap();
        assert_eq!(cat1.max_concentration, None);
    }
}
