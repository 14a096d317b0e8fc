//! Side-by-side comparison of the versions of one formula
//!
//! Versions are matched line by line on the ingredient (code, or name when
//! the code is empty). Every cell is classified against a reference version.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Formula, FormulaLine};

/// Identifier of a line across versions: its ingredient code, else its name
pub fn line_key(line: &FormulaLine) -> String {
    let code = line.ingredient_code.trim();
    if code.is_empty() {
        line.ingredient_name.trim().to_string()
    } else {
        code.to_string()
    }
}

/// Whether two lines carry the same ingredient, phase and quantities
pub fn lines_equal(a: &FormulaLine, b: &FormulaLine) -> bool {
    a.phase.trim() == b.phase.trim()
        && a.percent == b.percent
        && a.grams == b.grams
        && a.ingredient_code.trim() == b.ingredient_code.trim()
        && a.ingredient_name.trim() == b.ingredient_name.trim()
}

/// Order version labels numerically when both start with a number, as text otherwise
pub fn compare_version_labels(a: &str, b: &str) -> Ordering {
    let (a, b) = (a.trim(), b.trim());
    match (leading_number(a), leading_number(b)) {
        (Some(na), Some(nb)) => na.cmp(&nb),
        _ => a.cmp(b),
    }
}

/// Sort versions of a formula from oldest to newest label
pub fn sort_versions(versions: &mut [Formula]) {
    versions.sort_by(|a, b| compare_version_labels(&a.version, &b.version));
}

fn leading_number(label: &str) -> Option<i64> {
    let digits: String = label.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// How a version's line relates to the reference version's line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineChange {
    /// Cell of the reference version itself
    Reference,
    /// Same phase, quantities and ingredient as the reference
    Unchanged,
    /// Higher percentage than the reference
    More,
    /// Lower percentage than the reference
    Less,
    /// Same percentage, but phase or grams differ
    Modified,
    /// Absent from the reference
    Added,
    /// Absent from this version
    Missing,
}

/// One version's value for an ingredient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineCell {
    pub percent: Option<Decimal>,
    pub change: LineChange,
}

/// One ingredient across all versions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineComparison {
    pub key: String,
    pub display_name: String,
    pub cells: Vec<LineCell>,
}

/// One header field across all versions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterComparison {
    pub parameter: String,
    pub values: Vec<String>,
    /// Per version: the value differs from the reference's
    pub differs_from_reference: Vec<bool>,
    /// Per version: the value differs from another non-reference version
    pub differs_between_others: Vec<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionHeader {
    pub id: Option<i64>,
    pub version: String,
    pub is_active: bool,
}

/// Comparison table of the versions of one formula
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionComparison {
    pub reference: usize,
    pub versions: Vec<VersionHeader>,
    pub parameters: Vec<ParameterComparison>,
    pub lines: Vec<LineComparison>,
}

/// Header fields shown in a comparison, in display order
pub const COMPARED_PARAMETERS: &[&str] = &[
    "version",
    "improvement_goal",
    "formulator",
    "stability_start",
    "protocol",
    "appearance",
    "ph",
];

fn parameter_value(formula: &Formula, parameter: &str) -> String {
    let value = match parameter {
        "version" => &formula.version,
        "improvement_goal" => &formula.improvement_goal,
        "formulator" => &formula.formulator,
        "stability_start" => {
            return formula
                .stability
                .start_date
                .map(|d| d.date_naive().to_string())
                .unwrap_or_default();
        }
        "protocol" => &formula.notes.protocol,
        "appearance" => &formula.notes.appearance,
        "ph" => &formula.notes.ph,
        _ => return String::new(),
    };
    value.trim().to_string()
}

/// Compare versions against the one at index `reference`.
///
/// An out-of-range reference falls back to the first version. Ingredient rows
/// are ordered by key.
pub fn compare_versions(versions: &[Formula], reference: usize) -> VersionComparison {
    let reference = if reference < versions.len() { reference } else { 0 };

    let headers = versions
        .iter()
        .map(|f| VersionHeader {
            id: f.id,
            version: f.version.clone(),
            is_active: f.is_active,
        })
        .collect();

    let parameters = COMPARED_PARAMETERS
        .iter()
        .map(|name| compare_parameter(versions, reference, name))
        .collect();

    let maps: Vec<HashMap<String, &FormulaLine>> = versions
        .iter()
        .map(|f| {
            let mut map = HashMap::new();
            for line in &f.lines {
                map.entry(line_key(line)).or_insert(line);
            }
            map
        })
        .collect();

    let keys: BTreeSet<String> = maps.iter().flat_map(|m| m.keys().cloned()).collect();

    let lines = keys
        .into_iter()
        .map(|key| {
            let reference_line = maps.get(reference).and_then(|m| m.get(&key)).copied();
            let display_name = maps
                .iter()
                .find_map(|m| m.get(&key))
                .map(|l| {
                    let name = l.ingredient_name.trim();
                    if name.is_empty() {
                        l.ingredient_code.trim().to_string()
                    } else {
                        name.to_string()
                    }
                })
                .unwrap_or_else(|| key.clone());

            let cells = maps
                .iter()
                .enumerate()
                .map(|(i, m)| {
                    let line = m.get(&key).copied();
                    LineCell {
                        percent: line.map(|l| l.percent),
                        change: classify(line, reference_line, i == reference),
                    }
                })
                .collect();

            LineComparison {
                key,
                display_name,
                cells,
            }
        })
        .collect();

    VersionComparison {
        reference,
        versions: headers,
        parameters,
        lines,
    }
}

fn classify(
    line: Option<&FormulaLine>,
    reference_line: Option<&FormulaLine>,
    is_reference: bool,
) -> LineChange {
    match (line, reference_line) {
        (None, _) => LineChange::Missing,
        (Some(_), _) if is_reference => LineChange::Reference,
        (Some(_), None) => LineChange::Added,
        (Some(line), Some(reference)) => match line.percent.cmp(&reference.percent) {
            Ordering::Greater => LineChange::More,
            Ordering::Less => LineChange::Less,
            Ordering::Equal if lines_equal(line, reference) => LineChange::Unchanged,
            Ordering::Equal => LineChange::Modified,
        },
    }
}

fn compare_parameter(versions: &[Formula], reference: usize, name: &str) -> ParameterComparison {
    let values: Vec<String> = versions.iter().map(|f| parameter_value(f, name)).collect();
    let reference_value = values.get(reference).cloned().unwrap_or_default();
    let others = values.len().saturating_sub(1);

    let differs_from_reference = values
        .iter()
        .enumerate()
        .map(|(i, v)| i != reference && *v != reference_value)
        .collect();

    let differs_between_others = values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            i != reference
                && others >= 2
                && values
                    .iter()
                    .enumerate()
                    .any(|(j, w)| j != reference && j != i && w != v)
        })
        .collect();

    ParameterComparison {
        parameter: name.to_string(),
        values,
        differs_from_reference,
        differs_between_others,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn version(id: i64, label: &str, lines: Vec<FormulaLine>) -> Formula {
        let mut formula = Formula::new("Crème de nuit");
        formula.id = Some(id);
        formula.version = label.to_string();
        formula.lines = lines;
        formula
    }

    fn row<'a>(comparison: &'a VersionComparison, key: &str) -> &'a LineComparison {
        comparison.lines.iter().find(|l| l.key == key).unwrap()
    }

    #[test]
    fn test_line_key_falls_back_to_name() {
        let coded = FormulaLine::new("1", " MP1 ", "Glycérine", dec("1"));
        let uncoded = FormulaLine::new("1", "", " Eau florale ", dec("1"));
        assert_eq!(line_key(&coded), "MP1");
        assert_eq!(line_key(&uncoded), "Eau florale");
    }

    #[test]
    fn test_lines_equal_ignores_padding() {
        let a = FormulaLine::new("1", "MP1", "Glycérine", dec("5"));
        let mut b = FormulaLine::new(" 1", "MP1 ", "Glycérine", dec("5.0"));
        assert!(lines_equal(&a, &b));

        b.phase = "2".to_string();
        assert!(!lines_equal(&a, &b));
    }

    #[test]
    fn test_version_labels_sort_numerically() {
        let mut versions = vec![
            version(1, "10", vec![]),
            version(2, "2", vec![]),
            version(3, "1", vec![]),
        ];
        sort_versions(&mut versions);
        let labels: Vec<&str> = versions.iter().map(|v| v.version.as_str()).collect();
        assert_eq!(labels, vec!["1", "2", "10"]);

        assert_eq!(compare_version_labels("b", "a"), Ordering::Greater);
        assert_eq!(compare_version_labels("2", "beta"), Ordering::Less);
    }

    #[test]
    fn test_compare_classifies_lines() {
        let v1 = version(
            1,
            "1",
            vec![
                FormulaLine::new("1", "MP1", "Glycérine", dec("5")),
                FormulaLine::new("1", "MP2", "Huile", dec("10")),
                FormulaLine::new("2", "MP3", "Parfum", dec("1")),
                FormulaLine::new("2", "MP4", "Conservateur", dec("0.5")),
            ],
        );
        let mut moved = FormulaLine::new("3", "MP3", "Parfum", dec("1"));
        moved.grams = dec("10");
        let v2 = version(
            2,
            "2",
            vec![
                FormulaLine::new("1", "MP1", "Glycérine", dec("5")),
                FormulaLine::new("1", "MP2", "Huile", dec("12")),
                moved,
                FormulaLine::new("2", "MP5", "Vitamine E", dec("0.2")),
            ],
        );

        let comparison = compare_versions(&[v1, v2], 0);

        assert_eq!(comparison.reference, 0);
        let keys: Vec<&str> = comparison.lines.iter().map(|l| l.key.as_str()).collect();
        assert_eq!(keys, vec!["MP1", "MP2", "MP3", "MP4", "MP5"]);

        assert_eq!(row(&comparison, "MP1").cells[0].change, LineChange::Reference);
        assert_eq!(row(&comparison, "MP1").cells[1].change, LineChange::Unchanged);
        assert_eq!(row(&comparison, "MP2").cells[1].change, LineChange::More);
        assert_eq!(row(&comparison, "MP2").cells[1].percent, Some(dec("12")));
        assert_eq!(row(&comparison, "MP3").cells[1].change, LineChange::Modified);
        assert_eq!(row(&comparison, "MP4").cells[1].change, LineChange::Missing);
        assert_eq!(row(&comparison, "MP4").cells[1].percent, None);
        assert_eq!(row(&comparison, "MP5").cells[0].change, LineChange::Missing);
        assert_eq!(row(&comparison, "MP5").cells[1].change, LineChange::Added);
        assert_eq!(row(&comparison, "MP5").display_name, "Vitamine E");
    }

    #[test]
    fn test_compare_against_later_reference() {
        let v1 = version(1, "1", vec![FormulaLine::new("1", "MP1", "A", dec("8"))]);
        let v2 = version(2, "2", vec![FormulaLine::new("1", "MP1", "A", dec("5"))]);

        let comparison = compare_versions(&[v1, v2], 1);
        let cells = &row(&comparison, "MP1").cells;
        assert_eq!(cells[0].change, LineChange::More);
        assert_eq!(cells[1].change, LineChange::Reference);

        let fallback = compare_versions(&comparison_versions(), 9);
        assert_eq!(fallback.reference, 0);
    }

    fn comparison_versions() -> Vec<Formula> {
        vec![version(1, "1", vec![]), version(2, "2", vec![])]
    }

    #[test]
    fn test_compare_parameters() {
        let mut v1 = version(1, "1", vec![]);
        v1.formulator = "Claire".to_string();
        let mut v2 = version(2, "2", vec![]);
        v2.formulator = "Claire".to_string();
        v2.notes.ph = "5.5".to_string();
        let mut v3 = version(3, "3", vec![]);
        v3.formulator = "Marc".to_string();
        v3.notes.ph = "5.5".to_string();

        let comparison = compare_versions(&[v1, v2, v3], 0);
        let param = |name: &str| {
            comparison
                .parameters
                .iter()
                .find(|p| p.parameter == name)
                .unwrap()
        };

        let formulator = param("formulator");
        assert_eq!(formulator.values, vec!["Claire", "Claire", "Marc"]);
        assert_eq!(formulator.differs_from_reference, vec![false, false, true]);
        assert_eq!(formulator.differs_between_others, vec![false, true, true]);

        let ph = param("ph");
        assert_eq!(ph.differs_from_reference, vec![false, true, true]);
        assert_eq!(ph.differs_between_others, vec![false, false, false]);
    }

    #[test]
    fn test_compare_no_versions() {
        let comparison = compare_versions(&[], 0);
        assert!(comparison.versions.is_empty());
        assert!(comparison.lines.is_empty());
        assert!(comparison.parameters.iter().all(|p| p.values.is_empty()));
    }
}
