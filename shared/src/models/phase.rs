//! Manufacturing phase grouping

use std::cmp::Ordering;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::FormulaLine;

/// Numeric rank of a phase tag: the digit itself, or 0 for anything else
pub fn numeric_phase(phase: &str) -> u8 {
    let mut chars = phase.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => c.to_digit(10).map_or(0, |d| d as u8),
        _ => 0,
    }
}

/// Grouping key used for phase totals
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "label", rename_all = "snake_case")]
pub enum PhaseKey {
    /// QSP line without a phase of its own
    Qsp,
    /// Lines with no phase
    Unphased,
    Phase(String),
}

impl PhaseKey {
    /// Key a line is grouped under. A QSP line with a phase joins that phase.
    pub fn of(line: &FormulaLine) -> Self {
        let phase = line.phase.trim();
        match (phase.is_empty(), line.is_qsp) {
            (true, true) => PhaseKey::Qsp,
            (true, false) => PhaseKey::Unphased,
            (false, _) => PhaseKey::Phase(phase.to_string()),
        }
    }

    /// Same rank `sort_by_phase` gives the lines of this group
    pub fn rank(&self) -> u8 {
        match self {
            PhaseKey::Phase(p) => numeric_phase(p),
            PhaseKey::Qsp | PhaseKey::Unphased => 0,
        }
    }

    /// Whether the group comes from an explicit phase or a QSP line
    pub fn is_phased(&self) -> bool {
        !matches!(self, PhaseKey::Unphased)
    }

    /// Display label
    pub fn label(&self) -> &str {
        match self {
            PhaseKey::Qsp => "QSP",
            PhaseKey::Unphased => "",
            PhaseKey::Phase(p) => p,
        }
    }

    fn ordinal(&self) -> u8 {
        match self {
            PhaseKey::Qsp => 0,
            PhaseKey::Unphased => 1,
            PhaseKey::Phase(_) => 2,
        }
    }
}

impl Ord for PhaseKey {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.rank(), self.ordinal(), self.label()).cmp(&(other.rank(), other.ordinal(), other.label()))
    }
}

impl PartialOrd for PhaseKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for PhaseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseKey::Qsp => write!(f, "QSP"),
            PhaseKey::Unphased => write!(f, "No phase"),
            PhaseKey::Phase(p) => write!(f, "Phase {}", p),
        }
    }
}

/// Aggregated figures for one phase group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTotal {
    pub key: PhaseKey,
    pub percent_sum: Decimal,
    pub grams_sum: Decimal,
    pub count: usize,
    pub has_qsp: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_phase() {
        assert_eq!(numeric_phase("1"), 1);
        assert_eq!(numeric_phase("9"), 9);
        assert_eq!(numeric_phase(" 3 "), 3);
        assert_eq!(numeric_phase(""), 0);
        assert_eq!(numeric_phase("A"), 0);
        assert_eq!(numeric_phase("12"), 0);
    }

    #[test]
    fn test_key_of_line() {
        let mut line = FormulaLine::default();
        assert_eq!(PhaseKey::of(&line), PhaseKey::Unphased);

        line.is_qsp = true;
        assert_eq!(PhaseKey::of(&line), PhaseKey::Qsp);

        line.phase = "2".to_string();
        assert_eq!(PhaseKey::of(&line), PhaseKey::Phase("2".to_string()));
    }

    #[test]
    fn test_key_ordering() {
        let mut keys = vec![
            PhaseKey::Phase("3".to_string()),
            PhaseKey::Unphased,
            PhaseKey::Phase("1".to_string()),
            PhaseKey::Qsp,
            PhaseKey::Phase("A".to_string()),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                PhaseKey::Qsp,
                PhaseKey::Unphased,
                PhaseKey::Phase("A".to_string()),
                PhaseKey::Phase("1".to_string()),
                PhaseKey::Phase("3".to_string()),
            ]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(PhaseKey::Qsp.to_string(), "QSP");
        assert_eq!(PhaseKey::Phase("2".to_string()).to_string(), "Phase 2");
    }
}
