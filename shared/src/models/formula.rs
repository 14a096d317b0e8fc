//! Formula and formula line models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::balancer::{self, BalanceError, FormulaEdit, PhaseTotals};
use crate::models::{FormulaNotes, PhaseTotal, Stability};

/// Target mass of a freshly created formula, in grams
pub const DEFAULT_TOTAL_WEIGHT: Decimal = Decimal::ONE_THOUSAND;

/// Stock colour swatch shown next to a line
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StockIndicator {
    #[default]
    Neutral,
    /// Not in stock
    Red,
    /// In stock
    Green,
    /// Sample only
    Blue,
}

impl StockIndicator {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockIndicator::Neutral => "neutral",
            StockIndicator::Red => "red",
            StockIndicator::Green => "green",
            StockIndicator::Blue => "blue",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "neutral" => Some(StockIndicator::Neutral),
            "red" => Some(StockIndicator::Red),
            "green" => Some(StockIndicator::Green),
            "blue" => Some(StockIndicator::Blue),
            _ => None,
        }
    }
}

/// One ingredient entry in a formula
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct FormulaLine {
    /// Manufacturing phase tag, conventionally a single digit 1-9
    #[validate(length(max = 1))]
    pub phase: String,
    #[validate(length(max = 64))]
    pub ingredient_code: String,
    #[validate(length(max = 255))]
    pub ingredient_name: String,
    /// Share of the total formula weight, 0-100
    pub percent: Decimal,
    /// Absolute weight, `total_weight * percent / 100`
    pub grams: Decimal,
    /// "Quantité suffisante pour": the filler line completing the formula to 100%
    pub is_qsp: bool,
    #[validate(length(max = 2000))]
    pub notes: String,
    pub price_per_kilo: Option<Decimal>,
    pub stock_indicator: Option<StockIndicator>,
}

impl FormulaLine {
    /// Build a line for an ingredient with a given percentage
    pub fn new(phase: &str, ingredient_code: &str, ingredient_name: &str, percent: Decimal) -> Self {
        Self {
            phase: phase.to_string(),
            ingredient_code: ingredient_code.to_string(),
            ingredient_name: ingredient_name.to_string(),
            percent,
            ..Self::default()
        }
    }

    /// Build the QSP line for an ingredient
    pub fn qsp(phase: &str, ingredient_code: &str, ingredient_name: &str) -> Self {
        Self {
            is_qsp: true,
            ..Self::new(phase, ingredient_code, ingredient_name, Decimal::ZERO)
        }
    }

    /// Contribution of this line to the formula's price per kilo
    pub fn cost_per_kilo(&self) -> Option<Decimal> {
        match self.price_per_kilo {
            Some(price) if self.percent > Decimal::ZERO => price
                .checked_mul(self.percent)
                .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED)),
            _ => None,
        }
    }
}

/// A formula: the aggregate root edited in one session and saved as a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Formula {
    pub id: Option<i64>,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 50))]
    pub version: String,
    #[validate(length(max = 200))]
    pub formulator: String,
    #[validate(length(max = 2000))]
    pub improvement_goal: String,
    /// Version retained for manufacturing (one per formula name)
    pub is_active: bool,
    /// Target mass in grams
    pub total_weight: Decimal,
    #[validate]
    pub lines: Vec<FormulaLine>,
    #[validate]
    pub notes: FormulaNotes,
    #[validate]
    pub stability: Stability,
    /// Product photo, as a URL or data URL
    pub image: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for Formula {
    fn default() -> Self {
        Self {
            id: None,
            name: String::new(),
            version: String::new(),
            formulator: String::new(),
            improvement_goal: String::new(),
            is_active: false,
            total_weight: DEFAULT_TOTAL_WEIGHT,
            lines: Vec::new(),
            notes: FormulaNotes::default(),
            stability: Stability::default(),
            image: None,
            created_at: None,
            updated_at: None,
        }
    }
}

impl Formula {
    /// Create an empty formula with the default total weight
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// The QSP line, if one is flagged
    pub fn qsp_line(&self) -> Option<&FormulaLine> {
        self.lines.iter().find(|l| l.is_qsp)
    }

    /// Sum of the percentages of every line, QSP included
    pub fn total_percent(&self) -> Decimal {
        balancer::total_percent(&self.lines)
    }

    /// Sum of the percentages of every non-QSP line
    pub fn non_qsp_percent(&self) -> Decimal {
        balancer::non_qsp_percent(&self.lines)
    }

    /// Warning state: the formula adds up to more than 100%
    pub fn is_over_limit(&self) -> bool {
        balancer::is_over_limit(&self.lines)
    }

    /// Price of one kilogram of finished product
    pub fn cost_per_kilo(&self) -> Decimal {
        balancer::saturating_sum(self.lines.iter().filter_map(FormulaLine::cost_per_kilo))
    }

    /// Per-phase aggregation of the lines
    pub fn phase_totals(&self) -> PhaseTotals<'_> {
        balancer::phase_totals(&self.lines)
    }

    /// Derived, read-only figures for display
    pub fn summary(&self) -> FormulaSummary {
        let non_qsp_percent = self.non_qsp_percent();
        let qsp_percent = self
            .qsp_line()
            .map(|l| l.percent)
            .unwrap_or(Decimal::ZERO);
        let total_percent = self.total_percent();

        FormulaSummary {
            total_percent,
            non_qsp_percent,
            qsp_percent,
            is_over_limit: total_percent > Decimal::ONE_HUNDRED,
            total_weight: self.total_weight,
            cost_per_kilo: self.cost_per_kilo(),
            line_count: self.lines.len(),
            phase_totals: self.phase_totals().collect(),
        }
    }

    /// Apply one editing command.
    ///
    /// Either the whole edit succeeds or the formula is left untouched.
    pub fn apply(&mut self, edit: FormulaEdit) -> Result<(), BalanceError> {
        let (lines, total_weight) = edit.apply_to(self.lines.clone(), self.total_weight)?;
        self.lines = lines;
        self.total_weight = total_weight;
        Ok(())
    }

    /// Re-establish every balancing invariant on a formula loaded from elsewhere
    pub fn rebalanced(mut self) -> Self {
        let lines = std::mem::take(&mut self.lines);
        self.lines = balancer::sort_by_phase(balancer::recompute_qsp(
            balancer::set_total_weight(lines, self.total_weight),
            self.total_weight,
        ));
        self
    }

    /// Where a save of this formula lands.
    ///
    /// `original_version` is the version the formula carried when it was
    /// loaded into the editor. A loaded formula whose version was changed is
    /// saved as a new version; otherwise a loaded formula overwrites its own
    /// row and a fresh one is matched by name and version.
    pub fn save_target(&self, original_version: Option<&str>) -> SaveTarget {
        match (self.id, original_version) {
            (Some(source_id), Some(original)) if self.version.trim() != original.trim() => {
                SaveTarget::NewVersion { source_id }
            }
            (Some(id), _) => SaveTarget::UpdateById(id),
            (None, _) => SaveTarget::ByNameVersion,
        }
    }

    /// Copy of this formula as a fresh, inactive version with its stability
    /// test reset
    pub fn into_new_version(self) -> Self {
        Self {
            id: None,
            is_active: false,
            stability: Stability::default(),
            created_at: None,
            updated_at: None,
            ..self
        }
    }

    /// Formula as a save to `target` stores it
    pub fn prepared_for(self, target: SaveTarget) -> Self {
        match target {
            SaveTarget::NewVersion { .. } => self.into_new_version(),
            SaveTarget::ByNameVersion | SaveTarget::UpdateById(_) => self,
        }
        .rebalanced()
    }
}

/// Stored row a save writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTarget {
    /// Overwrite the row with the same name and version, or insert one
    ByNameVersion,
    /// Overwrite the loaded row, renames included
    UpdateById(i64),
    /// Insert a new version derived from the loaded row
    NewVersion { source_id: i64 },
}

/// Read-only figures derived from a formula
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaSummary {
    pub total_percent: Decimal,
    pub non_qsp_percent: Decimal,
    pub qsp_percent: Decimal,
    pub is_over_limit: bool,
    pub total_weight: Decimal,
    pub cost_per_kilo: Decimal,
    pub line_count: usize,
    pub phase_totals: Vec<PhaseTotal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_new_formula_defaults() {
        let formula = Formula::new("Crème hydratante");
        assert_eq!(formula.total_weight, dec("1000"));
        assert!(formula.lines.is_empty());
        assert!(formula.qsp_line().is_none());
        assert!(!formula.is_over_limit());
    }

    #[test]
    fn test_cost_per_kilo() {
        let mut formula = Formula::new("Sérum");
        let mut oil = FormulaLine::new("1", "MP001", "Huile de jojoba", dec("20"));
        oil.price_per_kilo = Some(dec("30"));
        let mut water = FormulaLine::new("1", "MP002", "Eau", dec("80"));
        water.price_per_kilo = Some(dec("0.5"));
        let unpriced = FormulaLine::new("2", "MP003", "Parfum", dec("1"));
        formula.lines = vec![oil, water, unpriced];

        // 30 * 20% + 0.5 * 80% = 6 + 0.4
        assert_eq!(formula.cost_per_kilo(), dec("6.4"));
    }

    #[test]
    fn test_line_cost_ignores_zero_percent() {
        let mut line = FormulaLine::new("1", "MP001", "Glycérine", Decimal::ZERO);
        line.price_per_kilo = Some(dec("4"));
        assert_eq!(line.cost_per_kilo(), None);
    }

    #[test]
    fn test_summary_over_limit() {
        let mut formula = Formula::new("Baume");
        formula.lines = vec![
            FormulaLine::new("", "A", "A", dec("30")),
            FormulaLine::new("", "B", "B", dec("30")),
            FormulaLine::new("", "C", "C", dec("50")),
        ];
        let summary = formula.summary();
        assert_eq!(summary.total_percent, dec("110"));
        assert!(summary.is_over_limit);
        assert_eq!(summary.qsp_percent, Decimal::ZERO);
        assert_eq!(summary.line_count, 3);
    }

    #[test]
    fn test_apply_failed_edit_leaves_formula_untouched() {
        let mut formula = Formula::new("Gel");
        formula.lines = vec![FormulaLine::new("1", "A", "A", dec("10"))];
        let before = formula.clone();

        let result = formula.apply(FormulaEdit::SetPercent {
            index: 5,
            value: "20".to_string(),
        });

        assert!(result.is_err());
        assert_eq!(formula, before);
    }

    #[test]
    fn test_rebalanced_restores_invariants() {
        let mut formula = Formula::new("Lotion");
        formula.total_weight = dec("200");
        formula.lines = vec![
            FormulaLine::new("2", "B", "B", dec("10")),
            FormulaLine::qsp("1", "EAU", "Eau"),
            FormulaLine::new("1", "A", "A", dec("15")),
        ];

        let formula = formula.rebalanced();

        assert!(formula.lines[0].is_qsp);
        assert_eq!(formula.lines[0].percent, dec("75"));
        assert_eq!(formula.lines[0].grams, dec("150"));
        assert_eq!(formula.lines[1].ingredient_code, "A");
        assert_eq!(formula.lines[1].grams, dec("30"));
        assert_eq!(formula.lines[2].ingredient_code, "B");
    }

    #[test]
    fn test_stock_indicator_round_trip() {
        for indicator in [
            StockIndicator::Neutral,
            StockIndicator::Red,
            StockIndicator::Green,
            StockIndicator::Blue,
        ] {
            assert_eq!(StockIndicator::parse(indicator.as_str()), Some(indicator));
        }
        assert_eq!(StockIndicator::parse("purple"), None);
    }

    #[test]
    fn test_formula_validation() {
        let mut formula = Formula::new("");
        assert!(formula.validate().is_err());

        formula.name = "Shampooing".to_string();
        formula.lines = vec![FormulaLine::new("12", "A", "A", dec("1"))];
        assert!(formula.validate().is_err());

        formula.lines[0].phase = "1".to_string();
        assert!(formula.validate().is_ok());

        formula.notes.ph = "x".repeat(51);
        assert!(formula.validate().is_err());
    }

    #[test]
    fn test_save_target() {
        let mut formula = Formula::new("Crème");
        formula.version = "2".to_string();
        assert_eq!(formula.save_target(None), SaveTarget::ByNameVersion);
        assert_eq!(formula.save_target(Some("1")), SaveTarget::ByNameVersion);

        formula.id = Some(7);
        assert_eq!(formula.save_target(None), SaveTarget::UpdateById(7));
        assert_eq!(formula.save_target(Some(" 2 ")), SaveTarget::UpdateById(7));
        assert_eq!(
            formula.save_target(Some("1")),
            SaveTarget::NewVersion { source_id: 7 }
        );
    }

    #[test]
    fn test_into_new_version_resets_stability() {
        let mut formula = Formula::new("Crème");
        formula.id = Some(7);
        formula.version = "2".to_string();
        formula.is_active = true;
        formula.notes.ph = "5.5".to_string();
        formula.stability = Stability::start(Utc::now());
        formula.lines = vec![FormulaLine::new("1", "A", "A", dec("10"))];

        let copy = formula.clone().into_new_version();
        assert_eq!(copy.id, None);
        assert!(!copy.is_active);
        assert!(!copy.stability.is_running());
        assert!(copy.stability.days.is_empty());
        assert_eq!(copy.notes, formula.notes);
        assert_eq!(copy.lines, formula.lines);
        assert_eq!(copy.version, "2");
    }

    #[test]
    fn test_prepared_for_keeps_loaded_row_state() {
        let mut formula = Formula::new("Crème");
        formula.id = Some(7);
        formula.version = "2".to_string();
        formula.is_active = true;
        formula.stability = Stability::start(Utc::now());
        let mut water = FormulaLine::new("1", "EAU", "Eau", Decimal::ZERO);
        water.is_qsp = true;
        formula.lines = vec![water, FormulaLine::new("1", "A", "A", dec("10"))];

        let renamed = Formula {
            name: "Crème riche".to_string(),
            ..formula.clone()
        };
        let target = renamed.save_target(Some("2"));
        let stored = renamed.prepared_for(target);
        assert_eq!(stored.id, Some(7));
        assert_eq!(stored.name, "Crème riche");
        assert!(stored.is_active);
        assert!(stored.stability.is_running());
        let qsp = stored.lines.iter().find(|l| l.is_qsp).map(|l| l.percent);
        assert_eq!(qsp, Some(dec("90")));

        formula.version = "3".to_string();
        let target = formula.save_target(Some("2"));
        let stored = formula.prepared_for(target);
        assert_eq!(stored.id, None);
        assert!(!stored.is_active);
        assert!(!stored.stability.is_running());
        assert_eq!(stored.version, "3");
    }

    #[test]
    fn test_cost_per_kilo_does_not_overflow() {
        let mut formula = Formula::new("Sérum");
        let mut line = FormulaLine::new("1", "A", "A", dec("50"));
        line.price_per_kilo = Some(Decimal::MAX);
        formula.lines = vec![line.clone(), line];
        assert_eq!(formula.lines[0].cost_per_kilo(), None);
        assert_eq!(formula.cost_per_kilo(), Decimal::ZERO);
    }
}
