//! WebAssembly module for the Cosmetic Formulary editor
//!
//! Runs the formula balancer in the browser so every keystroke is
//! rebalanced locally:
//! - Applying editor commands to a formula
//! - Summary figures (totals, QSP, cost, phase totals)
//! - Lenient parsing of quantity fields
//! - Side-by-side comparison of formula versions
//!
//! Formulas and edits cross the boundary as JSON strings.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::balancer::*;
pub use shared::compare::*;
pub use shared::models::*;
pub use shared::validation::*;

/// Formula after an edit, with its derived figures
#[derive(Debug, Serialize)]
pub struct EditResult {
    pub formula: Formula,
    pub summary: FormulaSummary,
}

/// Apply one editor command to a formula.
///
/// Returns `{ formula, summary }` as JSON. Throws on malformed JSON or an
/// edit the balancer refuses (bad index, QSP quantity, far move).
#[wasm_bindgen]
pub fn apply_formula_edit(formula_json: &str, edit_json: &str) -> Result<String, JsValue> {
    let result = edit_formula(formula_json, edit_json).map_err(js_error)?;
    if result.summary.is_over_limit {
        warn_over_limit(&result.summary);
    }
    to_json(&result).map_err(js_error)
}

/// Summary figures of a formula, as JSON
#[wasm_bindgen]
pub fn formula_summary(formula_json: &str) -> Result<String, JsValue> {
    let formula = parse_formula(formula_json).map_err(js_error)?;
    to_json(&formula.summary()).map_err(js_error)
}

/// Rebalance a formula loaded from storage or another tab
#[wasm_bindgen]
pub fn rebalance_formula(formula_json: &str) -> Result<String, JsValue> {
    let formula = parse_formula(formula_json).map_err(js_error)?;
    to_json(&formula.rebalanced()).map_err(js_error)
}

/// Empty formula with the default total weight
#[wasm_bindgen]
pub fn new_formula(name: &str) -> Result<String, JsValue> {
    to_json(&Formula::new(name)).map_err(js_error)
}

/// Parse a percent or gram field; junk reads as "0"
#[wasm_bindgen]
pub fn parse_quantity_input(raw: &str) -> String {
    parse_quantity(raw).to_string()
}

/// Keep the first digit 1-9 of a phase field
#[wasm_bindgen]
pub fn normalize_phase_input(raw: &str) -> String {
    normalize_phase(raw)
}

/// Grams for a percentage of the total weight
#[wasm_bindgen]
pub fn grams_for_percent(total_weight: &str, percent: &str) -> String {
    grams_for(parse_quantity(total_weight), parse_quantity(percent)).to_string()
}

/// Percentage for a weight in grams; "0" when the total weight is zero
#[wasm_bindgen]
pub fn percent_for_grams(total_weight: &str, grams: &str) -> String {
    percent_for(parse_quantity(total_weight), parse_quantity(grams)).to_string()
}

/// Whether a decimal string is a complete 100% total
#[wasm_bindgen]
pub fn is_full_formula(total_percent: &str) -> bool {
    Decimal::from_str(total_percent.trim()).map_or(false, |p| p == Decimal::ONE_HUNDRED)
}

/// Compare a JSON array of formula versions against the one at `reference`.
///
/// Versions are sorted by label first; `reference` indexes the sorted list.
#[wasm_bindgen]
pub fn compare_formula_versions(versions_json: &str, reference: usize) -> Result<String, JsValue> {
    let comparison = compare_json(versions_json, reference).map_err(js_error)?;
    to_json(&comparison).map_err(js_error)
}

fn compare_json(versions_json: &str, reference: usize) -> Result<VersionComparison, String> {
    let mut versions: Vec<Formula> = serde_json::from_str(versions_json)
        .map_err(|e| format!("Invalid versions JSON: {}", e))?;
    sort_versions(&mut versions);
    Ok(compare_versions(&versions, reference))
}

fn edit_formula(formula_json: &str, edit_json: &str) -> Result<EditResult, String> {
    let mut formula = parse_formula(formula_json)?;
    let edit: FormulaEdit =
        serde_json::from_str(edit_json).map_err(|e| format!("Invalid edit JSON: {}", e))?;

    formula.apply(edit).map_err(|e| e.to_string())?;
    let summary = formula.summary();
    Ok(EditResult { formula, summary })
}

fn parse_formula(formula_json: &str) -> Result<Formula, String> {
    serde_json::from_str(formula_json).map_err(|e| format!("Invalid formula JSON: {}", e))
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("Serialization failed: {}", e))
}

fn js_error(message: String) -> JsValue {
    js_sys::Error::new(&message).into()
}

#[cfg(target_arch = "wasm32")]
fn warn_over_limit(summary: &FormulaSummary) {
    web_sys::console::warn_1(&JsValue::from_str(&format!(
        "Formula exceeds 100% ({}%)",
        summary.total_percent
    )));
}

#[cfg(not(target_arch = "wasm32"))]
fn warn_over_limit(_summary: &FormulaSummary) {}
