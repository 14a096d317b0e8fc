//! Formula balancing: percent/gram reconciliation, QSP fill and phase ordering
//!
//! Every function takes the line list by value and hands back the updated
//! list. Nothing here keeps state or performs I/O; the caller owns the
//! read-modify-write cycle of its formula.
//!
//! Contract violations (an index past the end, editing the QSP line's
//! quantities, a non-adjacent move) are reported as [`BalanceError`] rather
//! than ignored. User input mistakes are never errors: quantities are parsed
//! with [`parse_quantity`](crate::validation::parse_quantity) and fall back
//! to zero.
//!
//! Arithmetic never panics. A product or quotient that does not fit in a
//! `Decimal` reads as zero, like any other invalid quantity, and sums
//! saturate at the `Decimal` bounds.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{numeric_phase, FormulaLine, PhaseKey, PhaseTotal, StockIndicator};
use crate::validation::{
    in_range, normalize_phase, parse_decimal, parse_optional_price, parse_quantity,
};

/// Errors raised when a caller breaks the balancer's contract
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BalanceError {
    #[error("Line index {index} is out of range for a formula with {len} lines")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Line {index} is the QSP line; its quantity is computed")]
    QspNotEditable { index: usize },

    #[error("Lines can only move by one position (from {from} to {to})")]
    NonAdjacentMove { from: usize, to: usize },
}

// ============================================================================
// Conversions
// ============================================================================

/// Grams represented by `percent` of `total_weight`; zero on overflow
pub fn grams_for(total_weight: Decimal, percent: Decimal) -> Decimal {
    total_weight
        .checked_mul(percent)
        .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::ZERO)
}

/// Percentage represented by `grams` of `total_weight`; zero when the total
/// is zero or the ratio overflows
pub fn percent_for(total_weight: Decimal, grams: Decimal) -> Decimal {
    if total_weight.is_zero() {
        return Decimal::ZERO;
    }
    grams
        .checked_div(total_weight)
        .and_then(|v| v.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::ZERO)
}

/// Sum that saturates at the `Decimal` bounds instead of overflowing
pub fn saturating_sum(values: impl IntoIterator<Item = Decimal>) -> Decimal {
    values
        .into_iter()
        .fold(Decimal::ZERO, Decimal::saturating_add)
}

// ============================================================================
// Derived figures
// ============================================================================

/// Sum of every line's percentage
pub fn total_percent(lines: &[FormulaLine]) -> Decimal {
    saturating_sum(lines.iter().map(|l| l.percent))
}

/// Sum of the percentages of the non-QSP lines
pub fn non_qsp_percent(lines: &[FormulaLine]) -> Decimal {
    saturating_sum(lines.iter().filter(|l| !l.is_qsp).map(|l| l.percent))
}

/// Warning state: the lines add up to more than 100%
pub fn is_over_limit(lines: &[FormulaLine]) -> bool {
    total_percent(lines) > Decimal::ONE_HUNDRED
}

// ============================================================================
// Balancing operations
// ============================================================================

/// Recompute the QSP line so the formula reaches 100%.
///
/// The QSP percentage floors at zero when the other lines already exceed 100%.
/// Lines without a QSP flag are returned as is.
pub fn recompute_qsp(mut lines: Vec<FormulaLine>, total_weight: Decimal) -> Vec<FormulaLine> {
    let Some(qsp_index) = lines.iter().position(|l| l.is_qsp) else {
        return lines;
    };

    let others = saturating_sum(
        lines
            .iter()
            .enumerate()
            .filter(|(i, l)| *i != qsp_index && !l.is_qsp)
            .map(|(_, l)| l.percent),
    );
    let percent = Decimal::ONE_HUNDRED
        .saturating_sub(others)
        .max(Decimal::ZERO);

    if let Some(qsp) = lines.get_mut(qsp_index) {
        qsp.percent = percent;
        qsp.grams = grams_for(total_weight, percent);
    }
    lines
}

/// Flag the line at `index` as QSP and clear the flag everywhere else.
///
/// The most recent toggle always wins.
pub fn set_qsp_flag(
    mut lines: Vec<FormulaLine>,
    index: usize,
    total_weight: Decimal,
) -> Result<Vec<FormulaLine>, BalanceError> {
    check_index(&lines, index)?;
    for (i, line) in lines.iter_mut().enumerate() {
        line.is_qsp = i == index;
    }
    Ok(recompute_qsp(lines, total_weight))
}

/// Uncheck the QSP flag of one line. It keeps its last computed quantities.
pub fn clear_qsp_flag(
    mut lines: Vec<FormulaLine>,
    index: usize,
) -> Result<Vec<FormulaLine>, BalanceError> {
    line_mut(&mut lines, index)?.is_qsp = false;
    Ok(lines)
}

/// Set a line's percentage; its grams follow from `total_weight`.
///
/// Negative values are clamped to zero.
pub fn set_percent(
    mut lines: Vec<FormulaLine>,
    index: usize,
    new_percent: Decimal,
    total_weight: Decimal,
) -> Result<Vec<FormulaLine>, BalanceError> {
    let line = editable_line(&mut lines, index)?;
    let percent = new_percent.max(Decimal::ZERO);
    line.percent = percent;
    line.grams = grams_for(total_weight, percent);

    Ok(sort_by_phase(recompute_qsp(lines, total_weight)))
}

/// Set a line's weight in grams; its percentage follows from `total_weight`.
///
/// With a zero total weight the percentage is zero.
pub fn set_grams(
    mut lines: Vec<FormulaLine>,
    index: usize,
    new_grams: Decimal,
    total_weight: Decimal,
) -> Result<Vec<FormulaLine>, BalanceError> {
    let line = editable_line(&mut lines, index)?;
    let grams = new_grams.max(Decimal::ZERO);
    line.grams = grams;
    line.percent = percent_for(total_weight, grams);

    Ok(sort_by_phase(recompute_qsp(lines, total_weight)))
}

/// Rescale every line to a new total weight, keeping percentages fixed.
///
/// A negative weight is ignored and the lines come back unchanged.
pub fn set_total_weight(mut lines: Vec<FormulaLine>, new_total_weight: Decimal) -> Vec<FormulaLine> {
    if new_total_weight < Decimal::ZERO {
        return lines;
    }
    for line in &mut lines {
        line.grams = grams_for(new_total_weight, line.percent);
    }
    recompute_qsp(lines, new_total_weight)
}

/// Stable sort by `(numeric phase, QSP first)`.
///
/// Empty and non-digit phases rank as phase 0, so a QSP line without a phase
/// comes first overall.
pub fn sort_by_phase(mut lines: Vec<FormulaLine>) -> Vec<FormulaLine> {
    lines.sort_by_key(|l| (numeric_phase(&l.phase), !l.is_qsp));
    lines
}

/// Swap a line with its neighbour. Does not re-sort, so a manual order
/// inside a phase block survives until the next phase edit.
pub fn move_line(
    mut lines: Vec<FormulaLine>,
    from: usize,
    to: usize,
) -> Result<Vec<FormulaLine>, BalanceError> {
    check_index(&lines, from)?;
    check_index(&lines, to)?;
    if from.abs_diff(to) != 1 {
        return Err(BalanceError::NonAdjacentMove { from, to });
    }
    lines.swap(from, to);
    Ok(lines)
}

/// Append a blank line at the end
pub fn add_line(mut lines: Vec<FormulaLine>) -> Vec<FormulaLine> {
    lines.push(FormulaLine::default());
    lines
}

/// Remove a line and rebalance what is left
pub fn remove_line(
    mut lines: Vec<FormulaLine>,
    index: usize,
    total_weight: Decimal,
) -> Result<Vec<FormulaLine>, BalanceError> {
    check_index(&lines, index)?;
    lines.remove(index);
    Ok(sort_by_phase(recompute_qsp(lines, total_weight)))
}

/// Change a line's phase from raw input (first digit 1-9 kept) and re-sort
pub fn set_phase(
    mut lines: Vec<FormulaLine>,
    index: usize,
    raw: &str,
) -> Result<Vec<FormulaLine>, BalanceError> {
    line_mut(&mut lines, index)?.phase = normalize_phase(raw);
    Ok(sort_by_phase(lines))
}

// ============================================================================
// Phase totals
// ============================================================================

/// Aggregate lines per phase.
///
/// The returned iterator is lazy: each group is summed when it is reached.
/// It can be cloned to restart from the first group.
pub fn phase_totals(lines: &[FormulaLine]) -> PhaseTotals<'_> {
    let keys: BTreeSet<PhaseKey> = lines.iter().map(PhaseKey::of).collect();
    PhaseTotals {
        lines,
        keys: keys.into_iter().collect(),
        next: 0,
    }
}

/// Iterator over [`PhaseTotal`] groups, ordered like `sort_by_phase`
#[derive(Debug, Clone)]
pub struct PhaseTotals<'a> {
    lines: &'a [FormulaLine],
    keys: Vec<PhaseKey>,
    next: usize,
}

impl Iterator for PhaseTotals<'_> {
    type Item = PhaseTotal;

    fn next(&mut self) -> Option<PhaseTotal> {
        let key = self.keys.get(self.next)?.clone();
        self.next += 1;

        let mut percent_sum = Decimal::ZERO;
        let mut grams_sum = Decimal::ZERO;
        let mut count = 0;
        let mut has_qsp = false;
        for line in self.lines.iter().filter(|l| PhaseKey::of(l) == key) {
            percent_sum = percent_sum.saturating_add(line.percent);
            grams_sum = grams_sum.saturating_add(line.grams);
            count += 1;
            has_qsp |= line.is_qsp;
        }

        Some(PhaseTotal {
            key,
            percent_sum,
            grams_sum,
            count,
            has_qsp,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.keys.len() - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PhaseTotals<'_> {}

impl std::iter::FusedIterator for PhaseTotals<'_> {}

// ============================================================================
// Edit commands
// ============================================================================

/// One user edit on a formula, as sent by the editor.
///
/// Quantities arrive as the raw text typed in the form field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FormulaEdit {
    AddLine,
    RemoveLine { index: usize },
    MoveLine { from: usize, to: usize },
    SetPhase { index: usize, phase: String },
    SetPercent { index: usize, value: String },
    SetGrams { index: usize, value: String },
    SetTotalWeight { value: String },
    SetQsp { index: usize, checked: bool },
    SelectIngredient {
        index: usize,
        code: String,
        name: String,
        price_per_kilo: Option<Decimal>,
    },
    SetPricePerKilo { index: usize, value: String },
    SetNotes { index: usize, notes: String },
    SetStockIndicator {
        index: usize,
        indicator: Option<StockIndicator>,
    },
    SortByPhase,
}

impl FormulaEdit {
    /// Apply the edit to a line list, returning the new lines and total weight
    pub fn apply_to(
        self,
        lines: Vec<FormulaLine>,
        total_weight: Decimal,
    ) -> Result<(Vec<FormulaLine>, Decimal), BalanceError> {
        let lines = match self {
            FormulaEdit::AddLine => add_line(lines),
            FormulaEdit::RemoveLine { index } => remove_line(lines, index, total_weight)?,
            FormulaEdit::MoveLine { from, to } => move_line(lines, from, to)?,
            FormulaEdit::SetPhase { index, phase } => set_phase(lines, index, &phase)?,
            FormulaEdit::SetPercent { index, value } => {
                set_percent(lines, index, parse_quantity(&value), total_weight)?
            }
            FormulaEdit::SetGrams { index, value } => {
                set_grams(lines, index, parse_quantity(&value), total_weight)?
            }
            FormulaEdit::SetTotalWeight { value } => {
                let new_total = parse_decimal(&value).unwrap_or(Decimal::ZERO);
                if new_total < Decimal::ZERO {
                    return Ok((lines, total_weight));
                }
                let new_total = in_range(new_total);
                return Ok((set_total_weight(lines, new_total), new_total));
            }
            FormulaEdit::SetQsp { index, checked: true } => {
                set_qsp_flag(lines, index, total_weight)?
            }
            FormulaEdit::SetQsp {
                index,
                checked: false,
            } => clear_qsp_flag(lines, index)?,
            FormulaEdit::SelectIngredient {
                index,
                code,
                name,
                price_per_kilo,
            } => {
                let mut lines = lines;
                let line = line_mut(&mut lines, index)?;
                line.ingredient_code = code;
                line.ingredient_name = name;
                line.price_per_kilo = price_per_kilo;
                lines
            }
            FormulaEdit::SetPricePerKilo { index, value } => {
                let mut lines = lines;
                line_mut(&mut lines, index)?.price_per_kilo = parse_optional_price(&value);
                lines
            }
            FormulaEdit::SetNotes { index, notes } => {
                let mut lines = lines;
                line_mut(&mut lines, index)?.notes = notes;
                lines
            }
            FormulaEdit::SetStockIndicator { index, indicator } => {
                let mut lines = lines;
                line_mut(&mut lines, index)?.stock_indicator = indicator;
                lines
            }
            FormulaEdit::SortByPhase => sort_by_phase(lines),
        };
        Ok((lines, total_weight))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn check_index(lines: &[FormulaLine], index: usize) -> Result<(), BalanceError> {
    if index < lines.len() {
        Ok(())
    } else {
        Err(BalanceError::IndexOutOfRange {
            index,
            len: lines.len(),
        })
    }
}

fn line_mut(lines: &mut [FormulaLine], index: usize) -> Result<&mut FormulaLine, BalanceError> {
    let len = lines.len();
    lines
        .get_mut(index)
        .ok_or(BalanceError::IndexOutOfRange { index, len })
}

fn editable_line(
    lines: &mut [FormulaLine],
    index: usize,
) -> Result<&mut FormulaLine, BalanceError> {
    let line = line_mut(lines, index)?;
    if line.is_qsp {
        return Err(BalanceError::QspNotEditable { index });
    }
    Ok(line)
}
