//! Input parsing and validation utilities for the Cosmetic Formulary
//!
//! Form fields are forgiving: quantities typed by the formulator are parsed
//! leniently (French decimal comma, trailing garbage) and never produce an
//! error, only a zero. Quantities above [`MAX_QUANTITY`] count as invalid
//! input, which keeps every balancing product far from `Decimal` overflow.

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::models::{Formula, FormulaLine};

/// Largest accepted percent, gram, total weight or price value (one billion)
pub const MAX_QUANTITY: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

// ============================================================================
// Quantity Parsing
// ============================================================================

/// Parse the leading number of a form field.
///
/// Accepts `,` as decimal separator and ignores anything after the number,
/// so `"12,5 %"` reads as `12.5`. Returns `None` when no digit leads the input.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let text = raw.trim().replace(',', ".");
    let mut chars = text.chars().peekable();

    let mut sign = "";
    if let Some(&c) = chars.peek() {
        if c == '-' || c == '+' {
            sign = if c == '-' { "-" } else { "" };
            chars.next();
        }
    }

    let mut int_part = String::new();
    while let Some(&c) = chars.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        int_part.push(c);
        chars.next();
    }

    let mut frac_part = String::new();
    if chars.peek() == Some(&'.') {
        chars.next();
        while let Some(&c) = chars.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            frac_part.push(c);
            chars.next();
        }
    }

    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if int_part.is_empty() {
        int_part.push('0');
    }

    let number = if frac_part.is_empty() {
        format!("{}{}", sign, int_part)
    } else {
        format!("{}{}.{}", sign, int_part, frac_part)
    };
    Decimal::from_str(&number).ok()
}

/// Parse a percent or gram field: invalid, empty or out-of-range input is
/// zero, negatives clamp to zero
pub fn parse_quantity(raw: &str) -> Decimal {
    in_range(parse_decimal(raw).unwrap_or(Decimal::ZERO).max(Decimal::ZERO))
}

/// Parse a price field: empty, invalid, zero or out-of-range means "no price"
pub fn parse_optional_price(raw: &str) -> Option<Decimal> {
    parse_decimal(raw).filter(|p| *p > Decimal::ZERO && *p <= MAX_QUANTITY)
}

/// Zero for magnitudes above [`MAX_QUANTITY`], the value otherwise
pub fn in_range(value: Decimal) -> Decimal {
    if value.abs() > MAX_QUANTITY {
        Decimal::ZERO
    } else {
        value
    }
}

/// Keep the first digit 1-9 of a phase field, or nothing
pub fn normalize_phase(raw: &str) -> String {
    raw.chars()
        .find(|c| ('1'..='9').contains(c))
        .map(String::from)
        .unwrap_or_default()
}

// ============================================================================
// Formula Validations
// ============================================================================

/// Validate the target mass of a formula
pub fn validate_total_weight(total_weight: Decimal) -> Result<(), &'static str> {
    if total_weight < Decimal::ZERO {
        return Err("Total weight cannot be negative");
    }
    if total_weight > MAX_QUANTITY {
        return Err("Total weight is too large");
    }
    Ok(())
}

/// Validate that at most one line is flagged QSP
pub fn validate_single_qsp(lines: &[FormulaLine]) -> Result<(), &'static str> {
    if lines.iter().filter(|l| l.is_qsp).count() > 1 {
        return Err("Only one line can be the QSP line");
    }
    Ok(())
}

/// Validate a line percentage
pub fn validate_line_percent(percent: Decimal) -> Result<(), &'static str> {
    if percent < Decimal::ZERO {
        return Err("Line percentage cannot be negative");
    }
    if percent > MAX_QUANTITY {
        return Err("Line percentage is too large");
    }
    Ok(())
}

/// Validate a line's price per kilo, when it has one
pub fn validate_line_price(price_per_kilo: Option<Decimal>) -> Result<(), &'static str> {
    match price_per_kilo {
        Some(price) if price < Decimal::ZERO => Err("Price per kilo cannot be negative"),
        Some(price) if price > MAX_QUANTITY => Err("Price per kilo is too large"),
        _ => Ok(()),
    }
}

/// Validate a formula name (the version may be empty)
pub fn validate_formula_name(name: &str) -> Result<(), &'static str> {
    if name.trim().is_empty() {
        return Err("Formula name cannot be empty");
    }
    Ok(())
}

/// Validate everything a formula must satisfy before it is stored
pub fn validate_formula(formula: &Formula) -> Result<(), &'static str> {
    validate_formula_name(&formula.name)?;
    validate_total_weight(formula.total_weight)?;
    validate_single_qsp(&formula.lines)?;
    for line in &formula.lines {
        validate_line_percent(line.percent)?;
        validate_line_price(line.price_per_kilo)?;
    }
    Ok(())
}

/// Check if a formula adds up to exactly 100%
pub fn is_complete(formula: &Formula) -> bool {
    formula.total_percent() == Decimal::ONE_HUNDRED
}
