//! Ingredient reference data (imported from the formulator's spreadsheets)

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A raw material from the ingredient list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ingredient {
    pub code: String,
    pub name: String,
    pub main_supplier: Option<String>,
    pub inci: Option<String>,
    pub category: Option<String>,
    pub price_per_kilo: Option<Decimal>,
    pub in_stock: bool,
    pub cas_number: Option<String>,
}

/// Allergen content of an ingredient
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Allergen {
    pub ingredient_code: String,
    pub allergen_name: String,
    /// Allergen share of the raw material, in percent
    pub percentage: Decimal,
}

/// IFRA maximum use level of an ingredient for one product category
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IfraLimit {
    pub category_number: String,
    pub description: String,
    pub ingredient_code: String,
    pub limit_percent: Decimal,
}

/// IFRA product categories (51st amendment), in certificate order
pub const IFRA_CATEGORIES: &[&str] = &[
    "1", "2", "3", "4", "5A", "5B", "5C", "5D", "6", "7A", "7B", "8", "9", "10A", "10B", "11A",
    "11B", "12",
];

/// Normalize an ingredient code for lookups
pub fn normalize_code(code: &str) -> String {
    code.trim().to_lowercase()
}
