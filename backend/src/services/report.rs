//! Report data service
//!
//! Resolves a stored formula against the ingredient reference tables and
//! returns the figures a printed report needs.

use std::collections::HashMap;

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use shared::{
    allergen_breakdown, ifra_report, inci_breakdown, inci_index, normalize_code, Allergen,
    AllergenEntry, Formula, IfraLimit, IfraReport, InciEntry, Ingredient,
};

use crate::error::AppResult;
use crate::services::FormulaService;

/// Report service for INCI, allergen and IFRA data
#[derive(Clone)]
pub struct ReportService {
    db: PgPool,
}

impl ReportService {
    /// Create a new ReportService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// INCI composition of a formula
    pub async fn inci_report(
        &self,
        organization_id: Uuid,
        formula_id: i64,
    ) -> AppResult<Vec<InciEntry>> {
        let formula = self.load_formula(organization_id, formula_id).await?;
        let inci_by_code = self.inci_by_code(organization_id, &formula).await?;
        Ok(inci_breakdown(&formula.lines, &inci_by_code))
    }

    /// Allergen concentrations of a formula
    pub async fn allergen_report(
        &self,
        organization_id: Uuid,
        formula_id: i64,
    ) -> AppResult<Vec<AllergenEntry>> {
        let formula = self.load_formula(organization_id, formula_id).await?;
        let codes = line_codes(&formula);

        let rows = sqlx::query_as::<_, (String, String, Decimal)>(
            r#"
            SELECT ingredient_code, allergen_name, percentage
            FROM allergens
            WHERE organization_id = $1 AND ingredient_code = ANY($2)
            "#,
        )
        .bind(organization_id)
        .bind(&codes)
        .fetch_all(&self.db)
        .await?;

        let allergens: Vec<Allergen> = rows
            .into_iter()
            .map(|(ingredient_code, allergen_name, percentage)| Allergen {
                ingredient_code,
                allergen_name,
                percentage,
            })
            .collect();

        Ok(allergen_breakdown(&formula.lines, &allergens))
    }

    /// IFRA maximum concentrations of a formula
    pub async fn ifra_report(&self, organization_id: Uuid, formula_id: i64) -> AppResult<IfraReport> {
        let formula = self.load_formula(organization_id, formula_id).await?;
        let codes: Vec<String> = line_codes(&formula).iter().map(|c| normalize_code(c)).collect();

        // IFRA standards are published data, shared by every organization
        let rows = sqlx::query_as::<_, (String, String, String, Decimal)>(
            r#"
            SELECT category_number, description, ingredient_code, limit_percent
            FROM ifra_limits
            WHERE LOWER(TRIM(ingredient_code)) = ANY($1)
            "#,
        )
        .bind(&codes)
        .fetch_all(&self.db)
        .await?;

        let limits: Vec<IfraLimit> = rows
            .into_iter()
            .map(
                |(category_number, description, ingredient_code, limit_percent)| IfraLimit {
                    category_number,
                    description,
                    ingredient_code,
                    limit_percent,
                },
            )
            .collect();

        Ok(ifra_report(&formula.lines, &limits))
    }

    async fn load_formula(&self, organization_id: Uuid, formula_id: i64) -> AppResult<Formula> {
        FormulaService::new(self.db.clone())
            .get_formula(organization_id, formula_id)
            .await
    }

    async fn inci_by_code(
        &self,
        organization_id: Uuid,
        formula: &Formula,
    ) -> AppResult<HashMap<String, String>> {
        let rows = sqlx::query_as::<
            _,
            (
                String,
                String,
                Option<String>,
                Option<String>,
                Option<String>,
                Option<Decimal>,
                bool,
                Option<String>,
            ),
        >(
            r#"
            SELECT code, name, main_supplier, inci, category, price_per_kilo, in_stock, cas_number
            FROM ingredients
            WHERE organization_id = $1 AND code = ANY($2)
            "#,
        )
        .bind(organization_id)
        .bind(line_codes(formula))
        .fetch_all(&self.db)
        .await?;

        let ingredients: Vec<Ingredient> = rows
            .into_iter()
            .map(
                |(code, name, main_supplier, inci, category, price_per_kilo, in_stock, cas_number)| {
                    Ingredient {
                        code,
                        name,
                        main_supplier,
                        inci,
                        category,
                        price_per_kilo,
                        in_stock,
                        cas_number,
                    }
                },
            )
            .collect();

        Ok(inci_index(&ingredients))
    }
}

/// Distinct, trimmed, non-empty ingredient codes of a formula
fn line_codes(formula: &Formula) -> Vec<String> {
    let mut codes: Vec<String> = formula
        .lines
        .iter()
        .map(|l| l.ingredient_code.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    codes.sort();
    codes.dedup();
    codes
}
