//! Formula storage service
//!
//! A formula is persisted as one header row plus its ordered lines. Every
//! query is scoped to the caller's organization.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{types::Json, PgPool, Postgres, Transaction};
use uuid::Uuid;

use shared::{
    compare_versions, sort_versions, validate_formula, Formula, FormulaLine, FormulaNotes,
    PaginatedResponse, Pagination, SaveTarget, Stability, StockIndicator, VersionComparison,
};

use crate::error::{AppError, AppResult};

/// Formula service for saving and loading formula snapshots
#[derive(Clone)]
pub struct FormulaService {
    db: PgPool,
}

/// Formula header as stored
#[derive(Debug, sqlx::FromRow)]
struct FormulaRow {
    id: i64,
    name: String,
    version: String,
    formulator: String,
    improvement_goal: String,
    is_active: bool,
    total_weight: Decimal,
    notes: Json<FormulaNotes>,
    stability: Json<Stability>,
    image: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Formula line as stored
#[derive(Debug, sqlx::FromRow)]
struct FormulaLineRow {
    phase: String,
    ingredient_code: String,
    ingredient_name: String,
    percent: Decimal,
    grams: Decimal,
    is_qsp: bool,
    notes: String,
    price_per_kilo: Option<Decimal>,
    stock_indicator: Option<String>,
}

impl From<FormulaLineRow> for FormulaLine {
    fn from(row: FormulaLineRow) -> Self {
        Self {
            phase: row.phase,
            ingredient_code: row.ingredient_code,
            ingredient_name: row.ingredient_name,
            percent: row.percent,
            grams: row.grams,
            is_qsp: row.is_qsp,
            notes: row.notes,
            price_per_kilo: row.price_per_kilo,
            stock_indicator: row
                .stock_indicator
                .as_deref()
                .and_then(StockIndicator::parse),
        }
    }
}

/// Formula entry in a listing
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FormulaListItem {
    pub id: i64,
    pub name: String,
    pub version: String,
    pub formulator: String,
    pub is_active: bool,
    pub total_weight: Decimal,
    pub line_count: i64,
    pub updated_at: DateTime<Utc>,
}

impl FormulaService {
    /// Create a new FormulaService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// List the formulas of an organization, one entry per version
    pub async fn list_formulas(
        &self,
        organization_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<FormulaListItem>> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM formulas WHERE organization_id = $1")
                .bind(organization_id)
                .fetch_one(&self.db)
                .await?;

        let items = sqlx::query_as::<_, FormulaListItem>(
            r#"
            SELECT f.id, f.name, f.version, f.formulator, f.is_active, f.total_weight,
                   (SELECT COUNT(*) FROM formula_lines l WHERE l.formula_id = f.id) AS line_count,
                   f.updated_at
            FROM formulas f
            WHERE f.organization_id = $1
            ORDER BY f.name, f.version
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(organization_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse {
            data: items,
            pagination: pagination.meta(u64::try_from(total).unwrap_or(0)),
        })
    }

    /// Load a formula with its lines in stored order
    pub async fn get_formula(&self, organization_id: Uuid, formula_id: i64) -> AppResult<Formula> {
        let row = sqlx::query_as::<_, FormulaRow>(
            r#"
            SELECT id, name, version, formulator, improvement_goal, is_active, total_weight,
                   notes, stability, image, created_at, updated_at
            FROM formulas
            WHERE id = $1 AND organization_id = $2
            "#,
        )
        .bind(formula_id)
        .bind(organization_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Formula".to_string()))?;

        let lines = sqlx::query_as::<_, FormulaLineRow>(
            r#"
            SELECT phase, ingredient_code, ingredient_name, percent, grams, is_qsp, notes,
                   price_per_kilo, stock_indicator
            FROM formula_lines
            WHERE formula_id = $1
            ORDER BY position
            "#,
        )
        .bind(formula_id)
        .fetch_all(&self.db)
        .await?;

        Ok(Formula {
            id: Some(row.id),
            name: row.name,
            version: row.version,
            formulator: row.formulator,
            improvement_goal: row.improvement_goal,
            is_active: row.is_active,
            total_weight: row.total_weight,
            lines: lines.into_iter().map(FormulaLine::from).collect(),
            notes: row.notes.0,
            stability: row.stability.0,
            image: row.image,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        })
    }

    /// Save a formula snapshot.
    ///
    /// `original_version` is the version the formula had when it was loaded.
    /// A loaded formula is overwritten in place, renames included, unless its
    /// version changed: it is then stored as a new, inactive version with its
    /// stability test reset. A formula without id overwrites the row with the
    /// same name and version, or creates one. Header and lines are written in
    /// one transaction.
    pub async fn save_formula(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        formula: Formula,
        original_version: Option<&str>,
    ) -> AppResult<Formula> {
        validate_formula(&formula).map_err(|msg| AppError::ValidationError(msg.to_string()))?;
        let target = formula.save_target(original_version);
        let formula = formula.prepared_for(target);

        let mut tx = self.db.begin().await?;

        let formula_id = match target {
            SaveTarget::UpdateById(id) => {
                self.update_by_id(&mut tx, organization_id, user_id, id, &formula)
                    .await?
            }
            SaveTarget::ByNameVersion | SaveTarget::NewVersion { .. } => {
                self.upsert_by_name_version(&mut tx, organization_id, user_id, &formula)
                    .await?
            }
        };

        for (position, line) in formula.lines.iter().enumerate() {
            let position = i32::try_from(position).map_err(anyhow::Error::from)?;
            sqlx::query(
                r#"
                INSERT INTO formula_lines (formula_id, position, phase, ingredient_code,
                                           ingredient_name, percent, grams, is_qsp, notes,
                                           price_per_kilo, stock_indicator)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(formula_id)
            .bind(position)
            .bind(&line.phase)
            .bind(&line.ingredient_code)
            .bind(&line.ingredient_name)
            .bind(line.percent)
            .bind(line.grams)
            .bind(line.is_qsp)
            .bind(&line.notes)
            .bind(line.price_per_kilo)
            .bind(line.stock_indicator.map(|s| s.as_str()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        if let SaveTarget::NewVersion { source_id } = target {
            tracing::info!(
                "Formula {} saved as new version {} ('{}' v'{}')",
                source_id,
                formula_id,
                formula.name,
                formula.version
            );
        }
        tracing::info!(
            "Saved formula {} '{}' v'{}' ({} lines) for organization {}",
            formula_id,
            formula.name,
            formula.version,
            formula.lines.len(),
            organization_id
        );

        self.get_formula(organization_id, formula_id).await
    }

    /// Overwrite a loaded row and clear its lines.
    ///
    /// A row renamed onto a name that already has an active version loses its
    /// own active flag.
    async fn update_by_id(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        organization_id: Uuid,
        user_id: Uuid,
        formula_id: i64,
        formula: &Formula,
    ) -> AppResult<i64> {
        let clash: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM formulas
            WHERE organization_id = $1 AND name = $2 AND version = $3 AND id <> $4
            "#,
        )
        .bind(organization_id)
        .bind(&formula.name)
        .bind(&formula.version)
        .bind(formula_id)
        .fetch_optional(&mut **tx)
        .await?;

        if clash.is_some() {
            return Err(duplicate_version(formula));
        }

        let id: i64 = sqlx::query_scalar(
            r#"
            UPDATE formulas
            SET name = $3, version = $4, formulator = $5, improvement_goal = $6,
                total_weight = $7, notes = $8, stability = $9, image = $10,
                updated_by = $11, updated_at = NOW(),
                is_active = is_active AND NOT EXISTS (
                    SELECT 1 FROM formulas other
                    WHERE other.organization_id = $2 AND other.name = $3
                      AND other.is_active AND other.id <> $1
                )
            WHERE id = $1 AND organization_id = $2
            RETURNING id
            "#,
        )
        .bind(formula_id)
        .bind(organization_id)
        .bind(&formula.name)
        .bind(&formula.version)
        .bind(&formula.formulator)
        .bind(&formula.improvement_goal)
        .bind(formula.total_weight)
        .bind(Json(&formula.notes))
        .bind(Json(&formula.stability))
        .bind(&formula.image)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Formula".to_string()))?;

        sqlx::query("DELETE FROM formula_lines WHERE formula_id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;

        Ok(id)
    }

    /// Overwrite the row with the formula's name and version, or insert one
    async fn upsert_by_name_version(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        organization_id: Uuid,
        user_id: Uuid,
        formula: &Formula,
    ) -> AppResult<i64> {
        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM formulas WHERE organization_id = $1 AND name = $2 AND version = $3",
        )
        .bind(organization_id)
        .bind(&formula.name)
        .bind(&formula.version)
        .fetch_optional(&mut **tx)
        .await?;

        match existing {
            Some(id) => self.update_by_id(tx, organization_id, user_id, id, formula).await,
            None => {
                let id = sqlx::query_scalar::<_, i64>(
                    r#"
                    INSERT INTO formulas (organization_id, name, version, formulator,
                                          improvement_goal, total_weight, notes, stability,
                                          image, created_by, updated_by)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
                    RETURNING id
                    "#,
                )
                .bind(organization_id)
                .bind(&formula.name)
                .bind(&formula.version)
                .bind(&formula.formulator)
                .bind(&formula.improvement_goal)
                .bind(formula.total_weight)
                .bind(Json(&formula.notes))
                .bind(Json(&formula.stability))
                .bind(&formula.image)
                .bind(user_id)
                .fetch_one(&mut **tx)
                .await?;
                Ok(id)
            }
        }
    }

    /// Every stored version of a formula name, oldest label first
    pub async fn list_versions(&self, organization_id: Uuid, name: &str) -> AppResult<Vec<Formula>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM formulas WHERE organization_id = $1 AND name = $2 ORDER BY id",
        )
        .bind(organization_id)
        .bind(name)
        .fetch_all(&self.db)
        .await?;

        let mut versions = Vec::with_capacity(ids.len());
        for id in ids {
            versions.push(self.get_formula(organization_id, id).await?);
        }
        sort_versions(&mut versions);
        Ok(versions)
    }

    /// Compare every version of a formula's name against that formula
    pub async fn compare_versions(
        &self,
        organization_id: Uuid,
        formula_id: i64,
    ) -> AppResult<VersionComparison> {
        let reference = self.get_formula(organization_id, formula_id).await?;
        let versions = self.list_versions(organization_id, &reference.name).await?;
        let reference_index = versions
            .iter()
            .position(|v| v.id == Some(formula_id))
            .unwrap_or(0);

        Ok(compare_versions(&versions, reference_index))
    }

    /// Delete a formula version and its lines
    pub async fn delete_formula(&self, organization_id: Uuid, formula_id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM formulas WHERE id = $1 AND organization_id = $2")
            .bind(formula_id)
            .bind(organization_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Formula".to_string()));
        }

        tracing::info!("Deleted formula {} for organization {}", formula_id, organization_id);
        Ok(())
    }

    /// Mark one version as the active one among the versions sharing its name
    pub async fn activate_version(
        &self,
        organization_id: Uuid,
        formula_id: i64,
    ) -> AppResult<Formula> {
        let mut tx = self.db.begin().await?;

        let name: String =
            sqlx::query_scalar("SELECT name FROM formulas WHERE id = $1 AND organization_id = $2")
                .bind(formula_id)
                .bind(organization_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| AppError::NotFound("Formula".to_string()))?;

        // Clear first: the partial unique index allows one active row per name
        sqlx::query(
            r#"
            UPDATE formulas
            SET is_active = FALSE, updated_at = NOW()
            WHERE organization_id = $1 AND name = $2 AND is_active
            "#,
        )
        .bind(organization_id)
        .bind(&name)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE formulas SET is_active = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(formula_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!("Activated formula {} ('{}')", formula_id, name);
        self.get_formula(organization_id, formula_id).await
    }
}

fn duplicate_version(formula: &Formula) -> AppError {
    AppError::Validation {
        field: "version".to_string(),
        message: format!(
            "Formula '{}' already has a version '{}'",
            formula.name, formula.version
        ),
        message_fr: format!(
            "La formule '{}' a déjà une version '{}'",
            formula.name, formula.version
        ),
    }
}
