//! Formula HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use shared::{Formula, FormulaEdit, FormulaSummary, Pagination};

use crate::error::{AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::services::FormulaService;
use crate::AppState;

/// Body of a balance request: the current formula and one edit to apply
#[derive(Debug, Deserialize)]
pub struct BalanceRequest {
    pub formula: Formula,
    pub edit: FormulaEdit,
}

/// Body of a save request
#[derive(Debug, Deserialize)]
pub struct SaveFormulaRequest {
    pub formula: Formula,
    /// Version the formula carried when it was loaded
    #[serde(default)]
    pub original_version: Option<String>,
}

/// Formula after an edit, with its derived figures
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub formula: Formula,
    pub summary: FormulaSummary,
}

/// List the formulas of the current organization
pub async fn list_formulas(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(pagination): Query<Pagination>,
) -> impl IntoResponse {
    let service = FormulaService::new(state.db.clone());

    match service.list_formulas(user.organization_id, &pagination).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Blank formula with the configured default total weight
pub async fn new_formula(State(state): State<AppState>, _user: CurrentUser) -> impl IntoResponse {
    let formula = Formula {
        total_weight: state.config.formulas.default_total_weight,
        ..Formula::default()
    };
    (StatusCode::OK, Json(formula))
}

/// Get a formula with its lines
pub async fn get_formula(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(formula_id): Path<i64>,
) -> impl IntoResponse {
    let service = FormulaService::new(state.db.clone());

    match service.get_formula(user.organization_id, formula_id).await {
        Ok(formula) => (StatusCode::OK, Json(formula)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Save a formula (create, overwrite the same version, or add a version)
pub async fn save_formula(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<SaveFormulaRequest>,
) -> impl IntoResponse {
    if let Err(e) = check_formula(&state, &payload.formula) {
        return e.into_response();
    }

    let service = FormulaService::new(state.db.clone());

    match service
        .save_formula(
            user.organization_id,
            user.user_id,
            payload.formula,
            payload.original_version.as_deref(),
        )
        .await
    {
        Ok(formula) => (StatusCode::OK, Json(formula)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Compare every version of a formula's name against that formula
pub async fn compare_versions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(formula_id): Path<i64>,
) -> impl IntoResponse {
    let service = FormulaService::new(state.db.clone());

    match service.compare_versions(user.organization_id, formula_id).await {
        Ok(comparison) => (StatusCode::OK, Json(comparison)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Delete a formula version
pub async fn delete_formula(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(formula_id): Path<i64>,
) -> impl IntoResponse {
    let service = FormulaService::new(state.db.clone());

    match service.delete_formula(user.organization_id, formula_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

/// Make a version the active one for its formula name
pub async fn activate_formula(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(formula_id): Path<i64>,
) -> impl IntoResponse {
    let service = FormulaService::new(state.db.clone());

    match service.activate_version(user.organization_id, formula_id).await {
        Ok(formula) => (StatusCode::OK, Json(formula)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Apply one edit to a formula and return it rebalanced. Nothing is stored.
pub async fn balance_formula(
    State(state): State<AppState>,
    _user: CurrentUser,
    Json(request): Json<BalanceRequest>,
) -> impl IntoResponse {
    match balance(&state, request) {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Derived figures of a stored formula
pub async fn formula_summary(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(formula_id): Path<i64>,
) -> impl IntoResponse {
    let service = FormulaService::new(state.db.clone());

    match service.get_formula(user.organization_id, formula_id).await {
        Ok(formula) => (StatusCode::OK, Json(formula.summary())).into_response(),
        Err(e) => e.into_response(),
    }
}

fn balance(state: &AppState, request: BalanceRequest) -> AppResult<BalanceResponse> {
    let BalanceRequest { mut formula, edit } = request;

    if matches!(edit, FormulaEdit::AddLine)
        && formula.lines.len() >= state.config.formulas.max_lines
    {
        return Err(too_many_lines(state.config.formulas.max_lines));
    }

    tracing::debug!("Applying {:?} to formula '{}'", edit, formula.name);
    formula.apply(edit)?;

    let summary = formula.summary();
    if summary.is_over_limit {
        tracing::debug!(
            "Formula '{}' exceeds 100% ({}%)",
            formula.name,
            summary.total_percent
        );
    }

    Ok(BalanceResponse { formula, summary })
}

fn check_formula(state: &AppState, formula: &Formula) -> AppResult<()> {
    formula.validate()?;
    if formula.lines.len() > state.config.formulas.max_lines {
        return Err(too_many_lines(state.config.formulas.max_lines));
    }
    Ok(())
}

fn too_many_lines(max: usize) -> AppError {
    AppError::Validation {
        field: "lines".to_string(),
        message: format!("A formula cannot have more than {} lines", max),
        message_fr: format!("Une formule ne peut pas dépasser {} lignes", max),
    }
}
