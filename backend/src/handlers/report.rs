//! Report data HTTP handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::middleware::CurrentUser;
use crate::services::ReportService;
use crate::AppState;

/// INCI list of a formula, largest share first
pub async fn inci_report(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(formula_id): Path<i64>,
) -> impl IntoResponse {
    let service = ReportService::new(state.db.clone());

    match service.inci_report(user.organization_id, formula_id).await {
        Ok(entries) => (StatusCode::OK, Json(serde_json::json!({ "inci": entries }))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Allergen concentrations of a formula
pub async fn allergen_report(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(formula_id): Path<i64>,
) -> impl IntoResponse {
    let service = ReportService::new(state.db.clone());

    match service.allergen_report(user.organization_id, formula_id).await {
        Ok(entries) => {
            (StatusCode::OK, Json(serde_json::json!({ "allergens": entries }))).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// IFRA maximum concentration per product category
pub async fn ifra_report(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(formula_id): Path<i64>,
) -> impl IntoResponse {
    let service = ReportService::new(state.db.clone());

    match service.ifra_report(user.organization_id, formula_id).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => e.into_response(),
    }
}
