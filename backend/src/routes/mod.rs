//! Route definitions for the Cosmetic Formulary API

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Protected routes - formulas
        .nest("/formulas", formula_routes(state))
}

/// Formula routes (protected)
fn formula_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_formulas).post(handlers::save_formula),
        )
        .route("/new", get(handlers::new_formula))
        .route("/balance", post(handlers::balance_formula))
        .route(
            "/:formula_id",
            get(handlers::get_formula).delete(handlers::delete_formula),
        )
        .route("/:formula_id/activate", post(handlers::activate_formula))
        .route("/:formula_id/compare", get(handlers::compare_versions))
        .route("/:formula_id/summary", get(handlers::formula_summary))
        .route("/:formula_id/reports/inci", get(handlers::inci_report))
        .route("/:formula_id/reports/allergens", get(handlers::allergen_report))
        .route("/:formula_id/reports/ifra", get(handlers::ifra_report))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
