//! API module for the balance gateway

pub mod routes;
pub mod types;

use crate::server::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;

/// Create all API routes
pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/balances", post(routes::balances::get_balances))
        .route("/balances/:address", get(routes::balances::get_balance))
        .route("/providers", get(routes::providers::list_providers))
        .route("/health", get(routes::health::health_check))
        .with_state(state)
}

/// Create OpenAPI documentation routes
pub fn docs_routes() -> Router<AppState> {
    Router::new().route("/api-docs/openapi.json", get(openapi_json))
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        routes::balances::get_balance,
        routes::balances::get_balances,
        routes::providers::list_providers,
        routes::health::health_check,
    ),
    components(schemas(
        types::AddressBalanceResponse,
        types::BatchBalanceRequest,
        types::HealthCheckResponse,
        types::ProviderInfo,
        types::ProvidersResponse,
        crate::balance::BalanceResult,
        crate::error::ErrorResponse,
        crate::error::ErrorDetails,
    )),
    tags(
        (name = "balances", description = "Address balance lookups"),
        (name = "providers", description = "Configured balance providers"),
        (name = "health", description = "Health and monitoring"),
    ),
    info(
        title = "Balance Aggregator API",
        version = "1.0.0",
        description = "Best-effort address balances gathered from several providers",
        license(
            name = "MIT OR Apache-2.0",
        ),
    ),
    servers(
        (url = "http://localhost:8000", description = "Local development"),
    ),
)]
pub struct ApiDoc;

/// Serve OpenAPI JSON
async fn openapi_json() -> impl axum::response::IntoResponse {
    axum::Json(ApiDoc::openapi())
}
