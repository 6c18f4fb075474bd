//! Provider listing route handler

use crate::{
    api::types::{ProviderInfo, ProvidersResponse},
    server::AppState,
};
use axum::{extract::State, Json};

/// List configured providers
#[utoipa::path(
    get,
    path = "/api/v1/providers",
    responses(
        (status = 200, description = "Configured providers", body = ProvidersResponse),
    ),
    tag = "providers",
)]
pub async fn list_providers(State(state): State<AppState>) -> Json<ProvidersResponse> {
    let providers = state
        .config
        .providers
        .iter()
        .map(|provider| {
            let limit = provider.rate_limit();
            ProviderInfo {
                name: provider.name().to_string(),
                kind: provider.kind.to_string(),
                enabled: provider.enabled,
                batch_limit: provider.batch_limit(),
                rate_limit_quota: limit.as_ref().map(|l| l.quota),
                rate_limit_period_secs: limit.as_ref().map(|l| l.period_secs),
            }
        })
        .collect();

    Json(ProvidersResponse { providers })
}
