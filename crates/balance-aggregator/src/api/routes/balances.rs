//! Balance lookup route handlers

use crate::{
    api::types::{AddressBalanceResponse, BatchBalanceRequest},
    error::{Error, Result},
    server::AppState,
};
use axum::{
    extract::{Path, State},
    Json,
};
use std::collections::HashMap;
use tracing::info;

fn ensure_workers(state: &AppState) -> Result<()> {
    if state.aggregator.is_empty() {
        return Err(Error::NoProvidersConfigured);
    }
    Ok(())
}

/// Query every provider for one address
#[utoipa::path(
    get,
    path = "/api/v1/balances/{address}",
    params(
        ("address" = String, Path, description = "Address to look up"),
    ),
    responses(
        (status = 200, description = "One result per provider", body = AddressBalanceResponse),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 503, description = "No providers configured", body = crate::error::ErrorResponse),
    ),
    tag = "balances",
)]
pub async fn get_balance(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<AddressBalanceResponse>> {
    let address = address.trim().to_string();
    if address.is_empty() {
        return Err(Error::InvalidRequest {
            message: "address must not be empty".to_string(),
        });
    }
    ensure_workers(&state)?;

    let results = state.aggregator.get_balance(&address).await;
    Ok(Json(AddressBalanceResponse::new(address, results)))
}

/// Query every provider for several addresses
#[utoipa::path(
    post,
    path = "/api/v1/balances",
    request_body = BatchBalanceRequest,
    responses(
        (status = 200, description = "One entry per distinct address, in request order", body = [AddressBalanceResponse]),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 503, description = "No providers configured", body = crate::error::ErrorResponse),
    ),
    tag = "balances",
)]
pub async fn get_balances(
    State(state): State<AppState>,
    Json(request): Json<BatchBalanceRequest>,
) -> Result<Json<Vec<AddressBalanceResponse>>> {
    let mut addresses: Vec<String> = Vec::with_capacity(request.addresses.len());
    for address in request.addresses {
        let address = address.trim().to_string();
        if !address.is_empty() && !addresses.contains(&address) {
            addresses.push(address);
        }
    }

    if addresses.is_empty() {
        return Err(Error::InvalidRequest {
            message: "addresses must contain at least one address".to_string(),
        });
    }
    let limit = state.config.server.max_addresses_per_request;
    if addresses.len() > limit {
        return Err(Error::InvalidRequest {
            message: format!("at most {limit} addresses per request"),
        });
    }
    ensure_workers(&state)?;

    info!(count = addresses.len(), "Batch balance lookup");
    let mut grouped: HashMap<String, Vec<_>> = HashMap::new();
    for result in state.aggregator.get_balances(&addresses).await {
        grouped.entry(result.address.clone()).or_default().push(result);
    }

    let responses = addresses
        .into_iter()
        .map(|address| {
            let results = grouped.remove(&address).unwrap_or_default();
            AddressBalanceResponse::new(address, results)
        })
        .collect();

    Ok(Json(responses))
}
