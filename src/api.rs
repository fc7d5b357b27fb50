//! REST API router for the exchange.
//!
//! Used by the binary and by integration tests. Create with [`create_router`].
//! Uses Extension for state so the router is `Router<()>` and works with `into_make_service()`.

use axum::{
    body::Bytes,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::error::{IntakeError, RepositoryError};
use crate::intake::OrderIntake;
use crate::order_book::list_orders;
use crate::types::OrderView;

/// Shared app state: one intake (and so one order store) per process.
#[derive(Clone)]
pub struct AppState {
    pub(crate) intake: Arc<OrderIntake>,
}

/// Builds the REST router with state. Returns `Router<()>` so you can call `.into_make_service()` for `axum::serve`.
pub fn create_router(intake: Arc<OrderIntake>) -> Router<()> {
    let state = AppState { intake };
    Router::new()
        .route("/health", get(health))
        .route("/trade", post(trade))
        .route("/order_book", get(order_book))
        .layer(Extension(state))
}

/// Failures that are not the client's fault.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl From<IntakeError> for ApiError {
    fn from(e: IntakeError) -> Self {
        match e {
            IntakeError::Persistence(_) => ApiError::Unavailable(e.to_string()),
            IntakeError::Matching(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(e: RepositoryError) -> Self {
        ApiError::Unavailable(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };
        log::error!("request failed status={} error={}", status.as_u16(), message);
        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// `true` if the order was admitted, `false` if it was rejected.
async fn trade(Extension(state): Extension<AppState>, body: Bytes) -> Result<Json<bool>, ApiError> {
    let intake = state.intake;
    let admitted = tokio::task::spawn_blocking(move || intake.admit_bytes(&body))
        .await
        .map_err(|e| ApiError::Internal(format!("intake task failed: {}", e)))??;
    Ok(Json(admitted))
}

#[derive(serde::Serialize)]
struct OrderBookResponse {
    data: Vec<OrderView>,
}

async fn order_book(Extension(state): Extension<AppState>) -> Result<Json<OrderBookResponse>, ApiError> {
    let intake = state.intake;
    let data = tokio::task::spawn_blocking(move || {
        list_orders(intake.repository()).map(|orders| orders.collect::<Vec<_>>())
    })
    .await
    .map_err(|e| ApiError::Internal(format!("order book task failed: {}", e)))??;
    Ok(Json(OrderBookResponse { data }))
}
