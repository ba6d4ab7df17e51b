use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use consent_core::{
    verify, violations, Block, ChainStore, Head, InvalidReason, Ledger, LedgerError, Order,
    Verification, Violation,
};
use serde::{Deserialize, Serialize};
use tokio::task::JoinError;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::constants::MAX_BODY_BYTES;

pub(crate) type SharedLedger = Arc<Ledger<dyn ChainStore>>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) ledger: SharedLedger,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConsentIn {
    user_id: String,
    consent_given: bool,
    profile_data: serde_json::Value,
}

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default)]
    order: Order,
}

#[derive(Serialize)]
struct LedgerOut {
    ledger: Vec<Block>,
}

#[derive(Serialize)]
struct VerifyOut {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<InvalidReason>,
    violations: Vec<Violation>,
}

#[derive(Serialize)]
struct ErrorOut {
    error: String,
}

pub(crate) enum ApiError {
    Ledger(LedgerError),
    Join(JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Ledger(e) => {
                let status = match e {
                    LedgerError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
                    LedgerError::Serialization(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    LedgerError::Verification(_) => StatusCode::CONFLICT,
                    LedgerError::Poisoned => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string())
            }
            ApiError::Join(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };
        (status, Json(ErrorOut { error: message })).into_response()
    }
}

/// Run a ledger call on the blocking pool. Once started it runs to completion
/// even if the request is dropped, so an append is never cut off mid-persist.
async fn blocking<T, F>(ledger: SharedLedger, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Ledger<dyn ChainStore>) -> consent_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&ledger))
        .await
        .map_err(ApiError::Join)?
        .map_err(ApiError::Ledger)
}

async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn record_consent(
    State(state): State<AppState>,
    Json(body): Json<ConsentIn>,
) -> Result<(StatusCode, Json<Block>), ApiError> {
    let ConsentIn {
        user_id,
        consent_given,
        profile_data,
    } = body;
    let block = blocking(state.ledger, move |ledger| {
        ledger.record_consent(&user_id, consent_given, &profile_data)
    })
    .await
    .inspect_err(|e| {
        if let ApiError::Ledger(e) = e {
            error!(error = %e, "consent was not recorded");
        }
    })?;
    Ok((StatusCode::CREATED, Json(block)))
}

async fn list_ledger(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<LedgerOut>, ApiError> {
    let ledger = blocking(state.ledger, move |ledger| ledger.blocks(query.order)).await?;
    Ok(Json(LedgerOut { ledger }))
}

async fn verify_ledger(State(state): State<AppState>) -> Result<Json<VerifyOut>, ApiError> {
    let (result, all) = blocking(state.ledger, |ledger| {
        let blocks = ledger.blocks(Order::Oldest)?;
        Ok((verify(&blocks), violations(&blocks)))
    })
    .await?;
    let out = match result {
        Verification::Valid => VerifyOut {
            status: "valid",
            index: None,
            reason: None,
            violations: all,
        },
        Verification::Invalid(v) => {
            warn!(index = v.index, reason = %v.reason, count = all.len(), "ledger verification failed");
            VerifyOut {
                status: "invalid",
                index: Some(v.index),
                reason: Some(v.reason),
                violations: all,
            }
        }
    };
    Ok(Json(out))
}

async fn chain_head(State(state): State<AppState>) -> Result<Json<Head>, ApiError> {
    let head = blocking(state.ledger, |ledger| ledger.head()).await?;
    Ok(Json(head))
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/consent", post(record_consent))
        .route("/ledger", get(list_ledger))
        .route("/ledger/verify", get(verify_ledger))
        .route("/chain/head", get(chain_head))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
