//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::ENGINE_VERSION;
use crate::coordinator::Schedule;
use crate::error::AllocError;
use crate::priority::PriorityClass;
use crate::service::AllocationService;
use crate::store::ResourceId;
use crate::token::{Outcome, RequestMetadata, TokenId};

/// `READY` while accepting work, `DRAINING` once shutdown has been requested.
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: &'static str,
    pub engine_version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenSlotRequest {
    pub capacity: usize,
}

/// Booking source, either by name (`"WALK_IN"`) or by rank (`5`).
///
/// Ranks are read as `i64` so out-of-range numbers surface as
/// `InvalidCategory` rather than a body rejection.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SourceInput {
    Rank(i64),
    Name(String),
}

impl SourceInput {
    fn resolve(self) -> Result<PriorityClass, AllocError> {
        match self {
            SourceInput::Rank(rank) => u8::try_from(rank)
                .map_err(|_| AllocError::InvalidCategory(rank.to_string()))
                .and_then(PriorityClass::from_rank),
            SourceInput::Name(name) => name.parse(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub source: SourceInput,
    #[serde(flatten)]
    pub metadata: RequestMetadata,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseRequest {
    pub outcome: Outcome,
}

#[derive(Debug, Serialize)]
pub struct SlotView {
    pub active: usize,
    #[serde(flatten)]
    pub schedule: Schedule,
}

#[derive(Debug, Serialize)]
pub struct WaitlistResponse {
    pub resource_id: ResourceId,
    pub waiting: Vec<TokenId>,
}

fn status_for(err: &AllocError) -> StatusCode {
    match err {
        AllocError::ResourceNotFound(_) | AllocError::TokenNotFound(_) => StatusCode::NOT_FOUND,
        AllocError::InvalidCategory(_) | AllocError::InvalidCapacity(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        AllocError::InvalidTransition { .. } => StatusCode::CONFLICT,
        AllocError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
        AllocError::Store(_) | AllocError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_body(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

fn error_response(err: AllocError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::error!(error = %err, "Request failed");
    } else {
        tracing::debug!(error = %err, "Request rejected");
    }
    error_body(status, err.to_string())
}

/// Malformed bodies get the same `{"error": ...}` shape as domain errors.
fn rejection_response(rejection: JsonRejection) -> Response {
    tracing::debug!(error = %rejection.body_text(), "Request body rejected");
    error_body(rejection.status(), rejection.body_text())
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, AllocError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn health_check(State(service): State<Arc<AllocationService>>) -> Json<HealthCheckResponse> {
    let status = if service.is_shutting_down() {
        "DRAINING"
    } else {
        "READY"
    };
    Json(HealthCheckResponse {
        status,
        engine_version: ENGINE_VERSION,
        server_version: service.server_version().map(str::to_owned),
    })
}

async fn shutdown(State(service): State<Arc<AllocationService>>) -> impl IntoResponse {
    tracing::info!("Shutdown requested via HTTP");
    service.trigger_shutdown();
    (StatusCode::OK, Json(serde_json::json!({})))
}

async fn open_slot(
    State(service): State<Arc<AllocationService>>,
    payload: Result<Json<OpenSlotRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };
    let result = service.coordinator().open_resource(request.capacity).await;
    respond(StatusCode::CREATED, result)
}

async fn get_slot(
    State(service): State<Arc<AllocationService>>,
    Path(slot_id): Path<u64>,
) -> Response {
    let result = service
        .coordinator()
        .schedule(ResourceId::new(slot_id))
        .await
        .map(|schedule| SlotView {
            active: schedule.occupying.len(),
            schedule,
        });
    respond(StatusCode::OK, result)
}

async fn get_occupancy(
    State(service): State<Arc<AllocationService>>,
    Path(slot_id): Path<u64>,
) -> Response {
    let result = service
        .coordinator()
        .occupancy(ResourceId::new(slot_id))
        .await;
    respond(StatusCode::OK, result)
}

async fn get_waitlist(
    State(service): State<Arc<AllocationService>>,
    Path(slot_id): Path<u64>,
) -> Response {
    let resource_id = ResourceId::new(slot_id);
    let result = service
        .coordinator()
        .list_waiting(resource_id)
        .await
        .map(|waiting| WaitlistResponse {
            resource_id,
            waiting,
        });
    respond(StatusCode::OK, result)
}

async fn get_history(
    State(service): State<Arc<AllocationService>>,
    Path(slot_id): Path<u64>,
) -> Response {
    let result = service
        .coordinator()
        .history(ResourceId::new(slot_id))
        .await;
    respond(StatusCode::OK, result)
}

async fn submit_token(
    State(service): State<Arc<AllocationService>>,
    Path(slot_id): Path<u64>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };
    let class = match request.source.resolve() {
        Ok(class) => class,
        Err(e) => return error_response(e),
    };
    let result = service
        .coordinator()
        .submit(ResourceId::new(slot_id), class, request.metadata)
        .await;
    respond(StatusCode::CREATED, result)
}

async fn get_token(
    State(service): State<Arc<AllocationService>>,
    Path(token_id): Path<u64>,
) -> Response {
    let result = service.coordinator().token(TokenId::new(token_id)).await;
    respond(StatusCode::OK, result)
}

async fn release_token(
    State(service): State<Arc<AllocationService>>,
    Path(token_id): Path<u64>,
    payload: Result<Json<ReleaseRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };
    let result = service
        .coordinator()
        .release(TokenId::new(token_id), request.outcome)
        .await;
    respond(StatusCode::OK, result)
}

pub fn routes(service: Arc<AllocationService>) -> Router {
    Router::new()
        .route("/health-check", get(health_check))
        .route("/shutdown", post(shutdown))
        .route("/slots", post(open_slot))
        .route("/slots/{id}", get(get_slot))
        .route("/slots/{id}/occupancy", get(get_occupancy))
        .route("/slots/{id}/waitlist", get(get_waitlist))
        .route("/slots/{id}/history", get(get_history))
        .route("/slots/{id}/tokens", post(submit_token))
        .route("/tokens/{id}", get(get_token))
        .route("/tokens/{id}/release", post(release_token))
        .with_state(service)
}
