//! HTTP API for the mock USS.
//!
//! Flight planning endpoints answer 200 with the domain outcome in the body;
//! only malformed requests get a 4xx (from the extractors). Peer endpoints
//! serve this USS's own intents and accept change notifications.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;
use uss_tasks::Scheduler;

use crate::models::{
    CapabilitiesResponse, ClearAreaRequest, ClearAreaResponse, DeleteFlightPlanResponse,
    ServiceStatus, StatusResponse, UpsertFlightPlanRequest, UpsertFlightPlanResponse,
};
use crate::registry::{GetOperationalIntentDetailsResponse, PutOperationalIntentDetailsParameters};
use crate::scd::ScdEngine;

pub const API_NAME: &str = "Flight Planning Automated Testing Interface";
pub const API_VERSION: &str = "v1";

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ScdEngine>,
    pub scheduler: Arc<Scheduler>,
}

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Flight planning
        .route(
            "/flight_planning/v1/flight_plans/:flight_plan_id",
            put(upsert_flight_plan).delete(delete_flight_plan),
        )
        .route("/flight_planning/v1/clear_area_requests", post(clear_area))
        .route("/flight_planning/v1/status", get(status))
        .route("/flight_planning/v1/capabilities", get(capabilities))
        // Peer USS
        .route("/uss/v1/operational_intents", post(notify_operational_intent))
        .route("/uss/v1/operational_intents/:id", get(get_operational_intent))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// --- Flight planning endpoints ---

async fn upsert_flight_plan(
    State(state): State<AppState>,
    Path(flight_plan_id): Path<String>,
    Json(req): Json<UpsertFlightPlanRequest>,
) -> Json<UpsertFlightPlanResponse> {
    Json(
        state
            .engine
            .upsert_flight_plan(&flight_plan_id, req.flight_plan)
            .await,
    )
}

async fn delete_flight_plan(
    State(state): State<AppState>,
    Path(flight_plan_id): Path<String>,
) -> Json<DeleteFlightPlanResponse> {
    Json(state.engine.delete_flight_plan(&flight_plan_id).await)
}

async fn clear_area(
    State(state): State<AppState>,
    Json(req): Json<ClearAreaRequest>,
) -> Json<ClearAreaResponse> {
    tracing::info!("Clear area request {}", req.request_id);
    Json(state.engine.clear_area(&req.extent).await)
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, StatusCode> {
    let tasks = state.scheduler.status().map_err(|e| {
        error!("Cannot read task state: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let status = if tasks.stopping || state.scheduler.shutdown_signal().is_triggered() {
        ServiceStatus::Stopping
    } else if state.scheduler.startup_complete().unwrap_or(false) {
        ServiceStatus::Ready
    } else {
        ServiceStatus::Starting
    };

    Ok(Json(StatusResponse {
        status,
        system_identity: state.engine.identity().manager.clone(),
        api_name: API_NAME.to_string(),
        api_version: API_VERSION.to_string(),
    }))
}

async fn capabilities(State(state): State<AppState>) -> Json<CapabilitiesResponse> {
    let mut capabilities = vec!["BasicStrategicConflictDetection".to_string()];
    if state.engine.jurisdiction().require_flight_authorisation {
        capabilities.push("FlightAuthorisationValidation".to_string());
    }
    Json(CapabilitiesResponse { capabilities })
}

// --- Peer endpoints ---

async fn get_operational_intent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<GetOperationalIntentDetailsResponse>, StatusCode> {
    match state.engine.own_operational_intent(&id) {
        Ok(Some(operational_intent)) => Ok(Json(GetOperationalIntentDetailsResponse {
            operational_intent,
        })),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!("Cannot read operational intent {}: {}", id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn notify_operational_intent(
    State(state): State<AppState>,
    Json(notification): Json<PutOperationalIntentDetailsParameters>,
) -> StatusCode {
    match state.engine.receive_notification(notification) {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(e) => {
            error!("Cannot apply notification: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
