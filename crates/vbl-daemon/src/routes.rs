//! Axum router and handlers.
//!
//! `build_router` returns the bare router so tests can drive it with
//! `tower::ServiceExt::oneshot`; `main.rs` attaches middleware layers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use vbl_live::PositionRef;
use vbl_store::PositionsRepo;

use crate::api_types::{ErrorResponse, HealthResponse, StatusResponse};
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/positions/:id/status", get(position_status))
        .route("/v1/positions/:id/start", post(position_start))
        .route("/v1/positions/:id/pause", post(position_pause))
        .route("/v1/positions/:id/resume", post(position_resume))
        .route("/v1/positions/:id/stop", post(position_stop))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// Worker lifecycle
// ---------------------------------------------------------------------------

fn resolve(st: &AppState, position_id: &str) -> Option<PositionRef> {
    st.engine
        .ports
        .positions
        .list()
        .into_iter()
        .find(|p| p.id == position_id)
        .map(|p| PositionRef {
            tenant_id: p.tenant_id,
            portfolio_id: p.portfolio_id,
            position_id: p.id,
        })
}

fn not_found(position_id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("position_not_found: {position_id}"),
        }),
    )
        .into_response()
}

fn status_response(st: &AppState, position_id: &str) -> Response {
    let status = st.trader.status(position_id).unwrap_or_default();
    (
        StatusCode::OK,
        Json(StatusResponse {
            position_id: position_id.to_string(),
            status,
        }),
    )
        .into_response()
}

async fn position_status(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    if resolve(&st, &id).is_none() {
        return not_found(&id);
    }
    status_response(&st, &id)
}

async fn position_start(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let Some(position) = resolve(&st, &id) else {
        return not_found(&id);
    };
    st.trader.start(position);
    info!(position_id = %id, "start requested");
    status_response(&st, &id)
}

async fn position_pause(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    if resolve(&st, &id).is_none() {
        return not_found(&id);
    }
    st.trader.pause(&id);
    status_response(&st, &id)
}

async fn position_resume(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    if resolve(&st, &id).is_none() {
        return not_found(&id);
    }
    st.trader.resume(&id);
    status_response(&st, &id)
}

async fn position_stop(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    if resolve(&st, &id).is_none() {
        return not_found(&id);
    }
    st.trader.stop(&id).await;
    info!(position_id = %id, "stop requested");
    status_response(&st, &id)
}
