//! HTTP route definitions

use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::app::AppState;
use crate::game::MAX_PLAYERS;
use crate::matchmaking::{self, JoinResult, MatchmakingError};
use crate::store::keys::{leader_key, meta_key, player_key, snapshot_key};
use crate::store::models::{LeaderLease, MatchMeta, PlayerRecord, SnapshotRecord};
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = if state.config.client_origin == "*" {
        CorsLayer::permissive()
    } else {
        let allowed_origins: Vec<header::HeaderValue> = state
            .config
            .client_origin
            .split(',')
            .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(allowed_origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/api/match/join", post(join_handler))
        .route("/api/match/:match_id/state", get(match_state_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_rooms: usize,
    active_coordinators: usize,
    connected_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_rooms: state.rooms.active_rooms(),
        active_coordinators: state.coordinators.active_coordinators(),
        connected_players: state.coordinators.total_connections(),
    })
}

// ============================================================================
// Match endpoints
// ============================================================================

#[derive(Deserialize, Default)]
struct JoinMatchRequest {
    #[serde(default)]
    nickname: String,
}

async fn join_handler(
    State(state): State<AppState>,
    body: Option<Json<JoinMatchRequest>>,
) -> Result<Json<JoinResult>, AppError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let result = matchmaking::join_match(&state.store, &req.nickname)
        .await
        .map_err(|err| match err {
            MatchmakingError::NoSlotAvailable => {
                AppError::Unavailable("no available match".to_string())
            }
            MatchmakingError::Store(err) => AppError::Internal(err.to_string()),
        })?;

    Ok(Json(result))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MatchStateResponse {
    meta: Option<MatchMeta>,
    leader: Option<LeaderLease>,
    snapshot_seq: u32,
    players: Vec<MatchStatePlayer>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MatchStatePlayer {
    slot: usize,
    player_id: String,
    nickname: String,
}

/// Observability endpoint: metadata, current lease holder and roster.
/// Clients poll it to display who is simulating their match.
async fn match_state_handler(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
) -> Result<Json<MatchStateResponse>, AppError> {
    let meta = state
        .store
        .get::<MatchMeta>(&meta_key(&match_id))
        .await
        .map_err(AppError::store)?
        .value;
    if meta.is_none() {
        return Err(AppError::NotFound(format!("unknown match {match_id}")));
    }

    let leader = state
        .store
        .get::<LeaderLease>(&leader_key(&match_id))
        .await
        .map_err(AppError::store)?
        .value;
    let snapshot_seq = state
        .store
        .get::<SnapshotRecord>(&snapshot_key(&match_id))
        .await
        .map_err(AppError::store)?
        .value
        .map(|record| record.seq)
        .unwrap_or(0);

    let mut players = Vec::new();
    for slot in 0..MAX_PLAYERS {
        let record = state
            .store
            .get::<PlayerRecord>(&player_key(&match_id, slot))
            .await
            .map_err(AppError::store)?
            .value;
        if let Some(record) = record {
            players.push(MatchStatePlayer {
                slot,
                player_id: record.player_id,
                nickname: record.nickname,
            });
        }
    }

    Ok(Json(MatchStateResponse {
        meta,
        leader,
        snapshot_seq,
        players,
    }))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn store(err: crate::store::StoreError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
