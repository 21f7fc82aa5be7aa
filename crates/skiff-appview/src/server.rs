//! HTTP and WebSocket API for the appview.
//!
//! Read-only surface over the canonical store: clients fetch a whole board
//! with one call and hold a WebSocket per board for change nudges. All
//! writes arrive through the firehose sink, never through this API.
//!
//! Connect to `/api/v1/ws/board?board=<at-uri>` for live updates.

use crate::notify::BoardNotifier;
use crate::store::{CanonicalRow, CanonicalStore};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use skiff_types::RecordUri;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};

const HEARTBEAT_INTERVAL: tokio::time::Duration = tokio::time::Duration::from_secs(30);

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CanonicalStore>,
    pub notifier: BoardNotifier,
}

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    // CORS layer for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/health", get(health))
        .route("/api/v1/status", get(status))
        // Full board state
        .route("/api/v1/board", get(get_board))
        // WebSocket for board change nudges
        .route("/api/v1/ws/board", get(ws_board_handler))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the task is cancelled.
pub async fn serve(addr: SocketAddr, router: Router) -> crate::error::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "appview API listening");
    axum::serve(listener, router).await?;
    Ok(())
}

async fn health() -> &'static str {
    "OK"
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    cursor: Option<u64>,
    live_boards: usize,
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, StatusCode> {
    let cursor = state
        .store
        .load_cursor()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(StatusResponse {
        cursor,
        live_boards: state.notifier.board_count(),
    }))
}

#[derive(Debug, Deserialize)]
struct BoardQuery {
    board: String,
}

#[derive(Debug, Serialize)]
struct BoardResponse {
    board: RecordUri,
    records: Vec<CanonicalRow>,
}

async fn get_board(
    State(state): State<AppState>,
    Query(query): Query<BoardQuery>,
) -> Result<Json<BoardResponse>, StatusCode> {
    let board: RecordUri = query.board.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    let records = state
        .store
        .list_board(&board)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(BoardResponse { board, records }))
}

/// WebSocket message types for board updates
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BoardEvent {
    /// Something on the board changed; re-fetch over the HTTP API
    Update,
    /// Keep-alive
    Heartbeat { timestamp: u64 },
}

async fn ws_board_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<BoardQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, StatusCode> {
    let board: RecordUri = query.board.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    // Subscribe before the upgrade so no change between handshake and loop
    // start is lost.
    let rx = state.notifier.subscribe(&board);
    Ok(ws.on_upgrade(move |socket| handle_board_socket(socket, board, rx)))
}

async fn handle_board_socket(
    mut socket: WebSocket,
    board: RecordUri,
    mut rx: broadcast::Receiver<()>,
) {
    info!(%board, "WebSocket client connected for board updates");
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        debug!(%board, "Received from client: {}", text);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(%board, "WebSocket client disconnected");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = socket.send(Message::Pong(data)).await {
                            warn!("Failed to send pong: {}", e);
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
            changed = rx.recv() => {
                match changed {
                    // Lagged still means "something changed"; the nudge
                    // carries no payload, so collapsing misses is fine.
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        if let Err(e) = send_event(&mut socket, BoardEvent::Update).await {
                            warn!("Failed to send update: {}", e);
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!(%board, "board channel closed");
                        break;
                    }
                }
            }
            _ = heartbeat.tick() => {
                let event = BoardEvent::Heartbeat {
                    timestamp: skiff_types::now_micros(),
                };
                if let Err(e) = send_event(&mut socket, event).await {
                    warn!("Failed to send heartbeat: {}", e);
                    break;
                }
            }
        }
    }
}

async fn send_event(socket: &mut WebSocket, event: BoardEvent) -> Result<(), axum::Error> {
    let json = serde_json::to_string(&event).map_err(|e| {
        axum::Error::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            e.to_string(),
        ))
    })?;
    socket.send(Message::Text(json)).await
}
