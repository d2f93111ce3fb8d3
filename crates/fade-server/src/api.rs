/// HTTP surface: initial-load query and the WebSocket endpoint.
///
/// The socket is served at `/` (what the bundled web client opens) and at `/ws`.
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use fade_protocol::ChatRoom;
use serde_json::json;

use crate::ws;

pub fn router(room: ChatRoom) -> Router {
    Router::new()
        .route("/api/messages", get(list_messages))
        .route("/", get(ws::upgrade))
        .route("/ws", get(ws::upgrade))
        .with_state(room)
}

/// Live messages, oldest first.
async fn list_messages(State(room): State<ChatRoom>) -> Response {
    // Store reads may block on SQLite
    let listed = tokio::task::spawn_blocking(move || room.list_active()).await;
    match listed {
        Ok(Ok(messages)) => Json(messages).into_response(),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "failed to list messages");
            fetch_failed()
        }
        Err(e) => {
            tracing::error!(error = %e, "list task failed");
            fetch_failed()
        }
    }
}

fn fetch_failed() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Failed to fetch messages" })),
    )
        .into_response()
}
