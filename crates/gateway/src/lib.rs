//! WebSocket transport for the realtime session channel.
//!
//! Auth happens before the upgrade: a `?token=` query param is resolved to a
//! user id through [`relaychat_chat::ports::AuthPort`], then the connection
//! is handed to [`ws::handle_connection`] for its full lifecycle. Everything
//! else — parsing, authorization, persistence, fan-out — lives in
//! `relaychat-chat`; this crate only owns the socket.
//!
//! Split into "accept the upgrade" (`ws_upgrade_handler`) and "run the
//! connection" (`ws::handle_connection`).

mod state;
mod ws;

use std::sync::Arc;

use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;

pub use relaychat_chat::ports::{AuthPort, NullAuthPort, PortError};
pub use state::GatewayState;
pub use ws::{handle_connection, resolve_user, run_periodic_read_flush};

#[derive(Debug, Deserialize)]
struct ConnectQuery {
    token: Option<String>,
}

/// Build the single `/ws` route. The embedder mounts this router alongside
/// whatever REST surface it owns; this crate has none of its own — every
/// other operation is a plain async method an embedding HTTP layer calls
/// directly on the service structs.
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new().route("/ws", get(ws_upgrade_handler)).with_state(state)
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<ConnectQuery>,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    match resolve_user(&state, query.token.as_deref()).await {
        Ok(user_id) => ws.on_upgrade(move |socket| async move {
            handle_connection(socket, state, user_id).await;
        }),
        Err(err) => {
            tracing::warn!(%err, "ws: rejecting upgrade, auth failed");
            axum::http::StatusCode::UNAUTHORIZED.into_response()
        },
    }
}
