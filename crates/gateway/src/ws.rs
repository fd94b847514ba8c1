use std::{collections::HashMap, sync::Arc};

use axum::extract::ws::{Message, WebSocket};
use futures::{stream::StreamExt, SinkExt};
use relaychat_chat::ports::PortError;
use relaychat_protocol::{ErrorEnvelope, InboundFrame};
use relaychat_session::IdentitySnapshot;
use tracing::{debug, info, warn};

use crate::state::GatewayState;

/// Resolve the `?token=` query param to a user id before upgrading.
pub async fn resolve_user(state: &GatewayState, token: Option<&str>) -> Result<u64, PortError> {
    let token = token.ok_or(PortError::Rejected("missing token".into()))?;
    state.auth.resolve_token(token).await
}

/// Handle one WebSocket connection end to end: attach, read-cursor
/// bootstrap, message loop, detach-and-flush cleanup.
pub async fn handle_connection(socket: WebSocket, state: Arc<GatewayState>, user_id: u64) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, user_id, "ws: connection opened");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (sender, mut receiver) = relaychat_session::SessionHub::new_connection_channel();

    let identity = match state.chat.store().get_user(user_id).await {
        Ok(Some(user)) => IdentitySnapshot {
            nickname: user.nickname,
            avatar: user.avatar,
        },
        Ok(None) => {
            warn!(conn_id = %conn_id, user_id, "ws: unknown user, closing");
            return;
        },
        Err(err) => {
            warn!(conn_id = %conn_id, user_id, %err, "ws: failed to load identity");
            return;
        },
    };

    let outcome = state.hub.attach(user_id, conn_id.clone(), identity, sender).await;
    if outcome.is_first_connection {
        if let Err(err) = bootstrap_read_cursors(&state, user_id, &outcome.user_state).await {
            warn!(conn_id = %conn_id, user_id, %err, "ws: failed to bootstrap read cursors");
        }
    }

    let write_conn_id = conn_id.clone();
    let heartbeat_interval = std::time::Duration::from_secs(state.heartbeat_interval_secs);
    let write_handle = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(heartbeat_interval);
        heartbeat.tick().await; // first tick fires immediately
        loop {
            tokio::select! {
                batch = relaychat_session::recv_batch(&mut receiver) => {
                    let Some(batch) = batch else {
                        debug!(conn_id = %write_conn_id, "ws: outbound channel closed");
                        return;
                    };
                    for frame in batch {
                        if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                            debug!(conn_id = %write_conn_id, "ws: write loop closed");
                            return;
                        }
                    }
                },
                _ = heartbeat.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        debug!(conn_id = %write_conn_id, "ws: heartbeat ping failed, closing");
                        return;
                    }
                },
            }
        }
    });

    let read_deadline = std::time::Duration::from_secs(state.read_deadline_secs);
    loop {
        let next = tokio::time::timeout(read_deadline, ws_rx.next()).await;
        let msg = match next {
            Ok(Some(msg)) => msg,
            Ok(None) => break,
            Err(_) => {
                debug!(conn_id = %conn_id, user_id, "ws: idle timeout");
                break;
            },
        };

        let text = match msg {
            Ok(Message::Text(t)) => t.to_string(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                debug!(conn_id = %conn_id, user_id, %err, "ws: read error");
                break;
            },
        };

        if text.len() > state.max_frame_bytes {
            let err = ErrorEnvelope::new("frame too large");
            send_error(&state, user_id, err).await;
            continue;
        }

        handle_frame(&state, user_id, &outcome.user_state, &text).await;
    }

    if let Some(user_state) = state.hub.detach(&conn_id).await {
        let now_ms = relaychat_common::now_ms();
        if let Err(err) = state.read_receipts.flush_user(user_id, &user_state, now_ms).await {
            warn!(conn_id = %conn_id, user_id, %err, "ws: failed to flush read cursors on detach");
        }
    }

    write_handle.abort();
    info!(conn_id = %conn_id, user_id, "ws: connection closed");
}

async fn handle_frame(
    state: &Arc<GatewayState>,
    user_id: u64,
    user_state: &Arc<tokio::sync::RwLock<relaychat_session::UserSession>>,
    text: &str,
) {
    let frame = match InboundFrame::parse(text) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(user_id, %err, "ws: invalid frame");
            send_error(state, user_id, ErrorEnvelope::new("invalid frame")).await;
            return;
        },
    };

    match frame {
        InboundFrame::Message(inbound) => {
            let now_ms = relaychat_common::now_ms();
            let identity = user_state.read().await.identity.clone();
            let result = state
                .chat
                .handle_send(
                    user_id,
                    &identity,
                    user_state,
                    inbound.send_to,
                    inbound.send_type,
                    &inbound.send_content,
                    inbound.extra,
                    inbound.packet_id.clone(),
                    now_ms,
                )
                .await;
            if let Err(err) = result {
                send_error(state, user_id, err.into_envelope(inbound.packet_id)).await;
            }
        },
        InboundFrame::ReadAck(ack) => {
            state.chat.handle_read_ack(user_state, ack.room_id, ack.last_read_msg_id).await;
        },
    }
}

async fn send_error(state: &Arc<GatewayState>, user_id: u64, envelope: ErrorEnvelope) {
    if let Ok(bytes) = serde_json::to_string(&envelope) {
        state.hub.send_to_user(user_id, bytes).await;
    }
}

/// Periodically flush every online user's read cursor, independent of
/// detach-triggered flushes ("optional periodic tick (recommended
/// 5s)"). The embedder spawns this once alongside the `/ws` route.
pub async fn run_periodic_read_flush(state: Arc<GatewayState>) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(state.read_flush_interval_secs));
    loop {
        ticker.tick().await;
        let now_ms = relaychat_common::now_ms();
        for (user_id, user_state) in state.hub.online_user_states().await {
            if let Err(err) = state.read_receipts.flush_user(user_id, &user_state, now_ms).await {
                warn!(user_id, %err, "periodic read-cursor flush failed");
            }
        }
    }
}

async fn bootstrap_read_cursors(
    state: &Arc<GatewayState>,
    user_id: u64,
    user_state: &Arc<tokio::sync::RwLock<relaychat_session::UserSession>>,
) -> relaychat_chat::Result<()> {
    let conversations = state.chat.store().list_conversations(user_id).await?;
    let snapshot: HashMap<u64, u64> = conversations
        .into_iter()
        .filter_map(|c| c.last_read_msg_id.map(|id| (c.room_id, id)))
        .collect();
    user_state.write().await.seed_read_list(snapshot);
    Ok(())
}
