//! HTTP and WebSocket surface of the relay.

use crate::registry::{Frame, MemberId, Payload, SessionRegistry};
use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use handset_core::{Envelope, Method, SessionId};
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;

pub fn router(registry: SessionRegistry) -> Router {
    Router::new()
        .route("/ws/{session}", get(ws_handler))
        .route("/sessions/{session}", get(session_info))
        .route("/health", get(health))
        .with_state(registry)
}

async fn ws_handler(
    Path(session): Path<String>,
    State(registry): State<SessionRegistry>,
    ws: WebSocketUpgrade,
) -> Response {
    match session.parse::<SessionId>() {
        Ok(session) => ws
            .on_upgrade(move |socket| handle_socket(socket, session, registry))
            .into_response(),
        Err(e) => {
            tracing::debug!("Rejected session id {:?}: {}", session, e);
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
    }
}

/// Relay frames between `socket` and the other members of `session`.
async fn handle_socket(socket: WebSocket, session: SessionId, registry: SessionRegistry) {
    let membership = registry.join(&session).await;
    let me = membership.member;
    let tx = membership.tx;
    let mut rx = membership.rx;
    tracing::info!(%session, member = %me, members = membership.members, "member joined");
    announce(&tx, me, Method::MemberJoined, membership.members);

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let _ = tx.send(Frame { from: me, payload: Payload::Text(text.to_string()) });
                }
                Some(Ok(Message::Binary(data))) => {
                    let _ = tx.send(Frame { from: me, payload: Payload::Binary(data.to_vec()) });
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(%session, member = %me, error = %e, "receive error");
                    break;
                }
            },
            frame = rx.recv() => match frame {
                Ok(frame) if frame.from == me => {}
                Ok(frame) => {
                    if sink.send(to_message(frame.payload)).await.is_err() {
                        break;
                    }
                }
                // Dropping frames would break ordering; make the member
                // reconnect and start over from a snapshot instead.
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(%session, member = %me, skipped = n, "member lagged, disconnecting");
                    break;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    let _ = sink.close().await;
    let remaining = registry.leave(&session, me).await;
    tracing::info!(%session, member = %me, remaining, "member left");
    if remaining > 0 {
        announce(&tx, me, Method::MemberLeft, remaining);
    }
}

fn to_message(payload: Payload) -> Message {
    match payload {
        Payload::Text(text) => Message::Text(text.into()),
        Payload::Binary(data) => Message::Binary(data.into()),
    }
}

fn announce(tx: &broadcast::Sender<Frame>, from: MemberId, method: Method, members: usize) {
    let envelope = Envelope::new(method, Some(json!({ "members": members })));
    if let Ok(text) = envelope.to_text() {
        let _ = tx.send(Frame {
            from,
            payload: Payload::Text(text),
        });
    }
}

#[derive(Serialize)]
struct SessionInfo {
    session: SessionId,
    members: usize,
}

async fn session_info(
    Path(session): Path<String>,
    State(registry): State<SessionRegistry>,
) -> Result<Json<SessionInfo>, StatusCode> {
    let session: SessionId = session.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    let members = registry
        .members(&session)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(SessionInfo { session, members }))
}

async fn health(State(registry): State<SessionRegistry>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "sessions": registry.len().await,
    }))
}
