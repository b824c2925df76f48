//! # Live Status Endpoint
//!
//! `GET /purchases/{id}/live` upgrades to a WebSocket that streams the
//! purchase's status until it settles.
//!
//! ## Admission
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Origin not allowed            ──► 403                                  │
//! │  no / bad "bearer, <jwt>"      ──► 401                                  │
//! │  unknown purchase              ──► 404                                  │
//! │  purchase already watched      ──► upgrade, close 1008 "limit reached"  │
//! │  otherwise                     ──► upgrade, push current status         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Connection Tasks
//! ```text
//!   session loop ──┐
//!                  ├──► outgoing mpsc ──► outgoing task ──► socket sink
//!   ping task ─────┘
//!
//!   socket stream ──► session loop
//! ```

use axum::body::Bytes;
use axum::extract::rejection::PathRejection;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::header::{ORIGIN, SEC_WEBSOCKET_PROTOCOL};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use boxoffice_settlement::{LiveMessage, LiveSession, PublishError, SettlementError};

use crate::auth::{token_from_protocols, BEARER_PROTOCOL};
use crate::error::{ApiError, ApiResult};
use crate::routes::purchases::purchase_id;
use crate::AppState;

const OUTGOING_CAPACITY: usize = 32;

/// `GET /purchases/{id}/live`
pub async fn live(
    State(state): State<AppState>,
    headers: HeaderMap,
    id: Result<Path<Uuid>, PathRejection>,
    ws: WebSocketUpgrade,
) -> Response {
    match admit(&state, &headers, id).await {
        Ok(Admission::Open(session)) => {
            let ping_every = Duration::from_secs(state.config.live.ping_interval_secs);
            ws.protocols([BEARER_PROTOCOL])
                .on_upgrade(move |socket| run_session(socket, session, ping_every))
        }
        Ok(Admission::LimitReached(purchase_id)) => ws
            .protocols([BEARER_PROTOCOL])
            .on_upgrade(move |socket| reject_limit_reached(socket, purchase_id)),
        Err(e) => e.into_response(),
    }
}

enum Admission {
    Open(LiveSession),
    LimitReached(Uuid),
}

async fn admit(
    state: &AppState,
    headers: &HeaderMap,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Admission> {
    let origin = headers
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !state.config.live.allows_origin(origin) {
        warn!(origin, "Live connection from disallowed origin");
        return Err(ApiError::forbidden("ORIGIN_NOT_ALLOWED", "origin not allowed"));
    }

    let token = headers
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .and_then(token_from_protocols)
        .ok_or_else(|| ApiError::unauthenticated("missing bearer token"))?;
    let operator = state.jwt.validate_token(token)?;

    let purchase_id = purchase_id(id)?;
    match state.live.open(purchase_id).await {
        Ok(session) => {
            info!(purchase_id = %purchase_id, operator_id = %operator.id, "Live connection admitted");
            Ok(Admission::Open(session))
        }
        Err(SettlementError::Publish(PublishError::LimitReached { purchase_id })) => {
            warn!(purchase_id = %purchase_id, "Live connection refused, limit reached");
            Ok(Admission::LimitReached(purchase_id))
        }
        Err(e) => Err(e.into()),
    }
}

async fn reject_limit_reached(mut socket: WebSocket, purchase_id: Uuid) {
    let frame = CloseFrame {
        code: close_code::POLICY,
        reason: "limit reached".into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!(purchase_id = %purchase_id, error = %e, "Could not send close frame");
    }
}

/// Drives one admitted connection until the purchase settles or the
/// client leaves. Dropping `session` at the end frees the purchase's slot.
async fn run_session(socket: WebSocket, mut session: LiveSession, ping_every: Duration) {
    let purchase_id = session.purchase_id();
    let (mut sender, mut receiver) = socket.split();
    let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<Message>(OUTGOING_CAPACITY);

    let outgoing_handle = tokio::spawn(async move {
        while let Some(msg) = outgoing_rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let ping_tx = outgoing_tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_interval = interval(ping_every);
        ping_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ping_interval.tick().await;
        loop {
            ping_interval.tick().await;
            if ping_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                break;
            }
        }
    });

    let initial = session.initial_message();
    let mut settled = initial.is_final_status();
    let mut connected = send_message(&outgoing_tx, &initial).await;

    while connected && !settled {
        tokio::select! {
            update = session.next_update() => match update {
                Some(msg) => {
                    settled = msg.is_final_status();
                    connected = send_message(&outgoing_tx, &msg).await;
                }
                None => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let reply = answer(&session, serde_json::from_str(&text)).await;
                    connected = send_message(&outgoing_tx, &reply).await;
                }
                Some(Ok(Message::Binary(data))) => {
                    let reply = answer(&session, serde_json::from_slice(&data)).await;
                    connected = send_message(&outgoing_tx, &reply).await;
                }
                Some(Ok(Message::Ping(data))) => {
                    connected = outgoing_tx.send(Message::Pong(data)).await.is_ok();
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => {
                    debug!(purchase_id = %purchase_id, "Client closed live connection");
                    break;
                }
                Some(Err(e)) => {
                    warn!(purchase_id = %purchase_id, error = %e, "Live connection error");
                    break;
                }
            },
        }
    }

    if connected && settled {
        let frame = CloseFrame {
            code: close_code::NORMAL,
            reason: "purchase settled".into(),
        };
        let _ = outgoing_tx.send(Message::Close(Some(frame))).await;
    }

    // Cleanup: let the outgoing task drain before the socket goes away
    ping_handle.abort();
    drop(outgoing_tx);
    let _ = outgoing_handle.await;
    drop(session);
    debug!(purchase_id = %purchase_id, "Live connection finished");
}

async fn answer(session: &LiveSession, parsed: serde_json::Result<LiveMessage>) -> LiveMessage {
    match parsed {
        Ok(msg) => session.handle_client_message(msg).await,
        Err(e) => {
            debug!(purchase_id = %session.purchase_id(), error = %e, "Invalid live message");
            LiveMessage::error("invalid message")
        }
    }
}

/// Queues `msg`; false once the connection is gone.
async fn send_message(outgoing: &mpsc::Sender<Message>, msg: &LiveMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => outgoing.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to encode live message");
            true
        }
    }
}
