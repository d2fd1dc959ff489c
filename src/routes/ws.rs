//! WebSocket handler — authenticated, room-scoped event relay.
//!
//! DESIGN
//! ======
//! On upgrade the credential from `?token=` is resolved before any frame is
//! read. The connection is then registered and enters a `select!` loop:
//! - Incoming client frames → parse + decode + dispatch to a handler
//! - Frames queued by peers' broadcasts → forward to client
//! - Liveness pings → sent on the socket
//!
//! The whole loop is raced against the handle's close flag, so an eviction
//! ends the task even mid-write. Any inbound text frame counts as a sign of
//! life for the liveness monitor, same as a pong.
//!
//! Handler functions are pure business logic: they validate, mutate state,
//! and return an `Outcome`. The dispatch layer owns all outbound concerns:
//! reply to sender and broadcast to peers.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → authenticate, or close with 4001 (1011 on backend failure)
//! 2. Client sends frames → dispatch → handler returns Outcome
//! 3. Dispatch applies Outcome (reply / broadcast / both)
//! 4. Close, error or eviction → unregister → `PRESENCE_LEAVE` to every
//!    room the connection was still in
//!
//! Frames from one connection are handled strictly in arrival order: the
//! loop awaits each dispatch before reading the next frame.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::FutureExt;
use tokio::time::{Duration, timeout};
use tracing::{debug, error, info, warn};

use crate::broadcast::broadcast_room;
use crate::connection::{ConnectionChannels, ConnectionHandle, Control};
use crate::event::{Envelope, Event, EventError, ProtocolError};
use crate::frame::{ErrorCode, Frame, SERVER_ERROR_MESSAGE, codes};
use crate::services::auth::Identity;
use crate::services::room::announce_departure;
use crate::services::{self, EventContext, Outcome};
use crate::state::AppState;

/// Close code for a missing or rejected credential.
pub const CLOSE_UNAUTHORIZED: u16 = 4001;

const HEARTBEAT_TIMEOUT_REASON: &str = "Heartbeat timeout";

/// How long an evicted connection gets to flush its close frame.
const CLOSE_SEND_TIMEOUT: Duration = Duration::from_secs(1);

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let token = params.get("token").cloned();
    ws.on_upgrade(move |socket| run_ws(socket, state, token))
}

/// Resolve the connection credential, or the close frame to reject it with.
async fn authenticate(state: &AppState, token: Option<&str>) -> Result<Identity, CloseFrame> {
    let unauthorized = || CloseFrame { code: CLOSE_UNAUTHORIZED, reason: "Unauthorized".into() };

    let Some(token) = token.filter(|t| !t.is_empty()) else {
        return Err(unauthorized());
    };
    match state.auth.authenticate(token).await {
        Ok(Some(identity)) => Ok(identity),
        Ok(None) => Err(unauthorized()),
        Err(e) => {
            error!(error = %e, "ws: authentication backend failed");
            Err(CloseFrame { code: close_code::ERROR, reason: "Authentication unavailable".into() })
        }
    }
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, token: Option<String>) {
    let identity = match authenticate(&state, token.as_deref()).await {
        Ok(identity) => identity,
        Err(close) => {
            warn!(code = close.code, "ws: rejected connection");
            let _ = socket.send(Message::Close(Some(close))).await;
            return;
        }
    };

    let (conn, mut channels) = ConnectionHandle::new(identity, state.config.outbound_queue_capacity);
    state.registry.register(conn.clone());
    info!(conn_id = %conn.id, user_id = %conn.user_id(), name = %conn.identity.name, "ws: client connected");

    // Eviction closes the handle; dropping the session future cancels any
    // socket write that is stuck on a peer that stopped reading.
    let evicted = tokio::select! {
        () = run_session(&mut socket, &state, &conn, &mut channels) => false,
        () = conn.closed() => true,
    };

    if evicted {
        let close = CloseFrame { code: close_code::NORMAL, reason: HEARTBEAT_TIMEOUT_REASON.into() };
        if timeout(CLOSE_SEND_TIMEOUT, socket.send(Message::Close(Some(close)))).await.is_err() {
            warn!(conn_id = %conn.id, "ws: peer not reading, dropping socket without close frame");
        }
    }

    teardown(&state, &conn);
}

/// Pump frames until the peer leaves or a write fails.
async fn run_session(
    socket: &mut WebSocket,
    state: &AppState,
    conn: &ConnectionHandle,
    channels: &mut ConnectionChannels,
) {
    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { return };
                match msg {
                    Message::Text(text) => {
                        conn.mark_alive();
                        for frame in process_inbound_text(state, conn, text.as_str()).await {
                            if send_frame(socket, &frame).await.is_err() {
                                return;
                            }
                        }
                    }
                    Message::Pong(_) => conn.mark_alive(),
                    Message::Close(_) => return,
                    Message::Ping(_) | Message::Binary(_) => {}
                }
            }
            Some(frame) = channels.outbound.recv() => {
                if send_frame(socket, &frame).await.is_err() {
                    return;
                }
            }
            Some(control) = channels.control.recv() => match control {
                Control::Ping => {
                    if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                        return;
                    }
                }
            },
        }
    }
}

/// Remove a finished connection and tell its rooms. Safe after eviction:
/// the registry no longer lists any rooms, so nothing is announced twice.
fn teardown(state: &AppState, conn: &ConnectionHandle) {
    conn.close();
    let rooms = state.registry.unregister(conn.id);
    announce_departure(&state.registry, &conn.identity, &rooms);
    info!(conn_id = %conn.id, user_id = %conn.user_id(), rooms = rooms.len(), "ws: client disconnected");
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse and process one inbound text frame and return frames for the sender.
///
/// Broadcasts are queued on peers' outbound channels as a side effect. This
/// keeps the websocket transport separate from frame handling, so tests can
/// exercise the whole pipeline without a socket.
pub(crate) async fn process_inbound_text(state: &AppState, conn: &ConnectionHandle, text: &str) -> Vec<Frame> {
    if text.len() > state.config.max_frame_bytes {
        warn!(conn_id = %conn.id, bytes = text.len(), "ws: inbound frame too large");
        return vec![Frame::error_from(&ProtocolError::TooLarge)];
    }

    let Envelope { kind, payload, request_id } = match Envelope::parse(text) {
        Ok(envelope) => envelope,
        Err(rejection) => {
            warn!(conn_id = %conn.id, error = %rejection.error, "ws: rejected frame");
            return vec![Frame::error_from(&rejection.error).with_request_id(rejection.request_id)];
        }
    };

    if kind.is_ephemeral() {
        debug!(conn_id = %conn.id, event = kind.as_str(), "ws: recv event");
    } else {
        info!(conn_id = %conn.id, user_id = %conn.user_id(), event = kind.as_str(), "ws: recv event");
    }

    let result = match Event::decode(kind, payload) {
        Ok(event) => AssertUnwindSafe(dispatch(state, conn, event)).catch_unwind().await,
        Err(err) => Ok(Err(err)),
    };

    match result {
        Ok(Ok(outcome)) => apply_outcome(state, conn, outcome, request_id),
        Ok(Err(err)) => {
            log_event_error(conn, kind.as_str(), &err);
            vec![Frame::error_from(&err).with_request_id(request_id)]
        }
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            error!(conn_id = %conn.id, event = kind.as_str(), panic = %detail, "ws: handler panicked");
            vec![Frame::error(codes::SERVER_ERROR, SERVER_ERROR_MESSAGE).with_request_id(request_id)]
        }
    }
}

/// Route a decoded event to its handler.
async fn dispatch(state: &AppState, conn: &ConnectionHandle, event: Event) -> Result<Outcome, EventError> {
    let ctx = EventContext::new(state, conn);
    match event {
        Event::RoomJoin(req) => services::room::join(&ctx, req).await,
        Event::RoomLeave(req) => Ok(services::room::leave(&ctx, req)),
        Event::ChatSend(req) => services::chat::send(&ctx, req).await,
        Event::ChatTyping(req) => services::chat::typing(&ctx, req).await,
        Event::ChatDelete(req) => services::chat::delete(&ctx, req).await,
        Event::BoardElementAdd(req) => services::board::add(&ctx, req).await,
        Event::BoardElementUpdate(req) => services::board::update(&ctx, req).await,
        Event::BoardElementDelete(req) => services::board::delete(&ctx, req).await,
        Event::BoardElementRestore(req) => services::board::restore(&ctx, req).await,
        Event::BoardElementLive(req) => services::board::live(&ctx, req).await,
        Event::PresenceUpdate(req) => services::presence::update(&ctx, req).await,
    }
}

/// Apply an outcome. The dispatch layer owns all outbound logic.
fn apply_outcome(
    state: &AppState,
    conn: &ConnectionHandle,
    outcome: Outcome,
    request_id: Option<serde_json::Value>,
) -> Vec<Frame> {
    match outcome {
        Outcome::Reply(frame) => vec![frame.with_request_id(request_id)],
        Outcome::Broadcast { room_id, frame } => {
            broadcast_room(&state.registry, room_id, &frame, None);
            vec![]
        }
        Outcome::BroadcastOthers { room_id, frame } => {
            broadcast_room(&state.registry, room_id, &frame, Some(conn.id));
            vec![]
        }
        Outcome::ReplyAndBroadcast { reply, room_id, broadcast } => {
            broadcast_room(&state.registry, room_id, &broadcast, Some(conn.id));
            vec![reply.with_request_id(request_id)]
        }
    }
}

fn log_event_error(conn: &ConnectionHandle, event: &str, err: &EventError) {
    match err {
        EventError::Store(e) => {
            error!(conn_id = %conn.id, event, error = %e, "ws: store failure");
        }
        _ => {
            warn!(conn_id = %conn.id, event, code = err.error_code(), message = %err, "ws: event rejected");
        }
    }
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match frame.to_text() {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
