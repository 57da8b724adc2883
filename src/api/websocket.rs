//! Per-connection WebSocket handling.
//!
//! Each upgrade authenticates against the account service, caches the
//! session, replays connect-time continuity (`game_state`, `lastWin`) and
//! then pumps two directions: inbound `PB:` bet messages into the betting
//! engine and lobby broadcast events out to the socket, with targeted
//! events filtered by session key.

use super::events::Outbound;
use super::handlers::AppState;
use crate::errors::CardiqResult;
use crate::game::round::{GameEvent, RoundPhase};
use crate::metrics::MetricsRegistry;
use crate::session::PlayerSession;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Connection query parameters.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
    pub game_id: Option<String>,
}

/// GET /ws upgrade handler.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let ip = client_ip(&headers);
    ws.on_upgrade(move |socket| handle_connection(state, socket, params, ip))
}

/// First address in `x-forwarded-for`, or empty when absent.
pub fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

async fn handle_connection(state: Arc<AppState>, socket: WebSocket, params: WsQuery, ip: String) {
    let (mut sender, mut receiver) = socket.split();

    let session = match authenticate(&state, &params, ip).await {
        Ok(session) => session,
        Err(reason) => {
            warn!(reason = %reason, "websocket authentication failed");
            let _ = sender
                .send(
                    Outbound::BetError {
                        reason: format!("Authentication error: {}", reason),
                    }
                    .into_message(),
                )
                .await;
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    let session_key = session.session_key.clone();
    let connected =
        state.metrics.websocket_connections_active.fetch_add(1, Ordering::SeqCst) + 1;
    info!(session_key = %session_key, user_id = %session.user_id, total = connected, "client connected");

    // Single writer for the sink; bet responses and broadcast events both
    // funnel through this channel.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

    let metrics = state.metrics.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
            MetricsRegistry::incr(&metrics.websocket_messages_sent);
        }
    });

    send_welcome(&state, &session, &out_tx).await;

    let mut broadcast_task = {
        let out_tx = out_tx.clone();
        let mut events = state.lobby.subscribe();
        let session_key = session_key.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Some(outbound) = route_event(event, &session_key) {
                            if out_tx.send(outbound.into_message()).is_err() {
                                break;
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(session_key = %session_key, skipped, "event stream lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    };

    // Inbound loop runs on this task.
    loop {
        tokio::select! {
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_inbound(&state, &session_key, &text, &out_tx).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(session_key = %session_key, error = %e, "websocket receive error");
                        break;
                    }
                }
            }
            _ = &mut send_task => break,
            _ = &mut broadcast_task => break,
        }
    }

    send_task.abort();
    broadcast_task.abort();

    // Disconnect clears only the ephemeral session; in-flight wagers and
    // pending settlement are untouched.
    if let Err(e) = state.sessions.delete(&session_key).await {
        warn!(session_key = %session_key, error = %e, "failed to delete session");
    }
    let remaining =
        state.metrics.websocket_connections_active.fetch_sub(1, Ordering::SeqCst) - 1;
    info!(session_key = %session_key, remaining, "client disconnected");
}

async fn authenticate(
    state: &Arc<AppState>,
    params: &WsQuery,
    ip: String,
) -> Result<PlayerSession, String> {
    let token = params
        .token
        .clone()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| "Invalid token".to_string())?;

    let detail = state
        .accounts
        .fetch_user_detail(&token)
        .await
        .map_err(|_| "Failed to authenticate user".to_string())?;

    let session = PlayerSession {
        user_id: detail.user_id,
        user_name: detail.name,
        balance: detail.balance,
        session_key: Uuid::new_v4().to_string(),
        operator_id: detail.operator_id,
        game_id: params.game_id.clone().unwrap_or_default(),
        token,
        ip,
    };

    state
        .sessions
        .put(&session)
        .await
        .map_err(|e| e.to_string())?;
    Ok(session)
}

/// Connect-time events: identity, game-state snapshot, last win.
async fn send_welcome(
    state: &Arc<AppState>,
    session: &PlayerSession,
    out_tx: &mpsc::UnboundedSender<Message>,
) {
    let _ = out_tx.send(
        Outbound::Info {
            user_id: session.user_id.clone(),
            user_name: session.user_name.clone(),
            balance: session.balance,
            operator_id: session.operator_id.clone(),
        }
        .into_message(),
    );

    let snapshot = state.lobby.snapshot();
    let outcome = if snapshot.phase >= RoundPhase::ShowCards {
        state.lobby.outcome()
    } else {
        None
    };
    let _ = out_tx.send(
        Outbound::GameState {
            round_id: snapshot.round_id,
            phase: snapshot.phase,
            history: state.lobby.history(),
            outcome,
        }
        .into_message(),
    );

    match last_win(state, session).await {
        Ok(Some(amount)) => {
            let _ = out_tx.send(Outbound::LastWin { amount }.into_message());
        }
        Ok(None) => {}
        Err(e) => warn!(user_id = %session.user_id, error = %e, "last win lookup failed"),
    }
}

async fn last_win(state: &Arc<AppState>, session: &PlayerSession) -> CardiqResult<Option<f64>> {
    state
        .store
        .last_win(&session.user_id, &session.operator_id)
        .await
}

/// Dispatch one inbound frame. Format: `PLACE_BET:<roundId>:<betData>`,
/// with `PB` accepted as the legacy short form.
async fn handle_inbound(
    state: &Arc<AppState>,
    session_key: &str,
    text: &str,
    out_tx: &mpsc::UnboundedSender<Message>,
) {
    let mut parts = text.splitn(3, ':');
    let event = parts.next().unwrap_or_default();

    match (event, parts.next(), parts.next()) {
        ("PLACE_BET" | "PB", Some(round_id), Some(bet_data)) => {
            // An unparsable round id can never match the live round.
            let round_id: u64 = round_id.parse().unwrap_or(0);
            match state.betting.place_wager(session_key, round_id, bet_data).await {
                Ok(accepted) => {
                    let _ = out_tx.send(
                        Outbound::Info {
                            user_id: accepted.user_id,
                            user_name: accepted.user_name,
                            balance: accepted.balance,
                            operator_id: accepted.operator_id,
                        }
                        .into_message(),
                    );
                    let _ = out_tx.send(Outbound::BetAccepted.into_message());
                }
                Err(rejection) => {
                    let _ = out_tx.send(
                        Outbound::BetError {
                            reason: rejection.to_string(),
                        }
                        .into_message(),
                    );
                }
            }
        }
        _ => {
            let _ = out_tx.send(
                Outbound::BetError {
                    reason: "invalid event".to_string(),
                }
                .into_message(),
            );
        }
    }
}

/// Map a lobby event to this connection's outbound message, dropping
/// targeted events addressed to other sessions.
fn route_event(event: GameEvent, session_key: &str) -> Option<Outbound> {
    match event {
        GameEvent::Phase { phase, .. } => Some(Outbound::GameStatus { status: phase }),
        GameEvent::Tick {
            round_id,
            phase,
            seconds_left,
        } => Some(Outbound::Countdown {
            round_id,
            phase_code: phase.code(),
            seconds_left,
        }),
        GameEvent::Cards { outcome } => Some(Outbound::RoundCards { outcome }),
        GameEvent::Result { outcome } => Some(Outbound::RoundResult { outcome }),
        GameEvent::Balance {
            session_key: target,
            user_id,
            user_name,
            operator_id,
            balance,
        } => (target == session_key).then_some(Outbound::Info {
            user_id,
            user_name,
            balance,
            operator_id,
        }),
        GameEvent::Settled {
            session_key: target,
            win_amount,
            status,
            winner,
            pair,
        } => (target == session_key).then_some(Outbound::Settlement {
            win_amount,
            status,
            winner,
            pair,
        }),
    }
}
