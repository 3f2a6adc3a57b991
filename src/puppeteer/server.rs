//! Websocket endpoint the puppet connects to

use super::{PuppeteerEvent, PuppeteerState, Session};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

pub(crate) fn router(state: Arc<PuppeteerState>) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/{*path}", get(ws_handler))
        .with_state(state)
}

/// `puppet-id` query parameter; must be a non-negative integer
pub fn parse_puppet_id(params: &HashMap<String, String>) -> std::result::Result<u64, String> {
    let raw = params.get("puppet-id").ok_or_else(|| "missing puppet-id".to_string())?;
    raw.trim().parse::<u64>().map_err(|_| format!("invalid puppet-id '{}'", raw))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<PuppeteerState>>,
) -> Response {
    let puppet_id = match parse_puppet_id(&params) {
        Ok(id) => id,
        Err(reason) => {
            error!("refused connection: {}", reason);
            return (StatusCode::BAD_REQUEST, reason).into_response();
        }
    };

    if let Err((status, reason)) = state.admission(puppet_id) {
        error!("refused connection: {}", reason);
        return (status, reason).into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, puppet_id))
}

async fn handle_socket(socket: WebSocket, state: Arc<PuppeteerState>, puppet_id: u64) {
    let (mut sink, mut stream) = socket.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    let Some((conn_id, cancel)) = state.install_session(puppet_id, outbound) else {
        // lost a race with another puppet between handshake and upgrade
        error!("refused connection: puppet {} arrived while another one is connected", puppet_id);
        let _ = sink.send(Message::Close(None)).await;
        return;
    };

    info!("puppet connected, id: {}", puppet_id);
    state.emit(PuppeteerEvent::PuppetConnected { puppet_id });

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sink.send(message).await.is_err() {
                break;
            }
            if closing {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => state.on_message(text.as_str()),
                Some(Ok(Message::Close(_))) | None => {
                    debug!("puppet {} closed the connection", puppet_id);
                    break;
                }
                Some(Err(e)) => {
                    debug!("puppet {} connection error: {}", puppet_id, e);
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    state.close_session(Some(conn_id));
    let _ = writer.await;
}

impl Session {
    pub(crate) fn send_text(&self, raw: String) -> bool {
        self.outbound.send(Message::Text(raw.into())).is_ok()
    }

    pub(crate) fn close(&self) {
        let _ = self.outbound.send(Message::Close(None));
        self.cancel.cancel();
    }
}
