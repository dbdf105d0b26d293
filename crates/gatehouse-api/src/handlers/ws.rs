//! WebSocket upgrade handler.

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures::future::ready;
use futures::{SinkExt, StreamExt};
use tracing::{info, warn};

use gatehouse_realtime::message::validator::validate_stream_name;
use gatehouse_realtime::{AuthenticatedClient, HubError, StreamName, WsFrame};

use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters of the upgrade request.
#[derive(Debug, serde::Deserialize)]
pub struct WsQuery {
    /// JWT access token.
    #[serde(default)]
    pub token: String,
    /// Comma-separated streams to subscribe to on connect.
    #[serde(default)]
    pub streams: Option<String>,
}

/// GET /ws?token={jwt}&streams={a,b}: WebSocket upgrade
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    // Authenticate before upgrade
    let client = state.hub.authenticate(&query.token)?;
    let streams = parse_streams(query.streams.as_deref())?;
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    Ok(ws.on_upgrade(move |socket| handle_socket(state, client, streams, socket)))
}

/// Parses the `streams` query parameter.
pub fn parse_streams(raw: Option<&str>) -> Result<Vec<StreamName>, HubError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| validate_stream_name(name).map(|()| StreamName::parse(name)))
        .collect()
}

async fn handle_socket(
    state: AppState,
    client: AuthenticatedClient,
    streams: Vec<StreamName>,
    socket: WebSocket,
) {
    let user_id = client.user_id;
    let accepted = match state.hub.admit(client, &streams).await {
        Ok(accepted) => accepted,
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "Rejecting upgraded socket");
            return;
        }
    };
    let conn_id = accepted.handle.id;
    info!(conn_id = %conn_id, user_id = %user_id, "WebSocket connection established");

    let (ws_tx, ws_rx) = socket.split();
    let sink = ws_tx.with(|frame: WsFrame| ready(Ok::<_, axum::Error>(into_message(frame))));
    let stream = ws_rx.filter_map(|message| {
        ready(match message {
            Ok(message) => from_message(message).map(Ok),
            Err(e) => Some(Err(e)),
        })
    });

    state.hub.serve(accepted, sink, stream).await;

    info!(conn_id = %conn_id, user_id = %user_id, "WebSocket connection closed");
}

fn into_message(frame: WsFrame) -> Message {
    match frame {
        WsFrame::Text(text) => Message::Text(text.into()),
        WsFrame::Ping(payload) => Message::Ping(payload.into()),
        WsFrame::Pong(payload) => Message::Pong(payload.into()),
        WsFrame::Close => Message::Close(None),
    }
}

/// Binary frames carry nothing the hub understands and are dropped.
fn from_message(message: Message) -> Option<WsFrame> {
    match message {
        Message::Text(text) => Some(WsFrame::Text(text.as_str().to_owned())),
        Message::Ping(payload) => Some(WsFrame::Ping(payload.to_vec())),
        Message::Pong(payload) => Some(WsFrame::Pong(payload.to_vec())),
        Message::Close(_) => Some(WsFrame::Close),
        Message::Binary(_) => None,
    }
}
