//! WebSocket transport binding for the messaging core.
//!
//! Handles the HTTP → WebSocket upgrade and the connection lifecycle:
//! 1. Capture origin and client metadata from the upgrade request
//! 2. Await the `connect` handshake event
//! 3. Admit the connection through `MessagingCore::connect`
//! 4. Pump frames both ways until either side closes
//! 5. Cascade cleanup through `MessagingCore::disconnect`
//!
//! The transport knows nothing about rooms or permissions; it only
//! parses `ClientEvent`s in and serializes `EventEnvelope`s out.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use http::HeaderMap;
use tokio::sync::mpsc;

use crate::domain::foundation::ErrorCode;
use crate::domain::realtime::ConnectionMeta;
use crate::ports::AuthCredentials;
use crate::realtime::{ClientEvent, EventEnvelope, MessagingCore};

/// Time a client has to send its `connect` event after the upgrade.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// State required for WebSocket handling.
#[derive(Clone)]
pub struct WsState {
    /// The realtime engine.
    pub core: Arc<MessagingCore>,
}

impl WsState {
    /// Creates a new WebSocket state.
    pub fn new(core: Arc<MessagingCore>) -> Self {
        Self { core }
    }
}

/// Handle WebSocket upgrade requests.
///
/// Route: `GET /ws`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<WsState>,
    headers: HeaderMap,
) -> Response {
    let origin = header_string(&headers, http::header::ORIGIN);
    let meta = ConnectionMeta {
        ip_address: header_string(&headers, http::HeaderName::from_static("x-forwarded-for")),
        user_agent: header_string(&headers, http::header::USER_AGENT),
    };
    ws.on_upgrade(move |socket| handle_socket(socket, state, origin, meta))
}

fn header_string(headers: &HeaderMap, name: http::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Runs for the lifetime of one connection.
async fn handle_socket(
    socket: WebSocket,
    state: WsState,
    origin: Option<String>,
    meta: ConnectionMeta,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let credentials = match await_connect(&mut ws_receiver).await {
        Ok(credentials) => credentials,
        Err(envelope) => {
            let _ = send_envelope(&mut ws_sender, &envelope).await;
            let _ = ws_sender.close().await;
            return;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<EventEnvelope>();
    let error_tx = tx.clone();

    let connection = match state
        .core
        .connect(credentials, origin.as_deref(), meta, tx)
        .await
    {
        Ok(connection) => connection,
        Err(rejection) => {
            // Severe connect failures terminate the transport.
            let _ = send_envelope(&mut ws_sender, &rejection.to_envelope()).await;
            let _ = ws_sender.close().await;
            return;
        }
    };
    let socket_id = connection.socket_id;

    // Pump core frames out to the transport.
    let mut send_task = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            if send_envelope(&mut ws_sender, &envelope).await.is_err() {
                tracing::debug!(socket_id = %socket_id, "Send error, closing connection");
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    // Feed transport frames into the core.
    let core = Arc::clone(&state.core);
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => core.dispatch(&socket_id, event).await,
                    Err(err) => {
                        tracing::debug!(socket_id = %socket_id, "Unparseable event: {}", err);
                        let _ = error_tx.send(EventEnvelope::error(
                            ErrorCode::MissingData,
                            "Invalid event payload",
                        ));
                    }
                },
                Ok(Message::Binary(_)) => {
                    tracing::warn!(socket_id = %socket_id, "Binary frames are not supported");
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    // Protocol-level frames are handled by the library.
                }
                Ok(Message::Close(_)) => {
                    tracing::debug!(socket_id = %socket_id, "Client sent close frame");
                    break;
                }
                Err(err) => {
                    tracing::debug!(socket_id = %socket_id, "Receive error: {}", err);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    state.core.disconnect(&socket_id).await;
}

/// Waits for the handshake `connect` event.
async fn await_connect(
    receiver: &mut SplitStream<WebSocket>,
) -> Result<AuthCredentials, EventEnvelope> {
    let frame = tokio::time::timeout(HANDSHAKE_TIMEOUT, receiver.next())
        .await
        .map_err(|_| EventEnvelope::error(ErrorCode::AuthFailed, "Handshake timed out"))?;

    match frame {
        Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientEvent>(&text) {
            Ok(ClientEvent::Connect(req)) => Ok(req.credentials),
            Ok(_) => Err(EventEnvelope::error(
                ErrorCode::AuthFailed,
                "First event must be connect",
            )),
            Err(_) => Err(EventEnvelope::error(
                ErrorCode::MissingData,
                "Invalid handshake payload",
            )),
        },
        Some(Ok(_)) => Err(EventEnvelope::error(
            ErrorCode::AuthFailed,
            "First event must be connect",
        )),
        Some(Err(_)) | None => Err(EventEnvelope::error(
            ErrorCode::ConnectionError,
            "Connection closed during handshake",
        )),
    }
}

/// Send a JSON frame over the WebSocket.
async fn send_envelope(
    sender: &mut SplitSink<WebSocket, Message>,
    envelope: &EventEnvelope,
) -> Result<(), axum::Error> {
    let json =
        serde_json::to_string(envelope).expect("EventEnvelope serialization should not fail");
    sender.send(Message::Text(json)).await
}

/// Create the axum router for the WebSocket endpoint.
pub fn websocket_router() -> axum::Router<WsState> {
    use axum::routing::get;

    axum::Router::new().route("/ws", get(ws_handler))
}
