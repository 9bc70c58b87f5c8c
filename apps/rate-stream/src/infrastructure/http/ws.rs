//! WebSocket Endpoint
//!
//! Binds subscriber registration to the actual connection lifecycle:
//! register on upgrade, wait for disconnect, unregister exactly once.
//!
//! Each connection runs two tasks. The writer task drains an outbound
//! queue into the socket; the queue's sender side is what the registry
//! holds (a `WsSink`), so the registry never owns the socket itself.
//! The receive loop reads inbound frames solely to detect disconnect.
//! Both tasks observe a per-connection cancellation token, which is
//! also how a failed broadcast send tears the connection down.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use metrics::gauge;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::AppState;
use crate::domain::registry::{SinkError, SubscriberSink, next_subscriber_id};

/// WebSocket routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/ws/currency", get(ws_handler))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one subscriber connection from registration to teardown.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let id = next_subscriber_id();
    let (sender, receiver) = socket.split();

    let token = state.shutdown.child_token();
    let (tx, rx) = mpsc::channel::<String>(state.outbound_capacity);

    let writer = tokio::spawn(write_loop(sender, rx, token.clone()));

    let sink = Arc::new(WsSink {
        tx,
        token: token.clone(),
    });
    state.registry.register(id, sink);
    update_subscriber_gauge(&state);
    tracing::info!(subscriber = id, total = state.registry.len(), "subscriber connected");

    read_until_disconnect(receiver, &token).await;

    // Unregister is idempotent, so it does not matter whether this path
    // or a failed broadcast send noticed the disconnect first.
    state.registry.unregister(id);
    token.cancel();
    let _ = writer.await;

    update_subscriber_gauge(&state);
    tracing::info!(subscriber = id, total = state.registry.len(), "subscriber disconnected");
}

/// Drain the outbound queue into the socket until the connection dies.
async fn write_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<String>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            () = token.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            payload = rx.recv() => match payload {
                Some(payload) => {
                    if sender.send(Message::Text(payload.into())).await.is_err() {
                        token.cancel();
                        break;
                    }
                }
                None => break,
            },
        }
    }
}

/// Suspend until the peer disconnects, an I/O error occurs, or the
/// service shuts down. Inbound message content is ignored.
async fn read_until_disconnect(mut receiver: SplitStream<WebSocket>, token: &CancellationToken) {
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            frame = receiver.next() => match frame {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

fn update_subscriber_gauge(state: &AppState) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("rate_stream_subscribers_active").set(state.registry.len() as f64);
}

/// Delivery channel handle stored in the registry.
///
/// Holds only the outbound queue sender and the connection token, never
/// the socket: dropping the registry entry cannot keep a dead
/// connection alive.
struct WsSink {
    tx: mpsc::Sender<String>,
    token: CancellationToken,
}

#[async_trait]
impl SubscriberSink for WsSink {
    async fn send(&self, payload: &str) -> Result<(), SinkError> {
        if self.token.is_cancelled() {
            return Err(SinkError::Closed);
        }
        self.tx
            .send(payload.to_owned())
            .await
            .map_err(|_| SinkError::Closed)
    }

    async fn close(&self) {
        self.token.cancel();
    }
}
