use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, timeout};

use crate::state::{AppState, Keepalive};
use crate::ws::protocol;
use crate::ws::ConnectionSender;

/// How long the writer may keep flushing queued frames after the reader stops.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Close code used when a keepalive pong never arrives (1001 = going away).
const CLOSE_KEEPALIVE_EXPIRED: u16 = 1001;

/// Run the actor-per-connection pattern for one relay WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Reader loop: decodes incoming frames and dispatches them to the gateway
///
/// The mpsc channel is the connection's single FIFO outbound queue; relays
/// from other connections push into it through the connection registry.
pub async fn run_connection(socket: WebSocket, state: AppState, peer: SocketAddr) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    // Connecting -> Connected
    let conn_id = state.gateway.connect(tx.clone());

    tracing::info!(conn_id = %conn_id, peer = %peer, "WebSocket actor started");

    // Spawn writer task: forwards mpsc messages to WebSocket sink
    let mut writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception for the keepalive task
    let (pong_tx, pong_rx) = mpsc::unbounded_channel::<()>();
    let (expired_tx, mut expired_rx) = oneshot::channel::<()>();

    let keepalive_enabled = state.keepalive.is_some();
    let keepalive_handle = state
        .keepalive
        .map(|keepalive| tokio::spawn(keepalive_task(keepalive, tx.clone(), pong_rx, expired_tx)));

    // Reader loop: process incoming WebSocket messages
    loop {
        tokio::select! {
            next = ws_receiver.next() => match next {
                Some(Ok(msg)) => match msg {
                    Message::Text(text) => {
                        protocol::handle_text_message(text.as_str(), &state, conn_id);
                    }
                    Message::Binary(data) => {
                        protocol::handle_binary_message(&data, &state, conn_id);
                    }
                    Message::Pong(_) => {
                        // Pong received: notify the keepalive task
                        let _ = pong_tx.send(());
                    }
                    Message::Ping(_) => {
                        // The socket queues the pong reply itself while reading
                    }
                    Message::Close(frame) => {
                        tracing::info!(
                            conn_id = %conn_id,
                            reason = ?frame,
                            "Client initiated close"
                        );
                        break;
                    }
                },
                Some(Err(e)) => {
                    tracing::warn!(
                        conn_id = %conn_id,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
                None => {
                    // Stream ended, client disconnected
                    tracing::info!(conn_id = %conn_id, "WebSocket stream ended");
                    break;
                }
            },
            _ = &mut expired_rx, if keepalive_enabled => {
                // Keepalive expired, or the writer died and the keepalive task gave up
                tracing::warn!(conn_id = %conn_id, "Keepalive expired, dropping connection");
                break;
            }
        }
    }

    // Connected -> Disconnected: leave every room, then deregister
    state.gateway.disconnect(conn_id);

    if let Some(handle) = keepalive_handle {
        handle.abort();
    }

    // Once every sender is gone the writer flushes what is queued and closes the sink
    drop(tx);
    if timeout(WRITER_DRAIN_TIMEOUT, &mut writer_handle).await.is_err() {
        writer_handle.abort();
    }

    tracing::info!(conn_id = %conn_id, peer = %peer, "WebSocket actor stopped");
}

/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed, connection is broken
            return;
        }
    }
    let _ = ws_sender.close().await;
}

/// Keepalive task: sends periodic pings and signals `expired` when a pong
/// does not arrive in time.
async fn keepalive_task(
    keepalive: Keepalive,
    tx: ConnectionSender,
    mut pong_rx: mpsc::UnboundedReceiver<()>,
    expired: oneshot::Sender<()>,
) {
    let mut ping_timer = interval(keepalive.interval);
    // Skip the first immediate tick
    ping_timer.tick().await;

    loop {
        ping_timer.tick().await;

        // Unsolicited pongs do not count towards this round
        while pong_rx.try_recv().is_ok() {}

        if tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
            // Writer task has died, connection is gone
            break;
        }

        match timeout(keepalive.timeout, pong_rx.recv()).await {
            Ok(Some(())) => {}
            _ => {
                let _ = tx.send(Message::Close(Some(CloseFrame {
                    code: CLOSE_KEEPALIVE_EXPIRED,
                    reason: "Pong timeout".into(),
                })));
                let _ = expired.send(());
                break;
            }
        }
    }
}
