use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{Ack, InboundFrame, OutboundFrame},
    error::ServiceError,
    services::room_service,
    state::{EventSender, SharedState, game::ConnectionId},
};

/// How long queued frames may take to flush once the socket is done.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle the full lifecycle for an individual client WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let connection: ConnectionId = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<OutboundFrame>();

    // Dedicated writer task keeps room events flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let message = match frame {
                OutboundFrame::Pong(payload) => Message::Pong(payload.into()),
                OutboundFrame::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
                frame => match frame.to_json() {
                    Some(Ok(text)) => Message::Text(text.into()),
                    Some(Err(err)) => {
                        warn!(error = %err, "failed to serialize outbound frame `{frame:?}`");
                        continue;
                    }
                    None => continue,
                },
            };
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    info!(%connection, "websocket connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                handle_text(&state, connection, &outbound_tx, text.as_str()).await;
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(OutboundFrame::Pong(payload.to_vec()));
            }
            Ok(Message::Close(_)) => {
                info!(%connection, "client closed websocket");
                let _ = outbound_tx.send(OutboundFrame::Close);
                break;
            }
            Ok(Message::Binary(_)) => {
                debug!(%connection, "ignoring binary frame");
            }
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%connection, error = %err, "websocket error");
                break;
            }
        }
    }

    room_service::disconnect(&state, connection).await;
    info!(%connection, "websocket disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Decode one text frame, run it and acknowledge it when the client asked for it.
async fn handle_text(
    state: &SharedState,
    connection: ConnectionId,
    outbound_tx: &EventSender,
    text: &str,
) {
    let frame = match InboundFrame::from_json_str(text) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(%connection, error = %err, "ignoring malformed frame");
            return;
        }
    };

    let result = match frame.command() {
        Ok(command) => {
            debug!(%connection, event = command.name(), "received command");
            room_service::dispatch(state, connection, outbound_tx, command).await
        }
        Err(err) => {
            warn!(%connection, event = %frame.event, error = %err, "rejected frame");
            Err(ServiceError::from(err))
        }
    };

    let reply = match result {
        Ok(reply) => reply,
        Err(err) => {
            match &err {
                ServiceError::StaleSubmission(_) => {
                    debug!(%connection, event = %frame.event, error = %err, "late answer rejected");
                }
                _ => warn!(%connection, event = %frame.event, error = %err, "command failed"),
            }
            Ack::failure(&err)
        }
    };

    if let Some(ack) = frame.ack {
        debug!(%connection, ack, ok = reply.ok, "sending ack");
        if outbound_tx.send(OutboundFrame::Ack { ack, reply }).is_err() {
            debug!(%connection, "writer closed before ack");
        }
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(mut writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<OutboundFrame>) {
    drop(outbound_tx);
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer_task)
        .await
        .is_err()
    {
        warn!("websocket writer did not drain in time, aborting");
        writer_task.abort();
    }
}
