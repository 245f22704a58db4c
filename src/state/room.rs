//! Room actor: one tokio task per room, owning its [`RoomSession`].
//!
//! Commands, disconnects and timer wake-ups are serialized through a single
//! `select!` loop, so every mutation of a room is totally ordered.

use std::{future, sync::Arc, time::Duration};

use indexmap::IndexMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::{
    dao::{history::HistoryRecorder, models::RoundSummary},
    dto::ws::OutboundFrame,
    error::ServiceError,
    state::{
        clock::Clock,
        game::ConnectionId,
        session::{Audience, CommandReply, Effect, RoomCommand, RoomSession},
    },
};

/// Channel feeding a connection's writer task.
pub type EventSender = mpsc::UnboundedSender<OutboundFrame>;

const COMMAND_BUFFER: usize = 64;

enum RoomMessage {
    Command {
        actor: ConnectionId,
        command: RoomCommand,
        subscriber: Option<EventSender>,
        reply: oneshot::Sender<Result<CommandReply, ServiceError>>,
    },
    Disconnect {
        connection: ConnectionId,
    },
    Shutdown,
}

#[derive(Debug, Clone)]
/// Cloneable address of a running room actor.
pub struct RoomHandle {
    code: String,
    tx: mpsc::Sender<RoomMessage>,
}

impl RoomHandle {
    /// Room code served by this actor.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// True once the actor stopped accepting messages.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Run `command` as `actor` and wait for the outcome.
    ///
    /// When `subscriber` is given and the command succeeds, the connection
    /// starts receiving the room's events, beginning with those the command
    /// emitted.
    pub async fn request(
        &self,
        actor: ConnectionId,
        command: RoomCommand,
        subscriber: Option<EventSender>,
    ) -> Result<CommandReply, ServiceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(RoomMessage::Command {
                actor,
                command,
                subscriber,
                reply: reply_tx,
            })
            .await
            .map_err(|_| self.gone())?;
        reply_rx.await.map_err(|_| self.gone())?
    }

    /// Tell the room that `connection` went away.
    pub async fn disconnect(&self, connection: ConnectionId) {
        if self
            .tx
            .send(RoomMessage::Disconnect { connection })
            .await
            .is_err()
        {
            debug!(room = %self.code, %connection, "disconnect for a stopped room");
        }
    }

    /// Close the room on behalf of the server and wait for the actor to stop.
    pub async fn shutdown(&self) {
        if self.tx.send(RoomMessage::Shutdown).await.is_err() {
            debug!(room = %self.code, "shutdown for a stopped room");
            return;
        }
        self.tx.closed().await;
    }

    fn gone(&self) -> ServiceError {
        ServiceError::Unavailable(format!("room {} is no longer running", self.code))
    }
}

/// Spawn the actor for `session`, with `host` already subscribed.
///
/// `on_exit` runs once the actor has stopped.
pub fn spawn_room<F>(
    session: RoomSession,
    host: ConnectionId,
    host_events: EventSender,
    clock: Arc<dyn Clock>,
    recorder: Arc<dyn HistoryRecorder>,
    on_exit: F,
) -> RoomHandle
where
    F: FnOnce() + Send + 'static,
{
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let code = session.code().to_string();

    let mut subscribers = IndexMap::new();
    subscribers.insert(host, host_events);
    let actor = RoomActor {
        session,
        subscribers,
        clock,
        recorder,
    };

    tokio::spawn(async move {
        actor.run(rx).await;
        on_exit();
    });

    RoomHandle { code, tx }
}

struct RoomActor {
    session: RoomSession,
    subscribers: IndexMap<ConnectionId, EventSender>,
    clock: Arc<dyn Clock>,
    recorder: Arc<dyn HistoryRecorder>,
}

impl RoomActor {
    async fn run(mut self, mut rx: mpsc::Receiver<RoomMessage>) {
        info!(room = %self.session.code(), "room actor started");
        self.flush();

        while !self.session.is_closed() {
            let now = self.clock.now_ms();
            let wake = self.session.next_wake(now);
            let sleep = async move {
                match wake {
                    Some(at) => tokio::time::sleep(Duration::from_millis(at.saturating_sub(now))).await,
                    None => future::pending::<()>().await,
                }
            };

            tokio::select! {
                message = rx.recv() => match message {
                    Some(message) => self.on_message(message),
                    None => {
                        self.session.shutdown();
                        self.flush();
                    }
                },
                () = sleep => {
                    let now = self.clock.now_ms();
                    self.session.on_clock(now);
                    self.flush();
                }
            }
        }

        info!(room = %self.session.code(), "room actor stopped");
    }

    fn on_message(&mut self, message: RoomMessage) {
        let now = self.clock.now_ms();
        self.session.on_clock(now);
        self.flush();

        match message {
            RoomMessage::Command {
                actor,
                command,
                subscriber,
                reply,
            } => {
                let leaving = matches!(command, RoomCommand::Leave);
                let mark = self.session.effects_len();
                let result = self.session.handle(actor, command, now);
                match &result {
                    Ok(_) => {
                        if let Some(events) = subscriber {
                            self.subscribers.insert(actor, events);
                        }
                    }
                    Err(err) => {
                        self.session.discard_effects_from(mark);
                        debug!(room = %self.session.code(), %actor, error = %err, "command rejected");
                    }
                }
                self.flush();
                if leaving && result.is_ok() {
                    self.subscribers.shift_remove(&actor);
                }
                if reply.send(result).is_err() {
                    debug!(room = %self.session.code(), %actor, "command caller went away");
                }
            }
            RoomMessage::Disconnect { connection } => {
                self.subscribers.shift_remove(&connection);
                self.session.disconnect(connection, now);
                self.flush();
            }
            RoomMessage::Shutdown => {
                self.session.shutdown();
                self.flush();
            }
        }
    }

    /// Deliver queued effects in order. Connections whose writer is gone are
    /// dropped and treated as disconnected.
    fn flush(&mut self) {
        loop {
            let effects = self.session.take_effects();
            if effects.is_empty() {
                return;
            }

            let mut dead: Vec<ConnectionId> = Vec::new();
            for effect in effects {
                match effect {
                    Effect::Deliver { audience, event } => {
                        let frame = OutboundFrame::Event(event);
                        match audience {
                            Audience::Room => {
                                for (id, events) in &self.subscribers {
                                    if events.send(frame.clone()).is_err() && !dead.contains(id) {
                                        dead.push(*id);
                                    }
                                }
                            }
                            Audience::Host => {
                                if let Some(host) = self.session.host_id() {
                                    self.deliver(host, frame, &mut dead);
                                }
                            }
                            Audience::Connection(id) => self.deliver(id, frame, &mut dead),
                        }
                    }
                    Effect::Record(summary) => self.record(summary),
                }
            }

            if dead.is_empty() {
                return;
            }
            let now = self.clock.now_ms();
            for id in dead {
                if self.subscribers.shift_remove(&id).is_some() {
                    warn!(room = %self.session.code(), connection = %id, "dropping subscriber with closed writer");
                    self.session.disconnect(id, now);
                }
            }
        }
    }

    fn deliver(&self, id: ConnectionId, frame: OutboundFrame, dead: &mut Vec<ConnectionId>) {
        if let Some(events) = self.subscribers.get(&id) {
            if events.send(frame).is_err() && !dead.contains(&id) {
                dead.push(id);
            }
        }
    }

    fn record(&self, summary: RoundSummary) {
        let room = summary.room_code.clone();
        let pending = self.recorder.record(summary);
        tokio::spawn(async move {
            if let Err(err) = pending.await {
                warn!(%room, error = %err, "failed to record round summary");
            }
        });
    }
}
