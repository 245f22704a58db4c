pub mod aggregator;
pub mod clock;
pub mod game;
pub mod registry;
pub mod room;
pub mod session;
pub mod state_machine;
pub mod timer;

use std::sync::Arc;

use dashmap::DashMap;

use crate::{
    config::AppConfig,
    dao::history::{HistoryRecorder, InMemoryHistory},
    state::{clock::TokioClock, game::ConnectionId},
};

pub use self::clock::Clock;
pub use self::registry::RoomRegistry;
pub use self::room::{EventSender, RoomHandle};
pub use self::session::{CommandReply, RoomCommand};
pub use self::state_machine::{InvalidTransition, RevealTrigger, Stage, StageEvent};

pub type SharedState = Arc<AppState>;

/// Room membership of every attached connection, shared with the registry.
pub type Memberships = Arc<DashMap<ConnectionId, Membership>>;

/// Role a connection holds in the room it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The hub that created the room.
    Host,
    /// A joined player.
    Player,
}

/// Room a connection currently belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    /// Normalized room code.
    pub code: String,
    /// Role inside that room.
    pub role: Role,
}

/// Central application state: configuration, live rooms and connections.
pub struct AppState {
    config: Arc<AppConfig>,
    registry: RoomRegistry,
    history: Arc<dyn HistoryRecorder>,
    connections: Memberships,
}

impl AppState {
    /// Construct a new [`AppState`] with the in-memory history recorder.
    pub fn new(config: AppConfig) -> SharedState {
        let history = Arc::new(InMemoryHistory::new(config.history_capacity()));
        Self::with_parts(config, Arc::new(TokioClock::new()), history)
    }

    /// Construct a new [`AppState`] from explicit collaborators.
    pub fn with_parts(
        config: AppConfig,
        clock: Arc<dyn Clock>,
        history: Arc<dyn HistoryRecorder>,
    ) -> SharedState {
        let config = Arc::new(config);
        let connections: Memberships = Arc::new(DashMap::new());
        Arc::new(Self {
            registry: RoomRegistry::new(config.clone(), clock, history.clone(), connections.clone()),
            config,
            history,
            connections,
        })
    }

    /// Shared application configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }

    /// Live rooms.
    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Recorder receiving finished rounds.
    pub fn history(&self) -> Arc<dyn HistoryRecorder> {
        self.history.clone()
    }

    /// Room membership of `connection`, if any.
    pub fn membership(&self, connection: &ConnectionId) -> Option<Membership> {
        self.connections
            .get(connection)
            .map(|entry| entry.value().clone())
    }

    /// Record that `connection` belongs to `code` with `role`.
    pub fn set_membership(&self, connection: ConnectionId, code: String, role: Role) {
        self.connections.insert(connection, Membership { code, role });
    }

    /// Forget the membership of `connection`, returning it.
    pub fn clear_membership(&self, connection: &ConnectionId) -> Option<Membership> {
        self.connections
            .remove(connection)
            .map(|(_, membership)| membership)
    }

    /// Number of connections currently attached to a room.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
