use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use rand::Rng;
use tracing::{info, warn};

use crate::{
    config::AppConfig,
    dao::history::HistoryRecorder,
    dto::validation::normalize_room_code,
    error::ServiceError,
    state::{
        clock::Clock,
        game::ConnectionId,
        room::{EventSender, RoomHandle, spawn_room},
        session::RoomSession,
        Memberships,
    },
};

/// Uppercase letters without `I` and `O`.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
/// Attempts at finding a free code before giving up.
const MAX_CODE_ATTEMPTS: usize = 32;

/// Map of live rooms, the only structure shared between room actors.
#[derive(Clone)]
pub struct RoomRegistry {
    rooms: Arc<DashMap<String, RoomHandle>>,
    memberships: Memberships,
    config: Arc<AppConfig>,
    clock: Arc<dyn Clock>,
    recorder: Arc<dyn HistoryRecorder>,
}

impl RoomRegistry {
    /// Empty registry spawning rooms with the given collaborators.
    ///
    /// Entries of `memberships` pointing at a room are dropped when its actor stops.
    pub fn new(
        config: Arc<AppConfig>,
        clock: Arc<dyn Clock>,
        recorder: Arc<dyn HistoryRecorder>,
        memberships: Memberships,
    ) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            memberships,
            config,
            clock,
            recorder,
        }
    }

    /// Create a room hosted by `host` under a fresh code and start its actor.
    pub fn create_room(
        &self,
        host: ConnectionId,
        host_events: EventSender,
    ) -> Result<RoomHandle, ServiceError> {
        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let code = generate_code(self.config.room_code_length());
            match self.try_reserve(code, host, &host_events) {
                Ok(handle) => return Ok(handle),
                Err(ServiceError::DuplicateCode(code)) => {
                    warn!(%code, attempt, "room code collision, retrying");
                }
                Err(err) => return Err(err),
            }
        }
        Err(ServiceError::Unavailable(
            "could not allocate a free room code".into(),
        ))
    }

    /// Handle of the room `code`, matched after normalization.
    pub fn get_room(&self, code: &str) -> Result<RoomHandle, ServiceError> {
        let code = normalize_room_code(code);
        self.rooms
            .get(&code)
            .map(|entry| entry.value().clone())
            .filter(|handle| !handle.is_closed())
            .ok_or(ServiceError::RoomNotFound(code))
    }

    /// Evict `code` and notify its members.
    pub async fn close_room(&self, code: &str) -> Result<(), ServiceError> {
        let handle = self.get_room(code)?;
        handle.shutdown().await;
        self.forget(handle.code());
        Ok(())
    }

    /// Close every room, used on server shutdown.
    pub async fn close_all(&self) {
        let handles: Vec<RoomHandle> = self.rooms.iter().map(|entry| entry.value().clone()).collect();
        for handle in &handles {
            handle.shutdown().await;
            self.forget(handle.code());
        }
        info!(rooms = handles.len(), "closed all rooms");
    }

    /// Number of live rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// True when no room is live.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Codes of live rooms, sorted.
    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.rooms.iter().map(|entry| entry.key().clone()).collect();
        codes.sort();
        codes
    }

    fn forget(&self, code: &str) {
        self.memberships.retain(|_, membership| membership.code != code);
        self.rooms.remove_if(code, |_, handle| handle.is_closed());
    }

    fn try_reserve(
        &self,
        code: String,
        host: ConnectionId,
        host_events: &EventSender,
    ) -> Result<RoomHandle, ServiceError> {
        match self.rooms.entry(code.clone()) {
            Entry::Occupied(_) => Err(ServiceError::DuplicateCode(code)),
            Entry::Vacant(slot) => {
                let session = RoomSession::new(
                    code.clone(),
                    host,
                    self.config.room_defaults(),
                    self.config.session_settings(),
                );
                let rooms = Arc::downgrade(&self.rooms);
                let memberships = Arc::downgrade(&self.memberships);
                let exit_code = code.clone();
                let handle = spawn_room(
                    session,
                    host,
                    host_events.clone(),
                    self.clock.clone(),
                    self.recorder.clone(),
                    move || {
                        // Memberships go first so the code cannot be reused while they linger.
                        if let Some(memberships) = memberships.upgrade() {
                            memberships.retain(|_, membership| membership.code != exit_code);
                        }
                        if let Some(rooms) = rooms.upgrade() {
                            rooms.remove_if(&exit_code, |_, handle| handle.is_closed());
                        }
                    },
                );
                slot.insert(handle.clone());
                info!(%code, %host, "room created");
                Ok(handle)
            }
        }
    }
}

fn generate_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::*;
    use crate::{
        dao::history::InMemoryHistory,
        state::{Membership, Role, clock::TokioClock},
    };

    fn registry() -> RoomRegistry {
        RoomRegistry::new(
            Arc::new(AppConfig::default()),
            Arc::new(TokioClock::new()),
            Arc::new(InMemoryHistory::new(8)),
            Arc::new(DashMap::new()),
        )
    }

    #[test]
    fn generated_codes_use_the_alphabet() {
        for _ in 0..200 {
            let code = generate_code(4);
            assert_eq!(code.len(), 4);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
            assert!(!code.contains('I') && !code.contains('O'));
        }
    }

    #[tokio::test]
    async fn created_rooms_get_distinct_codes() {
        let registry = registry();
        let mut codes = HashSet::new();
        let mut keep = Vec::new();
        for _ in 0..50 {
            let (tx, rx) = mpsc::unbounded_channel();
            let handle = registry.create_room(Uuid::new_v4(), tx).unwrap();
            assert!(codes.insert(handle.code().to_string()));
            keep.push(rx);
        }
        assert_eq!(registry.len(), 50);
    }

    #[tokio::test]
    async fn lookup_is_case_insensitive() {
        let registry = registry();
        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = registry.create_room(Uuid::new_v4(), tx).unwrap();
        let lower = format!("  {} ", handle.code().to_lowercase());
        assert_eq!(registry.get_room(&lower).unwrap().code(), handle.code());

        let err = registry.get_room("ZZZZZZZZ").unwrap_err();
        assert!(matches!(err, ServiceError::RoomNotFound(_)));
    }

    #[tokio::test]
    async fn close_room_removes_entry() {
        let registry = registry();
        let (tx, _rx) = mpsc::unbounded_channel();
        let code = registry
            .create_room(Uuid::new_v4(), tx)
            .unwrap()
            .code()
            .to_string();
        registry.memberships.insert(
            Uuid::new_v4(),
            Membership {
                code: code.clone(),
                role: Role::Player,
            },
        );
        registry.memberships.insert(
            Uuid::new_v4(),
            Membership {
                code: "OTHER".into(),
                role: Role::Player,
            },
        );
        registry.close_room(&code).await.unwrap();
        assert!(registry.is_empty());
        assert_eq!(registry.memberships.len(), 1);
        assert!(matches!(
            registry.get_room(&code),
            Err(ServiceError::RoomNotFound(_))
        ));
    }
}
