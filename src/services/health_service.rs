use tracing::debug;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report liveness along with the number of rooms currently hosted.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let codes = state.registry().codes();
    debug!(
        rooms = codes.len(),
        codes = ?codes,
        connections = state.connection_count(),
        "health check"
    );
    HealthResponse::ok(codes.len())
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::*;
    use crate::{config::AppConfig, state::AppState};

    #[tokio::test]
    async fn counts_live_rooms() {
        let state = AppState::new(AppConfig::default());
        assert_eq!(health_status(&state).await.rooms, 0);

        let (tx, _rx) = mpsc::unbounded_channel();
        let code = state
            .registry()
            .create_room(Uuid::new_v4(), tx)
            .unwrap()
            .code()
            .to_string();
        assert_eq!(state.registry().codes(), vec![code.clone()]);
        assert_eq!(health_status(&state).await.rooms, 1);

        state.registry().close_room(&code).await.unwrap();
        assert_eq!(health_status(&state).await.rooms, 0);
    }
}
