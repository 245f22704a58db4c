use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod health;
pub mod stats;
pub mod websocket;

/// Every route of the server: the room socket, the REST probes and the docs.
pub fn router(state: SharedState) -> Router<()> {
    Router::<SharedState>::new()
        .merge(health::router())
        .merge(stats::router())
        .merge(websocket::router())
        .merge(docs::router())
        .with_state(state)
}
