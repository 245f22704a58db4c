use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response returned by the `/health` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status, always "ok" while the process serves requests.
    pub status: String,
    /// Number of live rooms.
    pub rooms: usize,
}

impl HealthResponse {
    /// Create a health response for a server hosting `rooms` rooms.
    pub fn ok(rooms: usize) -> Self {
        Self {
            status: "ok".to_string(),
            rooms,
        }
    }
}
