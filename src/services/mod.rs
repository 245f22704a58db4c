/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Routing of client commands to room actors.
pub mod room_service;
/// Finished round history.
pub mod stats_service;
/// WebSocket connection and message handling service.
pub mod websocket_service;
