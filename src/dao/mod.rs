/// Round history recorder and its in-memory backend.
pub mod history;
/// Stored model definitions.
pub mod models;
/// Storage error types shared by history backends.
pub mod storage;
