use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Mixmatch Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::stats::summary,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::stats::SummaryResponse,
            crate::dto::stats::RoundStat,
            crate::dto::ws::InboundFrame,
            crate::dto::ws::Ack,
            crate::dto::ws::JoinRoomRequest,
            crate::dto::ws::RoomRef,
            crate::dto::ws::SeedTracksRequest,
            crate::dto::ws::StartGameRequest,
            crate::dto::ws::PlayAgainRequest,
            crate::dto::ws::SubmitAnswerRequest,
            crate::dto::ws::UpdateConfigRequest,
            crate::dto::room::RoomUpdate,
            crate::dto::room::QuestionPayload,
            crate::dto::room::RevealPayload,
            crate::dto::room::ResultPayload,
            crate::dto::room::GameEndPayload,
            crate::dto::room::HubMediaPayload,
            crate::dto::room::ReseedPayload,
            crate::error::ErrorCode,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "stats", description = "Finished round history"),
        (name = "rooms", description = "WebSocket protocol for hubs and players"),
    )
)]
pub struct ApiDoc;
