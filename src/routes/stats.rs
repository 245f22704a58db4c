use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use axum_valid::Valid;

use crate::{
    dto::stats::{SummaryQuery, SummaryResponse},
    error::AppError,
    services::stats_service,
    state::SharedState,
};

/// Read-only statistics about finished rounds.
pub fn router() -> Router<SharedState> {
    Router::new().route("/api/stats/summary", get(summary))
}

#[utoipa::path(
    get,
    path = "/api/stats/summary",
    tag = "stats",
    params(SummaryQuery),
    responses(
        (status = 200, description = "Most recent finished rounds", body = SummaryResponse),
        (status = 400, description = "Limit out of range"),
        (status = 503, description = "History backend unavailable")
    )
)]
/// Return the winners of the most recent rounds, newest first.
pub async fn summary(
    State(state): State<SharedState>,
    Valid(Query(query)): Valid<Query<SummaryQuery>>,
) -> Result<Json<SummaryResponse>, AppError> {
    let payload = stats_service::summary(&state, query.limit).await?;
    Ok(Json(payload))
}
