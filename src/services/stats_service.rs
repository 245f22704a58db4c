use tracing::debug;

use crate::{
    dto::stats::{RoundStat, SummaryResponse},
    error::ServiceError,
    state::SharedState,
};

/// Most recent finished rounds, newest first.
pub async fn summary(state: &SharedState, limit: usize) -> Result<SummaryResponse, ServiceError> {
    let entries = state.history().recent_summaries(limit).await?;
    debug!(limit, returned = entries.len(), "history summary served");
    Ok(SummaryResponse {
        ok: true,
        results: entries.into_iter().map(RoundStat::from).collect(),
    })
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        time::{Duration, UNIX_EPOCH},
    };

    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            history::{HistoryRecorder, InMemoryHistory},
            models::{RoundConfigEntity, RoundSummary, StandingEntity},
        },
        state::{AppState, clock::TokioClock, game::QuestionType},
    };

    #[tokio::test]
    async fn summary_lists_recorded_rounds() {
        let history = Arc::new(InMemoryHistory::new(10));
        let state = AppState::with_parts(
            AppConfig::default(),
            Arc::new(TokioClock::new()),
            history.clone(),
        );
        for (name, score) in [("Ana", 4), ("Bo", 7)] {
            history
                .record(RoundSummary {
                    room_code: "ABCD".into(),
                    leaderboard: vec![StandingEntity {
                        player_id: Uuid::new_v4(),
                        name: name.into(),
                        score,
                    }],
                    config: RoundConfigEntity {
                        max_questions: 5,
                        default_duration_ms: 20_000,
                        selected_playlist_ids: vec!["p".into()],
                        question_type: QuestionType::MultipleChoice,
                    },
                    tracks_played: 5,
                    ended_at: UNIX_EPOCH + Duration::from_secs(60),
                })
                .await
                .unwrap();
        }

        let response = summary(&state, 20).await.unwrap();
        assert!(response.ok);
        let players: Vec<_> = response.results.iter().map(|r| r.player.as_str()).collect();
        assert_eq!(players, vec!["Bo", "Ana"]);
        assert_eq!(response.results[0].points, 7);
        assert_eq!(response.results[0].date, "1970-01-01T00:01:00Z");

        let response = summary(&state, 1).await.unwrap();
        assert_eq!(response.results.len(), 1);
    }
}
