use std::{collections::VecDeque, sync::Arc};

use futures::{FutureExt, future::BoxFuture};
use tokio::sync::RwLock;
use tracing::debug;

use crate::dao::{
    models::{HistoryEntry, RoundSummary},
    storage::{StorageError, StorageResult},
};

/// Sink for finalized rounds. Room actors never await it.
pub trait HistoryRecorder: Send + Sync {
    /// Keep a finished round.
    fn record(&self, summary: RoundSummary) -> BoxFuture<'static, StorageResult<()>>;
    /// Up to `limit` most recent rounds, newest first. `limit` must be positive.
    fn recent_summaries(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<HistoryEntry>>>;
}

/// Bounded in-process history, newest first on read.
#[derive(Debug, Clone)]
pub struct InMemoryHistory {
    entries: Arc<RwLock<VecDeque<RoundSummary>>>,
    capacity: usize,
}

impl InMemoryHistory {
    /// Keep at most `capacity` summaries; older ones are dropped first.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }
}

impl HistoryRecorder for InMemoryHistory {
    fn record(&self, summary: RoundSummary) -> BoxFuture<'static, StorageResult<()>> {
        let entries = self.entries.clone();
        let capacity = self.capacity;
        async move {
            let mut entries = entries.write().await;
            if entries.len() == capacity {
                entries.pop_front();
            }
            debug!(room = %summary.room_code, "round summary stored");
            entries.push_back(summary);
            Ok(())
        }
        .boxed()
    }

    fn recent_summaries(
        &self,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<HistoryEntry>>> {
        let entries = self.entries.clone();
        async move {
            if limit == 0 {
                return Err(StorageError::InvalidQuery("limit must be at least 1".into()));
            }
            let entries = entries.read().await;
            Ok(entries
                .iter()
                .rev()
                .take(limit)
                .map(HistoryEntry::from)
                .collect())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use uuid::Uuid;

    use super::*;
    use crate::dao::models::{RoundConfigEntity, StandingEntity, UNKNOWN_PLAYER};
    use crate::state::game::QuestionType;

    fn summary(code: &str, winner: Option<(&str, u32)>, at_secs: u64) -> RoundSummary {
        RoundSummary {
            room_code: code.into(),
            leaderboard: winner
                .map(|(name, score)| StandingEntity {
                    player_id: Uuid::new_v4(),
                    name: name.into(),
                    score,
                })
                .into_iter()
                .collect(),
            config: RoundConfigEntity {
                max_questions: 3,
                default_duration_ms: 20_000,
                selected_playlist_ids: vec!["p1".into()],
                question_type: QuestionType::MultipleChoice,
            },
            tracks_played: 3,
            ended_at: UNIX_EPOCH + Duration::from_secs(at_secs),
        }
    }

    #[tokio::test]
    async fn newest_first_with_limit() {
        let history = InMemoryHistory::new(10);
        history.record(summary("AAAA", Some(("Ana", 2)), 1)).await.unwrap();
        history.record(summary("BBBB", Some(("Bob", 3)), 2)).await.unwrap();
        history.record(summary("CCCC", Some(("Cy", 1)), 3)).await.unwrap();

        let recent = history.recent_summaries(2).await.unwrap();
        let players: Vec<_> = recent.iter().map(|e| e.player.as_str()).collect();
        assert_eq!(players, vec!["Cy", "Bob"]);
        assert_eq!(recent[1].points, 3);
        assert_eq!(recent[1].questions, 3);
    }

    #[tokio::test]
    async fn capacity_drops_oldest() {
        let history = InMemoryHistory::new(2);
        for (code, at) in [("AAAA", 1), ("BBBB", 2), ("CCCC", 3)] {
            history.record(summary(code, Some(("x", at as u32)), at)).await.unwrap();
        }
        let recent = history.recent_summaries(10).await.unwrap();
        let points: Vec<_> = recent.iter().map(|e| e.points).collect();
        assert_eq!(points, vec![3, 2]);
    }

    #[tokio::test]
    async fn empty_leaderboard_reports_unknown() {
        let history = InMemoryHistory::new(5);
        history.record(summary("AAAA", None, 1)).await.unwrap();
        let recent = history.recent_summaries(1).await.unwrap();
        assert_eq!(recent[0].player, UNKNOWN_PLAYER);
        assert_eq!(recent[0].points, 0);
    }

    #[tokio::test]
    async fn zero_limit_is_rejected() {
        let history = InMemoryHistory::new(5);
        let err = history.recent_summaries(0).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidQuery(_)));
    }
}
