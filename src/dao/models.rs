use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::state::game::{QuestionType, RoomConfig, Standing};

/// Player row frozen into a round summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StandingEntity {
    /// Connection the player was bound to when the round ended.
    pub player_id: Uuid,
    /// Display name.
    pub name: String,
    /// Final points.
    pub score: u32,
}

impl From<&Standing> for StandingEntity {
    fn from(standing: &Standing) -> Self {
        Self {
            player_id: standing.id,
            name: standing.name.clone(),
            score: standing.score,
        }
    }
}

/// Configuration in effect during the round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundConfigEntity {
    /// Number of questions the round was set up with.
    pub max_questions: u32,
    /// Answer window per question.
    pub default_duration_ms: u64,
    /// Content sources picked by the host.
    pub selected_playlist_ids: Vec<String>,
    /// Question flavour.
    pub question_type: QuestionType,
}

impl From<&RoomConfig> for RoundConfigEntity {
    fn from(config: &RoomConfig) -> Self {
        Self {
            max_questions: config.max_questions,
            default_duration_ms: config.default_duration_ms,
            selected_playlist_ids: config.selected_playlist_ids.clone(),
            question_type: config.question_type,
        }
    }
}

/// Finalized round handed to the history recorder. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundSummary {
    /// Room the round was played in.
    pub room_code: String,
    /// Final leaderboard, best first.
    pub leaderboard: Vec<StandingEntity>,
    /// Configuration used.
    pub config: RoundConfigEntity,
    /// Questions actually played.
    pub tracks_played: usize,
    /// When the round ended.
    pub ended_at: SystemTime,
}

/// Compact history row exposed by the stats endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Name of the winner, or `Unknown` for an empty leaderboard.
    pub player: String,
    /// Winner's points.
    pub points: u32,
    /// Questions in the round.
    pub questions: usize,
    /// When the round ended.
    pub date: SystemTime,
}

/// Shown when a round ended without players.
pub const UNKNOWN_PLAYER: &str = "Unknown";

impl From<&RoundSummary> for HistoryEntry {
    fn from(summary: &RoundSummary) -> Self {
        let winner = summary.leaderboard.first();
        let questions = if summary.config.max_questions > 0 {
            summary.config.max_questions as usize
        } else {
            summary.tracks_played
        };
        Self {
            player: winner
                .map(|standing| standing.name.clone())
                .unwrap_or_else(|| UNKNOWN_PLAYER.to_string()),
            points: winner.map(|standing| standing.score).unwrap_or_default(),
            questions,
            date: summary.ended_at,
        }
    }
}
