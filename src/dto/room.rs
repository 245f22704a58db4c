//! Payloads of the events pushed to room members.

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::phase::VisibleStage,
    state::game::{
        Player, Question, QuestionKind, QuestionType, RoomConfig, SeedSource, Standing, Track,
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Player entry of `room:update`.
pub struct PlayerSummary {
    pub id: Uuid,
    pub name: String,
    pub score: u32,
    pub connected: bool,
}

impl From<&Player> for PlayerSummary {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id,
            name: player.name.clone(),
            score: player.score,
            connected: player.connected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Room configuration as seen by clients.
pub struct RoomConfigView {
    pub max_questions: u32,
    pub default_duration_ms: u64,
    #[serde(rename = "selectedPlaylistIDs")]
    pub selected_playlist_ids: Vec<String>,
    pub question_type: QuestionType,
}

impl From<&RoomConfig> for RoomConfigView {
    fn from(config: &RoomConfig) -> Self {
        Self {
            max_questions: config.max_questions,
            default_duration_ms: config.default_duration_ms,
            selected_playlist_ids: config.selected_playlist_ids.clone(),
            question_type: config.question_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Coarse room snapshot broadcast on every membership or config change.
pub struct RoomUpdate {
    pub code: String,
    pub players: Vec<PlayerSummary>,
    pub host_id: Option<Uuid>,
    pub first_player_id: Option<Uuid>,
    pub config: RoomConfigView,
    pub stage: VisibleStage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Question shown to players; the correct index is withheld.
pub struct QuestionPayload {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub prompt: String,
    pub options: Vec<String>,
    pub duration_ms: u64,
    /// Absolute deadline, epoch milliseconds.
    pub deadline: u64,
    /// 1-based position in the round.
    pub question_number: usize,
    pub total_questions: u32,
}

impl QuestionPayload {
    /// Build the payload, reporting `duration_ms` as the time left at `now_ms`.
    pub fn from_question(question: &Question, number: usize, total: u32, now_ms: u64) -> Self {
        Self {
            id: question.id,
            kind: question.kind,
            prompt: question.prompt.clone(),
            options: question.options.clone(),
            duration_ms: question.deadline_ms.saturating_sub(now_ms),
            deadline: question.deadline_ms,
            question_number: number,
            total_questions: total,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
/// Whole seconds remaining in the running countdown.
pub struct TickPayload {
    pub seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
/// Answer progress of the open question.
pub struct ProgressPayload {
    pub answered: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Playback hints sent to the hub only.
pub struct HubMediaPayload {
    pub track_id: String,
    pub spotify_uri: Option<String>,
    pub preview_url: Option<String>,
}

impl From<&Track> for HubMediaPayload {
    fn from(track: &Track) -> Self {
        Self {
            track_id: track.id.clone(),
            spotify_uri: track.uri.clone(),
            preview_url: track.preview_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
/// Track details disclosed at reveal time.
pub struct TrackMeta {
    pub id: String,
    pub title: String,
    pub artist: Option<String>,
}

impl From<&Track> for TrackMeta {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id.clone(),
            title: track.title.clone(),
            artist: track.artist.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Correct answer and per-option counts of the closed question.
pub struct RevealPayload {
    pub question_id: u64,
    /// `null` for free-text questions.
    pub correct_index: Option<usize>,
    pub per_option_counts: Vec<u32>,
    /// Players graded correct.
    pub correct_count: usize,
    pub reveal_until: u64,
    pub track_meta: TrackMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
/// Leaderboard row.
pub struct LeaderboardEntry {
    pub id: Uuid,
    pub name: String,
    pub score: u32,
}

impl From<&Standing> for LeaderboardEntry {
    fn from(standing: &Standing) -> Self {
        Self {
            id: standing.id,
            name: standing.name.clone(),
            score: standing.score,
        }
    }
}

/// Convert a ranked leaderboard into wire rows.
pub fn leaderboard_entries(standings: &[Standing]) -> Vec<LeaderboardEntry> {
    standings.iter().map(LeaderboardEntry::from).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Leaderboard between two questions.
pub struct ResultPayload {
    pub leaderboard: Vec<LeaderboardEntry>,
    pub result_until: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
/// Final leaderboard of the round.
pub struct GameEndPayload {
    pub leaderboard: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Content source the hub should resolve into tracks.
pub struct SeedSourceView {
    pub playlist_id: String,
    pub num_tracks: u32,
}

impl From<&SeedSource> for SeedSourceView {
    fn from(source: &SeedSource) -> Self {
        Self {
            playlist_id: source.playlist_id.clone(),
            num_tracks: source.num_tracks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
/// Ask the hub to resolve a fresh track list.
pub struct ReseedPayload {
    pub source: SeedSourceView,
}
