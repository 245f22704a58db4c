use rand::{Rng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Identifier of a live client connection.
pub type ConnectionId = Uuid;

/// Monotonic identifier of a question inside a room.
pub type QuestionId = u64;

/// Number of wrong options offered next to the correct title.
const DISTRACTOR_COUNT: usize = 3;

const MULTIPLE_CHOICE_PROMPT: &str = "Which song is playing?";
const TRACK_RECOGNITION_PROMPT: &str = "Type the title of the song";

/// Track reference seeded by the hub; used as the anchor of one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Stable identifier supplied by the content resolver.
    pub id: String,
    /// Canonical title, used to grade free-text answers.
    pub title: String,
    /// Display artist line.
    pub artist: Option<String>,
    /// Playback URI handed to the hub.
    pub uri: Option<String>,
    /// Optional preview URL handed to the hub.
    pub preview_url: Option<String>,
}

/// Player tracked inside a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// Connection the player joined with.
    pub id: ConnectionId,
    /// Display name, not guaranteed unique.
    pub name: String,
    /// Points accumulated during the current round.
    pub score: u32,
    /// False once the player's socket went away mid-game.
    pub connected: bool,
}

impl Player {
    /// Create a freshly joined, connected player with no points.
    pub fn new(id: ConnectionId, name: String) -> Self {
        Self {
            id,
            name,
            score: 0,
            connected: true,
        }
    }
}

/// Question flavour selected in the room configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
    /// Pick the playing song among several titles.
    #[default]
    MultipleChoice,
    /// Type the exact title of the playing song.
    TrackRecognition,
    /// Alternate between both, starting with multiple choice.
    Mixed,
}

impl QuestionType {
    /// Resolve the concrete kind used for the question at `index`.
    pub fn kind_for(self, index: usize) -> QuestionKind {
        match self {
            QuestionType::MultipleChoice => QuestionKind::MultipleChoice,
            QuestionType::TrackRecognition => QuestionKind::TrackRecognition,
            QuestionType::Mixed if index % 2 == 0 => QuestionKind::MultipleChoice,
            QuestionType::Mixed => QuestionKind::TrackRecognition,
        }
    }
}

/// Concrete kind of a generated question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionKind {
    /// Single-choice question with options.
    MultipleChoice,
    /// Free-text question graded against the track title.
    TrackRecognition,
}

/// Game settings the host can change while in the lobby.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomConfig {
    /// Number of questions in a round.
    pub max_questions: u32,
    /// Answer window of each question.
    pub default_duration_ms: u64,
    /// Content sources picked by the host.
    pub selected_playlist_ids: Vec<String>,
    /// Flavour of the generated questions.
    pub question_type: QuestionType,
}

/// Partial configuration update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigPatch {
    pub max_questions: Option<u32>,
    pub default_duration_ms: Option<u64>,
    pub selected_playlist_ids: Option<Vec<String>>,
    pub question_type: Option<QuestionType>,
}

impl RoomConfig {
    /// Apply every field present in `patch`.
    pub fn apply(&mut self, patch: ConfigPatch) {
        if let Some(max_questions) = patch.max_questions {
            self.max_questions = max_questions;
        }
        if let Some(duration) = patch.default_duration_ms {
            self.default_duration_ms = duration;
        }
        if let Some(ids) = patch.selected_playlist_ids {
            self.selected_playlist_ids = ids;
        }
        if let Some(question_type) = patch.question_type {
            self.question_type = question_type;
        }
    }
}

/// Descriptor the hub resolves into a track list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedSource {
    pub playlist_id: String,
    pub num_tracks: u32,
}

/// Answer recorded for the active question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Index into the question options.
    Choice(usize),
    /// Free-text guess.
    Text(String),
}

/// Question currently on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub id: QuestionId,
    pub kind: QuestionKind,
    pub prompt: String,
    pub options: Vec<String>,
    /// Hidden from players until the reveal; `None` for free-text questions.
    pub correct_index: Option<usize>,
    pub track: Track,
    pub duration_ms: u64,
    /// Absolute deadline in epoch milliseconds.
    pub deadline_ms: u64,
}

impl Question {
    /// Build the question anchored on `track`, drawing distractor titles from `pool`.
    pub fn build(
        id: QuestionId,
        kind: QuestionKind,
        track: &Track,
        pool: &[Track],
        duration_ms: u64,
        deadline_ms: u64,
        rng: &mut impl Rng,
    ) -> Self {
        let (prompt, options, correct_index) = match kind {
            QuestionKind::MultipleChoice => {
                let (options, correct) = multiple_choice_options(track, pool, rng);
                (MULTIPLE_CHOICE_PROMPT, options, Some(correct))
            }
            QuestionKind::TrackRecognition => (TRACK_RECOGNITION_PROMPT, Vec::new(), None),
        };

        Self {
            id,
            kind,
            prompt: prompt.to_string(),
            options,
            correct_index,
            track: track.clone(),
            duration_ms,
            deadline_ms,
        }
    }
}

/// Shuffle the correct title among up to [`DISTRACTOR_COUNT`] distinct other titles.
fn multiple_choice_options(
    track: &Track,
    pool: &[Track],
    rng: &mut impl Rng,
) -> (Vec<String>, usize) {
    let correct_key = normalize_title(&track.title);
    let mut seen = vec![correct_key];
    let mut distractors: Vec<String> = Vec::new();
    for candidate in pool {
        let key = normalize_title(&candidate.title);
        if key.is_empty() || seen.contains(&key) {
            continue;
        }
        seen.push(key);
        distractors.push(candidate.title.trim().to_string());
    }
    distractors.shuffle(rng);
    distractors.truncate(DISTRACTOR_COUNT);

    let mut options = distractors;
    options.push(track.title.trim().to_string());
    options.shuffle(rng);

    let correct = options
        .iter()
        .position(|option| normalize_title(option) == seen[0])
        .unwrap_or(0);
    (options, correct)
}

/// Canonical form used to compare titles: trimmed and lowercased.
pub fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

/// One row of the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    pub id: ConnectionId,
    pub name: String,
    pub score: u32,
}

/// Rank players by score, keeping join order between equal scores.
pub fn leaderboard<'a>(players: impl Iterator<Item = &'a Player>) -> Vec<Standing> {
    let mut standings: Vec<Standing> = players
        .map(|player| Standing {
            id: player.id,
            name: player.name.clone(),
            score: player.score,
        })
        .collect();
    standings.sort_by(|a, b| b.score.cmp(&a.score));
    standings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str, title: &str) -> Track {
        Track {
            id: id.into(),
            title: title.into(),
            artist: None,
            uri: None,
            preview_url: None,
        }
    }

    #[test]
    fn multiple_choice_contains_correct_title_once() {
        let pool = vec![
            track("1", "Alpha"),
            track("2", "Beta"),
            track("3", "Gamma"),
            track("4", "Delta"),
            track("5", "Epsilon"),
        ];
        let mut rng = rand::rng();
        let question = Question::build(
            7,
            QuestionKind::MultipleChoice,
            &pool[2],
            &pool,
            20_000,
            20_000,
            &mut rng,
        );

        assert_eq!(question.options.len(), 4);
        let correct = question.correct_index.unwrap();
        assert_eq!(question.options[correct], "Gamma");
        assert_eq!(
            question.options.iter().filter(|o| *o == "Gamma").count(),
            1
        );
    }

    #[test]
    fn multiple_choice_with_single_track_has_one_option() {
        let pool = vec![track("1", "Solo")];
        let mut rng = rand::rng();
        let question = Question::build(
            1,
            QuestionKind::MultipleChoice,
            &pool[0],
            &pool,
            1_000,
            1_000,
            &mut rng,
        );
        assert_eq!(question.options, vec!["Solo".to_string()]);
        assert_eq!(question.correct_index, Some(0));
    }

    #[test]
    fn duplicate_titles_are_not_offered_twice() {
        let pool = vec![track("1", "Same"), track("2", " same "), track("3", "Other")];
        let mut rng = rand::rng();
        let question = Question::build(
            1,
            QuestionKind::MultipleChoice,
            &pool[0],
            &pool,
            1_000,
            1_000,
            &mut rng,
        );
        assert_eq!(question.options.len(), 2);
    }

    #[test]
    fn track_recognition_has_no_options() {
        let pool = vec![track("1", "Alpha"), track("2", "Beta")];
        let mut rng = rand::rng();
        let question = Question::build(
            1,
            QuestionKind::TrackRecognition,
            &pool[0],
            &pool,
            1_000,
            1_000,
            &mut rng,
        );
        assert!(question.options.is_empty());
        assert_eq!(question.correct_index, None);
    }

    #[test]
    fn mixed_alternates_kinds() {
        assert_eq!(QuestionType::Mixed.kind_for(0), QuestionKind::MultipleChoice);
        assert_eq!(QuestionType::Mixed.kind_for(1), QuestionKind::TrackRecognition);
        assert_eq!(QuestionType::Mixed.kind_for(2), QuestionKind::MultipleChoice);
    }

    #[test]
    fn leaderboard_ties_keep_join_order() {
        let mut first = Player::new(Uuid::new_v4(), "first".into());
        let mut second = Player::new(Uuid::new_v4(), "second".into());
        let mut third = Player::new(Uuid::new_v4(), "third".into());
        first.score = 1;
        second.score = 3;
        third.score = 1;

        let board = leaderboard([&first, &second, &third].into_iter());
        let names: Vec<_> = board.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["second", "first", "third"]);
    }
}
