use serde::Serialize;
use utoipa::ToSchema;

use crate::state::Stage;

/// Room stage exposed to clients.
#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VisibleStage {
    /// Room is being torn down.
    Idle,
    /// Waiting for players.
    Lobby,
    /// Question open for answers.
    Question,
    /// Correct answer on screen.
    Reveal,
    /// Leaderboard between questions.
    Result,
    /// Final leaderboard.
    GameOver,
}

impl From<Stage> for VisibleStage {
    fn from(value: Stage) -> Self {
        match value {
            Stage::Idle => VisibleStage::Idle,
            Stage::Lobby => VisibleStage::Lobby,
            Stage::Question => VisibleStage::Question,
            Stage::Reveal => VisibleStage::Reveal,
            Stage::Result => VisibleStage::Result,
            Stage::GameOver => VisibleStage::GameOver,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gameover_is_one_word_on_the_wire() {
        let json = serde_json::to_string(&VisibleStage::from(Stage::GameOver)).unwrap();
        assert_eq!(json, "\"gameover\"");
    }
}
