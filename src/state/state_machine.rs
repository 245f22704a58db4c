use std::fmt;

use thiserror::Error;

/// Stages a room moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// No room yet, or the room has been destroyed.
    Idle,
    /// Players gather and the host configures the round.
    Lobby,
    /// A question is open for answers.
    Question,
    /// Answers are frozen and the correct one is shown.
    Reveal,
    /// Leaderboard between two questions.
    Result,
    /// Final leaderboard of the round.
    GameOver,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Lobby => "lobby",
            Stage::Question => "question",
            Stage::Reveal => "reveal",
            Stage::Result => "result",
            Stage::GameOver => "gameover",
        };
        f.write_str(name)
    }
}

/// What closed the answer window of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealTrigger {
    /// The question countdown expired.
    Timer,
    /// Every player submitted an answer.
    AllAnswered,
    /// The host or first player forced the reveal.
    Manual,
}

/// Events that can be applied to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    /// The host created the room.
    RoomCreated,
    /// The first question of a round is shown.
    StartRound,
    /// Answers are frozen for the current question.
    RevealAnswers(RevealTrigger),
    /// The leaderboard is shown after a reveal.
    ShowResults,
    /// The next question is shown after the leaderboard.
    NextQuestion,
    /// The round ran out of questions or tracks.
    FinishGame,
    /// A fresh round starts from the final leaderboard.
    PlayAgain,
    /// The host sends everyone back to the lobby.
    ReturnToLobby,
    /// The room is closed or evicted.
    Close,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from}")]
pub struct InvalidTransition {
    /// The stage the state machine was in when the invalid event was received.
    pub from: Stage,
    /// The event that cannot be applied from this stage.
    pub event: StageEvent,
}

/// Transition table of a single room.
#[derive(Debug, Clone)]
pub struct RoomStateMachine {
    stage: Stage,
}

impl Default for RoomStateMachine {
    fn default() -> Self {
        Self { stage: Stage::Idle }
    }
}

impl RoomStateMachine {
    /// Create a new state machine initialised in the idle stage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Validate `event` against the current stage without moving.
    pub fn check(&self, event: StageEvent) -> Result<Stage, InvalidTransition> {
        compute_transition(self.stage, event)
    }

    /// Apply `event`, returning the stage entered.
    pub fn apply(&mut self, event: StageEvent) -> Result<Stage, InvalidTransition> {
        let next = compute_transition(self.stage, event)?;
        self.stage = next;
        Ok(next)
    }
}

/// Compute a transition from an event if the transition is valid.
fn compute_transition(from: Stage, event: StageEvent) -> Result<Stage, InvalidTransition> {
    let next = match (from, event) {
        (Stage::Idle, StageEvent::RoomCreated) => Stage::Lobby,
        (Stage::Lobby, StageEvent::StartRound) => Stage::Question,
        (Stage::Question, StageEvent::RevealAnswers(_)) => Stage::Reveal,
        (Stage::Reveal, StageEvent::ShowResults) => Stage::Result,
        (Stage::Result, StageEvent::NextQuestion) => Stage::Question,
        (Stage::Result, StageEvent::FinishGame) => Stage::GameOver,
        (Stage::GameOver, StageEvent::PlayAgain) => Stage::Question,
        (Stage::Idle, StageEvent::ReturnToLobby) => {
            return Err(InvalidTransition { from, event });
        }
        (_, StageEvent::ReturnToLobby) => Stage::Lobby,
        (_, StageEvent::Close) => Stage::Idle,
        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(next)
}
