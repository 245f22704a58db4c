use std::collections::HashMap;

use crate::{
    error::ServiceError,
    state::{
        Stage,
        game::{Answer, ConnectionId, Question, QuestionId, QuestionKind, normalize_title},
    },
};

/// Answer progress of the current question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Players who submitted at least once.
    pub answered: usize,
    /// Players in the room.
    pub total: usize,
}

impl Progress {
    /// True once every player answered; an empty room never completes.
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.answered >= self.total
    }
}

/// Outcome of closing a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    /// Number of recorded answers per option; empty for free-text questions.
    pub per_option_counts: Vec<u32>,
    /// Players whose answer was correct, in no particular order.
    pub correct: Vec<ConnectionId>,
}

/// Per-question answer book.
#[derive(Debug, Default)]
pub struct AnswerAggregator {
    question_id: Option<QuestionId>,
    answers: HashMap<ConnectionId, Answer>,
    settled: bool,
}

impl AnswerAggregator {
    /// Create an empty aggregator bound to no question.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget previous answers and start collecting for `question_id`.
    pub fn open(&mut self, question_id: QuestionId) {
        self.question_id = Some(question_id);
        self.answers.clear();
        self.settled = false;
    }

    /// Drop every answer and unbind from the question.
    pub fn clear(&mut self) {
        self.question_id = None;
        self.answers.clear();
        self.settled = false;
    }

    /// Record or overwrite `player`'s answer.
    ///
    /// Nothing is stored when the submission is stale or malformed.
    pub fn submit(
        &mut self,
        stage: Stage,
        question: &Question,
        now_ms: u64,
        player: ConnectionId,
        question_id: QuestionId,
        answer: Answer,
    ) -> Result<(), ServiceError> {
        if stage != Stage::Question {
            return Err(ServiceError::StaleSubmission(format!(
                "answers are closed while in {stage}"
            )));
        }
        if self.question_id != Some(question_id) || question.id != question_id {
            return Err(ServiceError::StaleSubmission(format!(
                "question {question_id} is not the current question"
            )));
        }
        if now_ms >= question.deadline_ms {
            return Err(ServiceError::StaleSubmission(format!(
                "question {question_id} deadline has passed"
            )));
        }

        match (question.kind, &answer) {
            (QuestionKind::MultipleChoice, Answer::Choice(index)) => {
                if *index >= question.options.len() {
                    return Err(ServiceError::InvalidInput(format!(
                        "answer index {index} is out of range"
                    )));
                }
            }
            (QuestionKind::TrackRecognition, Answer::Text(_)) => {}
            (QuestionKind::MultipleChoice, Answer::Text(_)) => {
                return Err(ServiceError::InvalidInput(
                    "multiple-choice questions expect an answer index".into(),
                ));
            }
            (QuestionKind::TrackRecognition, Answer::Choice(_)) => {
                return Err(ServiceError::InvalidInput(
                    "track-recognition questions expect a text answer".into(),
                ));
            }
        }

        self.answers.insert(player, answer);
        Ok(())
    }

    /// Drop the answer of a player who left.
    pub fn remove(&mut self, player: &ConnectionId) {
        self.answers.remove(player);
    }

    /// Move an answer to the player's new connection.
    pub fn rebind(&mut self, from: &ConnectionId, to: ConnectionId) {
        if let Some(answer) = self.answers.remove(from) {
            self.answers.insert(to, answer);
        }
    }

    /// Progress against `total` players.
    pub fn progress(&self, total: usize) -> Progress {
        Progress {
            answered: self.answers.len(),
            total,
        }
    }

    /// Counts seen so far, without marking the question as scored.
    pub fn counts(&self, question: &Question) -> Vec<u32> {
        let mut counts = vec![0u32; question.options.len()];
        for answer in self.answers.values() {
            if let Answer::Choice(index) = answer {
                if let Some(slot) = counts.get_mut(*index) {
                    *slot += 1;
                }
            }
        }
        counts
    }

    /// Compute the reveal outcome. Returns `None` when the question was already settled.
    pub fn settle(&mut self, question: &Question) -> Option<Tally> {
        if self.settled || self.question_id != Some(question.id) {
            return None;
        }
        self.settled = true;

        let correct = self
            .answers
            .iter()
            .filter(|(_, answer)| is_correct(question, answer))
            .map(|(player, _)| *player)
            .collect();

        Some(Tally {
            per_option_counts: self.counts(question),
            correct,
        })
    }
}

/// Grade a single answer.
pub fn is_correct(question: &Question, answer: &Answer) -> bool {
    match (question.kind, answer) {
        (QuestionKind::MultipleChoice, Answer::Choice(index)) => {
            question.correct_index == Some(*index)
        }
        (QuestionKind::TrackRecognition, Answer::Text(text)) => {
            let guess = normalize_title(text);
            !guess.is_empty() && guess == normalize_title(&question.track.title)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::state::game::Track;

    fn choice_question(id: QuestionId) -> Question {
        Question {
            id,
            kind: QuestionKind::MultipleChoice,
            prompt: "Which song is playing?".into(),
            options: vec!["A".into(), "B".into(), "C".into()],
            correct_index: Some(1),
            track: Track {
                id: "t1".into(),
                title: "B".into(),
                artist: None,
                uri: None,
                preview_url: None,
            },
            duration_ms: 20_000,
            deadline_ms: 20_000,
        }
    }

    fn text_question(id: QuestionId) -> Question {
        Question {
            kind: QuestionKind::TrackRecognition,
            options: Vec::new(),
            correct_index: None,
            track: Track {
                id: "t2".into(),
                title: "Bohemian Rhapsody".into(),
                artist: Some("Queen".into()),
                uri: None,
                preview_url: None,
            },
            ..choice_question(id)
        }
    }

    #[test]
    fn stale_question_id_changes_nothing() {
        let question = choice_question(5);
        let mut aggregator = AnswerAggregator::new();
        aggregator.open(5);
        let player = Uuid::new_v4();

        let err = aggregator
            .submit(Stage::Question, &question, 0, player, 4, Answer::Choice(1))
            .unwrap_err();
        assert!(matches!(err, ServiceError::StaleSubmission(_)));
        assert_eq!(aggregator.progress(2).answered, 0);
    }

    #[test]
    fn submission_after_deadline_is_stale() {
        let question = choice_question(1);
        let mut aggregator = AnswerAggregator::new();
        aggregator.open(1);
        let err = aggregator
            .submit(
                Stage::Question,
                &question,
                20_000,
                Uuid::new_v4(),
                1,
                Answer::Choice(0),
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::StaleSubmission(_)));
    }

    #[test]
    fn submission_outside_question_stage_is_stale() {
        let question = choice_question(1);
        let mut aggregator = AnswerAggregator::new();
        aggregator.open(1);
        let err = aggregator
            .submit(Stage::Reveal, &question, 0, Uuid::new_v4(), 1, Answer::Choice(0))
            .unwrap_err();
        assert!(matches!(err, ServiceError::StaleSubmission(_)));
    }

    #[test]
    fn malformed_answers_are_invalid_input() {
        let question = choice_question(1);
        let mut aggregator = AnswerAggregator::new();
        aggregator.open(1);
        let player = Uuid::new_v4();
        for answer in [Answer::Choice(3), Answer::Text("B".into())] {
            let err = aggregator
                .submit(Stage::Question, &question, 0, player, 1, answer)
                .unwrap_err();
            assert!(matches!(err, ServiceError::InvalidInput(_)));
        }
        assert_eq!(aggregator.progress(1).answered, 0);
    }

    #[test]
    fn resubmission_overwrites_and_scores_once() {
        let question = choice_question(1);
        let mut aggregator = AnswerAggregator::new();
        aggregator.open(1);
        let player = Uuid::new_v4();

        aggregator
            .submit(Stage::Question, &question, 0, player, 1, Answer::Choice(0))
            .unwrap();
        aggregator
            .submit(Stage::Question, &question, 10, player, 1, Answer::Choice(1))
            .unwrap();
        assert_eq!(aggregator.progress(1).answered, 1);

        let tally = aggregator.settle(&question).unwrap();
        assert_eq!(tally.per_option_counts, vec![0, 1, 0]);
        assert_eq!(tally.correct, vec![player]);
        assert!(aggregator.settle(&question).is_none());
    }

    #[test]
    fn free_text_matches_trimmed_case_insensitive_title() {
        let question = text_question(2);
        assert!(is_correct(&question, &Answer::Text("  bohemian RHAPSODY ".into())));
        assert!(!is_correct(&question, &Answer::Text("Bohemian".into())));
        assert!(!is_correct(&question, &Answer::Text("   ".into())));
    }

    #[test]
    fn free_text_tally_has_no_option_counts() {
        let question = text_question(2);
        let mut aggregator = AnswerAggregator::new();
        aggregator.open(2);
        let right = Uuid::new_v4();
        let wrong = Uuid::new_v4();
        aggregator
            .submit(
                Stage::Question,
                &question,
                0,
                right,
                2,
                Answer::Text("bohemian rhapsody".into()),
            )
            .unwrap();
        aggregator
            .submit(
                Stage::Question,
                &question,
                0,
                wrong,
                2,
                Answer::Text("we will rock you".into()),
            )
            .unwrap();

        let tally = aggregator.settle(&question).unwrap();
        assert!(tally.per_option_counts.is_empty());
        assert_eq!(tally.correct, vec![right]);
    }

    #[test]
    fn removed_and_rebound_players() {
        let question = choice_question(1);
        let mut aggregator = AnswerAggregator::new();
        aggregator.open(1);
        let leaving = Uuid::new_v4();
        let moving = Uuid::new_v4();
        let fresh = Uuid::new_v4();
        for player in [leaving, moving] {
            aggregator
                .submit(Stage::Question, &question, 0, player, 1, Answer::Choice(1))
                .unwrap();
        }

        aggregator.remove(&leaving);
        aggregator.rebind(&moving, fresh);
        assert_eq!(aggregator.progress(1).answered, 1);
        let tally = aggregator.settle(&question).unwrap();
        assert_eq!(tally.correct, vec![fresh]);
    }

    #[test]
    fn empty_room_never_completes() {
        let aggregator = AnswerAggregator::new();
        assert!(!aggregator.progress(0).is_complete());
    }
}
