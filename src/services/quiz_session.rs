use rand::Rng;
use serde::Serialize;
use thiserror::Error;

use crate::models::{Assignment, InProgressQuestion};
use crate::services::quiz_timing;
use crate::services::randomizer::shuffle_with;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Active,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    AllAnswered,
    Submitted,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("an internet connection is required for this action")]
    Offline,
    #[error("the assignment has no questions yet")]
    NoQuestions,
    #[error("the assignment has no time allotted")]
    NoDuration,
    #[error("no quiz is in progress")]
    NotActive,
    #[error("a quiz is already running or has not been closed")]
    NotIdle,
    #[error("choose an answer before submitting")]
    EmptyAnswer,
}

/// Final state of a session, handed to the completion path.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedQuiz {
    pub assignment_id: String,
    pub questions: Vec<InProgressQuestion>,
    pub score: u32,
    pub total_questions: u32,
    pub reason: FinishReason,
}

impl FinishedQuiz {
    pub fn timed_out(&self) -> bool {
        self.reason == FinishReason::TimedOut
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnswerOutcome {
    /// Session already finished or the question was answered before.
    Ignored,
    Advance { correct: bool },
    Finished { correct: bool, quiz: FinishedQuiz },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Ignored,
    Running { remaining_seconds: u64 },
    TimedOut(FinishedQuiz),
}

/// Drives one attempt through `idle -> active -> finished`.
///
/// Connectivity is passed in at every decision point instead of being read from
/// a shared source, so the machine stays synchronous and deterministic under test.
#[derive(Debug)]
pub struct QuizSession {
    phase: SessionPhase,
    assignment_id: Option<String>,
    questions: Vec<InProgressQuestion>,
    cursor: usize,
    remaining_seconds: u64,
    finish_reason: Option<FinishReason>,
}

impl Default for QuizSession {
    fn default() -> Self {
        Self::new()
    }
}

impl QuizSession {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Idle,
            assignment_id: None,
            questions: Vec::new(),
            cursor: 0,
            remaining_seconds: 0,
            finish_reason: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn assignment_id(&self) -> Option<&str> {
        self.assignment_id.as_deref()
    }

    pub fn questions(&self) -> &[InProgressQuestion] {
        &self.questions
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current_question(&self) -> Option<&InProgressQuestion> {
        self.questions.get(self.cursor)
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.remaining_seconds
    }

    pub fn score(&self) -> u32 {
        self.questions.iter().filter(|question| question.is_correct() == Some(true)).count() as u32
    }

    pub fn timed_out(&self) -> bool {
        self.finish_reason == Some(FinishReason::TimedOut)
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    pub fn start(&mut self, assignment: &Assignment, online: bool) -> Result<(), SessionError> {
        self.start_with(assignment, online, &mut rand::thread_rng())
    }

    /// Refused starts leave the session untouched.
    pub fn start_with<R: Rng + ?Sized>(
        &mut self,
        assignment: &Assignment,
        online: bool,
        rng: &mut R,
    ) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Idle {
            return Err(SessionError::NotIdle);
        }
        if !online {
            return Err(SessionError::Offline);
        }
        let countdown = quiz_timing::validate_startable(assignment)?;

        let questions = shuffle_with(&assignment.questions, rng)
            .iter()
            .map(|spec| {
                let shuffled_answers = shuffle_with(&spec.usable_answers(), rng);
                InProgressQuestion::new(spec, shuffled_answers)
            })
            .collect();

        self.phase = SessionPhase::Active;
        self.assignment_id = Some(assignment.id.clone());
        self.questions = questions;
        self.cursor = 0;
        self.remaining_seconds = countdown;
        self.finish_reason = None;

        tracing::info!(
            assignment_id = %assignment.id,
            questions = self.questions.len(),
            countdown_seconds = countdown,
            "Quiz session started"
        );

        Ok(())
    }

    /// Answers the question under the cursor. The first answer wins.
    pub fn answer(&mut self, value: &str, online: bool) -> Result<AnswerOutcome, SessionError> {
        match self.phase {
            SessionPhase::Idle => return Err(SessionError::NotActive),
            SessionPhase::Finished => return Ok(AnswerOutcome::Ignored),
            SessionPhase::Active => {}
        }
        if !online {
            return Err(SessionError::Offline);
        }
        if value.trim().is_empty() {
            return Err(SessionError::EmptyAnswer);
        }

        let Some(question) = self.questions.get_mut(self.cursor) else {
            return Ok(AnswerOutcome::Ignored);
        };
        let Some(correct) = question.lock_answer(value) else {
            return Ok(AnswerOutcome::Ignored);
        };

        if self.cursor + 1 < self.questions.len() {
            Ok(AnswerOutcome::Advance { correct })
        } else {
            let quiz = self.finish(FinishReason::AllAnswered);
            Ok(AnswerOutcome::Finished { correct, quiz })
        }
    }

    /// Moves to the next question once the current one is answered.
    pub fn advance(&mut self) -> bool {
        if self.phase != SessionPhase::Active {
            return false;
        }
        let answered = self.current_question().is_some_and(InProgressQuestion::is_answered);
        if !answered || self.cursor + 1 >= self.questions.len() {
            return false;
        }
        self.cursor += 1;
        true
    }

    /// One second of countdown. Runs regardless of connectivity.
    pub fn tick(&mut self) -> TickOutcome {
        if self.phase != SessionPhase::Active {
            return TickOutcome::Ignored;
        }

        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds == 0 {
            return TickOutcome::TimedOut(self.finish(FinishReason::TimedOut));
        }
        TickOutcome::Running { remaining_seconds: self.remaining_seconds }
    }

    pub fn submit_now(&mut self, online: bool) -> Result<FinishedQuiz, SessionError> {
        if self.phase != SessionPhase::Active {
            return Err(SessionError::NotActive);
        }
        if !online {
            return Err(SessionError::Offline);
        }
        Ok(self.finish(FinishReason::Submitted))
    }

    /// Returns to `idle`, discarding any in-progress attempt without completing it.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn finish(&mut self, reason: FinishReason) -> FinishedQuiz {
        self.phase = SessionPhase::Finished;
        self.finish_reason = Some(reason);

        let quiz = FinishedQuiz {
            assignment_id: self.assignment_id.clone().unwrap_or_default(),
            questions: self.questions.clone(),
            score: self.score(),
            total_questions: self.questions.len() as u32,
            reason,
        };

        tracing::info!(
            assignment_id = %quiz.assignment_id,
            score = quiz.score,
            total_questions = quiz.total_questions,
            reason = ?reason,
            "Quiz session finished"
        );

        quiz
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuestionSpec;
    use crate::test_support::fixtures;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn started(assignment: &Assignment) -> QuizSession {
        let mut session = QuizSession::new();
        session.start_with(assignment, true, &mut StdRng::seed_from_u64(3)).expect("start");
        session
    }

    #[test]
    fn start_is_refused_offline_without_state_change() {
        let assignment = fixtures::assignment("a1", 2, 1);
        let mut session = QuizSession::new();

        assert_eq!(session.start(&assignment, false), Err(SessionError::Offline));
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert!(session.questions().is_empty());
    }

    #[test]
    fn start_is_refused_for_empty_or_untimed_assignments() {
        let mut session = QuizSession::new();
        assert_eq!(
            session.start(&fixtures::assignment("a1", 0, 5), true),
            Err(SessionError::NoQuestions)
        );
        assert_eq!(
            session.start(&fixtures::assignment("a1", 3, 0), true),
            Err(SessionError::NoDuration)
        );
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn start_initialises_cursor_countdown_and_shuffled_copies() {
        let assignment = fixtures::assignment("a1", 4, 2);
        let session = started(&assignment);

        assert_eq!(session.phase(), SessionPhase::Active);
        assert_eq!(session.cursor(), 0);
        assert_eq!(session.score(), 0);
        assert_eq!(session.remaining_seconds(), 120);
        assert_eq!(session.questions().len(), 4);

        let mut texts: Vec<_> =
            session.questions().iter().map(|question| question.question_text.clone()).collect();
        texts.sort();
        let mut expected: Vec<_> =
            assignment.questions.iter().map(|spec| spec.question_text.clone()).collect();
        expected.sort();
        assert_eq!(texts, expected);

        for question in session.questions() {
            let mut shuffled = question.shuffled_answers.clone();
            shuffled.sort();
            let mut original = question.answers.clone();
            original.sort();
            assert_eq!(shuffled, original);
            assert!(!question.is_answered());
        }
    }

    #[test]
    fn correct_value_wins_regardless_of_shuffled_position() {
        let assignment = Assignment {
            questions: vec![QuestionSpec {
                question_text: "Capital of France?".to_string(),
                answers: vec!["Paris".into(), "London".into(), "Rome".into(), "Berlin".into()],
                correct_answer: "Paris".to_string(),
            }],
            ..fixtures::assignment("geo", 0, 1)
        };

        for seed in 0..8 {
            let mut session = QuizSession::new();
            session.start_with(&assignment, true, &mut StdRng::seed_from_u64(seed)).unwrap();
            match session.answer("Paris", true).unwrap() {
                AnswerOutcome::Finished { correct, quiz } => {
                    assert!(correct);
                    assert_eq!(quiz.score, 1);
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
        }

        let mut session = QuizSession::new();
        session.start(&assignment, true).unwrap();
        match session.answer(" paris ", true).unwrap() {
            AnswerOutcome::Finished { correct, quiz } => {
                assert!(correct);
                assert_eq!(quiz.questions[0].is_correct(), Some(true));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn answer_offline_changes_nothing() {
        let mut session = started(&fixtures::assignment("a1", 2, 1));

        assert_eq!(session.answer("anything", false), Err(SessionError::Offline));
        assert_eq!(session.cursor(), 0);
        assert!(session.questions().iter().all(|question| !question.is_answered()));
        assert!(!session.advance());
    }

    #[test]
    fn blank_answer_is_rejected_and_leaves_question_open() {
        let mut session = started(&fixtures::assignment("a1", 2, 1));

        assert_eq!(session.answer("   ", true), Err(SessionError::EmptyAnswer));
        assert_eq!(session.answer("", true), Err(SessionError::EmptyAnswer));
        assert!(!session.current_question().unwrap().is_answered());
        assert!(!session.advance());

        let correct = session.current_question().unwrap().correct_answer.clone();
        assert_eq!(session.answer(&correct, true), Ok(AnswerOutcome::Advance { correct: true }));
    }

    #[test]
    fn second_answer_to_same_question_is_ignored() {
        let mut session = started(&fixtures::assignment("a1", 3, 1));
        let correct = session.current_question().unwrap().correct_answer.clone();

        assert_eq!(session.answer("wrong", true), Ok(AnswerOutcome::Advance { correct: false }));
        assert_eq!(session.answer(&correct, true), Ok(AnswerOutcome::Ignored));
        assert_eq!(session.current_question().unwrap().user_answer(), Some("wrong"));
        assert_eq!(session.score(), 0);
    }

    #[test]
    fn cursor_advances_only_after_an_answer() {
        let mut session = started(&fixtures::assignment("a1", 2, 1));

        assert!(!session.advance());
        session.answer("x", true).unwrap();
        assert!(session.advance());
        assert_eq!(session.cursor(), 1);
        assert!(!session.advance());
    }

    #[test]
    fn answering_the_last_question_finishes_immediately() {
        let mut session = started(&fixtures::assignment("a1", 2, 1));

        let first = session.current_question().unwrap().correct_answer.clone();
        session.answer(&first, true).unwrap();
        session.advance();

        let outcome = session.answer("nope", true).unwrap();
        let AnswerOutcome::Finished { correct, quiz } = outcome else {
            panic!("expected finish");
        };
        assert!(!correct);
        assert_eq!(quiz.reason, FinishReason::AllAnswered);
        assert_eq!(quiz.total_questions, 2);
        assert_eq!(quiz.score, 1);
        assert_eq!(session.phase(), SessionPhase::Finished);
    }

    #[test]
    fn countdown_reaching_zero_times_out_unanswered_session() {
        let mut session = started(&fixtures::assignment("a1", 2, 1));

        for expected in (1..60).rev() {
            assert_eq!(session.tick(), TickOutcome::Running { remaining_seconds: expected });
        }
        let TickOutcome::TimedOut(quiz) = session.tick() else {
            panic!("expected timeout");
        };

        assert!(quiz.timed_out());
        assert_eq!(quiz.score, 0);
        assert_eq!(quiz.total_questions, 2);
        assert!(session.timed_out());
        assert_eq!(session.phase(), SessionPhase::Finished);
    }

    #[test]
    fn ticks_continue_while_offline() {
        let mut session = started(&fixtures::assignment("a1", 1, 1));
        assert_eq!(session.answer("x", false), Err(SessionError::Offline));
        assert_eq!(session.tick(), TickOutcome::Running { remaining_seconds: 59 });
    }

    #[test]
    fn finished_session_ignores_reentry() {
        let mut session = started(&fixtures::assignment("a1", 2, 1));
        let quiz = session.submit_now(true).unwrap();
        assert_eq!(quiz.reason, FinishReason::Submitted);

        assert_eq!(session.tick(), TickOutcome::Ignored);
        assert_eq!(session.answer("x", true), Ok(AnswerOutcome::Ignored));
        assert_eq!(session.submit_now(true), Err(SessionError::NotActive));
        assert!(session.questions().iter().all(|question| !question.is_answered()));
    }

    #[test]
    fn submit_now_is_refused_offline() {
        let mut session = started(&fixtures::assignment("a1", 2, 1));
        assert_eq!(session.submit_now(false), Err(SessionError::Offline));
        assert_eq!(session.phase(), SessionPhase::Active);
    }

    #[test]
    fn new_attempt_requires_reset() {
        let assignment = fixtures::assignment("a1", 1, 1);
        let mut session = started(&assignment);
        session.submit_now(true).unwrap();

        assert_eq!(session.start(&assignment, true), Err(SessionError::NotIdle));
        session.reset();
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert!(session.start(&assignment, true).is_ok());
    }

    #[test]
    fn blank_options_are_not_offered() {
        let assignment = Assignment {
            questions: vec![QuestionSpec {
                question_text: "Pick one".to_string(),
                answers: vec!["yes".into(), "".into(), "  ".into(), "no".into()],
                correct_answer: "yes".to_string(),
            }],
            ..fixtures::assignment("a1", 0, 1)
        };
        let session = started(&assignment);
        assert_eq!(session.questions()[0].shuffled_answers.len(), 2);
    }
}
