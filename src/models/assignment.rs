use serde::{Deserialize, Serialize};

/// Reference back to the authored test an assignment was cut from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRef {
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

/// A test distributed to a group. Immutable once it reaches a student's view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: String,
    #[serde(default)]
    pub test: TestRef,
    #[serde(default)]
    pub questions: Vec<QuestionSpec>,
    pub duration_minutes: u32,
    pub group: String,
}

impl Assignment {
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn theme(&self) -> &str {
        self.test.theme.as_deref().unwrap_or("untitled")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSpec {
    pub question_text: String,
    #[serde(default)]
    pub answers: Vec<String>,
    /// Compared by value; its position among `answers` carries no meaning once shuffled.
    pub correct_answer: String,
}

impl QuestionSpec {
    /// Options worth showing: blank entries left over from authoring are dropped.
    pub fn usable_answers(&self) -> Vec<String> {
        self.answers.iter().filter(|answer| !answer.trim().is_empty()).cloned().collect()
    }

    pub fn is_correct(&self, value: &str) -> bool {
        normalize_answer(value) == normalize_answer(&self.correct_answer)
    }
}

pub fn normalize_answer(value: &str) -> String {
    value.trim().to_lowercase()
}

/// One question of a running attempt, also kept afterwards as the review transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InProgressQuestion {
    pub question_text: String,
    #[serde(default)]
    pub answers: Vec<String>,
    #[serde(default)]
    pub shuffled_answers: Vec<String>,
    pub correct_answer: String,
    #[serde(default)]
    user_answer: Option<String>,
    #[serde(default)]
    is_correct: Option<bool>,
}

impl InProgressQuestion {
    pub fn new(spec: &QuestionSpec, shuffled_answers: Vec<String>) -> Self {
        Self {
            question_text: spec.question_text.clone(),
            answers: spec.answers.clone(),
            shuffled_answers,
            correct_answer: spec.correct_answer.clone(),
            user_answer: None,
            is_correct: None,
        }
    }

    /// Rebuilds a transcript entry reported by the remote service.
    pub(crate) fn restored(
        spec: &QuestionSpec,
        shuffled_answers: Vec<String>,
        user_answer: Option<String>,
        is_correct: Option<bool>,
    ) -> Self {
        let mut question = Self::new(spec, shuffled_answers);
        question.is_correct = match (&user_answer, is_correct) {
            (Some(answer), None) => Some(spec.is_correct(answer)),
            (_, flag) => flag,
        };
        question.user_answer = user_answer;
        question
    }

    pub fn user_answer(&self) -> Option<&str> {
        self.user_answer.as_deref()
    }

    pub fn is_correct(&self) -> Option<bool> {
        self.is_correct
    }

    pub fn is_answered(&self) -> bool {
        self.user_answer.is_some()
    }

    /// Records the first answer. Returns `None` when an answer is already locked in.
    pub(crate) fn lock_answer(&mut self, value: &str) -> Option<bool> {
        if self.user_answer.is_some() {
            return None;
        }

        let correct = normalize_answer(value) == normalize_answer(&self.correct_answer);
        self.user_answer = Some(value.to_string());
        self.is_correct = Some(correct);
        Some(correct)
    }
}
