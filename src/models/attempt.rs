use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::assignment::{normalize_answer, InProgressQuestion, TestRef};

const TEMPORARY_PREFIX: &str = "temp-";

/// Either the id the remote service assigned, or a locally generated placeholder
/// used until the service confirms the attempt.
///
/// Stored tagged (`{"temporary": ..}` / `{"server": ..}`). Untagged strings from
/// older cache files are read with the `temp-` prefix rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "StoredAttemptId")]
pub enum AttemptId {
    Temporary(String),
    Server(String),
}

impl AttemptId {
    pub fn temporary() -> Self {
        AttemptId::Temporary(Uuid::new_v4().to_string())
    }

    pub fn server(id: impl Into<String>) -> Self {
        AttemptId::Server(id.into())
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, AttemptId::Temporary(_))
    }

    pub fn server_id(&self) -> Option<&str> {
        match self {
            AttemptId::Server(id) => Some(id),
            AttemptId::Temporary(_) => None,
        }
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptId::Temporary(suffix) => write!(f, "{TEMPORARY_PREFIX}{suffix}"),
            AttemptId::Server(id) => f.write_str(id),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredAttemptId {
    Tagged(TaggedAttemptId),
    Legacy(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum TaggedAttemptId {
    Temporary(String),
    Server(String),
}

impl From<StoredAttemptId> for AttemptId {
    fn from(stored: StoredAttemptId) -> Self {
        match stored {
            StoredAttemptId::Tagged(TaggedAttemptId::Temporary(id)) => AttemptId::Temporary(id),
            StoredAttemptId::Tagged(TaggedAttemptId::Server(id)) => AttemptId::Server(id),
            StoredAttemptId::Legacy(value) => match value.strip_prefix(TEMPORARY_PREFIX) {
                Some(suffix) => AttemptId::Temporary(suffix.to_string()),
                None => AttemptId::Server(value),
            },
        }
    }
}

/// A completed run through an assignment. The question list doubles as the review transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: AttemptId,
    #[serde(default)]
    pub assignment_id: Option<String>,
    pub student_id: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub test: TestRef,
    pub score: u32,
    pub total_questions: u32,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub questions: Vec<InProgressQuestion>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewOption {
    pub text: String,
    pub is_correct: bool,
    pub is_chosen: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewQuestion {
    pub question_text: String,
    pub options: Vec<ReviewOption>,
    pub chosen: Option<String>,
    pub answered_correctly: bool,
}

impl Attempt {
    pub fn is_confirmed(&self) -> bool {
        !self.id.is_temporary()
    }

    pub fn references(&self, assignment_id: &str) -> bool {
        self.assignment_id.as_deref() == Some(assignment_id)
    }

    /// Score as a whole percentage, half rounded up.
    pub fn percentage(&self) -> u32 {
        if self.total_questions == 0 {
            return 0;
        }
        let score = u64::from(self.score.min(self.total_questions));
        let total = u64::from(self.total_questions);
        ((score * 100 + total / 2) / total) as u32
    }

    pub fn review(&self) -> Vec<ReviewQuestion> {
        self.questions
            .iter()
            .map(|question| {
                let chosen = question.user_answer().map(normalize_answer);
                let correct = normalize_answer(&question.correct_answer);
                let source = if question.shuffled_answers.is_empty() {
                    &question.answers
                } else {
                    &question.shuffled_answers
                };

                let options = source
                    .iter()
                    .map(|text| {
                        let normalized = normalize_answer(text);
                        ReviewOption {
                            text: text.clone(),
                            is_correct: normalized == correct,
                            is_chosen: chosen.as_deref() == Some(normalized.as_str()),
                        }
                    })
                    .collect();

                ReviewQuestion {
                    question_text: question.question_text.clone(),
                    options,
                    chosen: question.user_answer().map(ToString::to_string),
                    answered_correctly: question.is_correct().unwrap_or(false),
                }
            })
            .collect()
    }
}
