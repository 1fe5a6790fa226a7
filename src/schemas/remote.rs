//! Boundary between the remote test service's loosely shaped JSON and the fixed
//! model. Records arrive with numeric or string ids, camelCase or snake_case keys,
//! and test references either nested or flattened; everything is resolved here.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

use super::fields::{bool_field, id_field, str_field, text_list, text_value, u32_field};
use crate::core::time::parse_timestamp;
use crate::models::{Assignment, Attempt, AttemptId, InProgressQuestion, QuestionSpec, TestRef};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("expected a JSON object")]
    NotAnObject,
    #[error("missing field {0}")]
    MissingField(&'static str),
}

/// Server acknowledgement of a submitted attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Confirmation {
    pub id: String,
    pub completed_at: Option<OffsetDateTime>,
    pub test: Option<TestRef>,
}

/// Outgoing history record, in the field names the service expects.
#[derive(Debug, Serialize)]
pub struct AttemptSubmission<'a> {
    pub number_corrected: u32,
    pub ball: u32,
    pub user: &'a str,
    pub give_information: Option<&'a str>,
    pub given_group: &'a str,
    pub test_information: Option<&'a str>,
    pub review_questions: &'a [InProgressQuestion],
}

impl<'a> AttemptSubmission<'a> {
    pub fn from_attempt(attempt: &'a Attempt) -> Self {
        Self {
            number_corrected: attempt.score,
            ball: attempt.total_questions,
            user: &attempt.student_id,
            give_information: attempt.assignment_id.as_deref(),
            given_group: &attempt.group,
            test_information: attempt.test.id.as_deref(),
            review_questions: &attempt.questions,
        }
    }
}

/// Items of a list response: a bare array, or an array under `results`.
pub fn list_items(payload: &Value) -> &[Value] {
    payload
        .as_array()
        .or_else(|| payload.get("results").and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

pub fn assignments_from_payload(payload: &Value) -> Vec<Assignment> {
    list_items(payload)
        .iter()
        .filter_map(|item| match assignment_from_value(item) {
            Ok(assignment) => Some(assignment),
            Err(err) => {
                tracing::warn!(error = %err, "Skipping malformed assignment record");
                None
            }
        })
        .collect()
}

pub fn attempts_from_payload(payload: &Value) -> Vec<Attempt> {
    list_items(payload)
        .iter()
        .filter_map(|item| match attempt_from_value(item) {
            Ok(attempt) => Some(attempt),
            Err(err) => {
                tracing::warn!(error = %err, "Skipping malformed history record");
                None
            }
        })
        .collect()
}

pub fn assignment_from_value(payload: &Value) -> Result<Assignment, NormalizeError> {
    if !payload.is_object() {
        return Err(NormalizeError::NotAnObject);
    }
    let id = id_field(payload, &["id"]).ok_or(NormalizeError::MissingField("id"))?;

    let questions = payload
        .get("given_questions")
        .or_else(|| payload.get("questions"))
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(question_spec_from_value).collect())
        .unwrap_or_default();

    Ok(Assignment {
        id,
        test: test_ref(payload),
        questions,
        duration_minutes: u32_field(payload, &["duration_minutes", "durationMinutes", "duration"])
            .unwrap_or(0),
        group: id_field(payload, &["given_group", "group"]).unwrap_or_default(),
    })
}

pub fn attempt_from_value(payload: &Value) -> Result<Attempt, NormalizeError> {
    if !payload.is_object() {
        return Err(NormalizeError::NotAnObject);
    }
    let id = id_field(payload, &["id"]).ok_or(NormalizeError::MissingField("id"))?;

    let questions = payload
        .get("review_questions")
        .or_else(|| payload.get("reviewQuestions"))
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(transcript_entry_from_value).collect::<Vec<_>>())
        .unwrap_or_default();

    let score = u32_field(payload, &["number_corrected", "score"]).unwrap_or(0);
    let total_questions = u32_field(payload, &["ball", "totalQuestions", "total_questions"])
        .unwrap_or(questions.len() as u32);

    Ok(Attempt {
        id: AttemptId::server(id),
        assignment_id: id_field(payload, &["give_information", "assignment_id"]),
        student_id: id_field(payload, &["user", "student_id"]).unwrap_or_default(),
        group: id_field(payload, &["given_group", "group"]).unwrap_or_default(),
        test: test_ref(payload),
        score,
        total_questions,
        completed_at: timestamp_field(payload),
        questions,
    })
}

pub fn confirmation_from_value(payload: &Value) -> Result<Confirmation, NormalizeError> {
    if !payload.is_object() {
        return Err(NormalizeError::NotAnObject);
    }
    let id = id_field(payload, &["id"]).ok_or(NormalizeError::MissingField("id"))?;
    let test = payload.get("test_information").filter(|value| value.is_object()).map(|_| test_ref(payload));

    Ok(Confirmation { id, completed_at: timestamp_field(payload), test })
}

fn timestamp_field(payload: &Value) -> Option<OffsetDateTime> {
    str_field(payload, &["date_completed", "dateCompleted", "completed_at"])
        .and_then(|raw| parse_timestamp(&raw))
}

fn test_ref(payload: &Value) -> TestRef {
    let nested = payload.get("test_information").or_else(|| payload.get("test"));

    let (theme, id) = match nested {
        Some(info @ Value::Object(_)) => (str_field(info, &["theme"]), id_field(info, &["id"])),
        Some(scalar) => (None, super::fields::id_value(scalar)),
        None => (None, None),
    };

    TestRef {
        theme: theme.or_else(|| str_field(payload, &["test_theme", "theme"])),
        id: id.or_else(|| id_field(payload, &["test_id"])),
    }
}

/// Authoring convention: when no explicit correct value is sent, option 0 is correct.
fn question_spec_from_value(payload: &Value) -> Option<QuestionSpec> {
    let question_text = str_field(payload, &["question_text", "text", "qTema"]).unwrap_or_default();
    let answers = text_list(payload, &["answers"]).unwrap_or_default();

    let correct_answer = ["correct_answer", "correctAnswer"]
        .iter()
        .find_map(|key| payload.get(*key).and_then(text_value))
        .filter(|value| !value.trim().is_empty())
        .or_else(|| answers.first().cloned().filter(|value| !value.trim().is_empty()));

    let Some(correct_answer) = correct_answer else {
        tracing::warn!(question_text = %question_text, "Skipping question without a correct answer");
        return None;
    };

    Some(QuestionSpec { question_text, answers, correct_answer })
}

fn transcript_entry_from_value(payload: &Value) -> Option<InProgressQuestion> {
    let spec = question_spec_from_value(payload)?;
    let shuffled = text_list(payload, &["shuffled_answers", "shuffledAnswers"]).unwrap_or_default();
    let user_answer = ["user_answer", "userAnswer"]
        .iter()
        .find_map(|key| payload.get(*key).and_then(text_value));
    let is_correct = bool_field(payload, &["is_correct", "isCorrect"]);

    Some(InProgressQuestion::restored(&spec, shuffled, user_answer, is_correct))
}
