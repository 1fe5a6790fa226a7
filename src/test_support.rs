use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::{Assignment, Attempt, AttemptId};
use crate::schemas::remote::Confirmation;
use crate::services::remote_tests::{RemoteError, RemoteTestService};

pub(crate) const TEST_ACCESS_TOKEN: &str = "test-access-token";

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("TESTDESK_ENV", "test");
    std::env::set_var("TESTDESK_STRICT_CONFIG", "0");
    std::env::set_var("TESTDESK_API_URL", "http://127.0.0.1:8000");
    std::env::set_var("TESTDESK_ACCESS_TOKEN", TEST_ACCESS_TOKEN);
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    for key in [
        "ENVIRONMENT",
        "TESTDESK_API_PREFIX",
        "TESTDESK_CONNECT_TIMEOUT_SECONDS",
        "TESTDESK_REQUEST_TIMEOUT_SECONDS",
        "TESTDESK_CACHE_DIR",
        "TESTDESK_ADVANCE_DELAY_MS",
        "TESTDESK_STUDENT_ID",
        "TESTDESK_GROUP_ID",
        "TESTDESK_STUDENT_PROFILE",
        "TESTDESK_RETRY_UNCONFIRMED_ON_LOAD",
        "TESTDESK_LOG_LEVEL",
        "TESTDESK_LOG_JSON",
    ] {
        std::env::remove_var(key);
    }
}

pub(crate) mod fixtures {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::models::{Assignment, Attempt, AttemptId, QuestionSpec, TestRef};
    use crate::services::quiz_session::{AnswerOutcome, FinishedQuiz, QuizSession};

    /// Questions `Question {i}` with `right-{i}` as the correct option among three.
    pub(crate) fn assignment(id: &str, question_count: usize, duration_minutes: u32) -> Assignment {
        let questions = (1..=question_count)
            .map(|i| QuestionSpec {
                question_text: format!("Question {i}"),
                answers: vec![format!("right-{i}"), format!("wrong-{i}-a"), format!("wrong-{i}-b")],
                correct_answer: format!("right-{i}"),
            })
            .collect();

        Assignment {
            id: id.to_string(),
            test: TestRef { theme: Some(format!("Theme {id}")), id: Some(format!("t-{id}")) },
            questions,
            duration_minutes,
            group: "G1".to_string(),
        }
    }

    pub(crate) fn temporary_attempt(student_id: &str, assignment_id: &str) -> Attempt {
        attempt(AttemptId::temporary(), student_id, assignment_id)
    }

    pub(crate) fn server_attempt(student_id: &str, server_id: &str, assignment_id: &str) -> Attempt {
        let mut attempt = attempt(AttemptId::server(server_id), student_id, assignment_id);
        attempt.completed_at = Some(time::macros::datetime!(2025-03-01 10:00 UTC));
        attempt
    }

    fn attempt(id: AttemptId, student_id: &str, assignment_id: &str) -> Attempt {
        Attempt {
            id,
            assignment_id: Some(assignment_id.to_string()),
            student_id: student_id.to_string(),
            group: "G1".to_string(),
            test: TestRef::default(),
            score: 1,
            total_questions: 2,
            completed_at: None,
            questions: Vec::new(),
        }
    }

    /// Plays the assignment to the end, answering the first `correct` questions right.
    pub(crate) fn finished_quiz(assignment: &Assignment, correct: usize) -> FinishedQuiz {
        let mut session = QuizSession::new();
        session.start_with(assignment, true, &mut StdRng::seed_from_u64(11)).expect("start");

        for index in 0.. {
            let value = match session.current_question() {
                Some(question) if index < correct => question.correct_answer.clone(),
                Some(_) => "wrong".to_string(),
                None => break,
            };
            match session.answer(&value, true).expect("answer") {
                AnswerOutcome::Finished { quiz, .. } => return quiz,
                AnswerOutcome::Advance { .. } => {
                    session.advance();
                }
                AnswerOutcome::Ignored => break,
            }
        }
        panic!("assignment {} did not finish", assignment.id);
    }
}

/// Scripted remote service. Successful submits land in its history so a
/// subsequent load sees them.
pub(crate) struct FakeRemote {
    assignments: StdMutex<Vec<Assignment>>,
    history: StdMutex<Vec<Attempt>>,
    submitted: StdMutex<Vec<Attempt>>,
    deleted: StdMutex<Vec<String>>,
    fail_lists: AtomicBool,
    fail_submit: AtomicBool,
    fail_delete: AtomicBool,
    unauthorized: AtomicBool,
    list_calls: AtomicUsize,
    next_id: AtomicU64,
}

impl FakeRemote {
    pub(crate) fn new(assignments: Vec<Assignment>, history: Vec<Attempt>) -> Self {
        Self {
            assignments: StdMutex::new(assignments),
            history: StdMutex::new(history),
            submitted: StdMutex::new(Vec::new()),
            deleted: StdMutex::new(Vec::new()),
            fail_lists: AtomicBool::new(false),
            fail_submit: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            unauthorized: AtomicBool::new(false),
            list_calls: AtomicUsize::new(0),
            next_id: AtomicU64::new(1000),
        }
    }

    pub(crate) fn set_fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_submit(&self, fail: bool) {
        self.fail_submit.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_unauthorized(&self, unauthorized: bool) {
        self.unauthorized.store(unauthorized, Ordering::SeqCst);
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn submitted(&self) -> Vec<Attempt> {
        self.submitted.lock().unwrap().clone()
    }

    pub(crate) fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    fn check(&self, fail: &AtomicBool) -> Result<(), RemoteError> {
        if self.unauthorized.load(Ordering::SeqCst) {
            return Err(RemoteError::Unauthorized(401));
        }
        if fail.load(Ordering::SeqCst) {
            return Err(RemoteError::Status { status: 503, detail: "unavailable".to_string() });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteTestService for FakeRemote {
    async fn list_assignments(&self, group_id: &str) -> Result<Vec<Assignment>, RemoteError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check(&self.fail_lists)?;
        let assignments = self.assignments.lock().unwrap();
        Ok(assignments.iter().filter(|assignment| assignment.group == group_id).cloned().collect())
    }

    async fn list_history(&self, student_id: &str) -> Result<Vec<Attempt>, RemoteError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check(&self.fail_lists)?;
        let history = self.history.lock().unwrap();
        Ok(history.iter().filter(|attempt| attempt.student_id == student_id).cloned().collect())
    }

    async fn submit_attempt(&self, attempt: &Attempt) -> Result<Confirmation, RemoteError> {
        self.check(&self.fail_submit)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let completed_at = Some(time::macros::datetime!(2025-04-01 12:00 UTC));

        self.submitted.lock().unwrap().push(attempt.clone());
        self.history.lock().unwrap().push(Attempt {
            id: AttemptId::server(id.clone()),
            completed_at,
            ..attempt.clone()
        });

        Ok(Confirmation { id, completed_at, test: None })
    }

    async fn delete_attempt(&self, attempt_id: &str) -> Result<(), RemoteError> {
        self.check(&self.fail_delete)?;
        self.deleted.lock().unwrap().push(attempt_id.to_string());
        self.history.lock().unwrap().retain(|attempt| attempt.id.to_string() != attempt_id);
        Ok(())
    }
}
