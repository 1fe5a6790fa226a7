use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::core::metrics;
use crate::core::time::now_utc;
use crate::models::{Assignment, Attempt, AttemptId};
use crate::repositories::attempt_cache::{AttemptCache, CacheError};
use crate::schemas::remote::Confirmation;
use crate::services::connectivity::ConnectivityMonitor;
use crate::services::notices::Notice;
use crate::services::quiz_session::FinishedQuiz;
use crate::services::remote_tests::{RemoteError, RemoteTestService};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("the session has expired; sign in again")]
    Unauthorized,
    #[error("assignment {0} is not in the pending list")]
    AssignmentNotFound(String),
    #[error("attempt {0} is not in the completed list")]
    AttemptNotFound(String),
    #[error("an internet connection is required for this action")]
    Offline,
    #[error(transparent)]
    Remote(RemoteError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl From<RemoteError> for ReconcileError {
    fn from(err: RemoteError) -> Self {
        if err.is_unauthorized() {
            ReconcileError::Unauthorized
        } else {
            ReconcileError::Remote(err)
        }
    }
}

/// What the student sees: assignments still to take and the attempt history.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StudentView {
    pub pending: Vec<Assignment>,
    pub completed: Vec<Attempt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewSource {
    Remote,
    Cache,
}

impl ViewSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ViewSource::Remote => "remote",
            ViewSource::Cache => "cache",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub source: ViewSource,
    pub view: StudentView,
    pub notice: Option<Notice>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitStatus {
    Confirmed,
    Unconfirmed,
    Offline,
}

impl CommitStatus {
    fn as_str(self) -> &'static str {
        match self {
            CommitStatus::Confirmed => "confirmed",
            CommitStatus::Unconfirmed => "unconfirmed",
            CommitStatus::Offline => "offline",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOutcome {
    pub attempt: Attempt,
    pub status: CommitStatus,
    pub notice: Notice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Temporary attempt; nothing to remove remotely.
    Local,
    Remote,
    /// Confirmed attempt removed while offline. The server copy returns on the next load.
    LocalOnly,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryReport {
    pub confirmed: usize,
    pub still_unconfirmed: usize,
}

/// Sole writer of a student's pending and completed collections.
///
/// The in-memory view is guarded by an async mutex held across remote calls, so
/// completion, deletion and retry never interleave for one student.
pub struct Reconciler {
    remote: Arc<dyn RemoteTestService>,
    cache: AttemptCache,
    connectivity: ConnectivityMonitor,
    student_id: String,
    group_id: String,
    view: Mutex<StudentView>,
}

impl Reconciler {
    pub fn new(
        remote: Arc<dyn RemoteTestService>,
        cache: AttemptCache,
        connectivity: ConnectivityMonitor,
        student_id: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Self {
        let student_id = student_id.into();
        let view = view_from_cache(&cache, &student_id);

        Self {
            remote,
            cache,
            connectivity,
            student_id,
            group_id: group_id.into(),
            view: Mutex::new(view),
        }
    }

    pub fn student_id(&self) -> &str {
        &self.student_id
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    pub async fn view(&self) -> StudentView {
        self.view.lock().await.clone()
    }

    pub async fn pending_assignment(&self, assignment_id: &str) -> Option<Assignment> {
        let view = self.view.lock().await;
        view.pending.iter().find(|assignment| assignment.id == assignment_id).cloned()
    }

    /// Rebuilds the view from the remote service, falling back to the cache.
    pub async fn load(&self) -> Result<LoadReport, ReconcileError> {
        let mut view = self.view.lock().await;

        if !self.connectivity.is_online() {
            *view = self.cached_view();
            metrics::record_load(ViewSource::Cache.as_str());
            tracing::info!(student_id = %self.student_id, "Offline; showing cached assignments");
            return Ok(LoadReport {
                source: ViewSource::Cache,
                view: view.clone(),
                notice: Some(Notice::warning("You are offline. Showing your last saved data.")),
            });
        }

        let fetched = tokio::try_join!(
            self.remote.list_assignments(&self.group_id),
            self.remote.list_history(&self.student_id),
        );

        let (assignments, history) = match fetched {
            Ok(lists) => lists,
            Err(err) if err.is_unauthorized() => return Err(ReconcileError::Unauthorized),
            Err(err) => {
                tracing::warn!(
                    student_id = %self.student_id,
                    error = %err,
                    "Remote load failed; keeping cached data"
                );
                *view = self.cached_view();
                metrics::record_load(ViewSource::Cache.as_str());
                return Ok(LoadReport {
                    source: ViewSource::Cache,
                    view: view.clone(),
                    notice: Some(Notice::warning(
                        "Could not reach the test service. Showing your last saved data.",
                    )),
                });
            }
        };

        let merged = merge_view(assignments, history, self.cache.load_completed(&self.student_id));
        let mut notice = None;
        if let Err(err) = self.persist(&merged) {
            tracing::warn!(student_id = %self.student_id, error = %err, "Failed to persist loaded view");
            notice = Some(Notice::warning("Your data could not be saved on this device."));
        }

        tracing::info!(
            student_id = %self.student_id,
            pending = merged.pending.len(),
            completed = merged.completed.len(),
            "Loaded student view from remote service"
        );
        metrics::record_load(ViewSource::Remote.as_str());

        *view = merged;
        Ok(LoadReport { source: ViewSource::Remote, view: view.clone(), notice })
    }

    /// Records a finished quiz locally, then tries to confirm it remotely.
    ///
    /// The attempt is durable in the cache before the remote call is issued.
    /// `Unauthorized` is returned even though the local copy was already saved.
    pub async fn complete(&self, quiz: FinishedQuiz) -> Result<CompletionOutcome, ReconcileError> {
        let mut view = self.view.lock().await;

        let Some(index) =
            view.pending.iter().position(|assignment| assignment.id == quiz.assignment_id)
        else {
            tracing::error!(
                student_id = %self.student_id,
                assignment_id = %quiz.assignment_id,
                "Finished quiz does not match a pending assignment"
            );
            return Err(ReconcileError::AssignmentNotFound(quiz.assignment_id));
        };

        let assignment = &view.pending[index];
        let attempt = Attempt {
            id: AttemptId::temporary(),
            assignment_id: Some(assignment.id.clone()),
            student_id: self.student_id.clone(),
            group: if assignment.group.is_empty() {
                self.group_id.clone()
            } else {
                assignment.group.clone()
            },
            test: assignment.test.clone(),
            score: quiz.score,
            total_questions: quiz.total_questions,
            completed_at: Some(now_utc()),
            questions: quiz.questions,
        };

        let mut completed = view.completed.clone();
        completed.push(attempt.clone());
        self.cache.save_completed(&self.student_id, &completed)?;
        view.completed = completed;

        view.pending.remove(index);
        if let Err(err) = self.cache.save_pending(&self.student_id, &view.pending) {
            // The durable attempt already hides the assignment on the next cached read.
            tracing::warn!(
                student_id = %self.student_id,
                assignment_id = %quiz.assignment_id,
                error = %err,
                "Failed to persist pending list"
            );
        }

        tracing::info!(
            student_id = %self.student_id,
            attempt_id = %attempt.id,
            assignment_id = %quiz.assignment_id,
            score = attempt.score,
            total_questions = attempt.total_questions,
            "Attempt saved locally"
        );

        if !self.connectivity.is_online() {
            metrics::record_commit(CommitStatus::Offline.as_str());
            tracing::warn!(attempt_id = %attempt.id, "Offline; attempt left unconfirmed");
            return Ok(CompletionOutcome {
                attempt,
                status: CommitStatus::Offline,
                notice: Notice::warning(
                    "Your result is saved on this device and will be sent when you are back online.",
                ),
            });
        }

        match self.remote.submit_attempt(&attempt).await {
            Ok(confirmation) => {
                let confirmed = promote(&attempt, confirmation);
                replace_attempt(&mut view.completed, &attempt.id, confirmed.clone());
                if let Err(err) = self.cache.save_completed(&self.student_id, &view.completed) {
                    tracing::warn!(attempt_id = %confirmed.id, error = %err, "Failed to persist confirmation");
                }
                metrics::record_commit(CommitStatus::Confirmed.as_str());
                tracing::info!(
                    temporary_id = %attempt.id,
                    attempt_id = %confirmed.id,
                    "Attempt confirmed by remote service"
                );
                Ok(CompletionOutcome {
                    attempt: confirmed,
                    status: CommitStatus::Confirmed,
                    notice: Notice::info("Your result has been submitted."),
                })
            }
            Err(err) => {
                metrics::record_commit(CommitStatus::Unconfirmed.as_str());
                tracing::warn!(attempt_id = %attempt.id, error = %err, "Remote commit failed; attempt left unconfirmed");
                if err.is_unauthorized() {
                    return Err(ReconcileError::Unauthorized);
                }
                Ok(CompletionOutcome {
                    attempt,
                    status: CommitStatus::Unconfirmed,
                    notice: Notice::warning(
                        "Your result is saved on this device but could not be sent. Try again later.",
                    ),
                })
            }
        }
    }

    /// Removes an attempt locally first; a failed remote delete puts it back in place.
    pub async fn delete_attempt(&self, attempt_id: &AttemptId) -> Result<DeleteOutcome, ReconcileError> {
        let mut view = self.view.lock().await;

        let Some(index) = view.completed.iter().position(|attempt| &attempt.id == attempt_id) else {
            return Err(ReconcileError::AttemptNotFound(attempt_id.to_string()));
        };

        let removed = view.completed.remove(index);
        if let Err(err) = self.cache.save_completed(&self.student_id, &view.completed) {
            view.completed.insert(index, removed);
            return Err(err.into());
        }

        let Some(server_id) = removed.id.server_id().map(str::to_string) else {
            metrics::record_delete("local");
            tracing::info!(attempt_id = %attempt_id, "Deleted unconfirmed attempt locally");
            return Ok(DeleteOutcome::Local);
        };

        if !self.connectivity.is_online() {
            metrics::record_delete("local_only");
            tracing::warn!(attempt_id = %attempt_id, "Offline; remote copy of attempt kept");
            return Ok(DeleteOutcome::LocalOnly);
        }

        match self.remote.delete_attempt(&server_id).await {
            Ok(()) => {
                metrics::record_delete("remote");
                tracing::info!(attempt_id = %attempt_id, "Deleted attempt");
                Ok(DeleteOutcome::Remote)
            }
            Err(err) => {
                metrics::record_delete("rolled_back");
                tracing::warn!(attempt_id = %attempt_id, error = %err, "Remote delete failed; restoring attempt");
                let position = index.min(view.completed.len());
                view.completed.insert(position, removed);
                if let Err(cache_err) = self.cache.save_completed(&self.student_id, &view.completed) {
                    tracing::error!(attempt_id = %attempt_id, error = %cache_err, "Failed to persist rollback");
                }
                Err(err.into())
            }
        }
    }

    /// Resubmits every unconfirmed attempt, replacing each in place on success.
    pub async fn retry_unconfirmed(&self) -> Result<RetryReport, ReconcileError> {
        if !self.connectivity.is_online() {
            return Err(ReconcileError::Offline);
        }

        let mut view = self.view.lock().await;
        let candidates: Vec<Attempt> =
            view.completed.iter().filter(|attempt| !attempt.is_confirmed()).cloned().collect();

        let mut report = RetryReport::default();
        let mut unauthorized = false;

        for attempt in candidates {
            if unauthorized || !self.connectivity.is_online() {
                report.still_unconfirmed += 1;
                continue;
            }

            match self.remote.submit_attempt(&attempt).await {
                Ok(confirmation) => {
                    let confirmed = promote(&attempt, confirmation);
                    tracing::info!(temporary_id = %attempt.id, attempt_id = %confirmed.id, "Unconfirmed attempt confirmed");
                    replace_attempt(&mut view.completed, &attempt.id, confirmed);
                    metrics::record_commit(CommitStatus::Confirmed.as_str());
                    report.confirmed += 1;
                }
                Err(err) => {
                    tracing::warn!(attempt_id = %attempt.id, error = %err, "Retry of unconfirmed attempt failed");
                    metrics::record_commit(CommitStatus::Unconfirmed.as_str());
                    unauthorized = err.is_unauthorized();
                    report.still_unconfirmed += 1;
                }
            }
        }

        if report.confirmed > 0 {
            self.cache.save_completed(&self.student_id, &view.completed)?;
        }
        if unauthorized {
            return Err(ReconcileError::Unauthorized);
        }

        Ok(report)
    }

    fn cached_view(&self) -> StudentView {
        view_from_cache(&self.cache, &self.student_id)
    }

    fn persist(&self, view: &StudentView) -> Result<(), CacheError> {
        self.cache.save_completed(&self.student_id, &view.completed)?;
        self.cache.save_pending(&self.student_id, &view.pending)
    }
}

/// Remote history plus local attempts the service has not acknowledged yet.
/// Pending keeps remote assignments no completed attempt refers to.
pub fn merge_view(
    assignments: Vec<Assignment>,
    history: Vec<Attempt>,
    cached_completed: Vec<Attempt>,
) -> StudentView {
    let remote_ids: HashSet<AttemptId> = history.iter().map(|attempt| attempt.id.clone()).collect();
    let acknowledged: HashSet<String> =
        history.iter().filter_map(|attempt| attempt.assignment_id.clone()).collect();

    let retained = cached_completed.into_iter().filter(|attempt| {
        attempt.id.is_temporary()
            && !remote_ids.contains(&attempt.id)
            && !attempt.assignment_id.as_ref().is_some_and(|id| acknowledged.contains(id))
    });

    let completed: Vec<Attempt> = history.into_iter().chain(retained).collect();
    let referenced: HashSet<&str> =
        completed.iter().filter_map(|attempt| attempt.assignment_id.as_deref()).collect();

    let mut seen = HashSet::new();
    let pending = assignments
        .into_iter()
        .filter(|assignment| !referenced.contains(assignment.id.as_str()))
        .filter(|assignment| seen.insert(assignment.id.clone()))
        .collect();

    StudentView { pending, completed }
}

/// Cached collections are written separately, so pending is filtered against
/// the cached attempts on the way back in.
fn view_from_cache(cache: &AttemptCache, student_id: &str) -> StudentView {
    let completed = cache.load_completed(student_id);
    let referenced: HashSet<&str> =
        completed.iter().filter_map(|attempt| attempt.assignment_id.as_deref()).collect();
    let pending = cache
        .load_pending(student_id)
        .into_iter()
        .filter(|assignment| !referenced.contains(assignment.id.as_str()))
        .collect();

    StudentView { pending, completed }
}

fn promote(attempt: &Attempt, confirmation: Confirmation) -> Attempt {
    Attempt {
        id: AttemptId::server(confirmation.id),
        completed_at: confirmation.completed_at.or(attempt.completed_at),
        test: confirmation.test.unwrap_or_else(|| attempt.test.clone()),
        ..attempt.clone()
    }
}

fn replace_attempt(completed: &mut [Attempt], id: &AttemptId, replacement: Attempt) {
    if let Some(slot) = completed.iter_mut().find(|attempt| &attempt.id == id) {
        *slot = replacement;
    }
}
