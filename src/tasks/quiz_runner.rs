use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

use crate::core::time::format_countdown;
use crate::models::InProgressQuestion;
use crate::services::notices::Notice;
use crate::services::quiz_session::{
    AnswerOutcome, FinishReason, FinishedQuiz, QuizSession, SessionError, SessionPhase, TickOutcome,
};
use crate::services::quiz_timing::TICK_INTERVAL;
use crate::services::reconciliation::{CompletionOutcome, ReconcileError, Reconciler};
use crate::tasks::countdown::Countdown;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

impl RunnerError {
    /// The credential was rejected; the caller should re-authenticate.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RunnerError::Reconcile(ReconcileError::Unauthorized))
    }
}

/// Progress published to whoever renders the quiz.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Started { assignment_id: String, remaining_seconds: u64 },
    Tick { remaining_seconds: u64 },
    Answered { correct: bool },
    Advanced { cursor: usize },
    Completed(CompletionOutcome),
    CompletionFailed { assignment_id: String, unauthorized: bool, notice: Notice },
    Left,
}

struct RunnerInner {
    reconciler: Arc<Reconciler>,
    session: Mutex<QuizSession>,
    countdown: Mutex<Option<Countdown>>,
    epoch: AtomicU64,
    advance_delay: Duration,
    events: mpsc::UnboundedSender<SessionEvent>,
}

/// Runs one quiz at a time against wall-clock time and live connectivity.
#[derive(Clone)]
pub struct QuizRunner {
    inner: Arc<RunnerInner>,
}

impl QuizRunner {
    pub fn new(
        reconciler: Arc<Reconciler>,
        advance_delay: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let runner = Self {
            inner: Arc::new(RunnerInner {
                reconciler,
                session: Mutex::new(QuizSession::new()),
                countdown: Mutex::new(None),
                epoch: AtomicU64::new(0),
                advance_delay,
                events,
            }),
        };
        (runner, receiver)
    }

    pub async fn phase(&self) -> SessionPhase {
        self.inner.session.lock().await.phase()
    }

    pub async fn current_question(&self) -> Option<InProgressQuestion> {
        self.inner.session.lock().await.current_question().cloned()
    }

    pub async fn finish_reason(&self) -> Option<FinishReason> {
        self.inner.session.lock().await.finish_reason()
    }

    pub async fn remaining_seconds(&self) -> u64 {
        self.inner.session.lock().await.remaining_seconds()
    }

    pub async fn countdown_running(&self) -> bool {
        self.inner.countdown.lock().await.as_ref().is_some_and(|countdown| !countdown.is_finished())
    }

    /// Starts a pending assignment. A finished session is closed first.
    pub async fn start(&self, assignment_id: &str) -> Result<(), RunnerError> {
        let assignment = self
            .inner
            .reconciler
            .pending_assignment(assignment_id)
            .await
            .ok_or_else(|| ReconcileError::AssignmentNotFound(assignment_id.to_string()))?;
        let online = self.inner.reconciler.connectivity().is_online();

        let remaining_seconds = {
            let mut session = self.inner.session.lock().await;
            if session.phase() == SessionPhase::Finished {
                session.reset();
            }
            session.start(&assignment, online)?;
            session.remaining_seconds()
        };
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);

        let runner = self.clone();
        let countdown = Countdown::spawn(TICK_INTERVAL, move || {
            let runner = runner.clone();
            async move { runner.on_tick().await }
        });
        *self.inner.countdown.lock().await = Some(countdown);

        tracing::debug!(
            assignment_id = %assignment.id,
            countdown = %format_countdown(remaining_seconds),
            "Countdown running"
        );
        self.emit(SessionEvent::Started {
            assignment_id: assignment.id.clone(),
            remaining_seconds,
        });
        Ok(())
    }

    /// Records an answer; the cursor moves after the configured delay.
    ///
    /// Answering the last question completes the attempt, and a failed
    /// completion is returned as the error.
    pub async fn answer(&self, value: &str) -> Result<AnswerOutcome, RunnerError> {
        let online = self.inner.reconciler.connectivity().is_online();
        let outcome = self.inner.session.lock().await.answer(value, online)?;

        match &outcome {
            AnswerOutcome::Ignored => {}
            AnswerOutcome::Advance { correct } => {
                self.emit(SessionEvent::Answered { correct: *correct });
                self.schedule_advance();
            }
            AnswerOutcome::Finished { correct, quiz } => {
                self.emit(SessionEvent::Answered { correct: *correct });
                self.finish(quiz.clone()).await?;
            }
        }

        Ok(outcome)
    }

    pub async fn submit_now(&self) -> Result<CompletionOutcome, RunnerError> {
        let online = self.inner.reconciler.connectivity().is_online();
        let quiz = self.inner.session.lock().await.submit_now(online)?;
        self.finish(quiz).await
    }

    /// Abandons the current session. The countdown stops and nothing is recorded.
    pub async fn leave(&self) {
        if let Some(countdown) = self.inner.countdown.lock().await.take() {
            countdown.cancel();
        }
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);

        let mut session = self.inner.session.lock().await;
        if session.phase() == SessionPhase::Active {
            tracing::info!(
                assignment_id = session.assignment_id().unwrap_or_default(),
                "Quiz left without submitting"
            );
        }
        session.reset();
        drop(session);

        self.emit(SessionEvent::Left);
    }

    async fn on_tick(&self) -> ControlFlow<()> {
        let outcome = self.inner.session.lock().await.tick();
        match outcome {
            TickOutcome::Ignored => ControlFlow::Break(()),
            TickOutcome::Running { remaining_seconds } => {
                self.emit(SessionEvent::Tick { remaining_seconds });
                ControlFlow::Continue(())
            }
            TickOutcome::TimedOut(quiz) => {
                self.emit(SessionEvent::Tick { remaining_seconds: 0 });
                if let Err(err) = self.finish(quiz).await {
                    tracing::debug!(error = %err, "Timed-out quiz was not recorded");
                }
                ControlFlow::Break(())
            }
        }
    }

    fn schedule_advance(&self) {
        let runner = self.clone();
        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        tokio::spawn(async move {
            tokio::time::sleep(runner.inner.advance_delay).await;
            if runner.inner.epoch.load(Ordering::SeqCst) != epoch {
                return;
            }
            let moved = {
                let mut session = runner.inner.session.lock().await;
                session.advance().then(|| session.cursor())
            };
            if let Some(cursor) = moved {
                runner.emit(SessionEvent::Advanced { cursor });
            }
        });
    }

    async fn finish(&self, quiz: FinishedQuiz) -> Result<CompletionOutcome, RunnerError> {
        if let Some(countdown) = self.inner.countdown.lock().await.take() {
            countdown.cancel();
        }

        let assignment_id = quiz.assignment_id.clone();
        match self.inner.reconciler.complete(quiz).await {
            Ok(outcome) => {
                self.emit(SessionEvent::Completed(outcome.clone()));
                Ok(outcome)
            }
            Err(err) => {
                tracing::error!(assignment_id = %assignment_id, error = %err, "Failed to record finished quiz");
                self.emit(SessionEvent::CompletionFailed {
                    assignment_id,
                    unauthorized: matches!(err, ReconcileError::Unauthorized),
                    notice: Notice::error(err.to_string()),
                });
                Err(err.into())
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.inner.events.send(event).is_err() {
            tracing::debug!("Session event receiver dropped");
        }
    }
}
