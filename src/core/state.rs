use std::sync::Arc;

use tokio::sync::mpsc;

use crate::core::config::Settings;
use crate::repositories::attempt_cache::AttemptCache;
use crate::schemas::student::StudentProfile;
use crate::services::connectivity::ConnectivityMonitor;
use crate::services::quiz_timing::advance_delay;
use crate::services::reconciliation::Reconciler;
use crate::services::remote_tests::RemoteTestService;
use crate::tasks::quiz_runner::{QuizRunner, SessionEvent};

/// Collaborators shared by every student session of this process.
#[derive(Clone)]
pub struct ClientState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    remote: Arc<dyn RemoteTestService>,
    cache: AttemptCache,
    connectivity: ConnectivityMonitor,
}

impl ClientState {
    pub fn new(
        settings: Settings,
        remote: Arc<dyn RemoteTestService>,
        cache: AttemptCache,
        connectivity: ConnectivityMonitor,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, remote, cache, connectivity }) }
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.inner.connectivity
    }

    pub fn reconciler_for(&self, student: &StudentProfile) -> Reconciler {
        Reconciler::new(
            self.inner.remote.clone(),
            self.inner.cache.clone(),
            self.inner.connectivity.clone(),
            student.id.clone(),
            student.group.clone(),
        )
    }

    pub fn quiz_runner(
        &self,
        reconciler: Arc<Reconciler>,
    ) -> (QuizRunner, mpsc::UnboundedReceiver<SessionEvent>) {
        QuizRunner::new(reconciler, advance_delay(Some(self.settings())))
    }
}
