pub mod core;
pub mod models;
pub mod repositories;
pub mod schemas;
pub mod services;
pub mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::Context;

use crate::core::config::{ConfigError, Settings};
use crate::core::time::format_offset;
use crate::core::{state::ClientState, telemetry};
use crate::repositories::attempt_cache::{AttemptCache, FileStore};
use crate::schemas::student::{student_from_value, StudentProfile};
use crate::services::connectivity::ConnectivityMonitor;
use crate::services::reconciliation::{ReconcileError, Reconciler, ViewSource};
use crate::services::remote_tests::HttpTestService;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let student = resolve_student(&settings)?;
    let retry_on_load = settings.sync().retry_unconfirmed_on_load;

    let remote = HttpTestService::from_settings(&settings)?;
    let cache = AttemptCache::new(Arc::new(FileStore::new(&settings.cache().dir)));
    let state = ClientState::new(settings, Arc::new(remote), cache, ConnectivityMonitor::new(true));
    let reconciler = state.reconciler_for(&student);

    tracing::info!(
        student_id = %student.id,
        group = %student.group,
        display_name = %student.display_name,
        environment = state.settings().runtime().environment.as_str(),
        api = %state.settings().api().base_url,
        online = state.connectivity().is_online(),
        "Syncing student view"
    );

    tokio::select! {
        result = sync_student(&reconciler, retry_on_load) => result?,
        signal = core::shutdown::interrupt_signal() => {
            tracing::warn!(signal, "Sync interrupted");
        }
    }

    Ok(())
}

/// A login document, when configured, wins over bare ids.
fn resolve_student(settings: &Settings) -> anyhow::Result<StudentProfile> {
    let student = settings.student();

    if let Some(path) = &student.profile_path {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read student profile {path}"))?;
        let payload: serde_json::Value =
            serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {path}"))?;
        return student_from_value(&payload)
            .with_context(|| format!("Student profile {path} is incomplete"));
    }

    let id = student.student_id.clone().ok_or(ConfigError::Missing("TESTDESK_STUDENT_ID"))?;
    let group = student.group_id.clone().ok_or(ConfigError::Missing("TESTDESK_GROUP_ID"))?;
    Ok(StudentProfile::from_ids(id, group))
}

async fn sync_student(reconciler: &Reconciler, retry_on_load: bool) -> anyhow::Result<()> {
    let report = reconciler.load().await.context("Failed to load student view")?;
    if let Some(notice) = &report.notice {
        tracing::warn!(level = ?notice.level, message = %notice.message, "Load finished with notice");
    }

    if retry_on_load && report.source == ViewSource::Remote {
        match reconciler.retry_unconfirmed().await {
            Ok(retry) => tracing::info!(
                confirmed = retry.confirmed,
                still_unconfirmed = retry.still_unconfirmed,
                "Retried unconfirmed attempts"
            ),
            Err(ReconcileError::Unauthorized) => {
                return Err(ReconcileError::Unauthorized).context("Retry rejected");
            }
            Err(err) => tracing::warn!(error = %err, "Retry of unconfirmed attempts failed"),
        }
    }

    let view = reconciler.view().await;
    for assignment in &view.pending {
        tracing::info!(
            assignment_id = %assignment.id,
            theme = assignment.theme(),
            questions = assignment.question_count(),
            duration_minutes = assignment.duration_minutes,
            "Pending assignment"
        );
    }
    for attempt in &view.completed {
        tracing::info!(
            attempt_id = %attempt.id,
            confirmed = attempt.is_confirmed(),
            score = attempt.score,
            total_questions = attempt.total_questions,
            percentage = attempt.percentage(),
            completed_at = %attempt.completed_at.map(format_offset).unwrap_or_default(),
            "Completed attempt"
        );
    }

    if let Some(exposition) = core::metrics::render() {
        tracing::debug!(metrics = %exposition, "Metrics snapshot");
    }

    Ok(())
}
