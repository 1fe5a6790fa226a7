use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

/// Current Prometheus exposition text, if the recorder is installed.
pub fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

pub(crate) fn record_load(source: &'static str) {
    metrics::counter!("reconcile_loads_total", "source" => source).increment(1);
}

pub(crate) fn record_commit(status: &'static str) {
    metrics::counter!("attempt_commits_total", "status" => status).increment(1);
}

pub(crate) fn record_delete(status: &'static str) {
    metrics::counter!("attempt_deletes_total", "status" => status).increment(1);
}
