use std::time::Duration;

use crate::core::config::Settings;
use crate::models::Assignment;
use crate::services::quiz_session::SessionError;

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

const DEFAULT_ADVANCE_DELAY: Duration = Duration::from_millis(300);

pub(crate) fn countdown_seconds(duration_minutes: u32) -> Result<u64, SessionError> {
    if duration_minutes == 0 {
        return Err(SessionError::NoDuration);
    }
    Ok(u64::from(duration_minutes) * 60)
}

/// Checks the preconditions an assignment must meet before a session can start,
/// returning the countdown length in seconds.
pub(crate) fn validate_startable(assignment: &Assignment) -> Result<u64, SessionError> {
    if assignment.questions.is_empty() {
        return Err(SessionError::NoQuestions);
    }
    countdown_seconds(assignment.duration_minutes)
}

pub fn advance_delay(settings: Option<&Settings>) -> Duration {
    settings
        .map(|settings| Duration::from_millis(settings.session().advance_delay_ms))
        .unwrap_or(DEFAULT_ADVANCE_DELAY)
}
