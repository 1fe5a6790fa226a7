use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Settings {
    pub(super) runtime: RuntimeSettings,
    pub(super) api: ApiSettings,
    pub(super) cache: CacheSettings,
    pub(super) session: SessionSettings,
    pub(super) student: StudentSettings,
    pub(super) sync: SyncSettings,
    pub(super) telemetry: TelemetrySettings,
}

#[derive(Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub api_prefix: String,
    pub access_token: String,
    pub connect_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
}

impl std::fmt::Debug for ApiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiSettings")
            .field("base_url", &self.base_url)
            .field("api_prefix", &self.api_prefix)
            .field("access_token", &if self.access_token.is_empty() { "<empty>" } else { "<redacted>" })
            .field("connect_timeout_seconds", &self.connect_timeout_seconds)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub dir: String,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub advance_delay_ms: u64,
}

#[derive(Debug, Clone)]
pub struct StudentSettings {
    pub student_id: Option<String>,
    pub group_id: Option<String>,
    /// Login response document written by the external sign-in flow.
    pub profile_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub retry_unconfirmed_on_load: bool,
}

#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    pub log_level: String,
    pub json: bool,
    pub prometheus_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub environment: Environment,
    pub strict_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Staging,
    Test,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Staging => "staging",
            Environment::Test => "test",
        }
    }

    pub(super) fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("invalid api url: {0}")]
    InvalidApiUrl(String),
    #[error("missing required setting {0}")]
    Missing(&'static str),
}
