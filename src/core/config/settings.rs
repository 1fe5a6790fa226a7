use super::parsing::{
    env_flag, env_optional, env_or_default, normalize_prefix, parse_bool, parse_environment,
    parse_u64,
};
use super::types::{
    ApiSettings, CacheSettings, ConfigError, RuntimeSettings, SessionSettings, Settings,
    StudentSettings, SyncSettings, TelemetrySettings,
};

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_API_PREFIX: &str = "/api/tests/tests";

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let environment = parse_environment(
            env_optional("TESTDESK_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config = env_optional("TESTDESK_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let base_url = env_or_default("TESTDESK_API_URL", DEFAULT_API_URL)
            .trim_end_matches('/')
            .to_string();
        let api_prefix = normalize_prefix(&env_or_default("TESTDESK_API_PREFIX", DEFAULT_API_PREFIX));
        let access_token = env_or_default("TESTDESK_ACCESS_TOKEN", "");
        let connect_timeout_seconds = parse_u64(
            "TESTDESK_CONNECT_TIMEOUT_SECONDS",
            env_or_default("TESTDESK_CONNECT_TIMEOUT_SECONDS", "10"),
        )?;
        let request_timeout_seconds = parse_u64(
            "TESTDESK_REQUEST_TIMEOUT_SECONDS",
            env_or_default("TESTDESK_REQUEST_TIMEOUT_SECONDS", "30"),
        )?;

        let cache_dir = env_or_default("TESTDESK_CACHE_DIR", ".testdesk-cache");

        let advance_delay_ms = parse_u64(
            "TESTDESK_ADVANCE_DELAY_MS",
            env_or_default("TESTDESK_ADVANCE_DELAY_MS", "300"),
        )?;

        let student_id = env_optional("TESTDESK_STUDENT_ID");
        let group_id = env_optional("TESTDESK_GROUP_ID");
        let profile_path = env_optional("TESTDESK_STUDENT_PROFILE");

        let retry_unconfirmed_on_load = env_flag("TESTDESK_RETRY_UNCONFIRMED_ON_LOAD");

        let log_level = env_or_default("TESTDESK_LOG_LEVEL", "info");
        let json = env_flag("TESTDESK_LOG_JSON");
        let prometheus_enabled = env_flag("PROMETHEUS_ENABLED");

        let settings = Self {
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings {
                base_url,
                api_prefix,
                access_token,
                connect_timeout_seconds,
                request_timeout_seconds,
            },
            cache: CacheSettings { dir: cache_dir },
            session: SessionSettings { advance_delay_ms },
            student: StudentSettings { student_id, group_id, profile_path },
            sync: SyncSettings { retry_unconfirmed_on_load },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub fn cache(&self) -> &CacheSettings {
        &self.cache
    }

    pub fn session(&self) -> &SessionSettings {
        &self.session
    }

    pub fn student(&self) -> &StudentSettings {
        &self.student
    }

    pub fn sync(&self) -> &SyncSettings {
        &self.sync
    }

    pub fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match reqwest::Url::parse(&self.api.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => return Err(ConfigError::InvalidApiUrl(self.api.base_url.clone())),
        }

        if self.api.request_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "TESTDESK_REQUEST_TIMEOUT_SECONDS",
                value: "0".to_string(),
            });
        }

        if self.cache.dir.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "TESTDESK_CACHE_DIR",
                value: String::from("<empty>"),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if env_optional("TESTDESK_API_URL").is_none() {
            return Err(ConfigError::Missing("TESTDESK_API_URL"));
        }
        if self.api.access_token.is_empty() {
            return Err(ConfigError::Missing("TESTDESK_ACCESS_TOKEN"));
        }

        Ok(())
    }
}
