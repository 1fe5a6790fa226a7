mod parsing;
mod settings;
mod types;

pub use types::{
    ApiSettings, CacheSettings, ConfigError, Environment, RuntimeSettings, SessionSettings,
    Settings, StudentSettings, SyncSettings, TelemetrySettings,
};
