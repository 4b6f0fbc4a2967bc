mod parsing;
mod secret;
mod settings;
mod types;

pub(crate) use types::{
    AdminSettings, ApiSettings, ConfigError, CorsSettings, DatabaseSettings, Environment,
    ExamSettings, RedisSettings, RuntimeSettings, S3Settings, SchoolSettings, SecuritySettings,
    Settings, StorageSettings, TelemetrySettings,
};
