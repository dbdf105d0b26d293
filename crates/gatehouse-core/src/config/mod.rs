//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section; every field has a serde default so an empty file is valid.

pub mod app;
pub mod auth;
pub mod collaboration;
pub mod logging;
pub mod realtime;
pub mod session;

use serde::{Deserialize, Serialize};

pub use self::app::ServerConfig;
pub use self::auth::AuthConfig;
pub use self::collaboration::{ChatConfig, CollaborationConfig, WriteReleasePolicy};
pub use self::logging::LoggingConfig;
pub use self::realtime::RealtimeConfig;
pub use self::session::SessionConfig;

use crate::error::AppError;
use crate::result::AppResult;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Token validation settings.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Realtime hub settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Active-session registry settings.
    #[serde(default)]
    pub session: SessionConfig,
    /// Session sharing and chat settings.
    #[serde(default)]
    pub collaboration: CollaborationConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `GATEHOUSE__`.
    pub fn load(env: &str) -> AppResult<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("GATEHOUSE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Rejects settings the background tasks cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        let intervals = [
            ("realtime.ping_interval_seconds", self.realtime.ping_interval_seconds),
            ("realtime.pong_timeout_seconds", self.realtime.pong_timeout_seconds),
            ("session.sweep_interval_seconds", self.session.sweep_interval_seconds),
            ("session.heartbeat_timeout_seconds", self.session.heartbeat_timeout_seconds),
        ];
        if let Some((key, _)) = intervals.iter().find(|(_, secs)| *secs == 0) {
            return Err(AppError::configuration(format!("{key} must be at least 1")));
        }
        if self.realtime.outbound_queue_capacity == 0 {
            return Err(AppError::configuration(
                "realtime.outbound_queue_capacity must be at least 1",
            ));
        }
        Ok(())
    }
}
