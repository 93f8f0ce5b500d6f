//! Layered server settings
//!
//! Sources in increasing precedence: built-in defaults, an optional settings
//! file, `TASKWEAVE_*` environment variables (`__` separates nested keys,
//! e.g. `TASKWEAVE_SSE__MAX_CONNECTIONS=50`) and finally command-line
//! overrides applied by the binary.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use taskweave_core::tasks::BackendSettings;
use taskweave_mcp::transport::SseConfig;

/// Settings file looked up when none is given explicitly
pub const DEFAULT_SETTINGS_FILE: &str = "config/taskweave";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub sse: SseSettings,
    pub tasks: TaskSettings,
    pub logging: LoggingSettings,
}

/// Listen address for the streaming transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SseSettings {
    pub max_connections: usize,
    pub idle_timeout_secs: u64,
    pub max_idle_periods: u32,
    pub queue_capacity: usize,
    pub max_body_bytes: usize,
}

/// Timeouts handed to the task backends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSettings {
    pub http_timeout_secs: u64,
    pub command_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    /// Directory for the daily rolling log file; stderr only when unset
    pub directory: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let sse = SseConfig::default();
        let tasks = BackendSettings::default();
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            sse: SseSettings {
                max_connections: sse.max_connections,
                idle_timeout_secs: sse.idle_timeout.as_secs(),
                max_idle_periods: sse.max_idle_periods,
                queue_capacity: sse.queue_capacity,
                max_body_bytes: sse.max_body_bytes,
            },
            tasks: TaskSettings {
                http_timeout_secs: tasks.http_timeout.as_secs(),
                command_timeout_secs: tasks.command_timeout.as_secs(),
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                directory: None,
            },
        }
    }
}

impl Settings {
    /// Load settings, reading `path` if given or the default settings file if present
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_SETTINGS_FILE).required(false),
        };

        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Settings::default())?)
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("TASKWEAVE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }

    /// `host:port` for the streaming transport
    pub fn address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn sse_config(&self) -> SseConfig {
        SseConfig {
            max_connections: self.sse.max_connections,
            idle_timeout: Duration::from_secs(self.sse.idle_timeout_secs),
            max_idle_periods: self.sse.max_idle_periods,
            queue_capacity: self.sse.queue_capacity,
            max_body_bytes: self.sse.max_body_bytes,
        }
    }

    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings {
            http_timeout: Duration::from_secs(self.tasks.http_timeout_secs),
            command_timeout: Duration::from_secs(self.tasks.command_timeout_secs),
        }
    }
}
