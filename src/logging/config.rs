use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

/// Settings for the subscriber built in [`super::init`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    /// JSON lines instead of the pretty console format.
    pub json: bool,
    pub directory: String,
}

impl LogConfig {
    pub fn new(environment: &str, level: Option<&str>) -> Self {
        let is_production = environment == "production";
        let default_level = if is_production {
            LogLevel::Info
        } else {
            LogLevel::Debug
        };

        Self {
            level: level
                .and_then(|l| l.parse().ok())
                .unwrap_or(default_level),
            json: is_production,
            directory: "logs".to_string(),
        }
    }

    pub fn from_env() -> Self {
        let environment =
            std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let level = std::env::var("LOG_LEVEL").ok();
        Self::new(&environment, level.as_deref())
    }

    /// Directive used when `RUST_LOG` is not set.
    pub fn filter_directive(&self) -> String {
        format!(
            "learnhub_backend={},tower_http=debug,axum=debug",
            self.level
        )
    }
}
