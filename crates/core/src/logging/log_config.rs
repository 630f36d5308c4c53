use crate::logging::log_level::LogLevel;

/// Logging configuration
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Output format for logs
    pub format: LogFormat,
}

/// Output format for log entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// Human readable
    #[default]
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = crate::errors::CallerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            _ => Err(crate::errors::CallerError::Configuration(format!(
                "Invalid log format: {s}"
            ))),
        }
    }
}
