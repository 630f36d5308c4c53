use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use super::validation::ConfigValidator;
use crate::logging::LogConfig;
use crate::models::OutputFormat;
use crate::{CallerError, CallerResult};

/// A century; longer retention windows are treated as configuration mistakes.
const MAX_KEEP_JOBS_HOURS: u64 = 24 * 365 * 100;

const DEFAULT_PATHS: [&str; 3] = [
    "config/caller.toml",
    "caller.toml",
    "/etc/caller/caller.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub caller: CallerConfig,
    pub executor: ExecutorConfig,
    pub returners: ReturnersConfig,
    pub job_cache: JobCacheConfig,
    pub master: MasterConfig,
    pub logging: LogConfig,
    pub process: ProcessConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MasterType {
    #[default]
    Standard,
    Disable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileClient {
    #[default]
    Remote,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallerConfig {
    /// Node id reported to the controller.
    pub id: String,
    pub cachedir: PathBuf,
    pub local: bool,
    pub master_type: MasterType,
    pub file_client: FileClient,
    /// Jobs run in their own processes; affects stale-marker detection.
    pub multiprocessing: bool,
    pub retcode_passthrough: bool,
    pub print_metadata: bool,
    pub cache_jobs: bool,
    pub unique_jid: bool,
    /// Target selector recorded for jobs started by this caller.
    pub target: String,
    pub output: Option<OutputFormat>,
}

impl Default for CallerConfig {
    fn default() -> Self {
        Self {
            id: default_node_id(),
            cachedir: PathBuf::from("/var/cache/caller"),
            local: false,
            master_type: MasterType::Standard,
            file_client: FileClient::Remote,
            multiprocessing: true,
            retcode_passthrough: false,
            print_metadata: false,
            cache_jobs: false,
            unique_jid: false,
            target: "caller".to_string(),
            output: None,
        }
    }
}

impl CallerConfig {
    /// No controller is involved: results stay on this node.
    pub fn is_local(&self) -> bool {
        self.local || self.file_client == FileClient::Local || self.master_type == MasterType::Disable
    }

    pub fn proc_dir(&self) -> PathBuf {
        self.cachedir.join("proc")
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.cachedir.join("jobs")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Executors tried in order; the first non-null result wins.
    pub module_executors: Vec<String>,
    pub splaytime_seconds: u64,
    pub executor_opts: Option<serde_json::Value>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            module_executors: vec!["direct_call".to_string()],
            splaytime_seconds: 0,
            executor_opts: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReturnersConfig {
    /// Sink names in delivery order.
    pub names: Vec<String>,
    pub jsonl_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobCacheConfig {
    pub keep_jobs_hours: Option<u64>,
    pub max_jobs: Option<usize>,
}

impl Default for JobCacheConfig {
    fn default() -> Self {
        Self {
            keep_jobs_hours: Some(24),
            max_jobs: Some(1000),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    pub url: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Substring a marker owner's command line must contain to count as ours.
    pub identity_marker: String,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            identity_marker: "caller".to_string(),
        }
    }
}

fn default_node_id() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "localhost".to_string())
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("Config file does not exist: {}", path));
            }
        } else if let Some(path) = DEFAULT_PATHS.iter().find(|p| Path::new(p).exists()) {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("CALLER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("Failed to parse TOML config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config to TOML")
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> CallerResult<()> {
        self.caller.validate()?;
        self.executor.validate()?;
        self.job_cache.validate()?;
        self.master.validate()?;
        Ok(())
    }
}

impl ConfigValidator for CallerConfig {
    fn validate(&self) -> CallerResult<()> {
        if self.id.trim().is_empty() {
            return Err(CallerError::config_error("caller.id must not be empty"));
        }
        if self.target.trim().is_empty() {
            return Err(CallerError::config_error("caller.target must not be empty"));
        }
        Ok(())
    }
}

impl ConfigValidator for ExecutorConfig {
    fn validate(&self) -> CallerResult<()> {
        if self.module_executors.is_empty() {
            return Err(CallerError::config_error(
                "executor.module_executors must name at least one executor",
            ));
        }
        Ok(())
    }
}

impl ConfigValidator for JobCacheConfig {
    fn validate(&self) -> CallerResult<()> {
        if self.keep_jobs_hours == Some(0) {
            return Err(CallerError::config_error(
                "job_cache.keep_jobs_hours must be greater than 0",
            ));
        }
        if let Some(hours) = self.keep_jobs_hours {
            if hours > MAX_KEEP_JOBS_HOURS {
                return Err(CallerError::config_error(format!(
                    "job_cache.keep_jobs_hours must be at most {MAX_KEEP_JOBS_HOURS}, got {hours}"
                )));
            }
        }
        if self.max_jobs == Some(0) {
            return Err(CallerError::config_error(
                "job_cache.max_jobs must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl ConfigValidator for MasterConfig {
    fn validate(&self) -> CallerResult<()> {
        if let Some(url) = &self.url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(CallerError::config_error(format!(
                    "master.url must be an http(s) URL: {url}"
                )));
            }
        }
        if self.timeout_seconds == 0 {
            return Err(CallerError::config_error(
                "master.timeout_seconds must be greater than 0",
            ));
        }
        Ok(())
    }
}
