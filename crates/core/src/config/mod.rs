//! Layered configuration: TOML file, built-in defaults, `CALLER_*` environment.

pub mod app_config;
pub mod validation;

pub use app_config::{
    AppConfig, CallerConfig, ExecutorConfig, FileClient, JobCacheConfig, MasterConfig,
    MasterType, ProcessConfig, ReturnersConfig,
};
pub use validation::ConfigValidator;
