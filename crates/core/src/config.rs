use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::types::OptionalResolutionStrategy;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ResolverConfig {
    /// Strategy used when a caller does not pick one explicitly.
    #[serde(default)]
    pub optional_strategy: OptionalResolutionStrategy,
}

/// What the sandbox gate does with a call that is not permitted.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMode {
    /// Deny the call.
    #[default]
    Enforce,
    /// Log the would-be denial and allow the call.
    WarnOnly,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SandboxConfig {
    #[serde(default)]
    pub enforcement: EnforcementMode,
    /// Named permission set every module receives.
    #[serde(default = "default_base_permission_set")]
    pub base_permission_set: String,
    /// Optional YAML file with named permission sets.
    #[serde(default)]
    pub policy_file: Option<String>,
}

fn default_base_permission_set() -> String {
    "core".to_string()
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            enforcement: EnforcementMode::default(),
            base_permission_set: default_base_permission_set(),
            policy_file: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "info,modgate=debug".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("MODGATE_ENV").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Map MODGATE__SANDBOX__ENFORCEMENT=warn_only to sandbox.enforcement
            .add_source(Environment::with_prefix("MODGATE").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Build from an in-memory YAML document instead of the layered sources.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(yaml, config::FileFormat::Yaml))
            .build()?
            .try_deserialize()
    }
}
