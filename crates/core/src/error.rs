//! Error types for modgate.

use thiserror::Error;

use crate::types::Name;

/// Result type alias using modgate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a resolution attempt found no consistent module set.
///
/// Carried as a value inside a failed resolution; it only becomes an
/// [`Error`] when the caller converts the result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unable to resolve module '{module}': {constraint}")]
pub struct UnresolvedDependency {
    /// The module that could not be given a version.
    pub module: Name,
    /// Human-readable form of the constraint that could not be met.
    pub constraint: String,
}

impl UnresolvedDependency {
    pub fn new(module: Name, constraint: impl Into<String>) -> Self {
        Self {
            module,
            constraint: constraint.into(),
        }
    }
}

/// Core error type for modgate.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Identity & Registry Errors
    // =========================================================================
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Module {name}@{version} is already registered")]
    RegistryConflict { name: String, version: String },

    // =========================================================================
    // Resolution Errors
    // =========================================================================
    #[error(transparent)]
    UnresolvedDependency(#[from] UnresolvedDependency),

    #[error("Circular dependency among modules: {}", .remaining.join(", "))]
    CircularDependency { remaining: Vec<String> },

    // =========================================================================
    // Permission & Sandbox Errors
    // =========================================================================
    #[error("Permission configuration error: {0}")]
    PermissionConfiguration(String),

    #[error("Security denial: module '{module}' may not access {target}")]
    SecurityDenial { module: String, target: String },

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Descriptor error: {0}")]
    Descriptor(#[from] serde_yaml::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a registry conflict error.
    pub fn registry_conflict(name: impl ToString, version: impl ToString) -> Self {
        Self::RegistryConflict {
            name: name.to_string(),
            version: version.to_string(),
        }
    }

    /// Create a circular dependency error naming the nodes left unordered.
    pub fn circular_dependency<I, S>(remaining: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        Self::CircularDependency {
            remaining: remaining.into_iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Create a permission configuration error.
    pub fn permission_configuration(msg: impl Into<String>) -> Self {
        Self::PermissionConfiguration(msg.into())
    }

    /// Create a security denial error.
    pub fn security_denial(module: impl ToString, target: impl ToString) -> Self {
        Self::SecurityDenial {
            module: module.to_string(),
            target: target.to_string(),
        }
    }

    /// Whether this error is a runtime security denial.
    pub fn is_security_denial(&self) -> bool {
        matches!(self, Self::SecurityDenial { .. })
    }
}
