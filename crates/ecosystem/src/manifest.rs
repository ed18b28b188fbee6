//! Module descriptor documents.
//!
//! A descriptor is a YAML (or JSON) document describing one version of one
//! module. Locating descriptor files is left to the host; this module only
//! turns one document into validated [`ModuleMetadata`].

use anyhow::{Context, Result};
use modgate_core::ModuleMetadata;
use std::collections::HashSet;
use std::path::Path;

/// Parser and validator for module descriptors.
pub struct ModuleManifest;

impl ModuleManifest {
    /// Load and validate a descriptor file.
    pub fn load(path: impl AsRef<Path>) -> modgate_core::Result<ModuleMetadata> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read module descriptor at {:?}", path.as_ref()))?;
        let metadata = Self::parse(&content)
            .with_context(|| format!("Invalid module descriptor at {:?}", path.as_ref()))?;
        Ok(metadata)
    }

    /// Parse and validate descriptor text. JSON documents are accepted too.
    pub fn parse(content: &str) -> Result<ModuleMetadata> {
        let metadata: ModuleMetadata =
            serde_yaml::from_str(content).context("Failed to parse module descriptor")?;
        Self::validate(&metadata)?;
        Ok(metadata)
    }

    /// Structural checks a descriptor must pass before it may be registered.
    pub fn validate(metadata: &ModuleMetadata) -> Result<()> {
        let mut seen = HashSet::new();
        for edge in &metadata.dependencies {
            if edge.target == metadata.name {
                anyhow::bail!("Module '{}' depends on itself", metadata.name);
            }
            if !seen.insert(&edge.target) {
                anyhow::bail!(
                    "Module '{}' declares more than one dependency on '{}'",
                    metadata.name,
                    edge.target
                );
            }
            if let (Some(min), Some(max)) = (&edge.min_version, &edge.max_version) {
                if min >= max {
                    anyhow::bail!(
                        "Module '{}' has an empty version range for '{}': {}",
                        metadata.name,
                        edge.target,
                        edge.range()
                    );
                }
            }
        }

        if metadata
            .required_permissions
            .iter()
            .any(|set| set.trim().is_empty())
        {
            anyhow::bail!(
                "Module '{}' requests a permission set with an empty name",
                metadata.name
            );
        }

        Ok(())
    }
}
