use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use modgate_core::{Error, Result};

use crate::permission::{Capability, GrantScope, PermissionSet, PermissionSetRegistry, TypeName};

/// A versioned document of named permission sets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyFile {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub sets: BTreeMap<String, PolicySet>,
}

/// One named set as written in a policy file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicySet {
    #[serde(default)]
    pub types: Vec<TypeName>,
    #[serde(default)]
    pub packages: Vec<String>,
    /// Capabilities granted regardless of the type used.
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub grants: Vec<ScopedGrant>,
}

/// A capability granted only through one type or package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopedGrant {
    pub capability: Capability,
    #[serde(default, rename = "type")]
    pub type_name: Option<TypeName>,
    #[serde(default)]
    pub package: Option<String>,
}

impl ScopedGrant {
    fn scope(&self) -> Result<GrantScope> {
        match (&self.type_name, &self.package) {
            (Some(name), None) => Ok(GrantScope::Type(name.clone())),
            (None, Some(package)) => Ok(GrantScope::Package(package.clone())),
            _ => Err(Error::permission_configuration(format!(
                "grant of '{}' must name exactly one of `type` or `package`",
                self.capability
            ))),
        }
    }
}

impl PolicySet {
    fn to_permission_set(&self) -> Result<PermissionSet> {
        let mut set = PermissionSet::new();
        for name in &self.types {
            set.add_type(name.clone());
        }
        for package in &self.packages {
            set.add_package(package.clone());
        }
        for capability in &self.capabilities {
            set.grant(capability.clone());
        }
        for grant in &self.grants {
            set.grant_scoped(grant.capability.clone(), grant.scope()?);
        }
        Ok(set)
    }
}

/// Permission configuration loaded from YAML.
pub struct PermissionPolicy {
    pub policy: PolicyFile,
}

impl PermissionPolicy {
    /// Load policy from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read policy file: {:?}", path.as_ref()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let policy: PolicyFile =
            serde_yaml::from_str(content).with_context(|| "Failed to parse policy YAML")?;
        Ok(Self { policy })
    }

    pub fn from_file(policy: PolicyFile) -> Self {
        Self { policy }
    }

    /// Merge another policy into this one (other wins on set name conflict).
    pub fn merge(&mut self, other: PolicyFile) {
        self.policy.sets.extend(other.sets);
        if !other.version.is_empty() {
            self.policy.version = other.version;
        }
    }

    /// Add every set of the policy to `registry`, merging into sets that
    /// already exist there.
    ///
    /// All sets are validated first; on error the registry is unchanged.
    pub fn apply(&self, registry: &mut PermissionSetRegistry) -> Result<()> {
        let mut sets = Vec::with_capacity(self.policy.sets.len());
        for (name, entry) in &self.policy.sets {
            sets.push((name, entry.to_permission_set()?));
        }

        for (name, set) in sets {
            registry.insert(name.clone(), set);
        }
        tracing::info!(
            version = %self.policy.version,
            sets = self.policy.sets.len(),
            "Applied permission policy"
        );
        Ok(())
    }
}
