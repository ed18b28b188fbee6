//! Module metadata and dependency edges.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Name, Version, VersionRange};

/// A required or optional relationship from one module to a version range of
/// another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// The module depended upon.
    #[serde(rename = "id")]
    pub target: Name,
    /// Lowest acceptable version (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_version: Option<Version>,
    /// Upper bound (exclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_version: Option<Version>,
    #[serde(default)]
    pub optional: bool,
}

impl DependencyEdge {
    /// A mandatory edge accepting any version of `target`.
    pub fn new(target: Name) -> Self {
        Self {
            target,
            min_version: None,
            max_version: None,
            optional: false,
        }
    }

    pub fn with_min(mut self, min: Version) -> Self {
        self.min_version = Some(min);
        self
    }

    pub fn with_max(mut self, max: Version) -> Self {
        self.max_version = Some(max);
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn range(&self) -> VersionRange {
        VersionRange::new(self.min_version.clone(), self.max_version.clone())
    }

    /// Whether `version` lies in `[min_version, max_version)`.
    pub fn is_satisfied_by(&self, version: &Version) -> bool {
        self.range().contains(version)
    }
}

impl fmt::Display for DependencyEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.target, self.range())?;
        if self.optional {
            f.write_str(" (optional)")?;
        }
        Ok(())
    }
}

/// How the resolver treats optional dependency edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionalResolutionStrategy {
    /// Optional edges behave exactly like mandatory ones.
    ForceInclude,
    /// Include the target when a compatible version exists; omit it otherwise.
    IncludeIfAvailable,
    /// Only constrain the target's version when something else requires it.
    #[default]
    IncludeIfRequired,
}

/// Descriptive metadata of one version of a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    #[serde(rename = "id")]
    pub name: Name,
    pub version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<DependencyEdge>,
    /// Named permission sets this module asks for on top of the base set.
    #[serde(default)]
    pub required_permissions: Vec<String>,
}

impl ModuleMetadata {
    pub fn new(name: Name, version: Version) -> Self {
        Self {
            name,
            version,
            display_name: None,
            description: None,
            dependencies: Vec::new(),
            required_permissions: Vec::new(),
        }
    }

    pub fn with_dependency(mut self, edge: DependencyEdge) -> Self {
        self.dependencies.push(edge);
        self
    }

    pub fn with_required_permission(mut self, set: impl Into<String>) -> Self {
        self.required_permissions.push(set.into());
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The edge pointing at `target`, if this module declares one.
    pub fn dependency_on(&self, target: &Name) -> Option<&DependencyEdge> {
        self.dependencies.iter().find(|edge| &edge.target == target)
    }

    pub fn mandatory_dependencies(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.dependencies.iter().filter(|edge| !edge.optional)
    }

    pub fn optional_dependencies(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.dependencies.iter().filter(|edge| edge.optional)
    }
}

impl fmt::Display for ModuleMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(text: &str) -> Name {
        Name::parse(text).unwrap()
    }

    #[test]
    fn test_edge_satisfaction() {
        let edge = DependencyEdge::new(name("engine"))
            .with_min(Version::new(1, 0, 0))
            .with_max(Version::new(2, 0, 0));

        assert!(edge.is_satisfied_by(&Version::new(1, 5, 0)));
        assert!(!edge.is_satisfied_by(&Version::new(2, 0, 0)));
        assert!(!edge.is_satisfied_by(&Version::new(0, 9, 0)));
        assert_eq!(edge.to_string(), "engine >=1.0.0, <2.0.0");
    }

    #[test]
    fn test_metadata_from_json() {
        let json = serde_json::json!({
            "id": "Physics",
            "version": "0.3.0-SNAPSHOT",
            "dependencies": [
                {"id": "engine", "min_version": "1.0.0"},
                {"id": "audio", "optional": true}
            ],
            "required_permissions": ["network"]
        });
        let meta: ModuleMetadata = serde_json::from_value(json).unwrap();

        assert_eq!(meta.to_string(), "Physics@0.3.0-SNAPSHOT");
        assert_eq!(meta.mandatory_dependencies().count(), 1);
        assert_eq!(meta.optional_dependencies().count(), 1);
        assert!(meta.dependency_on(&name("ENGINE")).is_some());
        assert_eq!(meta.required_permissions, vec!["network".to_string()]);
    }
}
