//! In-memory catalogue of known module versions.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

use modgate_core::{Error, ModuleMetadata, Name, Result, Version};

/// Every known version of every known module, keyed by name.
///
/// Populated during bootstrap and read-only afterwards. Entries are shared
/// as `Arc`s so resolution results never hold diverging copies.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: DashMap<Name, BTreeMap<Version, Arc<ModuleMetadata>>>,
}

impl ModuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            modules: DashMap::new(),
        }
    }

    /// Add one module version. Fails if the same name and version is known.
    pub fn register(&self, metadata: ModuleMetadata) -> Result<()> {
        let mut versions = self.modules.entry(metadata.name.clone()).or_default();
        if versions.contains_key(&metadata.version) {
            return Err(Error::registry_conflict(&metadata.name, &metadata.version));
        }

        tracing::info!(module = %metadata.name, version = %metadata.version, "Registering module");
        versions.insert(metadata.version.clone(), Arc::new(metadata));
        Ok(())
    }

    /// Register several modules, stopping at the first conflict.
    pub fn register_all(&self, modules: impl IntoIterator<Item = ModuleMetadata>) -> Result<()> {
        for metadata in modules {
            self.register(metadata)?;
        }
        Ok(())
    }

    /// All versions of `name`, newest first.
    pub fn versions_of(&self, name: &Name) -> Vec<Version> {
        self.modules
            .get(name)
            .map(|versions| versions.keys().rev().cloned().collect())
            .unwrap_or_default()
    }

    /// All metadata entries of `name`, newest first.
    pub fn modules_of(&self, name: &Name) -> Vec<Arc<ModuleMetadata>> {
        self.modules
            .get(name)
            .map(|versions| versions.values().rev().cloned().collect())
            .unwrap_or_default()
    }

    pub fn exact(&self, name: &Name, version: &Version) -> Option<Arc<ModuleMetadata>> {
        self.modules
            .get(name)
            .and_then(|versions| versions.get(version).cloned())
    }

    pub fn latest(&self, name: &Name) -> Option<Arc<ModuleMetadata>> {
        self.modules
            .get(name)
            .and_then(|versions| versions.values().next_back().cloned())
    }

    pub fn contains(&self, name: &Name) -> bool {
        self.modules.contains_key(name)
    }

    /// Known module names in lexicographic order.
    pub fn names(&self) -> Vec<Name> {
        let mut names: Vec<Name> = self.modules.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of registered module versions.
    pub fn len(&self) -> usize {
        self.modules.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Drop every entry ahead of an explicit reload.
    pub fn clear(&self) {
        tracing::info!(modules = self.len(), "Clearing module registry");
        self.modules.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str, version: &str) -> ModuleMetadata {
        ModuleMetadata::new(Name::parse(name).unwrap(), Version::parse(version).unwrap())
    }

    fn name(text: &str) -> Name {
        Name::parse(text).unwrap()
    }

    #[test]
    fn test_register_and_query() {
        let registry = ModuleRegistry::new();
        registry
            .register_all(vec![
                meta("engine", "1.0.0"),
                meta("engine", "2.0.0-SNAPSHOT"),
                meta("Engine", "1.5.0"),
                meta("audio", "0.1.0"),
            ])
            .unwrap();

        assert_eq!(registry.len(), 4);
        assert_eq!(
            registry.versions_of(&name("ENGINE")),
            vec![
                Version::parse("2.0.0-SNAPSHOT").unwrap(),
                Version::new(1, 5, 0),
                Version::new(1, 0, 0)
            ]
        );
        assert_eq!(
            registry.latest(&name("engine")).unwrap().version,
            Version::parse("2.0.0-SNAPSHOT").unwrap()
        );
        assert!(registry.exact(&name("engine"), &Version::new(1, 5, 0)).is_some());
        assert!(registry.exact(&name("engine"), &Version::new(1, 6, 0)).is_none());
        assert_eq!(registry.names(), vec![name("audio"), name("engine")]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let registry = ModuleRegistry::new();
        registry.register(meta("engine", "1.0.0")).unwrap();

        let err = registry.register(meta("ENGINE", "1.0.0")).unwrap_err();
        assert!(matches!(err, Error::RegistryConflict { .. }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_module() {
        let registry = ModuleRegistry::new();
        assert!(registry.versions_of(&name("ghost")).is_empty());
        assert!(registry.latest(&name("ghost")).is_none());
        assert!(!registry.contains(&name("ghost")));
    }

    #[test]
    fn test_clear() {
        let registry = ModuleRegistry::new();
        registry.register(meta("engine", "1.0.0")).unwrap();
        registry.clear();
        assert!(registry.is_empty());
        registry.register(meta("engine", "1.0.0")).unwrap();
    }
}
