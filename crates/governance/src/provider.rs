//! Per-module permission providers.
//!
//! A provider is the composed view a single module is checked against: the
//! environment's base set plus every extra set the module's descriptor asks
//! for. Providers are built once while the environment boots and never change
//! afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use modgate_core::{Error, ModuleMetadata, Name, Result};

use crate::permission::{Capability, PermissionSet, PermissionSetRegistry, TypeName};

/// Answers permission questions for one module.
pub trait PermissionProvider: Send + Sync {
    /// Whether module code may use the host type `name`.
    fn is_permitted(&self, name: &TypeName) -> bool;

    /// Whether module code may exercise `capability`, optionally through the
    /// host type `context`.
    fn is_capability_permitted(&self, capability: &Capability, context: Option<&TypeName>) -> bool;
}

/// Builds the provider for each module of an environment.
pub trait PermissionProviderFactory: Send + Sync {
    /// Fails with a permission configuration error when `module` requests a
    /// set that does not exist.
    fn create_permission_provider(
        &self,
        module: &ModuleMetadata,
    ) -> Result<Arc<dyn PermissionProvider>>;
}

/// Union of a base set and a module's requested extra sets.
pub struct StandardPermissionProvider {
    sets: Vec<Arc<PermissionSet>>,
}

impl StandardPermissionProvider {
    pub fn new(sets: Vec<Arc<PermissionSet>>) -> Self {
        Self { sets }
    }
}

impl PermissionProvider for StandardPermissionProvider {
    fn is_permitted(&self, name: &TypeName) -> bool {
        self.sets.iter().any(|set| set.is_permitted(name))
    }

    fn is_capability_permitted(&self, capability: &Capability, context: Option<&TypeName>) -> bool {
        self.sets
            .iter()
            .any(|set| set.is_capability_permitted(capability, context))
    }
}

/// Factory composing the base set with named extra sets.
pub struct StandardPermissionProviderFactory {
    base: Arc<PermissionSet>,
    named: HashMap<String, Arc<PermissionSet>>,
}

impl StandardPermissionProviderFactory {
    /// Freeze `sets`. `base_set` must name one of them.
    pub fn new(sets: PermissionSetRegistry, base_set: &str) -> Result<Self> {
        let named: HashMap<String, Arc<PermissionSet>> = sets
            .into_sets()
            .into_iter()
            .map(|(name, set)| (name, Arc::new(set)))
            .collect();

        let base = named.get(base_set).cloned().ok_or_else(|| {
            Error::permission_configuration(format!(
                "base permission set '{}' is not defined",
                base_set
            ))
        })?;

        Ok(Self { base, named })
    }

    pub fn base(&self) -> &PermissionSet {
        &self.base
    }

    pub fn set(&self, name: &str) -> Option<&PermissionSet> {
        self.named.get(name).map(Arc::as_ref)
    }
}

impl PermissionProviderFactory for StandardPermissionProviderFactory {
    fn create_permission_provider(
        &self,
        module: &ModuleMetadata,
    ) -> Result<Arc<dyn PermissionProvider>> {
        let mut sets = vec![self.base.clone()];
        for requested in &module.required_permissions {
            let set = self.named.get(requested).ok_or_else(|| {
                Error::permission_configuration(format!(
                    "module {} requests unknown permission set '{}'",
                    module, requested
                ))
            })?;
            if !sets.iter().any(|existing| Arc::ptr_eq(existing, set)) {
                sets.push(set.clone());
            }
        }

        tracing::debug!(
            module = %module.name,
            extra_sets = ?module.required_permissions,
            "Composed permission provider"
        );
        Ok(Arc::new(StandardPermissionProvider::new(sets)))
    }
}

/// Allows everything, logging each check the wrapped provider would deny.
pub struct WarnOnlyPermissionProvider {
    module: Name,
    inner: Arc<dyn PermissionProvider>,
}

impl WarnOnlyPermissionProvider {
    pub fn new(module: Name, inner: Arc<dyn PermissionProvider>) -> Self {
        Self { module, inner }
    }
}

impl PermissionProvider for WarnOnlyPermissionProvider {
    fn is_permitted(&self, name: &TypeName) -> bool {
        if !self.inner.is_permitted(name) {
            tracing::warn!(
                module = %self.module,
                type_name = %name,
                "Module used a type outside its permission set"
            );
        }
        true
    }

    fn is_capability_permitted(&self, capability: &Capability, context: Option<&TypeName>) -> bool {
        if !self.inner.is_capability_permitted(capability, context) {
            tracing::warn!(
                module = %self.module,
                capability = %capability,
                context = ?context.map(TypeName::as_str),
                "Module used a capability outside its permission set"
            );
        }
        true
    }
}

/// Wraps another factory so every provider it builds only warns.
pub struct WarnOnlyProviderFactory {
    inner: Arc<dyn PermissionProviderFactory>,
}

impl WarnOnlyProviderFactory {
    pub fn new(inner: Arc<dyn PermissionProviderFactory>) -> Self {
        Self { inner }
    }
}

impl PermissionProviderFactory for WarnOnlyProviderFactory {
    fn create_permission_provider(
        &self,
        module: &ModuleMetadata,
    ) -> Result<Arc<dyn PermissionProvider>> {
        let inner = self.inner.create_permission_provider(module)?;
        Ok(Arc::new(WarnOnlyPermissionProvider::new(
            module.name.clone(),
            inner,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modgate_core::Version;

    fn ty(text: &str) -> TypeName {
        TypeName::parse(text).unwrap()
    }

    fn sets() -> PermissionSetRegistry {
        let mut registry = PermissionSetRegistry::new();
        registry
            .get_or_create("core")
            .add_package("org.example.math")
            .grant(Capability::new("time.read"));
        registry
            .get_or_create("network")
            .add_package("org.example.net")
            .grant(Capability::new("net.connect"));
        registry
            .get_or_create("io")
            .add_type(ty("org.example.io.SafeReader"));
        registry
    }

    fn module(requested: &[&str]) -> ModuleMetadata {
        let mut meta = ModuleMetadata::new(Name::parse("game").unwrap(), Version::new(1, 0, 0));
        for set in requested {
            meta = meta.with_required_permission(*set);
        }
        meta
    }

    #[test]
    fn test_composes_base_and_extras() {
        let factory = StandardPermissionProviderFactory::new(sets(), "core").unwrap();

        let plain = factory.create_permission_provider(&module(&[])).unwrap();
        assert!(plain.is_permitted(&ty("org.example.math.Vector3")));
        assert!(!plain.is_permitted(&ty("org.example.net.Socket")));
        assert!(!plain.is_capability_permitted(&Capability::new("net.connect"), None));

        let networked = factory
            .create_permission_provider(&module(&["network", "network"]))
            .unwrap();
        assert!(networked.is_permitted(&ty("org.example.math.Vector3")));
        assert!(networked.is_permitted(&ty("org.example.net.Socket")));
        assert!(networked.is_capability_permitted(&Capability::new("net.connect"), None));
        assert!(!networked.is_permitted(&ty("org.example.io.SafeReader")));
    }

    #[test]
    fn test_unknown_extra_set_is_configuration_error() {
        let factory = StandardPermissionProviderFactory::new(sets(), "core").unwrap();
        let err = factory
            .create_permission_provider(&module(&["filesystem"]))
            .err()
            .unwrap();
        assert!(matches!(err, Error::PermissionConfiguration(_)));
        assert!(err.to_string().contains("filesystem"));
    }

    #[test]
    fn test_missing_base_set() {
        let result = StandardPermissionProviderFactory::new(sets(), "sandbox-base");
        assert!(matches!(result, Err(Error::PermissionConfiguration(_))));
    }

    #[test]
    fn test_warn_only_allows() {
        let standard: Arc<dyn PermissionProviderFactory> =
            Arc::new(StandardPermissionProviderFactory::new(sets(), "core").unwrap());
        let factory = WarnOnlyProviderFactory::new(standard);

        let provider = factory.create_permission_provider(&module(&[])).unwrap();
        assert!(provider.is_permitted(&ty("org.example.net.Socket")));
        assert!(provider.is_capability_permitted(&Capability::new("fs.write"), None));

        // configuration errors are still reported
        assert!(factory
            .create_permission_provider(&module(&["filesystem"]))
            .is_err());
    }
}
