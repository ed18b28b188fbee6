#![deny(unused)]
//! modgate - module system with dependency resolution and sandboxed permissions.
//!
//! Layering:
//! - `modgate_core`: names, versions, descriptors, errors, configuration
//! - `modgate_ecosystem`: registry, resolver, load ordering
//! - `modgate_governance`: permission sets, providers, API scanning, logging
//! - `modgate_sandbox`: environments, the gate and the symbol arena
//!
//! [`ModuleSystem`] wires them together the way a host normally boots:
//! configuration, descriptors, permission policy, one API scan, then one or
//! more environments.

use std::path::Path;
use std::sync::Arc;

pub use modgate_core::config::{AppConfig, EnforcementMode};
pub use modgate_core::{
    DependencyEdge, Error, ModuleMetadata, Name, OptionalResolutionStrategy, Result,
    UnresolvedDependency, Version, VersionRange,
};
pub use modgate_ecosystem::{
    dependency_closure, topological_order, DependencyResolver, ModuleManifest, ModuleRegistry,
    ResolutionResult, ResolvedSet,
};
pub use modgate_governance::{
    configure_tracing, ApiMarker, ApiScanner, Capability, GrantScope, PackageDescriptor,
    PermissionPolicy, PermissionProvider, PermissionProviderFactory, PermissionSet,
    PermissionSetRegistry, ScanReport, StandardPermissionProviderFactory, TypeDescriptor,
    TypeName,
};
pub use modgate_sandbox::{
    Caller, CallerToken, GuardedCall, ModuleEnvironment, SandboxGate, SymbolArena, SymbolHandle,
};

/// Host-side bootstrap state: known modules and configured permission sets.
pub struct ModuleSystem {
    config: AppConfig,
    registry: Arc<ModuleRegistry>,
    resolver: DependencyResolver,
    permission_sets: PermissionSetRegistry,
    scanned: bool,
}

impl ModuleSystem {
    pub fn new(config: AppConfig) -> Self {
        let registry = Arc::new(ModuleRegistry::new());
        let resolver = DependencyResolver::new(registry.clone())
            .with_default_strategy(config.resolver.optional_strategy);

        let mut permission_sets = PermissionSetRegistry::new();
        permission_sets.get_or_create(&config.sandbox.base_permission_set);

        Self {
            config,
            registry,
            resolver,
            permission_sets,
            scanned: false,
        }
    }

    /// Build from the layered configuration sources and apply the configured
    /// policy file, if any.
    pub fn from_env() -> Result<Self> {
        let mut system = Self::new(AppConfig::load()?);
        system.load_configured_policy()?;
        Ok(system)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn resolver(&self) -> &DependencyResolver {
        &self.resolver
    }

    pub fn register(&self, metadata: ModuleMetadata) -> Result<()> {
        self.registry.register(metadata)
    }

    /// Load, validate and register one descriptor file.
    ///
    /// Finding descriptor files is up to the host.
    pub fn register_descriptor(&self, path: impl AsRef<Path>) -> Result<()> {
        self.registry.register(ModuleManifest::load(path)?)
    }

    pub fn permission_sets(&self) -> &PermissionSetRegistry {
        &self.permission_sets
    }

    pub fn permission_sets_mut(&mut self) -> &mut PermissionSetRegistry {
        &mut self.permission_sets
    }

    /// Apply a permission policy file.
    pub fn load_policy(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let policy = PermissionPolicy::load(path)?;
        policy.apply(&mut self.permission_sets)
    }

    fn load_configured_policy(&mut self) -> Result<()> {
        match self.config.sandbox.policy_file.clone() {
            Some(path) => self.load_policy(path),
            None => Ok(()),
        }
    }

    /// Run the API scan with the base set as the active set.
    ///
    /// Only one scan is accepted; the permission surface is fixed afterwards.
    pub fn scan_api(
        &mut self,
        types: &[TypeDescriptor],
        packages: &[PackageDescriptor],
    ) -> Result<ScanReport> {
        if self.scanned {
            return Err(Error::permission_configuration("API scan has already run"));
        }
        let base = self.config.sandbox.base_permission_set.clone();
        let report = ApiScanner::new(&mut self.permission_sets, base).scan(types, packages)?;
        self.scanned = true;
        Ok(report)
    }

    /// Resolve `roots` with the configured optional strategy.
    pub fn resolve(&self, roots: impl IntoIterator<Item = Name>) -> ResolutionResult {
        self.resolver.resolve_default(roots)
    }

    /// Resolve `roots` and bind the result into a fresh environment.
    ///
    /// The environment keeps a snapshot of the current permission sets.
    pub fn boot(&self, roots: impl IntoIterator<Item = Name>) -> Result<ModuleEnvironment> {
        let resolved = self.resolve(roots).into_result()?;
        let factory = StandardPermissionProviderFactory::new(
            self.permission_sets.clone(),
            &self.config.sandbox.base_permission_set,
        )?;
        ModuleEnvironment::new(resolved, &factory, self.config.sandbox.enforcement)
    }
}

impl Default for ModuleSystem {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}
