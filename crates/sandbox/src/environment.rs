//! A booted set of modules bound to their permission providers.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use modgate_core::config::EnforcementMode;
use modgate_core::{ModuleMetadata, Name, Result};
use modgate_ecosystem::{dependency_closure, topological_order, ResolvedSet};
use modgate_governance::{PermissionProvider, PermissionProviderFactory, WarnOnlyPermissionProvider};

use crate::arena::SymbolArena;
use crate::gate::SandboxGate;

static NEXT_ENVIRONMENT: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one environment instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvironmentId(u64);

impl EnvironmentId {
    fn next() -> Self {
        Self(NEXT_ENVIRONMENT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for EnvironmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "env-{}", self.0)
    }
}

/// Who is making a guarded call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Caller {
    Host,
    Module(Name),
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => f.write_str("<host>"),
            Self::Module(name) => write!(f, "{}", name),
        }
    }
}

/// Proof of caller identity, handed out by a [`ModuleEnvironment`].
///
/// Tokens cannot be built outside this crate and are only honoured by the
/// environment that issued them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallerToken {
    environment: EnvironmentId,
    caller: Caller,
}

impl CallerToken {
    pub fn environment(&self) -> EnvironmentId {
        self.environment
    }

    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    pub fn module(&self) -> Option<&Name> {
        match &self.caller {
            Caller::Module(name) => Some(name),
            Caller::Host => None,
        }
    }

    pub fn is_host(&self) -> bool {
        matches!(self.caller, Caller::Host)
    }
}

pub(crate) struct ModuleBinding {
    pub(crate) provider: Arc<dyn PermissionProvider>,
    pub(crate) closure: BTreeSet<Name>,
}

pub(crate) type Bindings = HashMap<Name, ModuleBinding>;

/// Resolved modules, each bound to the provider its calls are checked with.
///
/// The binding table is built once and shared read-only with every gate and
/// arena created from the environment.
pub struct ModuleEnvironment {
    id: EnvironmentId,
    modules: ResolvedSet,
    bindings: Arc<Bindings>,
    enforcement: EnforcementMode,
}

impl ModuleEnvironment {
    /// Bind every module of `modules` to a provider from `factory`.
    ///
    /// Fails if any module requests a permission set the factory does not
    /// know; no environment is created in that case.
    pub fn new(
        modules: ResolvedSet,
        factory: &dyn PermissionProviderFactory,
        enforcement: EnforcementMode,
    ) -> Result<Self> {
        let id = EnvironmentId::next();
        let mut bindings = HashMap::with_capacity(modules.len());

        for module in modules.iter() {
            let mut provider = factory.create_permission_provider(module)?;
            if enforcement == EnforcementMode::WarnOnly {
                provider = Arc::new(WarnOnlyPermissionProvider::new(module.name.clone(), provider));
            }
            let closure = dependency_closure(&modules, &module.name);
            bindings.insert(module.name.clone(), ModuleBinding { provider, closure });
        }

        tracing::info!(
            environment = %id,
            modules = modules.len(),
            enforcement = ?enforcement,
            "Module environment ready"
        );

        Ok(Self {
            id,
            modules,
            bindings: Arc::new(bindings),
            enforcement,
        })
    }

    pub fn id(&self) -> EnvironmentId {
        self.id
    }

    pub fn enforcement(&self) -> EnforcementMode {
        self.enforcement
    }

    pub fn modules(&self) -> &ResolvedSet {
        &self.modules
    }

    pub fn module(&self, name: &Name) -> Option<&Arc<ModuleMetadata>> {
        self.modules.get(name)
    }

    pub fn host_token(&self) -> CallerToken {
        CallerToken {
            environment: self.id,
            caller: Caller::Host,
        }
    }

    /// Token for code of module `name`; `None` if the module is not loaded here.
    pub fn token_for(&self, name: &Name) -> Option<CallerToken> {
        self.bindings.get_key_value(name).map(|(key, _)| CallerToken {
            environment: self.id,
            caller: Caller::Module(key.clone()),
        })
    }

    /// Modules in load order. Fails when the set contains a cycle.
    pub fn load_order(&self) -> Result<Vec<Arc<ModuleMetadata>>> {
        topological_order(&self.modules)
    }

    /// Every module `name` transitively depends on.
    pub fn dependency_closure(&self, name: &Name) -> Option<&BTreeSet<Name>> {
        self.bindings.get(name).map(|binding| &binding.closure)
    }

    pub fn provider(&self, name: &Name) -> Option<Arc<dyn PermissionProvider>> {
        self.bindings.get(name).map(|binding| binding.provider.clone())
    }

    pub fn gate(&self) -> SandboxGate {
        SandboxGate::new(self.id, self.bindings.clone())
    }

    /// Empty symbol arena checked against this environment's bindings.
    pub fn symbol_arena(&self) -> SymbolArena {
        SymbolArena::new(self.gate())
    }
}
