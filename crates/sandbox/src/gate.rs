//! Permission checks on guarded host calls.

use std::fmt;
use std::sync::Arc;

use modgate_core::{Error, Name, Result};
use modgate_governance::{Capability, TypeName};

use crate::environment::{Bindings, Caller, CallerToken, EnvironmentId, ModuleBinding};

/// A host operation that module code may only perform with permission.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GuardedCall {
    /// Use of a host type.
    Type(TypeName),
    /// Exercise of a capability, optionally through a host type.
    Capability {
        capability: Capability,
        context: Option<TypeName>,
    },
}

impl GuardedCall {
    pub fn capability(capability: impl Into<String>) -> Self {
        Self::Capability {
            capability: Capability::new(capability),
            context: None,
        }
    }

    pub fn capability_via(capability: impl Into<String>, context: TypeName) -> Self {
        Self::Capability {
            capability: Capability::new(capability),
            context: Some(context),
        }
    }
}

impl fmt::Display for GuardedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(name) => write!(f, "type {}", name),
            Self::Capability {
                capability,
                context: Some(context),
            } => write!(f, "capability {} via {}", capability, context),
            Self::Capability {
                capability,
                context: None,
            } => write!(f, "capability {}", capability),
        }
    }
}

/// What a token resolved to inside one environment.
pub(crate) enum Resolved<'a> {
    Host,
    Module(&'a Name, &'a ModuleBinding),
}

/// Decides guarded calls for one environment.
///
/// Cheap to clone; every clone shares the same immutable binding table, so
/// checks from any number of threads take no locks.
#[derive(Clone)]
pub struct SandboxGate {
    environment: EnvironmentId,
    bindings: Arc<Bindings>,
}

impl SandboxGate {
    pub(crate) fn new(environment: EnvironmentId, bindings: Arc<Bindings>) -> Self {
        Self {
            environment,
            bindings,
        }
    }

    pub fn environment(&self) -> EnvironmentId {
        self.environment
    }

    /// `Ok(())` if the caller may perform `call`, otherwise a security denial.
    pub fn check(&self, token: &CallerToken, call: &GuardedCall) -> Result<()> {
        let (name, binding) = match self.resolve(token, &call.to_string())? {
            Resolved::Host => return Ok(()),
            Resolved::Module(name, binding) => (name, binding),
        };

        let permitted = match call {
            GuardedCall::Type(type_name) => binding.provider.is_permitted(type_name),
            GuardedCall::Capability {
                capability,
                context,
            } => binding
                .provider
                .is_capability_permitted(capability, context.as_ref()),
        };

        if permitted {
            Ok(())
        } else {
            Err(deny(name.as_str(), &call.to_string(), "not permitted"))
        }
    }

    /// Run `operation` only if `call` is allowed for the caller.
    pub fn guard<T>(
        &self,
        token: &CallerToken,
        call: &GuardedCall,
        operation: impl FnOnce() -> T,
    ) -> Result<T> {
        self.check(token, call)?;
        Ok(operation())
    }

    /// Map a token to its binding, denying tokens this gate did not issue.
    pub(crate) fn resolve(&self, token: &CallerToken, target: &str) -> Result<Resolved<'_>> {
        if token.environment() != self.environment {
            tracing::warn!(
                environment = %self.environment,
                token_environment = %token.environment(),
                caller = %token.caller(),
                call = target,
                "Rejected caller token from another environment"
            );
            return Err(Error::security_denial(token.caller().to_string(), target));
        }

        match token.caller() {
            Caller::Host => Ok(Resolved::Host),
            Caller::Module(name) => match self.bindings.get_key_value(name) {
                Some((name, binding)) => Ok(Resolved::Module(name, binding)),
                None => Err(deny(name.as_str(), target, "unknown module")),
            },
        }
    }
}

fn deny(caller: &str, target: &str, reason: &str) -> Error {
    tracing::warn!(caller, call = target, reason, "Sandbox denied guarded call");
    Error::security_denial(caller, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::ModuleEnvironment;
    use modgate_core::config::EnforcementMode;
    use modgate_core::{ModuleMetadata, Version};
    use modgate_ecosystem::ResolvedSet;
    use modgate_governance::{PermissionSetRegistry, StandardPermissionProviderFactory};

    fn ty(text: &str) -> TypeName {
        TypeName::parse(text).unwrap()
    }

    fn environment(enforcement: EnforcementMode) -> ModuleEnvironment {
        let mut sets = PermissionSetRegistry::new();
        sets.get_or_create("core")
            .add_package("org.example.math")
            .grant(Capability::new("time.read"));
        sets.get_or_create("network")
            .add_package("org.example.net")
            .grant_scoped(
                Capability::new("net.connect"),
                modgate_governance::GrantScope::Type(ty("org.example.net.Socket")),
            );
        let factory = StandardPermissionProviderFactory::new(sets, "core").unwrap();

        let modules: ResolvedSet = vec![
            Arc::new(ModuleMetadata::new(Name::parse("game").unwrap(), Version::new(1, 0, 0))),
            Arc::new(
                ModuleMetadata::new(Name::parse("lobby").unwrap(), Version::new(1, 0, 0))
                    .with_required_permission("network"),
            ),
        ]
        .into_iter()
        .collect();

        ModuleEnvironment::new(modules, &factory, enforcement).unwrap()
    }

    #[test]
    fn test_module_calls_checked_against_provider() {
        let env = environment(EnforcementMode::Enforce);
        let gate = env.gate();
        let game = env.token_for(&Name::parse("game").unwrap()).unwrap();
        let lobby = env.token_for(&Name::parse("lobby").unwrap()).unwrap();

        assert!(gate.check(&game, &GuardedCall::Type(ty("org.example.math.Vector3"))).is_ok());
        assert!(gate.check(&game, &GuardedCall::capability("time.read")).is_ok());

        let err = gate
            .check(&game, &GuardedCall::Type(ty("org.example.net.Socket")))
            .unwrap_err();
        assert!(err.is_security_denial());
        assert!(err.to_string().contains("org.example.net.Socket"));

        assert!(gate.check(&lobby, &GuardedCall::Type(ty("org.example.net.Socket"))).is_ok());
        assert!(gate
            .check(&lobby, &GuardedCall::capability_via("net.connect", ty("org.example.net.Socket")))
            .is_ok());
        assert!(gate.check(&lobby, &GuardedCall::capability("net.connect")).is_err());
    }

    #[test]
    fn test_host_bypasses_gate() {
        let env = environment(EnforcementMode::Enforce);
        let host = env.host_token();
        assert!(env
            .gate()
            .check(&host, &GuardedCall::Type(ty("org.example.kernel.Process")))
            .is_ok());
        assert!(env.gate().check(&host, &GuardedCall::capability("fs.write")).is_ok());
    }

    #[test]
    fn test_foreign_tokens_denied() {
        let env = environment(EnforcementMode::Enforce);
        let other = environment(EnforcementMode::Enforce);
        let call = GuardedCall::Type(ty("org.example.math.Vector3"));

        let foreign_module = other.token_for(&Name::parse("game").unwrap()).unwrap();
        assert!(env.gate().check(&foreign_module, &call).unwrap_err().is_security_denial());

        let foreign_host = other.host_token();
        assert!(env.gate().check(&foreign_host, &call).unwrap_err().is_security_denial());
    }

    #[test]
    fn test_denial_aborts_only_the_call() {
        let env = environment(EnforcementMode::Enforce);
        let gate = env.gate();
        let game = env.token_for(&Name::parse("game").unwrap()).unwrap();

        let mut ran = false;
        let denied = gate.guard(&game, &GuardedCall::capability("fs.write"), || ran = true);
        assert!(denied.is_err());
        assert!(!ran);

        let value = gate
            .guard(&game, &GuardedCall::capability("time.read"), || 42)
            .unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_warn_only_allows_denied_calls() {
        let env = environment(EnforcementMode::WarnOnly);
        let gate = env.gate();
        let game = env.token_for(&Name::parse("game").unwrap()).unwrap();

        assert!(gate.check(&game, &GuardedCall::Type(ty("org.example.net.Socket"))).is_ok());
        assert!(gate.check(&game, &GuardedCall::capability("fs.write")).is_ok());

        // identity checks still apply
        let other = environment(EnforcementMode::WarnOnly);
        assert!(gate.check(&other.host_token(), &GuardedCall::capability("fs.write")).is_err());
    }

    #[test]
    fn test_concurrent_checks() {
        let env = environment(EnforcementMode::Enforce);
        let gate = env.gate();
        let game = env.token_for(&Name::parse("game").unwrap()).unwrap();
        let lobby = env.token_for(&Name::parse("lobby").unwrap()).unwrap();
        let socket = GuardedCall::Type(ty("org.example.net.Socket"));

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let gate = gate.clone();
                let (game, lobby, socket) = (&game, &lobby, &socket);
                scope.spawn(move || {
                    for _ in 0..500 {
                        assert!(gate.check(game, socket).is_err());
                        assert!(gate.check(lobby, socket).is_ok());
                    }
                });
            }
        });
    }
}
