//! Sandbox integration tests.
//!
//! Tests the full pipeline: Registry → Resolver → ModuleEnvironment → SandboxGate.

use std::sync::Arc;

use modgate_core::config::EnforcementMode;
use modgate_core::{Name, OptionalResolutionStrategy};
use modgate_ecosystem::{DependencyResolver, ModuleManifest, ModuleRegistry};
use modgate_governance::{PermissionPolicy, PermissionSetRegistry, StandardPermissionProviderFactory, TypeName};
use modgate_sandbox::{GuardedCall, ModuleEnvironment};

// =============================================================================
// Helpers
// =============================================================================

const POLICY: &str = r#"
sets:
  core:
    packages: [host.math]
  network:
    packages: [host.net]
    capabilities: [net.connect]
"#;

const DESCRIPTORS: &[&str] = &[
    "id: engine\nversion: 1.0.0\n",
    r#"
id: lobby
version: 0.3.0
required_permissions: [network]
dependencies:
  - id: engine
"#,
    r#"
id: game
version: 1.0.0
dependencies:
  - id: engine
  - id: lobby
    optional: true
"#,
];

fn name(text: &str) -> Name {
    Name::parse(text).unwrap()
}

fn ty(text: &str) -> TypeName {
    TypeName::parse(text).unwrap()
}

fn factory() -> StandardPermissionProviderFactory {
    let mut sets = PermissionSetRegistry::new();
    PermissionPolicy::parse(POLICY).unwrap().apply(&mut sets).unwrap();
    StandardPermissionProviderFactory::new(sets, "core").unwrap()
}

fn environment(strategy: OptionalResolutionStrategy) -> ModuleEnvironment {
    let registry = ModuleRegistry::new();
    for text in DESCRIPTORS {
        registry.register(ModuleManifest::parse(text).unwrap()).unwrap();
    }
    let resolved = DependencyResolver::new(Arc::new(registry))
        .resolve([name("game")], strategy)
        .into_result()
        .unwrap();
    ModuleEnvironment::new(resolved, &factory(), EnforcementMode::Enforce).unwrap()
}

// =============================================================================
// 1. Resolved modules get their requested permissions
// =============================================================================

#[test]
fn test_permissions_follow_descriptors() {
    let env = environment(OptionalResolutionStrategy::IncludeIfAvailable);
    let gate = env.gate();
    let game = env.token_for(&name("game")).unwrap();
    let lobby = env.token_for(&name("lobby")).unwrap();
    let connect = GuardedCall::capability("net.connect");

    assert!(gate.check(&game, &GuardedCall::Type(ty("host.math.Vec2"))).is_ok());
    assert!(gate.check(&game, &connect).unwrap_err().is_security_denial());
    assert!(gate.check(&lobby, &connect).is_ok());
    assert!(gate.check(&lobby, &GuardedCall::Type(ty("host.net.Socket"))).is_ok());
}

// =============================================================================
// 2. Omitted optional modules have no token
// =============================================================================

#[test]
fn test_omitted_optional_module_not_loaded() {
    let env = environment(OptionalResolutionStrategy::IncludeIfRequired);
    assert!(env.token_for(&name("game")).is_some());
    assert!(env.token_for(&name("lobby")).is_none());

    let order: Vec<String> = env
        .load_order()
        .unwrap()
        .iter()
        .map(|m| m.name.to_string())
        .collect();
    assert_eq!(order, vec!["engine", "game"]);
}

// =============================================================================
// 3. Tokens do not cross environments
// =============================================================================

#[test]
fn test_tokens_bound_to_issuing_environment() {
    let first = environment(OptionalResolutionStrategy::IncludeIfAvailable);
    let second = environment(OptionalResolutionStrategy::IncludeIfAvailable);
    let connect = GuardedCall::capability("net.connect");

    let lobby_second = second.token_for(&name("lobby")).unwrap();
    assert!(second.gate().check(&lobby_second, &connect).is_ok());
    assert!(first.gate().check(&lobby_second, &connect).is_err());
}

// =============================================================================
// 4. Symbols and permissions together
// =============================================================================

#[test]
fn test_symbol_lookup_across_modules() {
    let env = environment(OptionalResolutionStrategy::IncludeIfAvailable);
    let mut arena = env.symbol_arena();
    let engine = env.token_for(&name("engine")).unwrap();
    let lobby = env.token_for(&name("lobby")).unwrap();
    let game = env.token_for(&name("game")).unwrap();

    arena.register_module_symbol(&lobby, ty("lobby.Session")).unwrap();
    arena.register_module_symbol(&engine, ty("engine.World")).unwrap();
    arena.register_host_symbol(ty("host.net.Socket"));

    // game depends on lobby (optional, included) and engine
    assert!(arena.lookup_symbol(&game, &ty("lobby.Session")).unwrap().is_some());
    assert!(arena.lookup_symbol(&game, &ty("engine.World")).unwrap().is_some());
    // host type outside game's permissions
    assert!(arena.lookup_symbol(&game, &ty("host.net.Socket")).is_err());
    assert!(arena.lookup_symbol(&lobby, &ty("host.net.Socket")).unwrap().is_some());
    // engine depends on nothing
    assert!(arena.lookup_symbol(&engine, &ty("lobby.Session")).is_err());
}
