//! Policy file, API scan and provider composition working together.

use std::sync::Arc;

use modgate_core::{Error, ModuleMetadata, Name, Version};
use modgate_governance::{
    ApiMarker, ApiScanner, Capability, PackageDescriptor, PermissionPolicy, PermissionProviderFactory,
    PermissionSetRegistry, StandardPermissionProviderFactory, TypeDescriptor, TypeName,
    WarnOnlyProviderFactory,
};

const POLICY: &str = r#"
version: "2024-01"
sets:
  core:
    capabilities: [time.read]
  network:
    grants:
      - capability: net.connect
        package: org.example.net
"#;

fn ty(text: &str) -> TypeName {
    TypeName::parse(text).unwrap()
}

fn module(id: &str, requested: &[&str]) -> ModuleMetadata {
    let mut meta = ModuleMetadata::new(Name::parse(id).unwrap(), Version::new(1, 0, 0));
    for set in requested {
        meta = meta.with_required_permission(*set);
    }
    meta
}

fn configured_sets() -> PermissionSetRegistry {
    let mut sets = PermissionSetRegistry::new();
    PermissionPolicy::parse(POLICY).unwrap().apply(&mut sets).unwrap();

    let types = vec![
        TypeDescriptor::new(ty("org.example.scene.Node")).with_marker(ApiMarker::new().inherited()),
        TypeDescriptor::new(ty("org.example.scene.Camera")).with_supertype(ty("org.example.scene.Node")),
        TypeDescriptor::new(ty("org.example.net.Socket"))
            .with_marker(ApiMarker::new().in_set("network")),
        TypeDescriptor::new(ty("org.example.host.Kernel")),
    ];
    let packages = vec![PackageDescriptor {
        name: "org.example.math".into(),
        marker: Some(ApiMarker::new()),
    }];
    ApiScanner::new(&mut sets, "core").scan(&types, &packages).unwrap();
    sets
}

#[test]
fn test_providers_reflect_policy_and_scan() {
    let factory = StandardPermissionProviderFactory::new(configured_sets(), "core").unwrap();

    let plain = factory.create_permission_provider(&module("game", &[])).unwrap();
    assert!(plain.is_permitted(&ty("org.example.scene.Camera")));
    assert!(plain.is_permitted(&ty("org.example.math.Matrix4")));
    assert!(!plain.is_permitted(&ty("org.example.net.Socket")));
    assert!(!plain.is_permitted(&ty("org.example.host.Kernel")));
    assert!(plain.is_capability_permitted(&Capability::new("time.read"), None));

    let online = factory
        .create_permission_provider(&module("lobby", &["network"]))
        .unwrap();
    let socket = ty("org.example.net.Socket");
    assert!(online.is_permitted(&socket));
    assert!(online.is_capability_permitted(&Capability::new("net.connect"), Some(&socket)));
    assert!(!online.is_capability_permitted(&Capability::new("net.connect"), None));
}

#[test]
fn test_unknown_set_fails_for_both_modes() {
    let standard: Arc<dyn PermissionProviderFactory> =
        Arc::new(StandardPermissionProviderFactory::new(configured_sets(), "core").unwrap());
    let warn_only = WarnOnlyProviderFactory::new(standard.clone());

    for factory in [standard.as_ref(), &warn_only as &dyn PermissionProviderFactory] {
        let err = factory
            .create_permission_provider(&module("game", &["gpu"]))
            .err()
            .unwrap();
        assert!(matches!(err, Error::PermissionConfiguration(_)));
    }
}
