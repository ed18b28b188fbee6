#![deny(unused)]
//! Permission governance for modgate.
//!
//! This crate provides:
//! - Permission sets and the named set registry
//! - Per-module permission providers (enforcing and warn-only)
//! - The API scanner that tags host types into sets
//! - YAML permission policy files
//! - Log subscriber setup

pub mod permission;
pub mod policy;
pub mod provider;
pub mod scanner;
pub mod tracing_layer;

pub use permission::{Capability, GrantScope, PermissionSet, PermissionSetRegistry, TypeName};
pub use policy::{PermissionPolicy, PolicyFile, PolicySet, ScopedGrant};
pub use provider::{
    PermissionProvider, PermissionProviderFactory, StandardPermissionProvider,
    StandardPermissionProviderFactory, WarnOnlyPermissionProvider, WarnOnlyProviderFactory,
};
pub use scanner::{ApiMarker, ApiScanner, PackageDescriptor, ScanReport, TypeDescriptor};
pub use tracing_layer::configure_tracing;
