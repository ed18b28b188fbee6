#![deny(unused)]
//! Module catalogue and dependency resolution for modgate.
//!
//! - [`ModuleManifest`] turns one descriptor document into metadata
//! - [`ModuleRegistry`] holds every known version of every module
//! - [`DependencyResolver`] picks one consistent version per module
//! - [`topological_order`] derives a load order from a resolved set

pub mod manifest;
pub mod ordering;
pub mod registry;
pub mod resolver;

pub use manifest::ModuleManifest;
pub use modgate_core::OptionalResolutionStrategy;
pub use ordering::{dependency_closure, topological_order};
pub use registry::ModuleRegistry;
pub use resolver::{DependencyResolver, ResolutionResult, ResolvedSet};
