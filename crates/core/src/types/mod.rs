//! Core type definitions for modgate.
//!
//! Identity, versioning, and module metadata shared by every crate.

pub mod module;
pub mod name;
pub mod version;

pub use module::*;
pub use name::*;
pub use version::*;
