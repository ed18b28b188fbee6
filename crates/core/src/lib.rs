#![deny(unused)]
//! Core types, configuration, and error definitions for modgate.
//!
//! This crate provides the identity and version model shared by the
//! registry, the resolver, and the sandbox.

pub mod config;
pub mod error;
pub mod types;

pub use error::{Error, Result, UnresolvedDependency};
pub use types::*;
