#![deny(unused)]
//! Runtime isolation for loaded modules.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  Module code                             │
//! │    ↓ guarded call + CallerToken          │
//! ├──────────────────────────────────────────┤
//! │  SandboxGate / SymbolArena               │
//! │    ↓ token → binding (immutable table)   │
//! ├──────────────────────────────────────────┤
//! │  ModuleEnvironment                       │
//! │    module → PermissionProvider, closure  │
//! └──────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let env = ModuleEnvironment::new(resolved, &factory, EnforcementMode::Enforce)?;
//! let gate = env.gate();
//! let token = env.token_for(&name).ok_or(...)?;
//! gate.check(&token, &GuardedCall::capability("net.connect"))?;
//! ```

pub mod arena;
pub mod environment;
pub mod gate;

pub use arena::{SymbolArena, SymbolHandle};
pub use environment::{Caller, CallerToken, EnvironmentId, ModuleEnvironment};
pub use gate::{GuardedCall, SandboxGate};
