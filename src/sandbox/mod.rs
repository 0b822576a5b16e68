//! Sandbox module - Low-level isolation primitives
//!
//! This module provides the pieces a single isolated execution is built from.
//! It handles:
//! - Engine configuration (interpreter path, limits) from env or TOML
//! - Per-execution scratch directories that vanish on drop
//! - Resource limits applied to the child before exec
//! - Dedicated uids lent to runs when the worker is root, and the sweep that
//!   kills whatever a run leaves behind
//!
//! The sandbox module does NOT:
//! - Spawn or supervise processes (that's the runner's job)
//! - Interpret results or decide verdicts
//! - Compare outputs

pub mod config;
pub mod identity;
pub mod limits;
pub mod workspace;

// Re-exports for convenience
pub use config::SandboxConfig;
pub use identity::{Identity, IdentityLease, IdentityRange};
pub use limits::ChildLimits;
pub use workspace::Workspace;
