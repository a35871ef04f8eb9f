//! Checkup - periodic check scheduling for Uppe agents
//!
//! This library provides the repeating-task scheduler (controllers and the
//! manager that owns them), the checker framework that turns a check
//! definition into a runnable probe, the protocol probers, and the metric,
//! alert and RPC contracts shared by the agent and central binaries.

pub mod alert;
pub mod checker;
pub mod controller;
pub mod duration;
pub mod metrics;
pub mod probe;
pub mod registry;
pub mod rpc;

// Re-export main types
pub use checker::{
    new_controller_opts, Check, CheckResult, Checker, CheckerError, CheckerRegistry, Component,
};
pub use controller::{Controller, ControllerError, ControllerOpts, Manager, RunStat};
pub use registry::{Registry, RegistryError};

/// Re-export common error types
pub use anyhow;

/// Checkup result type using anyhow for error handling
pub type Result<T> = anyhow::Result<T>;

/// Default port of the agent RPC server
pub const DEFAULT_AGENT_PORT: u16 = 9009;

/// Default timeout of a single RPC call against an agent
pub const DEFAULT_RPC_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
