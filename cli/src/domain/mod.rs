//! Domain layer: pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`
//! sockets. All functions are synchronous and take data in, returning data out.

pub mod config;
pub mod error;
pub mod qemu;
pub mod workflow;

pub use config::{
    AuthMethod, ConnectionParams, Endpoint, ProvisionConfig, TunnelEndpoints, TunnelMode,
    VmSettings,
};
pub use error::{ConfigError, ExecError, ProvisionError, TransportError, TunnelError};
pub use qemu::{Firmware, QemuSpec};
pub use workflow::{StepCommand, WorkflowState, WorkflowStep};
