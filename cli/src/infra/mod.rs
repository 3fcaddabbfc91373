//! Infrastructure layer: concrete implementations of application port traits.
//!
//! This module contains the I/O-performing code that talks to the remote
//! host: SSH dialing, authentication, command execution and tunnel channels.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::commands` or `crate::output` are forbidden.

pub mod ssh;

pub use ssh::{SshConnector, SshDialer, SshTransport};
