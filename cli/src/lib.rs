//! metal-os-install library: exposes modules for integration testing.

#![cfg_attr(test, allow(clippy::expect_used))]

pub mod application;
pub mod cli;
pub mod commands;
pub mod domain;
pub mod exit_codes;
pub mod infra;
pub mod logging;
pub mod output;
