//! Command implementations

pub mod install;
