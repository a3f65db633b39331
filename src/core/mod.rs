//! Core ingress filtering functionality
//!
//! - [`allowlist`]: Allowlist types and the specification parser
//! - [`chain`]: Interface to dedicated chain naming
//! - [`rules`]: Rule operations, programs, and the allowlist compiler
//! - [`controller`]: Apply/remove lifecycle against a backend
//! - [`backend`]: iptables and in-memory backends
//! - [`error`]: Error types for filter operations

pub mod allowlist;
pub mod backend;
pub mod chain;
pub mod controller;
pub mod error;
pub mod rules;

#[cfg(test)]
pub mod test_helpers;
