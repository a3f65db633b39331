//! Shared test utilities for core module tests
//!
//! This module is only compiled in test mode.

use crate::config::{DEFAULT_BASE_CHAIN, DEFAULT_REJECT_CHAIN, FilterConfig};
use crate::core::backend::MemoryBackend;
use crate::core::controller::{EndpointOptions, FilterController, InterfaceFilter};
use std::sync::Mutex;

/// Mutex for tests that change environment variables.
pub static ENV_VAR_MUTEX: Mutex<()> = Mutex::new(());

/// Memory backend holding the empty base and reject chains.
pub fn seeded_backend() -> MemoryBackend {
    MemoryBackend::with_chains([DEFAULT_BASE_CHAIN, DEFAULT_REJECT_CHAIN])
}

/// Controller with the default chain names.
pub fn controller(backend: MemoryBackend) -> FilterController<MemoryBackend> {
    FilterController::new(backend, &FilterConfig::default())
}

/// Filter for `interface` from an allowlist specification. Panics on bad input.
pub fn filter(interface: &str, spec: &str) -> InterfaceFilter {
    let options = EndpointOptions::from_spec(spec).expect("valid allowlist spec");
    InterfaceFilter::new(interface, &options).expect("valid interface name")
}
