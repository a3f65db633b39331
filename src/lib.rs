//! vethguard - per-interface ingress allowlisting
//!
//! Turns an allowlist such as `10.0.0.0/24, 192.168.1.1-192.168.1.10` into a
//! dedicated iptables chain for one interface, hooked into a shared base chain.
//!
//! # Architecture
//!
//! - [`core`] - Allowlist parsing, rule compilation, and the apply/remove lifecycle
//! - [`config`] - Chain names and iptables settings
//! - [`audit`] - Audit logging of filter changes
//! - [`elevation`] - Privilege escalation for iptables calls
//! - [`validators`] - Interface and chain name validation
//! - [`utils`] - XDG directories
//!
//! # Example
//!
//! ```
//! use vethguard::config::FilterConfig;
//! use vethguard::core::backend::MemoryBackend;
//! use vethguard::core::controller::{EndpointOptions, FilterController, InterfaceFilter};
//!
//! let config = FilterConfig::default();
//! let backend = MemoryBackend::with_chains([&config.base_chain, &config.reject_chain]);
//! let mut controller = FilterController::new(backend, &config);
//!
//! let options = EndpointOptions::from_spec("10.0.0.0/24").unwrap();
//! let filter = InterfaceFilter::new("veth0", &options).unwrap();
//! controller.apply(&filter).unwrap();
//! assert!(controller.backend().has_chain("CONTAINER-veth0"));
//! ```

#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]

pub mod audit;
pub mod config;
pub mod core;
pub mod elevation;
pub mod utils;
pub mod validators;

// Re-export commonly used types
pub use crate::core::allowlist::{AddressRange, Allowlist, NetworkBlock};
pub use crate::core::controller::{EndpointOptions, FilterController, InterfaceFilter, Outcome};
pub use crate::core::error::{Error, Result};
