//! Packet-filter backends
//!
//! A [`Backend`] runs one rule mutation at a time and answers chain-existence
//! queries. Calls are blocking and nothing is batched: there is no
//! transaction to batch into.
//!
//! - [`iptables::IptablesBackend`]: shells out to the `iptables` binary
//! - [`memory::MemoryBackend`]: in-process simulation of one iptables table

pub mod iptables;
pub mod memory;

use crate::core::rules::RuleOperation;

pub use iptables::IptablesBackend;
pub use memory::MemoryBackend;

/// A single failed backend call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{output}")]
pub struct BackendFailure {
    /// Raw diagnostic output
    pub output: String,
    pub exit_code: Option<i32>,
}

impl BackendFailure {
    pub fn new(output: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self {
            output: output.into(),
            exit_code,
        }
    }
}

/// Executes rule mutations against a packet-filtering table
pub trait Backend {
    /// Runs one operation, returning the backend's output on success.
    fn execute(&mut self, operation: &RuleOperation) -> Result<String, BackendFailure>;

    /// Reports whether `chain` exists in the table.
    ///
    /// `Err` means the question could not be answered, not that the chain is missing.
    fn chain_exists(&mut self, chain: &str) -> Result<bool, BackendFailure>;
}

impl<B: Backend + ?Sized> Backend for &mut B {
    fn execute(&mut self, operation: &RuleOperation) -> Result<String, BackendFailure> {
        (**self).execute(operation)
    }

    fn chain_exists(&mut self, chain: &str) -> Result<bool, BackendFailure> {
        (**self).chain_exists(chain)
    }
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn execute(&mut self, operation: &RuleOperation) -> Result<String, BackendFailure> {
        (**self).execute(operation)
    }

    fn chain_exists(&mut self, chain: &str) -> Result<bool, BackendFailure> {
        (**self).chain_exists(chain)
    }
}
