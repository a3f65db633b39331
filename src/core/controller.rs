//! Interface filter lifecycle
//!
//! ```text
//! Unfiltered --apply--> Active --remove--> Unfiltered
//! ```
//!
//! Neither transition is atomic. Each program runs one command at a time
//! and stops at the first failure, leaving whatever already ran in place.
//! [`BackendError::applied`] reports how far it got. Nothing here retries
//! or rolls back; that policy belongs to the caller.
//!
//! The position-1 insert into the base chain is not synchronized. Callers
//! must serialize `apply`/`remove` calls that share a base chain.

use crate::config::FilterConfig;
use crate::core::allowlist::{self, Allowlist};
use crate::core::backend::Backend;
use crate::core::error::{BackendError, Error, ParseError, Result};
use crate::core::rules::{RuleCompiler, RuleProgram};
use crate::validators::validate_interface;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Per-endpoint options handed over by the host framework
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointOptions {
    /// `None` disables ingress filtering for the endpoint
    #[serde(default)]
    pub ingress_allowed: Option<Allowlist>,
}

impl EndpointOptions {
    /// Parses an allowlist specification into endpoint options.
    ///
    /// # Errors
    ///
    /// Returns the offending token if the specification is malformed.
    pub fn from_spec(spec: &str) -> std::result::Result<Self, ParseError> {
        Ok(Self {
            ingress_allowed: allowlist::parse(spec)?,
        })
    }
}

/// An interface and the allowlist, if any, that guards its ingress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceFilter {
    interface: String,
    allowlist: Option<Allowlist>,
}

impl InterfaceFilter {
    /// # Errors
    ///
    /// Returns `Error::InvalidInterface` if `interface` is not a valid Linux interface name.
    pub fn new(interface: impl Into<String>, options: &EndpointOptions) -> Result<Self> {
        let interface = interface.into();
        validate_interface(&interface).map_err(|reason| Error::InvalidInterface {
            name: interface.clone(),
            reason,
        })?;

        debug!("New filter for iface {interface} with options {options:?}");
        if options.ingress_allowed.is_none() {
            info!("No network ingress filtering specified for {interface}");
        }

        Ok(Self {
            interface,
            allowlist: options.ingress_allowed.clone(),
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn allowlist(&self) -> Option<&Allowlist> {
        self.allowlist.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.allowlist.is_some()
    }
}

/// Result of a lifecycle call that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No allowlist configured; nothing was executed
    Disabled,
    /// Every operation of the program succeeded
    Completed { operations: usize },
}

/// Runs `program` front to back, stopping at the first failure.
///
/// # Errors
///
/// Returns a [`BackendError`] for the first failing operation, with
/// `applied` set to the number of operations that had already succeeded.
pub fn execute_program<B: Backend + ?Sized>(
    backend: &mut B,
    program: &RuleProgram,
) -> std::result::Result<usize, BackendError> {
    for (applied, operation) in program.iter().enumerate() {
        debug!("Executing {operation}");
        if let Err(failure) = backend.execute(operation) {
            error!(
                "Rule failed after {applied}/{} operations: {operation}: {}",
                program.len(),
                failure.output.trim()
            );
            return Err(BackendError {
                args: operation.argv(),
                output: failure.output,
                exit_code: failure.exit_code,
                applied,
            });
        }
    }
    Ok(program.len())
}

/// Applies and removes interface filters through a [`Backend`]
#[derive(Debug)]
pub struct FilterController<B> {
    backend: B,
    compiler: RuleCompiler,
}

impl<B: Backend> FilterController<B> {
    pub fn new(backend: B, config: &FilterConfig) -> Self {
        Self::with_compiler(backend, RuleCompiler::from_config(config))
    }

    pub fn with_compiler(backend: B, compiler: RuleCompiler) -> Self {
        Self { backend, compiler }
    }

    pub fn compiler(&self) -> &RuleCompiler {
        &self.compiler
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Installs the filter's allowlist.
    ///
    /// # Errors
    ///
    /// - `Error::Precondition` if the base or reject chain is missing (nothing executed)
    /// - `Error::Backend` on the first failing command (earlier commands stay applied)
    pub fn apply(&mut self, filter: &InterfaceFilter) -> Result<Outcome> {
        let Some(allowlist) = filter.allowlist() else {
            return Ok(Outcome::Disabled);
        };

        debug!("Allowing ingress {allowlist} for {}", filter.interface());

        self.check_dedicated_chain(filter.interface())?;
        self.check_preconditions()?;

        let program = self.compiler.compile(filter.interface(), allowlist);
        let operations = execute_program(&mut self.backend, &program)?;

        info!(
            "Applied ingress filtering on {} ({operations} operations)",
            filter.interface()
        );
        Ok(Outcome::Completed { operations })
    }

    /// Removes the filter's rules and chain.
    ///
    /// Always attempts the full removal, so removing a filter that is not
    /// installed surfaces the backend's not-found error.
    ///
    /// # Errors
    ///
    /// Returns `Error::Backend` on the first failing command.
    pub fn remove(&mut self, filter: &InterfaceFilter) -> Result<Outcome> {
        if !filter.is_enabled() {
            return Ok(Outcome::Disabled);
        }

        debug!("Removing rules for {}", filter.interface());
        self.check_dedicated_chain(filter.interface())?;

        let program = self.compiler.compile_removal(filter.interface());
        let operations = execute_program(&mut self.backend, &program)?;

        info!(
            "Removed ingress filtering from {} ({operations} operations)",
            filter.interface()
        );
        Ok(Outcome::Completed { operations })
    }

    /// The dedicated chain must not be one of the shared chains, or removal
    /// would flush and delete it.
    fn check_dedicated_chain(&self, interface: &str) -> Result<()> {
        let chain = self.compiler.namer().chain_for(interface);
        if chain == self.compiler.base_chain() || chain == self.compiler.reject_chain() {
            warn!("Interface {interface} maps onto shared chain {chain}");
            return Err(Error::InvalidInterface {
                name: interface.to_string(),
                reason: format!("its chain {chain} is a shared chain"),
            });
        }
        Ok(())
    }

    fn check_preconditions(&mut self) -> Result<()> {
        let chains = [
            self.compiler.base_chain().to_string(),
            self.compiler.reject_chain().to_string(),
        ];

        for chain in chains {
            match self.backend.chain_exists(&chain) {
                Ok(true) => {}
                Ok(false) => {
                    warn!("Expected iptables chain not found: {chain}");
                    return Err(Error::Precondition { chain });
                }
                Err(failure) => {
                    return Err(Error::Backend(BackendError {
                        args: vec!["-n".into(), "-L".into(), chain],
                        output: failure.output,
                        exit_code: failure.exit_code,
                        applied: 0,
                    }));
                }
            }
        }

        Ok(())
    }
}
