//! In-memory iptables table
//!
//! Reproduces the parts of iptables' behaviour the filter lifecycle depends
//! on, including its diagnostics, so lifecycle failures can be exercised
//! without touching the host firewall.

use super::{Backend, BackendFailure};
use crate::core::rules::{OperationKind, RuleOperation};
use std::collections::BTreeMap;

const NO_SUCH_CHAIN: &str = "iptables: No chain/target/match by that name.";
const CHAIN_EXISTS: &str = "iptables: Chain already exists.";
const BAD_RULE: &str = "iptables: Bad rule (does a matching rule exist in that chain?).";
const INDEX_TOO_BIG: &str = "iptables: Index of insertion too big.";
const CHAIN_IN_USE: &str = "iptables: Too many links.";
const CHAIN_NOT_EMPTY: &str = "iptables: Directory not empty.";

/// Targets that are verdicts rather than chains
const STANDARD_TARGETS: &[&str] = &["ACCEPT", "DROP", "REJECT", "RETURN", "LOG"];

/// Rule specification: the arguments after the chain name (and position, for inserts)
pub type RuleSpec = Vec<String>;

#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    chains: BTreeMap<String, Vec<RuleSpec>>,
    executed: Vec<RuleOperation>,
    calls: usize,
    fail_on_call: Option<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that already has the given (empty) chains
    pub fn with_chains<I, S>(chains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut backend = Self::new();
        for chain in chains {
            backend.chains.insert(chain.into(), Vec::new());
        }
        backend
    }

    /// Makes the `n`-th call to [`Backend::execute`] (0-based) fail without side effects.
    pub fn fail_on_call(mut self, n: usize) -> Self {
        self.fail_on_call = Some(n);
        self
    }

    /// Successfully executed operations, in order
    pub fn executed(&self) -> &[RuleOperation] {
        &self.executed
    }

    /// Number of `execute` calls, failed ones included
    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn has_chain(&self, chain: &str) -> bool {
        self.chains.contains_key(chain)
    }

    pub fn rules(&self, chain: &str) -> Option<&[RuleSpec]> {
        self.chains.get(chain).map(Vec::as_slice)
    }

    /// Copy of every chain and its rules
    pub fn snapshot(&self) -> BTreeMap<String, Vec<RuleSpec>> {
        self.chains.clone()
    }

    /// Appends a rule directly, bypassing target checks. Used to seed fixtures.
    pub fn seed_rule<I, S>(&mut self, chain: &str, spec: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.chains
            .entry(chain.to_string())
            .or_default()
            .push(spec.into_iter().map(Into::into).collect());
    }

    fn check_jump_target(&self, spec: &[String]) -> Result<(), BackendFailure> {
        let target = spec
            .iter()
            .position(|arg| arg == "-j")
            .and_then(|idx| spec.get(idx + 1));

        match target {
            Some(target)
                if !STANDARD_TARGETS.contains(&target.as_str())
                    && !self.chains.contains_key(target) =>
            {
                Err(failure(NO_SUCH_CHAIN))
            }
            _ => Ok(()),
        }
    }

    fn is_referenced(&self, chain: &str) -> bool {
        self.chains.values().flatten().any(|spec| {
            spec.windows(2)
                .any(|pair| pair[0] == "-j" && pair[1] == chain)
        })
    }

    fn apply(&mut self, operation: &RuleOperation) -> Result<(), BackendFailure> {
        let chain = operation.chain();
        let args = operation.args();

        match operation.kind() {
            OperationKind::CreateChain => {
                if self.chains.contains_key(chain) {
                    return Err(failure(CHAIN_EXISTS));
                }
                self.chains.insert(chain.to_string(), Vec::new());
            }
            OperationKind::AppendRule => {
                self.check_jump_target(args)?;
                self.chains
                    .get_mut(chain)
                    .ok_or_else(|| failure(NO_SUCH_CHAIN))?
                    .push(args.to_vec());
            }
            OperationKind::InsertRule => {
                let (position, spec) = args
                    .split_first()
                    .and_then(|(pos, spec)| pos.parse::<usize>().ok().map(|pos| (pos, spec)))
                    .filter(|(pos, _)| *pos >= 1)
                    .ok_or_else(|| failure("iptables: Invalid rule number."))?;
                self.check_jump_target(spec)?;
                let rules = self
                    .chains
                    .get_mut(chain)
                    .ok_or_else(|| failure(NO_SUCH_CHAIN))?;
                if position > rules.len() + 1 {
                    return Err(failure(INDEX_TOO_BIG));
                }
                rules.insert(position - 1, spec.to_vec());
            }
            OperationKind::DeleteRule => {
                self.check_jump_target(args)?;
                let rules = self
                    .chains
                    .get_mut(chain)
                    .ok_or_else(|| failure(NO_SUCH_CHAIN))?;
                let idx = rules
                    .iter()
                    .position(|spec| spec.as_slice() == args)
                    .ok_or_else(|| failure(BAD_RULE))?;
                rules.remove(idx);
            }
            OperationKind::FlushChain => {
                self.chains
                    .get_mut(chain)
                    .ok_or_else(|| failure(NO_SUCH_CHAIN))?
                    .clear();
            }
            OperationKind::DeleteChain => {
                let rules = self.chains.get(chain).ok_or_else(|| failure(NO_SUCH_CHAIN))?;
                if !rules.is_empty() {
                    return Err(failure(CHAIN_NOT_EMPTY));
                }
                if self.is_referenced(chain) {
                    return Err(failure(CHAIN_IN_USE));
                }
                self.chains.remove(chain);
            }
        }

        Ok(())
    }
}

fn failure(message: &str) -> BackendFailure {
    BackendFailure::new(message, Some(1))
}

impl Backend for MemoryBackend {
    fn execute(&mut self, operation: &RuleOperation) -> Result<String, BackendFailure> {
        let call = self.calls;
        self.calls += 1;

        if self.fail_on_call == Some(call) {
            return Err(BackendFailure::new(
                format!("iptables: injected failure on call {call}."),
                Some(4),
            ));
        }

        self.apply(operation)?;
        self.executed.push(operation.clone());
        Ok(String::new())
    }

    fn chain_exists(&mut self, chain: &str) -> Result<bool, BackendFailure> {
        Ok(self.chains.contains_key(chain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(kind: OperationKind, chain: &str, args: &[&str]) -> RuleOperation {
        RuleOperation::new(kind, chain, args.iter().copied())
    }

    #[test]
    fn test_create_twice_fails() {
        let mut backend = MemoryBackend::new();
        let create = RuleOperation::create_chain("X");
        assert!(backend.execute(&create).is_ok());
        let err = backend.execute(&create).unwrap_err();
        assert_eq!(err.output, CHAIN_EXISTS);
        assert_eq!(backend.executed().len(), 1);
        assert_eq!(backend.calls(), 2);
    }

    #[test]
    fn test_append_to_missing_chain_fails() {
        let mut backend = MemoryBackend::new();
        let err = backend
            .execute(&op(OperationKind::AppendRule, "X", &["-j", "ACCEPT"]))
            .unwrap_err();
        assert_eq!(err.output, NO_SUCH_CHAIN);
    }

    #[test]
    fn test_jump_to_missing_chain_fails() {
        let mut backend = MemoryBackend::with_chains(["X"]);
        let err = backend
            .execute(&op(OperationKind::AppendRule, "X", &["-j", "NOWHERE"]))
            .unwrap_err();
        assert_eq!(err.output, NO_SUCH_CHAIN);
        assert!(backend.rules("X").unwrap().is_empty());
    }

    #[test]
    fn test_insert_positions() {
        let mut backend = MemoryBackend::with_chains(["X"]);
        backend.seed_rule("X", ["-j", "DROP"]);
        backend
            .execute(&op(OperationKind::InsertRule, "X", &["1", "-j", "ACCEPT"]))
            .unwrap();
        assert_eq!(backend.rules("X").unwrap()[0], vec!["-j", "ACCEPT"]);

        let err = backend
            .execute(&op(OperationKind::InsertRule, "X", &["4", "-j", "ACCEPT"]))
            .unwrap_err();
        assert_eq!(err.output, INDEX_TOO_BIG);

        assert!(
            backend
                .execute(&op(OperationKind::InsertRule, "X", &["0", "-j", "ACCEPT"]))
                .is_err()
        );
    }

    #[test]
    fn test_delete_rule_needs_exact_match() {
        let mut backend = MemoryBackend::with_chains(["X"]);
        backend.seed_rule("X", ["-s", "10.0.0.1/32", "-j", "ACCEPT"]);

        let err = backend
            .execute(&op(OperationKind::DeleteRule, "X", &["-s", "10.0.0.2/32", "-j", "ACCEPT"]))
            .unwrap_err();
        assert_eq!(err.output, BAD_RULE);

        backend
            .execute(&op(OperationKind::DeleteRule, "X", &["-s", "10.0.0.1/32", "-j", "ACCEPT"]))
            .unwrap();
        assert!(backend.rules("X").unwrap().is_empty());
    }

    #[test]
    fn test_delete_chain_rules() {
        let mut backend = MemoryBackend::with_chains(["BASE", "X"]);
        backend.seed_rule("X", ["-j", "DROP"]);
        backend.seed_rule("BASE", ["-j", "X"]);

        let delete = RuleOperation::delete_chain("X");
        assert_eq!(backend.execute(&delete).unwrap_err().output, CHAIN_NOT_EMPTY);

        backend.execute(&RuleOperation::flush_chain("X")).unwrap();
        assert_eq!(backend.execute(&delete).unwrap_err().output, CHAIN_IN_USE);

        backend.execute(&RuleOperation::flush_chain("BASE")).unwrap();
        backend.execute(&delete).unwrap();
        assert!(!backend.has_chain("X"));
        assert_eq!(backend.execute(&delete).unwrap_err().output, NO_SUCH_CHAIN);
    }

    #[test]
    fn test_injected_failure_has_no_side_effects() {
        let mut backend = MemoryBackend::new().fail_on_call(0);
        let err = backend.execute(&RuleOperation::create_chain("X")).unwrap_err();
        assert!(err.output.contains("injected"));
        assert!(!backend.has_chain("X"));

        // Only the configured call fails
        backend.execute(&RuleOperation::create_chain("X")).unwrap();
        assert!(backend.chain_exists("X").unwrap());
    }
}
