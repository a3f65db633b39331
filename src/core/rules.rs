//! Rule programs and the allowlist compiler
//!
//! A [`RuleProgram`] is an ordered list of iptables mutations. Order is part
//! of the program's meaning: the dedicated chain must exist before rules are
//! appended to it, accept rules must precede the reject jump, and the base
//! chain only gets its jump once the dedicated chain is complete.
//!
//! # Apply program
//!
//! ```text
//! -N CONTAINER-veth0
//! -A CONTAINER-veth0 -s 10.0.0.0/24 -j ACCEPT
//! -A CONTAINER-veth0 -m iprange --src-range 10.1.0.1-10.1.0.9 -j ACCEPT
//! -A CONTAINER-veth0 -j CONTAINER-REJECT
//! -I CONTAINERS 1 -o veth0 -j CONTAINER-veth0
//! ```
//!
//! # Removal program
//!
//! ```text
//! -D CONTAINERS -o veth0 -j CONTAINER-veth0
//! -F CONTAINER-veth0
//! -X CONTAINER-veth0
//! ```

use crate::config::FilterConfig;
use crate::core::allowlist::Allowlist;
use crate::core::chain::ChainNamer;
use std::fmt;

/// Kind of iptables mutation, serialized as its command flag
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::AsRefStr,
)]
pub enum OperationKind {
    #[strum(serialize = "-N")]
    CreateChain,
    #[strum(serialize = "-I")]
    InsertRule,
    #[strum(serialize = "-A")]
    AppendRule,
    #[strum(serialize = "-D")]
    DeleteRule,
    #[strum(serialize = "-F")]
    FlushChain,
    #[strum(serialize = "-X")]
    DeleteChain,
}

/// One backend command: a kind, the chain it targets, and the rest of its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOperation {
    kind: OperationKind,
    chain: String,
    args: Vec<String>,
}

impl RuleOperation {
    pub fn new<I, S>(kind: OperationKind, chain: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            chain: chain.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn create_chain(chain: &str) -> Self {
        Self::new(OperationKind::CreateChain, chain, Vec::<String>::new())
    }

    pub fn flush_chain(chain: &str) -> Self {
        Self::new(OperationKind::FlushChain, chain, Vec::<String>::new())
    }

    pub fn delete_chain(chain: &str) -> Self {
        Self::new(OperationKind::DeleteChain, chain, Vec::<String>::new())
    }

    pub const fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    /// Arguments after the chain name
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Full argument vector, e.g. `["-A", "CONTAINER-veth0", "-j", "ACCEPT"]`
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 2);
        argv.push(self.kind.to_string());
        argv.push(self.chain.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

impl fmt::Display for RuleOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv().join(" "))
    }
}

/// Ordered sequence of operations, applied front to back
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleProgram {
    operations: Vec<RuleOperation>,
}

impl RuleProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, operation: RuleOperation) {
        self.operations.push(operation);
    }

    pub fn operations(&self) -> &[RuleOperation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RuleOperation> {
        self.operations.iter()
    }

    /// Renders the program as shell command lines for display
    pub fn to_command_lines(&self, iptables: &str, table: &str) -> Vec<String> {
        self.operations
            .iter()
            .map(|op| format!("{iptables} -t {table} {op}"))
            .collect()
    }
}

impl<'a> IntoIterator for &'a RuleProgram {
    type Item = &'a RuleOperation;
    type IntoIter = std::slice::Iter<'a, RuleOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}

/// Compiles allowlists into chain-scoped rule programs
#[derive(Debug, Clone)]
pub struct RuleCompiler {
    namer: ChainNamer,
    base_chain: String,
    reject_chain: String,
}

impl RuleCompiler {
    pub fn new(
        namer: ChainNamer,
        base_chain: impl Into<String>,
        reject_chain: impl Into<String>,
    ) -> Self {
        Self {
            namer,
            base_chain: base_chain.into(),
            reject_chain: reject_chain.into(),
        }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(
            ChainNamer::new(config.chain_prefix.clone()),
            config.base_chain.clone(),
            config.reject_chain.clone(),
        )
    }

    pub fn namer(&self) -> &ChainNamer {
        &self.namer
    }

    pub fn base_chain(&self) -> &str {
        &self.base_chain
    }

    pub fn reject_chain(&self) -> &str {
        &self.reject_chain
    }

    /// Builds the program that installs `allowlist` for `interface`.
    pub fn compile(&self, interface: &str, allowlist: &Allowlist) -> RuleProgram {
        let chain = self.namer.chain_for(interface);
        let mut program = RuleProgram::new();

        program.push(RuleOperation::create_chain(&chain));

        for network in &allowlist.networks {
            program.push(RuleOperation::new(
                OperationKind::AppendRule,
                &chain,
                ["-s".to_string(), network.to_string(), "-j".into(), "ACCEPT".into()],
            ));
        }

        for range in &allowlist.ranges {
            program.push(RuleOperation::new(
                OperationKind::AppendRule,
                &chain,
                [
                    "-m".to_string(),
                    "iprange".into(),
                    "--src-range".into(),
                    range.to_string(),
                    "-j".into(),
                    "ACCEPT".into(),
                ],
            ));
        }

        program.push(RuleOperation::new(
            OperationKind::AppendRule,
            &chain,
            ["-j", self.reject_chain.as_str()],
        ));

        // Traffic leaving the host towards the interface is ingress for whatever sits behind it
        program.push(RuleOperation::new(
            OperationKind::InsertRule,
            &self.base_chain,
            ["1", "-o", interface, "-j", chain.as_str()],
        ));

        program
    }

    /// Builds the program that tears down what [`compile`](Self::compile) installed.
    pub fn compile_removal(&self, interface: &str) -> RuleProgram {
        let chain = self.namer.chain_for(interface);
        let mut program = RuleProgram::new();

        program.push(RuleOperation::new(
            OperationKind::DeleteRule,
            &self.base_chain,
            ["-o", interface, "-j", chain.as_str()],
        ));
        program.push(RuleOperation::flush_chain(&chain));
        program.push(RuleOperation::delete_chain(&chain));

        program
    }
}

impl Default for RuleCompiler {
    fn default() -> Self {
        Self::from_config(&FilterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::allowlist::parse;

    fn argvs(program: &RuleProgram) -> Vec<String> {
        program.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_two_hosts_exact_sequence() {
        let allowlist = parse("10.0.0.1, 10.0.0.2").unwrap().unwrap();
        let program = RuleCompiler::default().compile("veth0", &allowlist);

        assert_eq!(
            argvs(&program),
            vec![
                "-N CONTAINER-veth0",
                "-A CONTAINER-veth0 -s 10.0.0.1/32 -j ACCEPT",
                "-A CONTAINER-veth0 -s 10.0.0.2/32 -j ACCEPT",
                "-A CONTAINER-veth0 -j CONTAINER-REJECT",
                "-I CONTAINERS 1 -o veth0 -j CONTAINER-veth0",
            ]
        );
    }

    #[test]
    fn test_ranges_follow_networks() {
        let allowlist = parse("10.0.0.1-10.0.0.5, 172.16.0.0/12").unwrap().unwrap();
        let program = RuleCompiler::default().compile("veth0", &allowlist);

        assert_eq!(
            argvs(&program),
            vec![
                "-N CONTAINER-veth0",
                "-A CONTAINER-veth0 -s 172.16.0.0/12 -j ACCEPT",
                "-A CONTAINER-veth0 -m iprange --src-range 10.0.0.1-10.0.0.5 -j ACCEPT",
                "-A CONTAINER-veth0 -j CONTAINER-REJECT",
                "-I CONTAINERS 1 -o veth0 -j CONTAINER-veth0",
            ]
        );
    }

    #[test]
    fn test_empty_allowlist_rejects_everything() {
        let program = RuleCompiler::default().compile("veth0", &Allowlist::default());

        assert_eq!(program.len(), 3);
        assert_eq!(program.operations()[0].kind(), OperationKind::CreateChain);
        assert_eq!(
            program.operations()[1].argv(),
            vec!["-A", "CONTAINER-veth0", "-j", "CONTAINER-REJECT"]
        );
        assert_eq!(program.operations()[2].kind(), OperationKind::InsertRule);
    }

    #[test]
    fn test_injected_chain_names() {
        let compiler = RuleCompiler::new(ChainNamer::new("T-"), "BASE", "DENY");
        let allowlist = parse("10.0.0.1").unwrap().unwrap();
        let program = compiler.compile("eth1", &allowlist);

        assert_eq!(program.operations()[0].chain(), "T-eth1");
        assert_eq!(program.operations()[2].args(), ["-j", "DENY"]);
        assert_eq!(
            program.operations()[3].argv(),
            vec!["-I", "BASE", "1", "-o", "eth1", "-j", "T-eth1"]
        );
    }

    #[test]
    fn test_removal_sequence() {
        let program = RuleCompiler::default().compile_removal("veth0");

        assert_eq!(
            argvs(&program),
            vec![
                "-D CONTAINERS -o veth0 -j CONTAINER-veth0",
                "-F CONTAINER-veth0",
                "-X CONTAINER-veth0",
            ]
        );
    }

    #[test]
    fn test_removal_deletes_the_inserted_jump() {
        let compiler = RuleCompiler::default();
        let allowlist = parse("10.0.0.1").unwrap().unwrap();
        let apply = compiler.compile("veth0", &allowlist);
        let remove = compiler.compile_removal("veth0");

        let insert = apply.operations().last().unwrap();
        let delete = &remove.operations()[0];
        assert_eq!(insert.chain(), delete.chain());
        // Same rule spec, minus the insert position
        assert_eq!(&insert.args()[1..], delete.args());
    }

    #[test]
    fn test_operation_kind_flags() {
        assert_eq!(OperationKind::CreateChain.as_ref(), "-N");
        assert_eq!(OperationKind::DeleteChain.to_string(), "-X");
        assert_eq!("-I".parse::<OperationKind>().unwrap(), OperationKind::InsertRule);
        assert!("-Z".parse::<OperationKind>().is_err());
    }

    #[test]
    fn test_command_lines() {
        let program = RuleCompiler::default().compile_removal("veth0");
        let lines = program.to_command_lines("iptables", "filter");
        assert_eq!(lines[1], "iptables -t filter -F CONTAINER-veth0");
    }
}
