use super::{Backend, BackendFailure};
use crate::config::FilterConfig;
use crate::core::rules::RuleOperation;
use std::process::Output;
use tracing::{debug, error};

/// Backend that runs the `iptables` binary, one blocking invocation per call
#[derive(Debug, Clone)]
pub struct IptablesBackend {
    iptables: String,
    table: String,
    elevate: bool,
}

impl IptablesBackend {
    pub fn new(iptables: impl Into<String>, table: impl Into<String>, elevate: bool) -> Self {
        Self {
            iptables: iptables.into(),
            table: table.into(),
            elevate,
        }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(config.iptables_path.clone(), config.table.clone(), config.elevate)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn run(&self, args: Vec<String>) -> Result<Output, BackendFailure> {
        let mut argv = vec!["-t".to_string(), self.table.clone()];
        argv.extend(args);

        debug!("iptables call {:?}", argv);

        let mut cmd = crate::elevation::create_iptables_command(&self.iptables, &argv, self.elevate)
            .map_err(|e| BackendFailure::new(e.to_string(), None))?;

        cmd.output().map_err(|e| {
            error!("Failed to spawn {}: {e}", self.iptables);
            BackendFailure::new(format!("failed to run {}: {e}", self.iptables), None)
        })
    }
}

/// Stdout followed by stderr, as iptables interleaves little of either
fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text
}

fn reports_missing_chain(output: &str) -> bool {
    output.contains("No chain/target/match by that name") || output.contains("does not exist")
}

impl Backend for IptablesBackend {
    fn execute(&mut self, operation: &RuleOperation) -> Result<String, BackendFailure> {
        let output = self.run(operation.argv())?;
        let text = combined_output(&output);

        if output.status.success() {
            Ok(text)
        } else {
            Err(BackendFailure::new(text, output.status.code()))
        }
    }

    fn chain_exists(&mut self, chain: &str) -> Result<bool, BackendFailure> {
        let output = self.run(vec!["-n".into(), "-L".into(), chain.to_string()])?;
        if output.status.success() {
            return Ok(true);
        }

        // A missing chain exits 1. Other codes (4 for the xtables lock, 126/127
        // from an elevation wrapper) mean the query itself failed.
        let text = combined_output(&output);
        if output.status.code() == Some(1) || reports_missing_chain(&text) {
            debug!("iptables chain {chain} not found");
            Ok(false)
        } else {
            Err(BackendFailure::new(text, output.status.code()))
        }
    }
}
