//! vethguard - per-interface ingress allowlisting on top of iptables
//!
//! # Usage
//!
//! ```bash
//! vethguard parse "10.0.0.0/24, 192.168.1.1-192.168.1.10"
//! vethguard plan veth0 "10.0.0.1"            # Show the iptables commands
//! vethguard plan veth0 "10.0.0.1" --remove   # Show the teardown commands
//! vethguard apply veth0 "10.0.0.1"           # Install the filter
//! vethguard apply veth0 "10.0.0.1" --dry-run # Simulate against an in-memory table
//! vethguard remove veth0 "10.0.0.1"          # Tear it down again
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::warn;
use vethguard::audit::{AuditEvent, AuditLog, EventType};
use vethguard::config::{FilterConfig, load_config};
use vethguard::core::allowlist;
use vethguard::core::backend::{IptablesBackend, MemoryBackend};
use vethguard::core::controller::{EndpointOptions, FilterController, InterfaceFilter, Outcome};
use vethguard::core::error::{Error, IptablesErrorPattern};
use vethguard::core::rules::RuleCompiler;

#[derive(Parser)]
#[command(name = "vethguard")]
#[command(about = "Per-interface ingress allowlisting for iptables", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.config/vethguard/config.json)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log every iptables call
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse an allowlist and print it
    Parse {
        /// Comma-separated IPs, CIDR blocks and IP ranges
        spec: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the iptables commands for an interface without running them
    Plan {
        interface: String,
        spec: String,
        /// Show the removal program instead
        #[arg(long)]
        remove: bool,
    },
    /// Install the ingress filter for an interface
    Apply {
        interface: String,
        spec: String,
        /// Run against an in-memory table instead of iptables
        #[arg(long)]
        dry_run: bool,
    },
    /// Remove the ingress filter from an interface
    Remove {
        interface: String,
        spec: String,
        /// Run against an in-memory table instead of iptables
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> vethguard::Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Parse { spec, json } => match allowlist::parse(&spec)? {
            None => println!("Filtering disabled (empty allowlist specification)"),
            Some(allowlist) if json => println!("{}", serde_json::to_string_pretty(&allowlist)?),
            Some(allowlist) => {
                for network in &allowlist.networks {
                    println!("network  {network}");
                }
                for range in &allowlist.ranges {
                    println!("range    {range}");
                }
                if allowlist.is_empty() {
                    println!("(allow nothing)");
                }
            }
        },
        Commands::Plan {
            interface,
            spec,
            remove,
        } => {
            let filter = InterfaceFilter::new(interface, &EndpointOptions::from_spec(&spec)?)?;
            let Some(allowlist) = filter.allowlist() else {
                println!("Filtering disabled: nothing to do");
                return Ok(());
            };

            let compiler = RuleCompiler::from_config(&config);
            let program = if remove {
                compiler.compile_removal(filter.interface())
            } else {
                compiler.compile(filter.interface(), allowlist)
            };
            for line in program.to_command_lines(&config.iptables_path, &config.table) {
                println!("{line}");
            }
        }
        Commands::Apply {
            interface,
            spec,
            dry_run,
        } => {
            let filter = InterfaceFilter::new(interface, &EndpointOptions::from_spec(&spec)?)?;
            if dry_run {
                let mut controller = FilterController::new(dry_run_backend(&config), &config);
                let outcome = controller.apply(&filter);
                print_executed(&config, controller.backend());
                print_outcome(outcome?);
            } else {
                let mut controller =
                    FilterController::new(IptablesBackend::from_config(&config), &config);
                let outcome = controller.apply(&filter);
                audit(&config, EventType::ApplyFilter, &filter, &outcome);
                print_outcome(outcome?);
            }
        }
        Commands::Remove {
            interface,
            spec,
            dry_run,
        } => {
            let filter = InterfaceFilter::new(interface, &EndpointOptions::from_spec(&spec)?)?;
            if dry_run {
                let mut backend = dry_run_backend(&config);
                // Simulate removal from a table where the filter is installed
                FilterController::new(&mut backend, &config).apply(&filter)?;
                let installed = backend.executed().len();

                let mut controller = FilterController::new(backend, &config);
                let outcome = controller.remove(&filter);
                for op in &controller.backend().executed()[installed..] {
                    println!("{} -t {} {op}", config.iptables_path, config.table);
                }
                print_outcome(outcome?);
            } else {
                let mut controller =
                    FilterController::new(IptablesBackend::from_config(&config), &config);
                let outcome = controller.remove(&filter);
                audit(&config, EventType::RemoveFilter, &filter, &outcome);
                print_outcome(outcome?);
            }
        }
    }

    Ok(())
}

fn dry_run_backend(config: &FilterConfig) -> MemoryBackend {
    MemoryBackend::with_chains([&config.base_chain, &config.reject_chain])
}

fn print_executed(config: &FilterConfig, backend: &MemoryBackend) {
    for op in backend.executed() {
        println!("{} -t {} {op}", config.iptables_path, config.table);
    }
}

fn print_outcome(outcome: Outcome) {
    match outcome {
        Outcome::Disabled => println!("Filtering disabled: nothing to do"),
        Outcome::Completed { operations } => println!("✓ {operations} operations applied"),
    }
}

fn audit(
    config: &FilterConfig,
    event_type: EventType,
    filter: &InterfaceFilter,
    outcome: &vethguard::Result<Outcome>,
) {
    if !config.audit_log {
        return;
    }

    let (success, applied, error) = match outcome {
        Ok(Outcome::Disabled) => (true, 0, None),
        Ok(Outcome::Completed { operations }) => (true, *operations, None),
        Err(Error::Backend(e)) => (false, e.applied, Some(e.to_string())),
        Err(e) => (false, 0, Some(e.to_string())),
    };
    let details = serde_json::json!({
        "allowlist": filter.allowlist().map(ToString::to_string),
        "base_chain": config.base_chain,
        "table": config.table,
    });
    let event = AuditEvent::new(event_type, filter.interface(), success, applied, details, error);

    match AuditLog::new() {
        Ok(log) => {
            if let Err(e) = log.log(&event) {
                warn!("Failed to write audit log: {e}");
            }
        }
        Err(e) => warn!("Audit log unavailable: {e}"),
    }
}

fn report(error: &Error) {
    eprintln!("Error: {error}");

    match error {
        Error::Backend(e) => {
            if e.applied > 0 {
                eprintln!(
                    "{} operation(s) were applied before the failure and were not rolled back.",
                    e.applied
                );
            }
            let translation = IptablesErrorPattern::match_error(&e.output);
            eprintln!("{}", translation.user_message);
            for suggestion in &translation.suggestions {
                eprintln!("  - {suggestion}");
            }
        }
        Error::Precondition { chain } => {
            eprintln!("  - Create the chain first: iptables -N {chain}");
            eprintln!("  - Or point the config file at the existing chains");
        }
        _ => {}
    }
}
