//! Privilege elevation for iptables calls
//!
//! Modifying iptables requires root. vethguard only elevates the `iptables`
//! binary itself, one invocation per rule operation.
//!
//! # Elevation Strategy
//!
//! - **Already root**: runs iptables directly
//! - **Preferred**: `run0` when available (systemd v256+, no SUID)
//! - **Terminal fallback**: `sudo`
//! - **Non-interactive fallback**: `pkexec`
//!
//! # Environment Variables
//!
//! - `VETHGUARD_ELEVATION_METHOD`: Force a specific elevation method (`sudo`, `run0`, or `pkexec`).
//! - `VETHGUARD_TEST_NO_ELEVATION`: Bypass elevation entirely (for testing only).
//!
//! Arguments are passed as an argument vector, never through a shell.

use std::process::Command;

/// Error type for privilege elevation operations
#[derive(Debug, thiserror::Error)]
pub enum ElevationError {
    /// pkexec binary not found in PATH
    #[error("pkexec not found - please install PolicyKit")]
    PkexecNotFound,

    /// Requested elevation method is not available (binary not found)
    #[error("Elevation method '{0}' is not available (binary not found)")]
    MethodNotAvailable(String),

    /// Invalid value for `VETHGUARD_ELEVATION_METHOD`
    #[error("Invalid VETHGUARD_ELEVATION_METHOD '{0}'. Valid options: sudo, run0, pkexec")]
    InvalidMethod(String),
}

/// Checks if a binary exists in PATH
fn binary_exists(name: &str) -> bool {
    std::env::var_os("PATH")
        .and_then(|paths| {
            std::env::split_paths(&paths).find_map(|dir| {
                let full_path = dir.join(name);
                if full_path.is_file() {
                    Some(full_path)
                } else {
                    None
                }
            })
        })
        .is_some()
}

fn wrapped(wrapper: &str, program: &str, args: &[String]) -> Command {
    let mut cmd = Command::new(wrapper);
    cmd.arg(program).args(args);
    cmd
}

fn direct(program: &str, args: &[String]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd
}

/// Builds the command for `program args...`, elevated when needed.
fn build_elevated_command(program: &str, args: &[String]) -> Result<Command, ElevationError> {
    use std::os::fd::AsFd;

    if std::env::var("VETHGUARD_TEST_NO_ELEVATION").is_ok() {
        return Ok(direct(program, args));
    }

    if nix::unistd::getuid().is_root() {
        return Ok(direct(program, args));
    }

    if let Ok(method) = std::env::var("VETHGUARD_ELEVATION_METHOD") {
        let method = method.to_lowercase();
        if !method.is_empty() {
            return match method.as_str() {
                "sudo" | "run0" | "pkexec" => {
                    if binary_exists(&method) {
                        Ok(wrapped(&method, program, args))
                    } else {
                        Err(ElevationError::MethodNotAvailable(method))
                    }
                }
                _ => Err(ElevationError::InvalidMethod(method)),
            };
        }
    }

    if binary_exists("run0") {
        return Ok(wrapped("run0", program, args));
    }

    let is_atty = nix::unistd::isatty(std::io::stdin().as_fd()).unwrap_or(false);
    if is_atty {
        Ok(wrapped("sudo", program, args))
    } else if binary_exists("pkexec") {
        Ok(wrapped("pkexec", program, args))
    } else {
        Err(ElevationError::PkexecNotFound)
    }
}

/// Creates an `iptables` command with the given arguments.
///
/// When `elevate` is false the command always runs unwrapped, which is what
/// callers already running as root or with `CAP_NET_ADMIN` want.
///
/// # Errors
///
/// Returns `Err` if elevation is needed but no usable method is available.
pub fn create_iptables_command(
    iptables: &str,
    args: &[String],
    elevate: bool,
) -> Result<Command, ElevationError> {
    if elevate {
        build_elevated_command(iptables, args)
    } else {
        Ok(direct(iptables, args))
    }
}
