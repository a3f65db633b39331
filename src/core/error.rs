use thiserror::Error;

/// Core error types for vethguard
#[derive(Debug, Error)]
pub enum Error {
    /// Allowlist specification could not be parsed
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A chain the filter hooks into is missing; nothing was executed
    #[error("Expected iptables chain not found: {chain}")]
    Precondition { chain: String },

    /// A rule-mutation command failed mid-program
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Interface name breaks kernel naming rules or maps onto a shared chain
    #[error("Invalid interface '{name}': {reason}")]
    InvalidInterface { name: String, reason: String },

    /// Configuration file is unusable
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Malformed allowlist token. Parsing is all-or-nothing, so one of these
/// means no allowlist was produced at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Could not parse IP, CIDR or IP range '{token}'")]
pub struct ParseError {
    pub token: String,
}

/// A backend command failed.
///
/// Operations before the failing one have taken effect and were not rolled
/// back; `applied` counts them so callers can attempt their own cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("iptables rule failed [{}]: {}", .args.join(" "), .output.trim())]
pub struct BackendError {
    /// Full argument vector of the failing operation
    pub args: Vec<String>,
    /// Raw diagnostic reported by the backend
    pub output: String,
    pub exit_code: Option<i32>,
    /// Operations of the program that succeeded before this one
    pub applied: usize,
}

/// Represents a translated error with helpful context
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

/// Database of iptables diagnostic patterns and their translations
pub struct IptablesErrorPattern;

impl IptablesErrorPattern {
    /// Matches an iptables diagnostic against known patterns and returns a user-friendly translation.
    pub fn match_error(msg: &str) -> ErrorTranslation {
        let lower = msg.to_lowercase();

        if lower.contains("permission denied")
            || lower.contains("operation not permitted")
            || lower.contains("you must be root")
        {
            return ErrorTranslation::new("Insufficient permissions to modify iptables rules")
                .with_suggestion("Run as root, or enable elevation in the config file")
                .with_suggestion("Check if CAP_NET_ADMIN capability is available");
        }

        if lower.contains("no such file") || lower.contains("command not found") {
            return ErrorTranslation::new("iptables is not installed or not found in PATH")
                .with_suggestion("Install iptables: sudo apt install iptables  (Debian/Ubuntu)")
                .with_suggestion("Or set iptables_path in the config file");
        }

        if lower.contains("another app is currently holding the xtables lock") {
            return ErrorTranslation::new("The xtables lock is held by another process")
                .with_suggestion("Another process is modifying iptables; retry shortly")
                .with_suggestion("Serialize filter changes for this host through one caller");
        }

        if lower.contains("couldn't load match") && lower.contains("iprange") {
            return ErrorTranslation::new("The iprange match extension is unavailable")
                .with_suggestion("Load the module: sudo modprobe xt_iprange")
                .with_suggestion("Or express the range as CIDR blocks instead");
        }

        if lower.contains("chain already exists") {
            return ErrorTranslation::new("The interface chain already exists")
                .with_suggestion("The filter may already be applied, or a previous apply failed midway")
                .with_suggestion("Run remove for this interface before applying again");
        }

        if lower.contains("bad rule") {
            return ErrorTranslation::new("The rule to delete was not found")
                .with_suggestion("The filter was probably never applied or already removed")
                .with_suggestion("Inspect the base chain: iptables -t filter -S");
        }

        if lower.contains("too many links") || lower.contains("directory not empty") {
            return ErrorTranslation::new("The interface chain is still in use")
                .with_suggestion("A rule still jumps to the chain or the chain is not empty")
                .with_suggestion("Remove the jump rule from the base chain first");
        }

        if lower.contains("no chain/target/match by that name")
            || (lower.contains("chain") && lower.contains("does not exist"))
        {
            return ErrorTranslation::new("iptables chain not found")
                .with_suggestion("Ensure the base chains exist before applying a filter")
                .with_suggestion("Check the chain names in the config file");
        }

        if lower.contains("host/network") && lower.contains("not found") {
            return ErrorTranslation::new("Invalid IP address or network")
                .with_suggestion("Use proper IPv4 format: 192.168.1.1 or 192.168.1.0/24")
                .with_suggestion("IPv6 entries cannot be installed with iptables");
        }

        ErrorTranslation::new(format!("Firewall error: {}", msg.trim()))
            .with_suggestion("Check the detailed error message for more information")
            .with_suggestion("Verify iptables is working: sudo iptables -t filter -S")
    }
}

pub type Result<T> = std::result::Result<T, Error>;
