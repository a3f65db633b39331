//! Audit logging for filter changes
//!
//! Every apply and remove issued from the command line is recorded as one
//! JSON line, whether it succeeded, failed, or was a no-op.
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;

/// Types of auditable events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ApplyFilter,
    RemoveFilter,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event occurred (UTC)
    pub timestamp: chrono::DateTime<chrono::Utc>,

    pub event_type: EventType,

    pub interface: String,

    /// Whether the operation succeeded
    pub success: bool,

    /// Operations that took effect, including those before a failure
    pub operations_applied: usize,

    /// Additional structured data about the event
    pub details: serde_json::Value,

    /// Error message if operation failed
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(
        event_type: EventType,
        interface: impl Into<String>,
        success: bool,
        operations_applied: usize,
        details: serde_json::Value,
        error: Option<String>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            event_type,
            interface: interface.into(),
            success,
            operations_applied,
            details,
            error,
        }
    }
}

/// Audit log writer
pub struct AuditLog {
    log_path: PathBuf,
}

impl AuditLog {
    /// Opens the audit log in the user state directory, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `Err` if state directory cannot be determined or created
    pub fn new() -> std::io::Result<Self> {
        let mut log_path = crate::utils::ensure_state_dir()?.ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "State directory not found")
        })?;
        log_path.push("audit.log");

        Ok(Self { log_path })
    }

    /// Audit log at an explicit path
    pub fn at(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
        }
    }

    /// Appends an event to the audit log
    ///
    /// # Errors
    ///
    /// Returns `Err` if file cannot be opened or written
    pub fn log(&self, event: &AuditEvent) -> std::io::Result<()> {
        let json = serde_json::to_string(event)?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;

        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;

        Ok(())
    }
}
