//! Input validation for names that end up in iptables argument vectors

/// Longest Linux interface name (IFNAMSIZ - 1)
pub const IFNAME_MAX_LEN: usize = 15;

/// Longest iptables chain name (`XT_EXTENSION_MAXNAMELEN` - 1)
pub const CHAIN_NAME_MAX_LEN: usize = 28;

/// Validates a network interface name.
///
/// Linux kernel interface name rules:
/// - 1 to 15 characters (IFNAMSIZ - 1)
/// - Alphanumeric, dot, dash, underscore only
/// - Cannot be "." or ".."
///
/// Names starting with `-` are also refused so they can never be read as an
/// iptables option.
///
/// # Errors
///
/// Returns `Err` if interface name violates kernel constraints.
pub fn validate_interface(name: &str) -> Result<String, String> {
    if name.is_empty() {
        return Err("Interface name must not be empty".to_string());
    }

    if name.len() > IFNAME_MAX_LEN {
        return Err(format!("Interface name too long (max {IFNAME_MAX_LEN} characters)"));
    }

    if name == "." || name == ".." {
        return Err("Invalid interface name".to_string());
    }

    if name.starts_with('-') {
        return Err("Interface name must not start with '-'".to_string());
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err("Interface name contains invalid characters".to_string());
    }

    Ok(name.to_string())
}

/// Validates an iptables chain or table name.
///
/// # Errors
///
/// Returns `Err` if the name is empty, longer than 28 characters, starts
/// with `-`, or contains whitespace or control characters.
pub fn validate_chain_name(name: &str) -> Result<String, String> {
    if name.is_empty() {
        return Err("Chain name must not be empty".to_string());
    }

    if name.len() > CHAIN_NAME_MAX_LEN {
        return Err(format!("Chain name too long (max {CHAIN_NAME_MAX_LEN} characters)"));
    }

    if name.starts_with('-') {
        return Err("Chain name must not start with '-'".to_string());
    }

    if !name.chars().all(|c| c.is_ascii_graphic()) {
        return Err("Chain name contains whitespace or invalid characters".to_string());
    }

    Ok(name.to_string())
}
