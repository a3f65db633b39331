/// Maps interface names to their dedicated chain names.
///
/// The mapping is `prefix + interface`. Interface names are kept whole, so two
/// distinct interfaces can never share a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainNamer {
    prefix: String,
}

impl ChainNamer {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn chain_for(&self, interface: &str) -> String {
        format!("{}{interface}", self.prefix)
    }
}

impl Default for ChainNamer {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CHAIN_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prefix() {
        assert_eq!(ChainNamer::default().chain_for("veth1a2b"), "CONTAINER-veth1a2b");
    }

    #[test]
    fn test_custom_prefix() {
        let namer = ChainNamer::new("TEST-");
        assert_eq!(namer.chain_for("eth0"), "TEST-eth0");
        assert_eq!(namer.prefix(), "TEST-");
    }

    #[test]
    fn test_distinct_interfaces_do_not_collide() {
        let namer = ChainNamer::default();
        assert_ne!(namer.chain_for("veth1"), namer.chain_for("veth10"));
        assert_ne!(namer.chain_for("a"), namer.chain_for("A"));
    }
}
