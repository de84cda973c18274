//! Common types used across CLI modules

use anyhow::{Result, bail};
use uuid::Uuid;

/// Identifier that can be either a full UUID or an unambiguous prefix
#[derive(Debug, Clone, PartialEq)]
pub enum IdOrPrefix {
    Full(Uuid),

    /// Lowercased prefix of the hyphenated UUID form
    Prefix(String),
}

impl IdOrPrefix {
    /// Parses a full UUID, or else a prefix of hex digits and dashes
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        if let Ok(uuid) = Uuid::parse_str(input) {
            return Ok(IdOrPrefix::Full(uuid));
        }

        if input.is_empty() {
            bail!("ID cannot be empty");
        }
        if !input.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
            bail!("'{}' is not a UUID or UUID prefix", input);
        }

        Ok(IdOrPrefix::Prefix(input.to_lowercase()))
    }

    /// The UUID if this is a full ID
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            IdOrPrefix::Full(uuid) => Some(*uuid),
            IdOrPrefix::Prefix(_) => None,
        }
    }

    pub fn matches(&self, id: &Uuid) -> bool {
        match self {
            IdOrPrefix::Full(uuid) => uuid == id,
            IdOrPrefix::Prefix(prefix) => id.to_string().starts_with(prefix.as_str()),
        }
    }
}

impl std::fmt::Display for IdOrPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdOrPrefix::Full(uuid) => write!(f, "{}", uuid),
            IdOrPrefix::Prefix(prefix) => write!(f, "{}", prefix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_uuid_parses_as_full() {
        let id = Uuid::new_v4();
        assert_eq!(IdOrPrefix::parse(&id.to_string()).unwrap(), IdOrPrefix::Full(id));
    }

    #[test]
    fn test_prefix_is_lowercased_and_matches() {
        let id = Uuid::parse_str("3F2A9C1B-7D4E-4A11-9B0C-5E6F7A8B9C0D").unwrap();
        let prefix = IdOrPrefix::parse("3F2A9C").unwrap();

        assert_eq!(prefix, IdOrPrefix::Prefix("3f2a9c".to_string()));
        assert!(prefix.matches(&id));
        assert!(!IdOrPrefix::parse("3f2b").unwrap().matches(&id));
    }

    #[test]
    fn test_non_hex_input_is_rejected() {
        assert!(IdOrPrefix::parse("").is_err());
        assert!(IdOrPrefix::parse("shop").is_err());
    }
}
