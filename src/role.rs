//! Role identity codec
//!
//! Role instances are addressed by a `(name, index)` pair with the canonical
//! string form `"<name>#<index>"`. Encoding is strict and total; parsing is
//! deliberately permissive because identity strings may originate from the
//! engine's request payloads.

use std::fmt;

/// Identity of one role instance within the model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoleId {
    /// Role type name; empty for the top-level model itself.
    pub name: String,
    /// Instance index within the role type.
    pub index: u32,
}

impl RoleId {
    /// Build an identity from a name and an instance index.
    pub fn new(name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }

    /// Parse a canonical identity string.
    ///
    /// Splits on the first `#`. A missing or non-numeric index coerces to 0
    /// and a missing name coerces to the empty string; this never fails.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once('#') {
            Some((name, index)) => Self {
                name: name.to_string(),
                index: index.parse().unwrap_or(0),
            },
            None => Self {
                name: raw.to_string(),
                index: 0,
            },
        }
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_round_trip() {
        for raw in ["worker#0", "db#17", "a#4294967295"] {
            assert_eq!(RoleId::parse(raw).to_string(), raw);
        }
    }

    #[test]
    fn test_parse_never_fails() {
        assert_eq!(RoleId::parse(""), RoleId::new("", 0));
        assert_eq!(RoleId::parse("x"), RoleId::new("x", 0));
        assert_eq!(RoleId::parse("x#y"), RoleId::new("x", 0));
        assert_eq!(RoleId::parse("#3"), RoleId::new("", 3));
        assert_eq!(RoleId::parse("x#"), RoleId::new("x", 0));
    }

    #[test]
    fn test_parse_splits_on_first_hash() {
        let id = RoleId::parse("a#1#2");
        assert_eq!(id.name, "a");
        assert_eq!(id.index, 0);
    }
}
