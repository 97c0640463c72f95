//! Character types for the roster.

use super::candidate::normalize_name;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Unique identifier for a character, stable for the whole run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterId(String);

impl CharacterId {
    /// The id for the `n`th character created (1-based).
    pub fn sequential(n: u32) -> Self {
        Self(format!("char_{n:03}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The creation number of a sequential id, if this is one.
    pub fn sequence(&self) -> Option<u32> {
        self.0.strip_prefix("char_")?.parse().ok()
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CharacterId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A canonical character and every surface form known to refer to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    /// Unique identifier.
    pub id: CharacterId,
    /// Name as first detected.
    pub canonical_name: String,
    /// Normalized aliases, always including the normalized canonical name.
    /// Append-only.
    pub aliases: BTreeSet<String>,
}

impl Character {
    /// Create a character whose only alias is its canonical name.
    pub fn new(id: CharacterId, canonical_name: impl Into<String>) -> Self {
        let canonical_name = canonical_name.into();
        let mut aliases = BTreeSet::new();
        aliases.insert(normalize_name(&canonical_name));
        Self {
            id,
            canonical_name,
            aliases,
        }
    }

    /// Check if a name matches one of this character's aliases (case-insensitive).
    pub fn matches_name(&self, query: &str) -> bool {
        self.aliases.contains(&normalize_name(query))
    }

    /// Longest alias, in characters.
    pub fn longest_alias(&self) -> Option<&str> {
        self.aliases
            .iter()
            .max_by_key(|a| a.chars().count())
            .map(String::as_str)
    }
}
