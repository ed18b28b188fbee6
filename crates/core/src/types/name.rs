//! Case-insensitive module names.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::{Error, Result};

/// A module identifier.
///
/// Two names are equal when their lower-cased forms are equal; the original
/// spelling is kept for display only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Name {
    display: String,
    normalized: String,
}

impl Name {
    /// Parse a name, rejecting empty text and embedded whitespace.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(Error::parse("module name must not be empty"));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(Error::parse(format!(
                "module name '{}' must not contain whitespace",
                trimmed
            )));
        }
        Ok(Self {
            display: trimmed.to_string(),
            normalized: trimmed.to_lowercase(),
        })
    }

    /// The name as it was originally written.
    pub fn as_str(&self) -> &str {
        &self.display
    }

    /// The lower-cased form used for comparison.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        self.normalized.cmp(&other.normalized)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl FromStr for Name {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Name {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Name> for String {
    fn from(name: Name) -> Self {
        name.display
    }
}
