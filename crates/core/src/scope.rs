//! Ordered scope sets.
//!
//! Scopes are kept as deduplicated, insertion-ordered sets. Parsing accepts
//! both whitespace- and comma-separated input; serialization is the
//! space-joined form RFC 6749 §3.3 uses on the wire.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum accepted length for a raw scope string, to bound memory on
/// adversarial input.
pub const MAX_SCOPE_LENGTH: usize = 1000;

/// A deduplicated, insertion-ordered set of scope strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeSet(Vec<String>);

/// Scope parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeParseError {
    #[error("scope string exceeds {MAX_SCOPE_LENGTH} bytes")]
    TooLong,
    #[error("invalid scope token {0:?}")]
    InvalidToken(String),
}

impl ScopeSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Parse a whitespace- or comma-separated scope string.
    ///
    /// Tokens must be printable ASCII excluding `"` and `\`
    /// (RFC 6749 §3.3). An empty input yields an empty set.
    pub fn parse(input: &str) -> Result<Self, ScopeParseError> {
        if input.len() > MAX_SCOPE_LENGTH {
            return Err(ScopeParseError::TooLong);
        }

        let mut set = Self::new();
        for token in input.split(|c: char| c.is_whitespace() || c == ',') {
            if token.is_empty() {
                continue;
            }
            if !is_valid_token(token) {
                return Err(ScopeParseError::InvalidToken(token.to_string()));
            }
            set.insert(token);
        }

        Ok(set)
    }

    /// Add a scope, preserving first-seen order.
    pub fn insert(&mut self, scope: &str) {
        if !self.contains(scope) {
            self.0.push(scope.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.0.iter().any(|s| s == scope)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// True when every scope in `self` is also in `other`.
    pub fn is_subset_of(&self, other: &ScopeSet) -> bool {
        self.0.iter().all(|s| other.contains(s))
    }

    /// Scopes of `self` followed by the scopes of `other` not already present.
    pub fn union(&self, other: &ScopeSet) -> ScopeSet {
        let mut out = self.clone();
        for s in other.iter() {
            out.insert(s);
        }
        out
    }

    /// Scopes of `self` that are also in `other`, keeping `self`'s order.
    pub fn intersect(&self, other: &ScopeSet) -> ScopeSet {
        ScopeSet(
            self.0
                .iter()
                .filter(|s| other.contains(s))
                .cloned()
                .collect(),
        )
    }
}

/// Scope token charset per RFC 6749 §3.3: `%x21 / %x23-5B / %x5D-7E`.
fn is_valid_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .bytes()
            .all(|b| b == 0x21 || (0x23..=0x5B).contains(&b) || (0x5D..=0x7E).contains(&b))
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

impl From<Vec<String>> for ScopeSet {
    fn from(values: Vec<String>) -> Self {
        let mut set = Self::new();
        for v in &values {
            set.insert(v);
        }
        set
    }
}

impl FromIterator<String> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        iter.into_iter().collect::<Vec<_>>().into()
    }
}

impl<'a> FromIterator<&'a str> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        iter.into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>()
            .into()
    }
}
