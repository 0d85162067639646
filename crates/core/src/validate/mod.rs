//! Request validators.
//!
//! Pure functions that cast untyped request parameters and cross-check them
//! against a client and the server configuration. Errors accumulate per
//! field instead of short-circuiting, so one response can report every
//! problem at once.

pub mod authorize;
pub mod token;

use std::collections::BTreeMap;

use serde::Serialize;

/// Messages shared across validators, in the house style the consent UI
/// pattern-matches on.
pub(crate) const BLANK: &str = "can't be blank";
pub(crate) const INVALID: &str = "is invalid";
pub(crate) const DOES_NOT_EXIST: &str = "does not exist";
pub(crate) const INVALID_ENTRY: &str = "invalid entry";

/// Accumulated validation errors, keyed by field.
///
/// Serializes to the `{"errors": {field: [message, …]}}` body of
/// non-redirectable authorize failures.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<&'static str, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// All errors as one `field: message, field: message` string, for
    /// redirect `error_description` values.
    pub fn joined(&self) -> String {
        self.0
            .iter()
            .flat_map(|(field, messages)| {
                messages.iter().map(move |m| format!("{field}: {m}"))
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_per_field() {
        let mut errors = FieldErrors::new();
        errors.add("scope", BLANK);
        errors.add("client_id", INVALID);
        errors.add("scope", "second problem");

        assert!(!errors.is_empty());
        assert!(errors.contains("scope"));
        assert_eq!(
            errors.joined(),
            "client_id: is invalid, scope: can't be blank, scope: second problem"
        );
    }

    #[test]
    fn serializes_to_field_map() {
        let mut errors = FieldErrors::new();
        errors.add("redirect_uri", INVALID_ENTRY);
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json, serde_json::json!({"redirect_uri": ["invalid entry"]}));
    }
}
