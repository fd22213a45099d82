//! Field-level validation
//!
//! Validation problems are collected per field, mirroring the JSON error
//! body clients receive (`{"mnemonic": ["..."]}`).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Mnemonics are ASCII letters, digits, hyphens and dots.
pub static NAMESPACE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9\-.]+$").expect("mnemonic pattern is a valid regex")
});

/// Column width of every mnemonic column
pub const MNEMONIC_MAX_LENGTH: usize = 255;

/// Errors keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-field shortcut
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    /// Merge another set of errors into this one
    pub fn extend(&mut self, other: FieldErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// `Ok(())` when nothing was recorded
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.0).unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{}: {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}

/// Check a mnemonic value, returning the problem as a message
pub fn check_mnemonic(value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err("This field is required.".to_string());
    }
    if value.len() > MNEMONIC_MAX_LENGTH {
        return Err(format!(
            "Ensure this value has at most {} characters (it has {}).",
            MNEMONIC_MAX_LENGTH,
            value.len()
        ));
    }
    if !NAMESPACE_REGEX.is_match(value) {
        return Err("Enter a valid value.".to_string());
    }
    Ok(())
}

/// Validate a mnemonic and record any problem under `field`
pub fn validate_mnemonic(errors: &mut FieldErrors, field: &str, value: &str) {
    if let Err(message) = check_mnemonic(value) {
        errors.add(field, message);
    }
}

/// Record a "required" error when a text value is blank
pub fn require_text(errors: &mut FieldErrors, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.add(field, "This field is required.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_valid_mnemonics() {
        for value in ["CIEL", "ocl-1.0", "a", "WHO.ICD-10", "2024"] {
            assert!(check_mnemonic(value).is_ok(), "{} should be valid", value);
        }
    }

    #[test]
    fn test_invalid_mnemonics() {
        for value in ["", "has space", "under_score", "slash/x", "ümlaut", "tab\t"] {
            assert!(check_mnemonic(value).is_err(), "{:?} should be invalid", value);
        }
    }

    #[test]
    fn test_mnemonic_too_long() {
        let value = "a".repeat(MNEMONIC_MAX_LENGTH + 1);
        assert!(check_mnemonic(&value).is_err());
        assert!(check_mnemonic(&value[..MNEMONIC_MAX_LENGTH]).is_ok());
    }

    #[test]
    fn test_field_errors_collects_per_field() {
        let mut errors = FieldErrors::new();
        validate_mnemonic(&mut errors, "id", "bad value");
        require_text(&mut errors, "name", "  ");
        require_text(&mut errors, "name", "");

        assert_eq!(errors.get("id").map(|m| m.len()), Some(1));
        assert_eq!(errors.get("name").map(|m| m.len()), Some(2));
        assert!(errors.clone().into_result().is_err());

        let json = errors.to_json();
        assert!(json["name"].is_array());
    }

    #[test]
    fn test_field_errors_display() {
        let errors = FieldErrors::single("mnemonic", "taken");
        assert_eq!(errors.to_string(), "mnemonic: taken");
    }

    proptest! {
        /// Any string containing a character outside the namespace alphabet fails.
        #[test]
        fn prop_foreign_character_rejected(
            prefix in "[a-zA-Z0-9.-]{0,10}",
            bad in any::<char>().prop_filter("outside namespace alphabet", |c| {
                !(c.is_ascii_alphanumeric() || *c == '-' || *c == '.')
            }),
            suffix in "[a-zA-Z0-9.-]{0,10}",
        ) {
            let value = format!("{}{}{}", prefix, bad, suffix);
            prop_assert!(check_mnemonic(&value).is_err());
        }

        /// Strings made only of the namespace alphabet pass.
        #[test]
        fn prop_namespace_alphabet_accepted(value in "[a-zA-Z0-9.-]{1,64}") {
            prop_assert!(check_mnemonic(&value).is_ok());
        }
    }
}
