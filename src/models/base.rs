//! Fields and behaviour shared by every persisted record
//!
//! Each entity embeds a [`BaseFields`] value instead of inheriting from a
//! base type, and exposes it through the [`Record`] trait so soft deletion
//! and timestamp handling are written once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Free-form key/value data attached to a record
pub type Extras = serde_json::Map<String, serde_json::Value>;

/// Timestamps, logical-delete flag and extras common to all records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseFields {
    /// Set once when the record is created
    pub created_at: DateTime<Utc>,
    /// Refreshed on every change
    pub updated_at: DateTime<Utc>,
    /// False once the record has been soft-deleted
    pub is_active: bool,
    /// Arbitrary client-supplied attributes
    pub extras: Extras,
}

impl Default for BaseFields {
    fn default() -> Self {
        Self::new()
    }
}

impl BaseFields {
    /// Fresh, active fields stamped with the current time
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Fresh, active fields stamped with the given creation time
    pub fn at(created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            updated_at: created_at,
            is_active: true,
            extras: Extras::new(),
        }
    }

    /// Bump `updated_at`, never moving it behind `created_at`
    pub fn touch(&mut self) {
        self.updated_at = Utc::now().max(self.created_at);
    }
}

/// Access to the embedded [`BaseFields`] plus the behaviour built on them.
pub trait Record {
    fn base(&self) -> &BaseFields;

    fn base_mut(&mut self) -> &mut BaseFields;

    fn is_active(&self) -> bool {
        self.base().is_active
    }

    /// Mark the record inactive.
    ///
    /// Returns `true` when the flag changed and the record needs saving;
    /// calling it on an already inactive record does nothing.
    fn soft_delete(&mut self) -> bool {
        if !self.base().is_active {
            return false;
        }
        let base = self.base_mut();
        base.is_active = false;
        base.touch();
        true
    }

    /// Reactivate a soft-deleted record. Returns `true` when it changed.
    fn undelete(&mut self) -> bool {
        if self.base().is_active {
            return false;
        }
        let base = self.base_mut();
        base.is_active = true;
        base.touch();
        true
    }
}

/// Serialize extras for a TEXT column
pub fn extras_to_json(extras: &Extras) -> String {
    serde_json::Value::Object(extras.clone()).to_string()
}

/// Parse extras from a TEXT column; anything but a JSON object is an error
pub fn extras_from_json(raw: &str) -> anyhow::Result<Extras> {
    if raw.trim().is_empty() {
        return Ok(Extras::new());
    }
    match serde_json::from_str(raw)? {
        serde_json::Value::Object(map) => Ok(map),
        other => anyhow::bail!("extras column holds a non-object value: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe {
        base: BaseFields,
    }

    impl Record for Probe {
        fn base(&self) -> &BaseFields {
            &self.base
        }
        fn base_mut(&mut self) -> &mut BaseFields {
            &mut self.base
        }
    }

    #[test]
    fn test_new_fields_are_active_and_empty() {
        let base = BaseFields::new();
        assert!(base.is_active);
        assert!(base.extras.is_empty());
        assert_eq!(base.created_at, base.updated_at);
    }

    #[test]
    fn test_soft_delete_then_undelete_restores_active() {
        let mut probe = Probe { base: BaseFields::new() };

        assert!(probe.soft_delete());
        assert!(!probe.is_active());

        assert!(probe.undelete());
        assert!(probe.is_active());
    }

    #[test]
    fn test_soft_delete_twice_is_noop() {
        let mut probe = Probe { base: BaseFields::new() };

        assert!(probe.soft_delete());
        let stamp = probe.base.updated_at;
        assert!(!probe.soft_delete());
        assert!(!probe.is_active());
        assert_eq!(probe.base.updated_at, stamp);
    }

    #[test]
    fn test_undelete_active_is_noop() {
        let mut probe = Probe { base: BaseFields::new() };
        let before = probe.base.clone();

        assert!(!probe.undelete());
        assert_eq!(probe.base, before);
    }

    #[test]
    fn test_extras_json_roundtrip_and_rejects_non_objects() {
        let mut extras = Extras::new();
        extras.insert("license".into(), serde_json::json!("CC-BY"));

        let raw = extras_to_json(&extras);
        assert_eq!(extras_from_json(&raw).unwrap(), extras);
        assert!(extras_from_json("").unwrap().is_empty());
        assert!(extras_from_json("[1,2]").is_err());
    }
}
