//! Structural validation against a target version (§4.7).
//!
//! No concrete schema registry ships with this crate (schema definition is
//! an adapter concern), so validation is driven by a declarative
//! [`SchemaRules`] the caller assembles once per message type: which
//! top-level fields were introduced at which version, and which were later
//! deprecated. A message that is simply newer-but-compatible is valid.

use crate::converter::{MessageVersion, Payload};

#[derive(Debug, Clone)]
pub struct FieldRule {
    pub field: String,
    pub introduced_in: MessageVersion,
    pub deprecated_in: Option<MessageVersion>,
}

impl FieldRule {
    pub fn new(field: impl Into<String>, introduced_in: MessageVersion) -> Self {
        Self { field: field.into(), introduced_in, deprecated_in: None }
    }

    pub fn deprecated_in(mut self, version: MessageVersion) -> Self {
        self.deprecated_in = Some(version);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaRules {
    pub fields: Vec<FieldRule>,
}

impl SchemaRules {
    pub fn new(fields: Vec<FieldRule>) -> Self {
        Self { fields }
    }

    fn rule_for(&self, field: &str) -> Option<&FieldRule> {
        self.fields.iter().find(|r| r.field == field)
    }
}

#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Checks every top-level property present in `msg` against `rules` for
/// `target_version`: a property introduced after `target_version` is a
/// structural error (the target schema doesn't have it yet); a property
/// that was deprecated at or before `target_version` is a warning.
pub fn validate(msg: &Payload, rules: &SchemaRules, target_version: MessageVersion) -> ValidationReport {
    let mut report = ValidationReport::default();

    let Some(object) = msg.as_object() else {
        return report;
    };

    for field in object.keys() {
        let Some(rule) = rules.rule_for(field) else {
            continue;
        };
        if rule.introduced_in > target_version {
            report.errors.push(ValidationIssue {
                field: field.clone(),
                message: format!("field '{field}' was introduced in {} but target is {target_version}", rule.introduced_in),
            });
            continue;
        }
        if let Some(deprecated_in) = rule.deprecated_in {
            if deprecated_in <= target_version {
                report.warnings.push(ValidationIssue {
                    field: field.clone(),
                    message: format!("field '{field}' was deprecated in {deprecated_in}"),
                });
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(major: u32, minor: u32, patch: u32) -> MessageVersion {
        MessageVersion::new(major, minor, patch)
    }

    fn rules() -> SchemaRules {
        SchemaRules::new(vec![
            FieldRule::new("shipping_address", v(1, 1, 0)),
            FieldRule::new("legacy_note", v(1, 0, 0)).deprecated_in(v(1, 2, 0)),
        ])
    }

    #[test]
    fn field_introduced_after_target_is_an_error() {
        let msg = serde_json::json!({ "shipping_address": "1 Main St" });
        let report = validate(&msg, &rules(), v(1, 0, 0));
        assert_eq!(report.errors.len(), 1);
        assert!(!report.is_valid());
    }

    #[test]
    fn deprecated_field_is_a_warning_not_an_error() {
        let msg = serde_json::json!({ "legacy_note": "hi" });
        let report = validate(&msg, &rules(), v(1, 2, 0));
        assert!(report.errors.is_empty());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.is_valid());
    }

    #[test]
    fn a_newer_compatible_message_with_known_fields_is_valid() {
        let msg = serde_json::json!({ "shipping_address": "1 Main St" });
        let report = validate(&msg, &rules(), v(1, 5, 0));
        assert!(report.is_valid());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn unknown_fields_are_not_flagged() {
        let msg = serde_json::json!({ "totally_new": true });
        let report = validate(&msg, &rules(), v(1, 0, 0));
        assert!(report.is_valid());
    }
}
