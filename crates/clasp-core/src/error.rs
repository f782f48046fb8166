//! Error handling for the Clasp fact/value runtime
//!
//! Every failure is local and synchronous: it describes a caller-side contract
//! violation (wrong kind, stale id, bad index) of the single operation that
//! returned it. Mutating operations validate before they change any state, so
//! an error never leaves a store or index half updated.

use clasp_types::{FactId, TypeSet, ValueKind};
use thiserror::Error;

/// Error type for all runtime operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClaspError {
    /// A raw type code is not one of the seven supported kinds
    #[error("Invalid value kind code: {code}")]
    InvalidKind { code: i32 },

    /// A multifield range bound is negative, inverted, or past the end
    #[error("Invalid multifield range [{begin}, {end}]: {message}")]
    InvalidRange { begin: i64, end: i64, message: String },

    /// A 1-based multifield index is outside `[1, length]`
    #[error("Index {index} out of range for multifield of length {length}")]
    IndexOutOfRange { index: i64, length: usize },

    /// A value was read or written as a kind it does not have
    #[error("Kind mismatch: expected {expected}, found {actual}")]
    KindMismatch { expected: String, actual: String },

    /// A slot value violates the slot's type constraint
    #[error("Slot '{slot}' of template '{template}' expects {expected}, got {actual}")]
    SlotType { template: String, slot: String, expected: TypeSet, actual: ValueKind },

    /// A slot value violates an allowed-values, range or cardinality constraint
    #[error("Slot '{slot}' of template '{template}' rejected value: {message}")]
    SlotValue { template: String, slot: String, message: String },

    /// The fact id was never asserted or has been retracted
    #[error("Unknown fact: f-{fact_id}")]
    UnknownFact { fact_id: FactId },

    /// The template has no such slot, or is implied and has no named slots
    #[error("Template '{template}' has no slot '{slot}'")]
    UnknownSlot { template: String, slot: String },

    /// No template is registered under this name
    #[error("Unknown template: {name}")]
    UnknownTemplate { name: String },

    /// A template with this name already exists
    #[error("Template already defined: {name}")]
    DuplicateTemplate { name: String },

    /// The template definition, or the shape of the values given for it, is malformed
    #[error("Invalid template '{name}': {message}")]
    InvalidTemplate { name: String, message: String },

    /// The template cannot be removed while facts or patterns refer to it
    #[error("Template '{name}' is in use by {facts} fact(s) and {patterns} pattern(s)")]
    TemplateInUse { name: String, facts: usize, patterns: usize },

    /// A pattern or join definition is malformed
    #[error("Invalid pattern: {message}")]
    InvalidPattern { message: String },

    /// The pattern id is not registered
    #[error("Unknown pattern: {pattern_id}")]
    UnknownPattern { pattern_id: u64 },

    /// The join id is not registered
    #[error("Unknown join: {join_id}")]
    UnknownJoin { join_id: u64 },

    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {message}")]
    Configuration { setting: Option<String>, message: String },
}

impl ClaspError {
    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            ClaspError::InvalidKind { .. }
            | ClaspError::InvalidRange { .. }
            | ClaspError::IndexOutOfRange { .. }
            | ClaspError::KindMismatch { .. } => "value",
            ClaspError::SlotType { .. }
            | ClaspError::SlotValue { .. }
            | ClaspError::UnknownSlot { .. } => "slot",
            ClaspError::UnknownFact { .. } => "fact_store",
            ClaspError::UnknownTemplate { .. }
            | ClaspError::DuplicateTemplate { .. }
            | ClaspError::InvalidTemplate { .. }
            | ClaspError::TemplateInUse { .. } => "template",
            ClaspError::InvalidPattern { .. }
            | ClaspError::UnknownPattern { .. }
            | ClaspError::UnknownJoin { .. } => "pattern",
            ClaspError::Configuration { .. } => "configuration",
        }
    }

    /// Create a kind mismatch error
    pub fn kind_mismatch(expected: impl Into<String>, actual: impl ToString) -> Self {
        Self::KindMismatch { expected: expected.into(), actual: actual.to_string() }
    }

    /// Create an invalid range error
    pub fn invalid_range(begin: i64, end: i64, message: impl Into<String>) -> Self {
        Self::InvalidRange { begin, end, message: message.into() }
    }

    /// Create an unknown slot error
    pub fn unknown_slot(template: &str, slot: &str) -> Self {
        Self::UnknownSlot { template: template.to_string(), slot: slot.to_string() }
    }

    /// Create a slot value error
    pub fn slot_value(template: &str, slot: &str, message: impl Into<String>) -> Self {
        Self::SlotValue {
            template: template.to_string(),
            slot: slot.to_string(),
            message: message.into(),
        }
    }

    /// Create an invalid template error
    pub fn invalid_template(name: &str, message: impl Into<String>) -> Self {
        Self::InvalidTemplate { name: name.to_string(), message: message.into() }
    }

    /// Create an invalid pattern error
    pub fn invalid_pattern(message: impl Into<String>) -> Self {
        Self::InvalidPattern { message: message.into() }
    }

    /// Create a configuration error for a named setting
    pub fn configuration(setting: &str, message: impl Into<String>) -> Self {
        Self::Configuration { setting: Some(setting.to_string()), message: message.into() }
    }
}

/// Result type alias for runtime operations
pub type ClaspResult<T> = Result<T, ClaspError>;

impl From<serde_yaml::Error> for ClaspError {
    fn from(err: serde_yaml::Error) -> Self {
        ClaspError::Configuration { setting: None, message: format!("YAML error: {err}") }
    }
}

impl From<std::io::Error> for ClaspError {
    fn from(err: std::io::Error) -> Self {
        ClaspError::Configuration { setting: None, message: format!("I/O error: {err}") }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(ClaspError::InvalidKind { code: 9 }.category(), "value");
        assert_eq!(ClaspError::UnknownFact { fact_id: 1 }.category(), "fact_store");
        assert_eq!(ClaspError::unknown_slot("person", "age").category(), "slot");
        assert_eq!(ClaspError::invalid_pattern("empty join").category(), "pattern");
        assert_eq!(ClaspError::UnknownJoin { join_id: 4 }.category(), "pattern");
        assert_eq!(ClaspError::UnknownJoin { join_id: 4 }.to_string(), "Unknown join: 4");
        assert_eq!(
            ClaspError::configuration("symbol_purge_threshold", "must be positive").category(),
            "configuration"
        );
    }

    #[test]
    fn test_error_messages() {
        let err = ClaspError::SlotType {
            template: "person".to_string(),
            slot: "age".to_string(),
            expected: TypeSet::of(ValueKind::Integer),
            actual: ValueKind::Float,
        };
        assert_eq!(
            err.to_string(),
            "Slot 'age' of template 'person' expects (INTEGER), got FLOAT"
        );
        assert_eq!(ClaspError::UnknownFact { fact_id: 3 }.to_string(), "Unknown fact: f-3");
        assert_eq!(
            ClaspError::IndexOutOfRange { index: 0, length: 2 }.to_string(),
            "Index 0 out of range for multifield of length 2"
        );
    }
}
