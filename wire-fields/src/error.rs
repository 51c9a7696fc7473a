//! Error types for field definitions and field storage

use thiserror::Error;

use crate::types::FieldId;

/// Result type for fields operations
pub type Result<T> = std::result::Result<T, FieldsError>;

/// Errors that can occur when editing or persisting fields
#[derive(Debug, Error)]
pub enum FieldsError {
    /// Name collides with a native page property
    #[error("field may not be named '{name}' because it is a reserved word")]
    ReservedName { name: String },

    /// Name is owned by another field
    #[error("field may not be named '{name}' because it is already used by another field")]
    DuplicateName { name: String },

    /// Name is malformed
    #[error("invalid field name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// No fieldtype registered under this name
    #[error("fieldtype '{name}' does not exist")]
    UnknownFieldtype { name: String },

    /// Value given as a fieldtype is neither a fieldtype nor a fieldtype name
    #[error("invalid fieldtype: {message}")]
    InvalidFieldtype { message: String },

    /// Operation needs a fieldtype but none is assigned
    #[error("field '{field}' has no fieldtype assigned")]
    MissingFieldtype { field: String },

    /// Field not found by name
    #[error("field not found: {name}")]
    FieldNotFound { name: String },

    /// Field not found by id
    #[error("field not found by id: {id}")]
    FieldNotFoundById { id: FieldId },

    /// Fieldgroup not found
    #[error("fieldgroup not found: {name}")]
    FieldgroupNotFound { name: String },

    /// Field is still a member of fieldgroups
    #[error("field '{name}' is used by {count} fieldgroup(s) and cannot be deleted")]
    FieldInUse { name: String, count: usize },

    /// Fieldgroup lacks a field flagged as global
    #[error("fieldgroup '{fieldgroup}' must contain global field '{field}'")]
    MissingGlobalField { fieldgroup: String, field: String },

    /// A rename would overwrite a value table that is already on disk
    #[error("value table '{table}' already exists")]
    TableExists { table: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl FieldsError {
    /// Create an invalid name error
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid fieldtype error
    pub fn invalid_fieldtype(message: impl Into<String>) -> Self {
        Self::InvalidFieldtype {
            message: message.into(),
        }
    }

    /// True for errors caused by a rejected field name
    pub fn is_name_error(&self) -> bool {
        matches!(
            self,
            Self::ReservedName { .. } | Self::DuplicateName { .. } | Self::InvalidName { .. }
        )
    }
}
