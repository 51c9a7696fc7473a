//! Field definitions for Wire content records
//!
//! `wire-fields` models a *field*: a named, typed attribute attached to pages
//! through fieldgroups. A [`Field`] carries native attributes, an open map of
//! type-specific settings, and change tracking for the two edits that need
//! follow-up work in storage: renames (the value table moves) and fieldtype
//! changes (stored values are migrated).
//!
//! # Architecture
//!
//! - **Field**: validated, change-tracked record; setters never touch storage
//! - **Fieldtype / Inputfield**: traits for pluggable value types and their widgets
//! - **FieldEnv**: the sanitizer, field lookup and fieldtype registry a setter consults
//! - **FieldStore**: persistence seam; [`FieldsContext`] is the YAML, file-backed store

pub mod builtin;
pub mod context;
pub mod data;
pub mod error;
pub mod field;
pub mod fieldtype;
pub mod inputfield;
pub mod sanitizer;
pub mod store;
pub mod types;

pub use builtin::{FieldtypeInteger, FieldtypeText, InputfieldInteger, InputfieldText};
pub use context::{FieldDefaults, FieldsContext, FieldsContextBuilder, ValueTable};
pub use data::FieldData;
pub use error::{FieldsError, Result};
pub use field::{Field, PendingChanges, Retype, TableRename};
pub use fieldtype::{Fieldtype, FieldtypeRef, FieldtypeRegistry};
pub use inputfield::{Inputfield, InputfieldFieldset, InputfieldSettings, InputfieldWrapper};
pub use sanitizer::{
    is_native_name, FieldEnv, FieldLookup, FieldNameSanitizer, NameSanitizer, MAX_NAME_LENGTH,
    NATIVE_NAMES,
};
pub use store::FieldStore;
pub use types::{FieldFlags, FieldId, FieldTableData, Fieldgroup, Page, TABLE_PREFIX};
