//! Field name sanitizing and the lookups used to validate a proposed name.

use std::sync::OnceLock;

use regex::Regex;

use crate::field::Field;
use crate::fieldtype::FieldtypeRegistry;

/// Longest field name the default sanitizer keeps.
pub const MAX_NAME_LENGTH: usize = 128;

/// Page properties that a field may never shadow.
pub const NATIVE_NAMES: &[&str] = &[
    "id",
    "parent",
    "parent_id",
    "parents",
    "template",
    "templates_id",
    "templates",
    "name",
    "status",
    "created",
    "modified",
    "created_users_id",
    "modified_users_id",
    "createdUser",
    "modifiedUser",
    "url",
    "path",
    "numChildren",
    "children",
    "child",
    "sort",
    "sortfield",
    "fields",
    "has_parent",
    "limit",
    "start",
    "include",
    "check_access",
];

/// True if `name` is one of [`NATIVE_NAMES`].
pub fn is_native_name(name: &str) -> bool {
    NATIVE_NAMES.contains(&name)
}

/// Turns arbitrary input into a candidate field name.
pub trait NameSanitizer: Send + Sync {
    fn field_name(&self, raw: &str) -> String;
}

static INVALID_NAME_CHARS: OnceLock<Regex> = OnceLock::new();

fn invalid_name_chars() -> &'static Regex {
    INVALID_NAME_CHARS
        .get_or_init(|| Regex::new(r"[^A-Za-z0-9_]").expect("Invalid field name regex"))
}

/// Default sanitizer: trims whitespace, replaces every character outside
/// `[A-Za-z0-9_]` with `_` and truncates to `max_length` characters.
///
/// Runs of underscores are left alone so the double-underscore check still
/// sees them.
#[derive(Debug, Clone)]
pub struct FieldNameSanitizer {
    max_length: usize,
}

impl FieldNameSanitizer {
    pub fn new() -> Self {
        Self {
            max_length: MAX_NAME_LENGTH,
        }
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }
}

impl Default for FieldNameSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

impl NameSanitizer for FieldNameSanitizer {
    fn field_name(&self, raw: &str) -> String {
        let replaced = invalid_name_chars().replace_all(raw.trim(), "_");
        replaced.chars().take(self.max_length).collect()
    }
}

/// Read access to the existing fields, used for uniqueness checks.
pub trait FieldLookup {
    /// Find an existing field by name.
    fn find_by_name(&self, name: &str) -> Option<&Field>;

    /// Whether `name` is reserved. Defaults to the native page properties.
    fn is_reserved_name(&self, name: &str) -> bool {
        is_native_name(name)
    }
}

impl FieldLookup for [Field] {
    fn find_by_name(&self, name: &str) -> Option<&Field> {
        self.iter().find(|f| f.name() == name)
    }
}

impl FieldLookup for Vec<Field> {
    fn find_by_name(&self, name: &str) -> Option<&Field> {
        self.as_slice().find_by_name(name)
    }
}

/// Everything a field setter may consult: the sanitizer, the existing
/// fields and the fieldtype registry.
#[derive(Clone, Copy)]
pub struct FieldEnv<'a> {
    pub sanitizer: &'a dyn NameSanitizer,
    pub fields: &'a dyn FieldLookup,
    pub fieldtypes: &'a FieldtypeRegistry,
}

impl<'a> FieldEnv<'a> {
    pub fn new(
        sanitizer: &'a dyn NameSanitizer,
        fields: &'a dyn FieldLookup,
        fieldtypes: &'a FieldtypeRegistry,
    ) -> Self {
        Self {
            sanitizer,
            fields,
            fieldtypes,
        }
    }
}
