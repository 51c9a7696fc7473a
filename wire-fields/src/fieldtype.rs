//! Fieldtypes and the registry that resolves them by name.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::builtin::{FieldtypeInteger, FieldtypeText};
use crate::field::Field;
use crate::inputfield::Inputfield;
use crate::types::Page;

/// Pluggable behavior defining how a field's value is input and migrated.
pub trait Fieldtype: Send + Sync + fmt::Debug {
    /// Registry name, e.g. `text`.
    fn name(&self) -> &str;

    /// Widget for editing the field's value on `page`. `None` if this
    /// fieldtype has no input.
    fn inputfield(&self, page: &Page, field: &Field) -> Option<Box<dyn Inputfield>>;

    /// Widgets for the fieldtype-specific settings of `field`.
    fn config_inputfields(&self, _field: &Field) -> Vec<Box<dyn Inputfield>> {
        Vec::new()
    }

    /// Convert a value stored by `from` into this fieldtype's representation.
    /// `None` drops the value.
    fn convert_value(&self, _from: &dyn Fieldtype, value: Value) -> Option<Value> {
        Some(value)
    }
}

/// Argument to [`Field::set_fieldtype`]: a fieldtype or the name of one.
#[derive(Debug, Clone)]
pub enum FieldtypeRef {
    Type(Arc<dyn Fieldtype>),
    Name(String),
}

impl From<Arc<dyn Fieldtype>> for FieldtypeRef {
    fn from(fieldtype: Arc<dyn Fieldtype>) -> Self {
        Self::Type(fieldtype)
    }
}

impl From<&Arc<dyn Fieldtype>> for FieldtypeRef {
    fn from(fieldtype: &Arc<dyn Fieldtype>) -> Self {
        Self::Type(Arc::clone(fieldtype))
    }
}

impl From<&str> for FieldtypeRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for FieldtypeRef {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

/// Fieldtypes keyed by name, in registration order.
#[derive(Debug, Clone, Default)]
pub struct FieldtypeRegistry {
    types: IndexMap<String, Arc<dyn Fieldtype>>,
}

impl FieldtypeRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in `text` and `integer` fieldtypes.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(FieldtypeText);
        registry.register(FieldtypeInteger);
        registry
    }

    /// Register a fieldtype, replacing any previous one with the same name.
    pub fn register(&mut self, fieldtype: impl Fieldtype + 'static) -> Arc<dyn Fieldtype> {
        let fieldtype: Arc<dyn Fieldtype> = Arc::new(fieldtype);
        self.types
            .insert(fieldtype.name().to_string(), Arc::clone(&fieldtype));
        fieldtype
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Fieldtype>> {
        self.types.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
