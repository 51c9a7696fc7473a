//! The field record: a named, typed attribute that pages carry through
//! fieldgroups.
//!
//! A [`Field`] holds its native attributes (`id`, `type`, `name`, `flags`,
//! `label`) plus an open [`FieldData`] map of type-specific settings. Renames
//! and fieldtype changes are recorded as pending markers that the
//! [`FieldStore`] consumes when the field is saved:
//!
//! ```rust
//! use wire_fields::{Field, FieldEnv, FieldNameSanitizer, FieldtypeRegistry};
//!
//! let sanitizer = FieldNameSanitizer::new();
//! let existing: Vec<Field> = Vec::new();
//! let fieldtypes = FieldtypeRegistry::builtin();
//! let env = FieldEnv::new(&sanitizer, &existing, &fieldtypes);
//!
//! let mut field = Field::new();
//! field.set_name("price", &env).unwrap();
//! field.set_name("cost", &env).unwrap();
//! assert_eq!(field.prev_table(), Some("field_price"));
//! assert_eq!(field.table(), "field_cost");
//! ```

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::data::{coerce_int, is_truthy, value_to_string, FieldData};
use crate::error::{FieldsError, Result};
use crate::fieldtype::{Fieldtype, FieldtypeRef, FieldtypeRegistry};
use crate::inputfield::{Inputfield, InputfieldFieldset, InputfieldWrapper};
use crate::sanitizer::{is_native_name, FieldEnv};
use crate::store::FieldStore;
use crate::types::{FieldFlags, FieldId, FieldTableData, Fieldgroup, Page, TABLE_PREFIX};

/// A value table that must be renamed when the field is saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRename {
    pub from: String,
    pub to: String,
}

/// A fieldtype change whose stored values must be migrated on save.
#[derive(Debug, Clone)]
pub struct Retype {
    pub from: Arc<dyn Fieldtype>,
    pub to: Arc<dyn Fieldtype>,
}

/// Work a store has to do before the field's new state is consistent.
#[derive(Debug, Clone, Default)]
pub struct PendingChanges {
    pub rename: Option<TableRename>,
    pub retype: Option<Retype>,
}

impl PendingChanges {
    pub fn is_empty(&self) -> bool {
        self.rename.is_none() && self.retype.is_none()
    }
}

/// A field definition.
#[derive(Clone, Default)]
pub struct Field {
    id: FieldId,
    fieldtype: Option<Arc<dyn Fieldtype>>,
    name: String,
    flags: FieldFlags,
    label: String,
    data: FieldData,
    prev_table: Option<String>,
    prev_fieldtype: Option<Arc<dyn Fieldtype>>,
    changes: Vec<String>,
}

impl Field {
    /// An unsaved field with no name and no fieldtype.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a field from a stored row.
    ///
    /// Sanitizing and uniqueness checks are skipped: rows come from storage
    /// that already enforced them. The name must still be non-empty, free of
    /// `__` and not reserved. Fails if the row names an unregistered fieldtype.
    pub fn from_table_data(row: FieldTableData, fieldtypes: &FieldtypeRegistry) -> Result<Self> {
        check_stored_name(&row.name)?;
        let fieldtype = match row.type_ {
            Some(name) => Some(
                fieldtypes
                    .get(&name)
                    .ok_or(FieldsError::UnknownFieldtype { name })?,
            ),
            None => None,
        };
        Ok(Self {
            id: row.id,
            fieldtype,
            name: row.name,
            flags: row.flags,
            label: row.label,
            data: FieldData::from(row.data),
            prev_table: None,
            prev_fieldtype: None,
            changes: Vec::new(),
        })
    }

    // --- Native attributes ---

    pub fn id(&self) -> FieldId {
        self.id
    }

    pub fn set_id(&mut self, id: FieldId) -> &mut Self {
        self.id = id;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: impl Into<String>) -> &mut Self {
        self.label = label.into();
        self
    }

    pub fn flags(&self) -> FieldFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: FieldFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    pub fn fieldtype(&self) -> Option<&Arc<dyn Fieldtype>> {
        self.fieldtype.as_ref()
    }

    pub fn data(&self) -> &FieldData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut FieldData {
        &mut self.data
    }

    /// Name of the table holding this field's values, computed from the
    /// current name.
    pub fn table(&self) -> String {
        format!("{TABLE_PREFIX}{}", self.name)
    }

    /// The `default` setting, if set to a truthy value.
    pub fn default_value(&self) -> Option<&Value> {
        self.data.get("default").filter(|v| is_truthy(v))
    }

    // --- Keyed access ---

    /// Read a native attribute, a pending marker, `table`, or a data setting.
    ///
    /// The fieldtype (`type`, `prevFieldtype`) is reported by name.
    pub fn get(&self, key: &str) -> Option<Value> {
        match key {
            "table" => Some(Value::String(self.table())),
            "prevTable" => self.prev_table.clone().map(Value::String),
            "prevFieldtype" => self
                .prev_fieldtype
                .as_ref()
                .map(|t| Value::String(t.name().to_string())),
            "id" => Some(Value::from(self.id)),
            "type" => self
                .fieldtype
                .as_ref()
                .map(|t| Value::String(t.name().to_string())),
            "name" => Some(Value::String(self.name.clone())),
            "flags" => Some(Value::from(self.flags.bits())),
            "label" => Some(Value::String(self.label.clone())),
            _ => self.data.get(key).cloned(),
        }
    }

    /// Write a native attribute, a pending marker, or a data setting.
    ///
    /// `name` and a truthy `type` go through [`Field::set_name`] and
    /// [`Field::set_fieldtype`]. `id` and `flags` are coerced to integers.
    /// Unknown keys land in [`Field::data`].
    pub fn set(&mut self, key: &str, value: Value, env: &FieldEnv<'_>) -> Result<&mut Self> {
        match key {
            "name" => return self.set_name(&value_to_string(&value), env),
            "type" if is_truthy(&value) => {
                return match value {
                    Value::String(name) => self.set_fieldtype(name, env.fieldtypes),
                    other => Err(FieldsError::invalid_fieldtype(format!(
                        "expected a fieldtype name, got {other}"
                    ))),
                };
            }
            "type" => self.fieldtype = None,
            "prevTable" => {
                self.prev_table = is_truthy(&value).then(|| value_to_string(&value));
            }
            "prevFieldtype" => {
                self.prev_fieldtype = match value {
                    Value::String(name) if !name.is_empty() => Some(
                        env.fieldtypes
                            .get(&name)
                            .ok_or(FieldsError::UnknownFieldtype { name })?,
                    ),
                    other if !is_truthy(&other) => None,
                    other => {
                        return Err(FieldsError::invalid_fieldtype(format!(
                            "expected a fieldtype name, got {other}"
                        )))
                    }
                };
            }
            "id" => self.id = coerce_int(&value),
            "flags" => self.flags = FieldFlags::from_bits(coerce_int(&value)),
            "label" => self.label = value_to_string(&value),
            _ => {
                if self.data.set(key, value) {
                    self.track_change(key);
                }
            }
        }
        Ok(self)
    }

    // --- Validated setters ---

    /// Sanitize, validate and store a new name.
    ///
    /// Nothing changes unless every check passes. Renaming a field that
    /// already had a name records the old table in [`Field::prev_table`].
    pub fn set_name(&mut self, name: &str, env: &FieldEnv<'_>) -> Result<&mut Self> {
        let name = env.sanitizer.field_name(name);

        if name.is_empty() {
            return Err(FieldsError::invalid_name(name, "name may not be empty"));
        }

        if env.fields.is_reserved_name(&name) {
            return Err(FieldsError::ReservedName { name });
        }

        if let Some(existing) = env.fields.find_by_name(&name) {
            // A `__` name is invalid whoever owns it; the check below reports it.
            if existing.id() != self.id && !name.contains("__") {
                return Err(FieldsError::DuplicateName { name });
            }
        }

        if name.contains("__") {
            return Err(FieldsError::invalid_name(
                name,
                "double underscores are reserved for internal use",
            ));
        }

        if self.name != name {
            self.track_change("name");
            // The first pending rename wins: its table is the one in storage.
            if !self.name.is_empty() && self.prev_table.is_none() {
                self.prev_table = Some(self.table());
            }
            debug!(field_id = self.id, from = %self.name, to = %name, "field renamed");
        }

        self.name = name;
        Ok(self)
    }

    /// Assign a fieldtype, given directly or by registered name.
    ///
    /// Switching to a fieldtype with a different name records the previous
    /// one in [`Field::prev_fieldtype`] so stored values can be migrated.
    pub fn set_fieldtype(
        &mut self,
        fieldtype: impl Into<FieldtypeRef>,
        fieldtypes: &FieldtypeRegistry,
    ) -> Result<&mut Self> {
        let fieldtype = match fieldtype.into() {
            FieldtypeRef::Type(fieldtype) => fieldtype,
            FieldtypeRef::Name(name) => fieldtypes
                .get(&name)
                .ok_or(FieldsError::UnknownFieldtype { name })?,
        };

        let changed = self
            .fieldtype
            .as_ref()
            .map_or(true, |current| current.name() != fieldtype.name());

        if changed {
            self.track_change(&format!("type:{}", fieldtype.name()));
            if let Some(current) = &self.fieldtype {
                if self.prev_fieldtype.is_none() {
                    self.prev_fieldtype = Some(Arc::clone(current));
                }
                debug!(
                    field = %self.name,
                    from = current.name(),
                    to = fieldtype.name(),
                    "fieldtype changed"
                );
            }
        }

        self.fieldtype = Some(fieldtype);
        Ok(self)
    }

    // --- Pending markers ---

    pub fn prev_table(&self) -> Option<&str> {
        self.prev_table.as_deref()
    }

    pub fn set_prev_table(&mut self, table: Option<String>) -> &mut Self {
        self.prev_table = table;
        self
    }

    pub fn prev_fieldtype(&self) -> Option<&Arc<dyn Fieldtype>> {
        self.prev_fieldtype.as_ref()
    }

    pub fn set_prev_fieldtype(&mut self, fieldtype: Option<Arc<dyn Fieldtype>>) -> &mut Self {
        self.prev_fieldtype = fieldtype;
        self
    }

    /// The rename and retype a store must carry out for this field.
    ///
    /// A marker that no longer differs from the current state (renamed back,
    /// or switched back to the original fieldtype) yields no work.
    pub fn pending(&self) -> PendingChanges {
        let table = self.table();
        let rename = self
            .prev_table
            .as_ref()
            .filter(|prev| **prev != table)
            .map(|prev| TableRename {
                from: prev.clone(),
                to: table,
            });

        let retype = match (&self.prev_fieldtype, &self.fieldtype) {
            (Some(from), Some(to)) if from.name() != to.name() => Some(Retype {
                from: Arc::clone(from),
                to: Arc::clone(to),
            }),
            _ => None,
        };

        PendingChanges { rename, retype }
    }

    /// Drop both pending markers. Called by stores after a successful save.
    pub fn clear_pending(&mut self) {
        self.prev_table = None;
        self.prev_fieldtype = None;
    }

    // --- Change tracking ---

    /// Whether `what` changed. `"type"` matches any `"type:<name>"` entry.
    pub fn is_changed(&self, what: &str) -> bool {
        self.changes.iter().any(|c| {
            c == what || (what == "type" && c.starts_with("type:"))
        })
    }

    pub fn changes(&self) -> &[String] {
        &self.changes
    }

    pub fn reset_track_changes(&mut self) {
        self.changes.clear();
    }

    fn track_change(&mut self, what: &str) {
        if !self.changes.iter().any(|c| c == what) {
            self.changes.push(what.to_string());
        }
    }

    // --- Persistence ---

    /// Save through `store`, which also performs any pending rename or retype.
    pub async fn save<S>(&mut self, store: &mut S) -> Result<bool>
    where
        S: FieldStore + ?Sized,
    {
        store.save_field(self).await
    }

    /// Row for storage: native attributes plus `data`.
    pub fn table_data(&self) -> FieldTableData {
        FieldTableData {
            id: self.id,
            type_: self.fieldtype.as_ref().map(|t| t.name().to_string()),
            name: self.name.clone(),
            flags: self.flags,
            label: self.label.clone(),
            data: self.data.as_map().clone(),
        }
    }

    // --- Fieldgroups ---

    /// The fieldgroups among `fieldgroups` that contain this field.
    pub fn fieldgroups<'a, I>(&self, fieldgroups: I) -> Vec<&'a Fieldgroup>
    where
        I: IntoIterator<Item = &'a Fieldgroup>,
    {
        fieldgroups
            .into_iter()
            .filter(|group| group.iter().any(|id| id == self.id))
            .collect()
    }

    /// Number of fieldgroups among `fieldgroups` that contain this field.
    pub fn num_fieldgroups<'a, I>(&self, fieldgroups: I) -> usize
    where
        I: IntoIterator<Item = &'a Fieldgroup>,
    {
        self.fieldgroups(fieldgroups).len()
    }

    // --- Inputfields ---

    /// Inputfield for editing this field's value on `page`, configured from
    /// the field's name, label and the data settings the widget recognizes.
    pub fn inputfield(&self, page: &Page) -> Option<Box<dyn Inputfield>> {
        let fieldtype = self.fieldtype.as_ref()?;
        let mut inputfield = fieldtype.inputfield(page, self)?;

        inputfield.set_name(&self.name);
        inputfield.set_label(&self.label);

        for (key, value) in self.data.iter() {
            if inputfield.has(key) {
                inputfield.set(key, value.clone());
            }
        }

        Some(inputfield)
    }

    /// Inputfields for editing this field's settings.
    ///
    /// The "Fieldtype Settings" fieldset is only included when the fieldtype
    /// contributes inputs; the "Inputfield Settings" fieldset is always last.
    pub fn config_inputfields(&self) -> Result<InputfieldWrapper> {
        let fieldtype = self
            .fieldtype
            .as_ref()
            .ok_or_else(|| FieldsError::MissingFieldtype {
                field: self.name.clone(),
            })?;

        let mut wrapper = InputfieldWrapper::new();

        let mut fieldtype_settings = InputfieldFieldset::new();
        fieldtype_settings.set_label("Fieldtype Settings");
        fieldtype_settings.set_description(&format!(
            "The following settings are requested by {}",
            fieldtype.name()
        ));
        for inputfield in fieldtype.config_inputfields(self) {
            fieldtype_settings.append(inputfield);
        }
        if !fieldtype_settings.is_empty() {
            wrapper.append(Box::new(fieldtype_settings));
        }

        let mut inputfield_settings = InputfieldFieldset::new();
        // Any page will do; the widget is only built to ask for its settings.
        if let Some(inputfield) = self.inputfield(&Page::root()) {
            inputfield_settings.set_label("Inputfield Settings");
            inputfield_settings.set_description(&format!(
                "The following settings are requested by {}, which accompanies {}",
                inputfield.class_name(),
                fieldtype.name()
            ));
            for config in inputfield.config_inputfields() {
                inputfield_settings.append(config);
            }
        }
        wrapper.append(Box::new(inputfield_settings));

        Ok(wrapper)
    }
}

/// Rules every stored name obeys, independent of sanitizer and uniqueness.
pub(crate) fn check_stored_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(FieldsError::invalid_name(name, "name may not be empty"));
    }
    if is_native_name(name) {
        return Err(FieldsError::ReservedName {
            name: name.to_string(),
        });
    }
    if name.contains("__") {
        return Err(FieldsError::invalid_name(
            name,
            "double underscores are reserved for internal use",
        ));
    }
    Ok(())
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("id", &self.id)
            .field("type", &self.fieldtype.as_ref().map(|t| t.name()))
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("label", &self.label)
            .field("data", &self.data)
            .field("prev_table", &self.prev_table)
            .field(
                "prev_fieldtype",
                &self.prev_fieldtype.as_ref().map(|t| t.name()),
            )
            .finish()
    }
}
