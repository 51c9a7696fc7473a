//! Plain data types shared by fields, fieldgroups and storage.
//!
//! All persisted types serialize to/from YAML via serde.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Numeric field identifier. Zero means "not persisted yet".
pub type FieldId = i64;

/// Prefix of every per-field value table.
pub const TABLE_PREFIX: &str = "field_";

/// Bit set of field flags.
///
/// Unknown bits are kept as-is so a row read from storage writes back unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldFlags(i64);

impl FieldFlags {
    /// Value is loaded together with the page
    pub const AUTOJOIN: FieldFlags = FieldFlags(1);
    /// Every fieldgroup must contain this field
    pub const GLOBAL: FieldFlags = FieldFlags(4);

    pub const fn empty() -> Self {
        FieldFlags(0)
    }

    pub const fn from_bits(bits: i64) -> Self {
        FieldFlags(bits)
    }

    pub const fn bits(self) -> i64 {
        self.0
    }

    pub const fn contains(self, other: FieldFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: FieldFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: FieldFlags) {
        self.0 &= !other.0;
    }

    pub fn is_autojoin(self) -> bool {
        self.contains(Self::AUTOJOIN)
    }

    pub fn is_global(self) -> bool {
        self.contains(Self::GLOBAL)
    }
}

impl std::ops::BitOr for FieldFlags {
    type Output = FieldFlags;

    fn bitor(self, rhs: FieldFlags) -> FieldFlags {
        FieldFlags(self.0 | rhs.0)
    }
}

/// Row form of a field, as handed to storage.
///
/// Type-specific settings live under the reserved `data` key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldTableData {
    #[serde(default)]
    pub id: FieldId,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    pub name: String,
    #[serde(default)]
    pub flags: FieldFlags,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub data: IndexMap<String, Value>,
}

impl FieldTableData {
    /// Row for a new field with the given name and fieldtype.
    pub fn new(name: impl Into<String>, type_: impl Into<String>) -> Self {
        Self {
            id: 0,
            type_: Some(type_.into()),
            name: name.into(),
            flags: FieldFlags::empty(),
            label: String::new(),
            data: IndexMap::new(),
        }
    }

    pub fn with_id(mut self, id: FieldId) -> Self {
        self.id = id;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_flags(mut self, flags: FieldFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

/// An ordered set of fields forming the schema of a page template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fieldgroup {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldId>,
}

impl Fieldgroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a member; adding an existing member is a no-op.
    pub fn with_field(mut self, id: FieldId) -> Self {
        self.add(id);
        self
    }

    pub fn add(&mut self, id: FieldId) {
        if !self.has(id) {
            self.fields.push(id);
        }
    }

    pub fn remove(&mut self, id: FieldId) {
        self.fields.retain(|&f| f != id);
    }

    pub fn has(&self, id: FieldId) -> bool {
        self.fields.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.fields.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The page an inputfield is built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub id: i64,
    pub path: String,
}

impl Page {
    pub fn new(id: i64, path: impl Into<String>) -> Self {
        Self {
            id,
            path: path.into(),
        }
    }

    /// The home page, used where an inputfield needs some page to bind to.
    pub fn root() -> Self {
        Self::new(1, "/")
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flags_bit_operations() {
        let mut flags = FieldFlags::AUTOJOIN | FieldFlags::GLOBAL;
        assert_eq!(flags.bits(), 5);
        assert!(flags.is_autojoin());
        assert!(flags.is_global());

        flags.remove(FieldFlags::AUTOJOIN);
        assert!(!flags.is_autojoin());
        assert_eq!(flags.bits(), 4);
    }

    #[test]
    fn flags_keep_unknown_bits() {
        let flags = FieldFlags::from_bits(13);
        assert!(flags.is_autojoin());
        assert!(flags.is_global());
        assert_eq!(flags.bits(), 13);
    }

    #[test]
    fn table_data_serializes_type_key() {
        let row = FieldTableData::new("price", "integer")
            .with_id(3)
            .with_label("Price")
            .with_data("default", json!(10));
        let yaml = serde_yaml::to_string(&row).unwrap();
        assert!(yaml.contains("type: integer"));
        assert!(!yaml.contains("type_:"));
        assert!(yaml.contains("flags: 0"));
    }

    #[test]
    fn table_data_reads_minimal_yaml() {
        let yaml_input = r#"
name: body
type: text
flags: 1
"#;
        let row: FieldTableData = serde_yaml::from_str(yaml_input).unwrap();
        assert_eq!(row.id, 0);
        assert_eq!(row.name, "body");
        assert_eq!(row.type_.as_deref(), Some("text"));
        assert!(row.flags.is_autojoin());
        assert!(row.label.is_empty());
        assert!(row.data.is_empty());
    }

    #[test]
    fn fieldgroup_membership() {
        let mut group = Fieldgroup::new("basic-page").with_field(1).with_field(2);
        group.add(1);
        assert_eq!(group.len(), 2);
        assert!(group.has(2));

        group.remove(1);
        assert_eq!(group.iter().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn root_page_is_slash() {
        let page = Page::root();
        assert_eq!(page.to_string(), "/");
    }
}
