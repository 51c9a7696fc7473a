//! FieldsContext: file-backed storage for fields, fieldgroups and field values.
//!
//! Field definitions and fieldgroups are YAML files under the context root.
//! Each field also owns a value table (`tables/field_<name>.yaml`) mapping
//! page ids to stored values. Saving a field compares it with the stored
//! definition of the same id and renames or migrates the value table to
//! match, so the table always follows the definition.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tracing::{debug, warn};
use ulid::Ulid;

use crate::error::{FieldsError, Result};
use crate::field::{check_stored_name, Field, Retype, TableRename};
use crate::fieldtype::FieldtypeRegistry;
use crate::sanitizer::{FieldEnv, FieldLookup, FieldNameSanitizer, NameSanitizer};
use crate::store::FieldStore;
use crate::types::{FieldId, FieldTableData, Fieldgroup, TABLE_PREFIX};

/// Stored values of one field, keyed by page id.
pub type ValueTable = BTreeMap<i64, Value>;

/// A collection of default field definitions and fieldgroups.
///
/// Consumers build this to pass to `FieldsContextBuilder::with_defaults()`.
/// On open, defaults that don't already exist on disk are written.
pub struct FieldDefaults {
    fields: Vec<FieldTableData>,
    fieldgroups: Vec<Fieldgroup>,
}

impl FieldDefaults {
    pub fn new() -> Self {
        Self {
            fields: Vec::new(),
            fieldgroups: Vec::new(),
        }
    }

    /// Add a default field definition. Defaults need a fixed, non-zero id.
    pub fn field(mut self, row: FieldTableData) -> Self {
        self.fields.push(row);
        self
    }

    /// Add a default fieldgroup.
    pub fn fieldgroup(mut self, group: Fieldgroup) -> Self {
        self.fieldgroups.push(group);
        self
    }

    pub fn fields(&self) -> &[FieldTableData] {
        &self.fields
    }

    pub fn fieldgroups(&self) -> &[Fieldgroup] {
        &self.fieldgroups
    }
}

impl Default for FieldDefaults {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `FieldsContext`. Created by `FieldsContext::open()`.
pub struct FieldsContextBuilder {
    root: PathBuf,
    defaults: Option<FieldDefaults>,
    fieldtypes: Option<FieldtypeRegistry>,
    sanitizer: Option<Box<dyn NameSanitizer>>,
}

impl FieldsContextBuilder {
    /// Provide default fields and fieldgroups.
    /// Defaults are seeded on first open; existing definitions are preserved.
    pub fn with_defaults(mut self, defaults: FieldDefaults) -> Self {
        self.defaults = Some(defaults);
        self
    }

    /// Fieldtypes used to resolve stored fields. Defaults to
    /// [`FieldtypeRegistry::builtin`].
    pub fn with_fieldtypes(mut self, fieldtypes: FieldtypeRegistry) -> Self {
        self.fieldtypes = Some(fieldtypes);
        self
    }

    /// Sanitizer applied to new field names. Defaults to [`FieldNameSanitizer`].
    pub fn with_sanitizer(mut self, sanitizer: impl NameSanitizer + 'static) -> Self {
        self.sanitizer = Some(Box::new(sanitizer));
        self
    }

    /// Build the context: create directories, seed defaults, load from disk.
    pub async fn build(self) -> Result<FieldsContext> {
        let root = self.root;

        fs::create_dir_all(root.join("fields")).await?;
        fs::create_dir_all(root.join("fieldgroups")).await?;
        fs::create_dir_all(root.join("tables")).await?;

        if let Some(defaults) = self.defaults {
            seed_defaults(&root, &defaults).await?;
        }

        let mut ctx = FieldsContext {
            root,
            fieldtypes: self.fieldtypes.unwrap_or_else(FieldtypeRegistry::builtin),
            sanitizer: self
                .sanitizer
                .unwrap_or_else(|| Box::new(FieldNameSanitizer::new()) as Box<dyn NameSanitizer>),
            fields: Vec::new(),
            fieldgroups: Vec::new(),
            name_index: HashMap::new(),
            id_index: HashMap::new(),
            fieldgroup_index: HashMap::new(),
        };

        ctx.load_fields().await?;
        ctx.load_fieldgroups().await?;

        debug!(
            fields = ctx.fields.len(),
            fieldgroups = ctx.fieldgroups.len(),
            "fields context opened"
        );

        Ok(ctx)
    }
}

/// Seed defaults that don't already exist on disk.
///
/// Fields are matched by id: if a definition with that id exists (even if
/// renamed), the default is skipped. Fieldgroups are matched by name.
async fn seed_defaults(root: &Path, defaults: &FieldDefaults) -> Result<()> {
    let fields_dir = root.join("fields");
    let fieldgroups_dir = root.join("fieldgroups");

    let existing_ids = collect_existing_field_ids(&fields_dir).await?;

    for row in &defaults.fields {
        if existing_ids.contains(&row.id) {
            continue;
        }
        check_stored_name(&row.name)?;
        let yaml = serde_yaml::to_string(row)?;
        atomic_write(&fields_dir.join(format!("{}.yaml", row.name)), yaml.as_bytes()).await?;

        let table = root
            .join("tables")
            .join(format!("{TABLE_PREFIX}{}.yaml", row.name));
        if !table.exists() {
            write_table(&table, &ValueTable::new()).await?;
        }
        debug!(name = %row.name, id = row.id, "seeded default field");
    }

    for group in &defaults.fieldgroups {
        let path = fieldgroups_dir.join(format!("{}.yaml", group.name));
        if !path.exists() {
            let yaml = serde_yaml::to_string(group)?;
            atomic_write(&path, yaml.as_bytes()).await?;
            debug!(name = %group.name, "seeded default fieldgroup");
        }
    }

    Ok(())
}

/// Read all .yaml files in fields/ and extract their ids.
async fn collect_existing_field_ids(fields_dir: &Path) -> Result<Vec<FieldId>> {
    let mut ids = Vec::new();
    if !fields_dir.exists() {
        return Ok(ids);
    }
    let mut entries = fs::read_dir(fields_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
            continue;
        }
        if let Ok(content) = fs::read_to_string(&path).await {
            if let Ok(row) = serde_yaml::from_str::<FieldTableData>(&content) {
                ids.push(row.id);
            }
        }
    }
    Ok(ids)
}

/// Context for fields, fieldgroups and field values.
///
/// Owns a directory on disk with the structure:
/// ```text
/// root/
///   fields/        ← one .yaml per field definition
///   fieldgroups/   ← one .yaml per fieldgroup
///   tables/        ← one field_<name>.yaml per field, page id → value
/// ```
pub struct FieldsContext {
    root: PathBuf,
    fieldtypes: FieldtypeRegistry,
    sanitizer: Box<dyn NameSanitizer>,
    fields: Vec<Field>,
    fieldgroups: Vec<Fieldgroup>,
    name_index: HashMap<String, usize>,
    id_index: HashMap<FieldId, usize>,
    fieldgroup_index: HashMap<String, usize>,
}

impl FieldsContext {
    /// Open or create a fields directory. Returns a builder for optional configuration.
    ///
    /// ```rust,ignore
    /// // Simple open:
    /// let ctx = FieldsContext::open(path).build().await?;
    ///
    /// // With defaults:
    /// let ctx = FieldsContext::open(path)
    ///     .with_defaults(my_defaults())
    ///     .build()
    ///     .await?;
    /// ```
    pub fn open(root: impl Into<PathBuf>) -> FieldsContextBuilder {
        FieldsContextBuilder {
            root: root.into(),
            defaults: None,
            fieldtypes: None,
            sanitizer: None,
        }
    }

    /// Environment for validating edits to fields of this context.
    pub fn env(&self) -> FieldEnv<'_> {
        FieldEnv::new(self.sanitizer.as_ref(), self, &self.fieldtypes)
    }

    pub fn fieldtypes(&self) -> &FieldtypeRegistry {
        &self.fieldtypes
    }

    /// An unsaved field with a validated name and a fieldtype.
    pub fn new_field(&self, name: &str, fieldtype: &str) -> Result<Field> {
        let mut field = Field::new();
        field
            .set_fieldtype(fieldtype, &self.fieldtypes)?
            .set_name(name, &self.env())?;
        Ok(field)
    }

    // --- Fields ---

    /// Get a field by name.
    pub fn get_field_by_name(&self, name: &str) -> Option<&Field> {
        self.name_index.get(name).map(|&i| &self.fields[i])
    }

    /// Get a field by id.
    pub fn get_field_by_id(&self, id: FieldId) -> Option<&Field> {
        self.id_index.get(&id).map(|&i| &self.fields[i])
    }

    /// All fields.
    pub fn all_fields(&self) -> &[Field] {
        &self.fields
    }

    /// Delete a field by id. Fails while any fieldgroup still uses it.
    pub async fn delete_field(&mut self, id: FieldId) -> Result<()> {
        let idx = self
            .id_index
            .get(&id)
            .copied()
            .ok_or(FieldsError::FieldNotFoundById { id })?;

        let field = &self.fields[idx];
        let count = field.num_fieldgroups(&self.fieldgroups);
        if count > 0 {
            return Err(FieldsError::FieldInUse {
                name: field.name().to_string(),
                count,
            });
        }

        let _ = fs::remove_file(self.definition_path(field.name())).await;
        let _ = fs::remove_file(self.table_path(&field.table())).await;

        let name = field.name().to_string();
        self.name_index.remove(&name);
        self.id_index.remove(&id);

        // Swap-remove and fix indexes
        self.fields.swap_remove(idx);
        if idx < self.fields.len() {
            let moved = &self.fields[idx];
            self.name_index.insert(moved.name().to_string(), idx);
            self.id_index.insert(moved.id(), idx);
        }

        debug!(%name, id, "deleted field");
        Ok(())
    }

    // --- Fieldgroups ---

    /// Get a fieldgroup by name.
    pub fn get_fieldgroup(&self, name: &str) -> Option<&Fieldgroup> {
        self.fieldgroup_index
            .get(name)
            .map(|&i| &self.fieldgroups[i])
    }

    /// All fieldgroups.
    pub fn all_fieldgroups(&self) -> &[Fieldgroup] {
        &self.fieldgroups
    }

    /// Write (create or update) a fieldgroup. Every member must exist and
    /// every global field must be a member.
    pub async fn write_fieldgroup(&mut self, group: &Fieldgroup) -> Result<()> {
        if let Some(id) = group.iter().find(|id| !self.id_index.contains_key(id)) {
            return Err(FieldsError::FieldNotFoundById { id });
        }

        if let Some(global) = self
            .fields
            .iter()
            .find(|f| f.flags().is_global() && !group.has(f.id()))
        {
            return Err(FieldsError::MissingGlobalField {
                fieldgroup: group.name.clone(),
                field: global.name().to_string(),
            });
        }

        let yaml = serde_yaml::to_string(group)?;
        atomic_write(&self.fieldgroup_path(&group.name), yaml.as_bytes()).await?;

        if let Some(&idx) = self.fieldgroup_index.get(&group.name) {
            self.fieldgroups[idx] = group.clone();
        } else {
            let idx = self.fieldgroups.len();
            self.fieldgroups.push(group.clone());
            self.fieldgroup_index.insert(group.name.clone(), idx);
        }

        Ok(())
    }

    /// Resolve the fields of a fieldgroup, in fieldgroup order.
    pub fn fields_for_fieldgroup(&self, name: &str) -> Vec<&Field> {
        let Some(group) = self.get_fieldgroup(name) else {
            return Vec::new();
        };
        group
            .iter()
            .filter_map(|id| self.get_field_by_id(id))
            .collect()
    }

    // --- Values ---

    /// Store `value` for `page_id` in the named field's value table.
    pub async fn set_value(&self, field_name: &str, page_id: i64, value: Value) -> Result<()> {
        let path = self.value_table_path(field_name)?;
        let mut table = read_table(&path).await?;
        table.insert(page_id, value);
        write_table(&path, &table).await
    }

    /// The named field's stored value for `page_id`.
    pub async fn get_value(&self, field_name: &str, page_id: i64) -> Result<Option<Value>> {
        let path = self.value_table_path(field_name)?;
        Ok(read_table(&path).await?.remove(&page_id))
    }

    /// All stored values of the named field.
    pub async fn table_values(&self, field_name: &str) -> Result<ValueTable> {
        let path = self.value_table_path(field_name)?;
        read_table(&path).await
    }

    /// The root directory path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // --- Internal ---

    fn definition_path(&self, name: &str) -> PathBuf {
        self.root.join("fields").join(format!("{name}.yaml"))
    }

    fn fieldgroup_path(&self, name: &str) -> PathBuf {
        self.root.join("fieldgroups").join(format!("{name}.yaml"))
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.root.join("tables").join(format!("{table}.yaml"))
    }

    fn value_table_path(&self, field_name: &str) -> Result<PathBuf> {
        let field = self
            .get_field_by_name(field_name)
            .ok_or_else(|| FieldsError::FieldNotFound {
                name: field_name.to_string(),
            })?;
        Ok(self.table_path(&field.table()))
    }

    fn next_id(&self) -> FieldId {
        self.fields.iter().map(Field::id).max().unwrap_or(0) + 1
    }

    async fn migrate_table(&self, table: &str, retype: &Retype) -> Result<()> {
        let path = self.table_path(table);
        let values = read_table(&path).await?;
        let mut migrated = ValueTable::new();
        for (page_id, value) in values {
            match retype.to.convert_value(retype.from.as_ref(), value) {
                Some(value) => {
                    migrated.insert(page_id, value);
                }
                None => {
                    warn!(
                        %table,
                        page_id,
                        from = retype.from.name(),
                        to = retype.to.name(),
                        "dropping value that does not convert"
                    );
                }
            }
        }
        write_table(&path, &migrated).await
    }

    async fn load_fields(&mut self) -> Result<()> {
        let fields_dir = self.root.join("fields");
        let mut entries = fs::read_dir(&fields_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let content = fs::read_to_string(&path).await?;
            let field = serde_yaml::from_str::<FieldTableData>(&content)
                .map_err(FieldsError::from)
                .and_then(|row| Field::from_table_data(row, &self.fieldtypes));
            match field {
                Ok(field)
                    if self.name_index.contains_key(field.name())
                        || self.id_index.contains_key(&field.id()) =>
                {
                    warn!(
                        ?path,
                        name = %field.name(),
                        id = field.id(),
                        "skipping duplicate field definition"
                    );
                }
                Ok(field) => {
                    let idx = self.fields.len();
                    self.name_index.insert(field.name().to_string(), idx);
                    self.id_index.insert(field.id(), idx);
                    self.fields.push(field);
                }
                Err(e) => {
                    warn!(?path, %e, "skipping invalid field definition");
                }
            }
        }
        Ok(())
    }

    async fn load_fieldgroups(&mut self) -> Result<()> {
        let fieldgroups_dir = self.root.join("fieldgroups");
        let mut entries = fs::read_dir(&fieldgroups_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let content = fs::read_to_string(&path).await?;
            match serde_yaml::from_str::<Fieldgroup>(&content) {
                Ok(group) => {
                    let idx = self.fieldgroups.len();
                    self.fieldgroup_index.insert(group.name.clone(), idx);
                    self.fieldgroups.push(group);
                }
                Err(e) => {
                    warn!(?path, %e, "skipping invalid fieldgroup");
                }
            }
        }
        Ok(())
    }
}

impl FieldLookup for FieldsContext {
    fn find_by_name(&self, name: &str) -> Option<&Field> {
        self.get_field_by_name(name)
    }
}

#[async_trait]
impl FieldStore for FieldsContext {
    async fn save_field(&mut self, field: &mut Field) -> Result<bool> {
        if field.fieldtype().is_none() {
            return Err(FieldsError::MissingFieldtype {
                field: field.name().to_string(),
            });
        }
        if field.name().is_empty() {
            return Err(FieldsError::invalid_name("", "name may not be empty"));
        }
        if let Some(existing) = self.get_field_by_name(field.name()) {
            if existing.id() != field.id() {
                return Err(FieldsError::DuplicateName {
                    name: field.name().to_string(),
                });
            }
        }

        // Rename and retype are planned against the stored record. The
        // field's own markers may be stale or belong to a never-saved draft.
        let stored = self.id_index.get(&field.id()).map(|&i| &self.fields[i]);
        let table = field.table();

        let rename = stored
            .map(Field::table)
            .filter(|from| *from != table)
            .map(|from| TableRename {
                from,
                to: table.clone(),
            });

        let retype = match (stored.and_then(Field::fieldtype), field.fieldtype()) {
            (Some(from), Some(to)) if from.name() != to.name() => Some(Retype {
                from: Arc::clone(from),
                to: Arc::clone(to),
            }),
            _ => None,
        };

        if stored.is_none() && !field.pending().is_empty() {
            debug!(name = %field.name(), "discarding pending changes of unsaved field");
        }

        if let Some(rename) = &rename {
            let to = self.table_path(&rename.to);
            if to.exists() {
                return Err(FieldsError::TableExists {
                    table: rename.to.clone(),
                });
            }
            let from = self.table_path(&rename.from);
            if from.exists() {
                fs::rename(&from, &to).await?;
            }
            debug!(from = %rename.from, to = %rename.to, "renamed value table");
        }

        if field.id() == 0 {
            field.set_id(self.next_id());
        }

        if let Some(retype) = &retype {
            self.migrate_table(&table, retype).await?;
            debug!(
                %table,
                from = retype.from.name(),
                to = retype.to.name(),
                "migrated value table"
            );
        }

        let table_path = self.table_path(&table);
        if !table_path.exists() {
            write_table(&table_path, &ValueTable::new()).await?;
        }

        let yaml = serde_yaml::to_string(&field.table_data())?;
        atomic_write(&self.definition_path(field.name()), yaml.as_bytes()).await?;

        field.clear_pending();
        field.reset_track_changes();

        if let Some(&idx) = self.id_index.get(&field.id()) {
            // Existing field, possibly renamed
            let old_name = self.fields[idx].name().to_string();
            if old_name != field.name() {
                self.name_index.remove(&old_name);
                let _ = fs::remove_file(self.definition_path(&old_name)).await;
            }
            self.fields[idx] = field.clone();
            self.name_index.insert(field.name().to_string(), idx);
        } else {
            let idx = self.fields.len();
            self.fields.push(field.clone());
            self.name_index.insert(field.name().to_string(), idx);
            self.id_index.insert(field.id(), idx);
        }

        debug!(name = %field.name(), id = field.id(), "saved field");
        Ok(true)
    }
}

async fn read_table(path: &Path) -> Result<ValueTable> {
    if !path.exists() {
        return Ok(ValueTable::new());
    }
    let content = fs::read_to_string(path).await?;
    if content.trim().is_empty() {
        return Ok(ValueTable::new());
    }
    Ok(serde_yaml::from_str(&content)?)
}

async fn write_table(path: &Path, table: &ValueTable) -> Result<()> {
    let yaml = serde_yaml::to_string(table)?;
    atomic_write(path, yaml.as_bytes()).await
}

/// Write to a temp file then rename for atomic persistence.
async fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "no parent dir"))?;
    let tmp = dir.join(format!(".tmp_{}", Ulid::new()));
    fs::write(&tmp, data).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldFlags;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_defaults() -> FieldDefaults {
        FieldDefaults::new()
            .field(
                FieldTableData::new("title", "text")
                    .with_id(1)
                    .with_label("Title")
                    .with_flags(FieldFlags::AUTOJOIN | FieldFlags::GLOBAL),
            )
            .field(FieldTableData::new("body", "text").with_id(2).with_label("Body"))
            .fieldgroup(Fieldgroup::new("basic-page").with_field(1).with_field(2))
    }

    async fn open_empty(tmp: &TempDir) -> FieldsContext {
        FieldsContext::open(tmp.path().join("site"))
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn open_creates_directories() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("site");
        let ctx = FieldsContext::open(&root).build().await.unwrap();
        assert!(root.join("fields").is_dir());
        assert!(root.join("fieldgroups").is_dir());
        assert!(root.join("tables").is_dir());
        assert!(ctx.all_fields().is_empty());
        assert!(ctx.all_fieldgroups().is_empty());
    }

    #[tokio::test]
    async fn save_new_field_assigns_id() {
        let tmp = TempDir::new().unwrap();
        let mut ctx = open_empty(&tmp).await;

        let mut field = ctx.new_field("price", "integer").unwrap();
        assert!(field.save(&mut ctx).await.unwrap());

        assert_eq!(field.id(), 1);
        assert!(field.changes().is_empty());
        assert_eq!(ctx.get_field_by_name("price").unwrap().id(), 1);
        assert_eq!(ctx.get_field_by_id(1).unwrap().name(), "price");
        assert!(ctx.root().join("fields/price.yaml").exists());
        assert!(ctx.root().join("tables/field_price.yaml").exists());

        let mut second = ctx.new_field("cost", "integer").unwrap();
        second.save(&mut ctx).await.unwrap();
        assert_eq!(second.id(), 2);
    }

    #[tokio::test]
    async fn new_field_rejects_existing_name() {
        let tmp = TempDir::new().unwrap();
        let mut ctx = open_empty(&tmp).await;

        let mut field = ctx.new_field("price", "integer").unwrap();
        field.save(&mut ctx).await.unwrap();

        let err = ctx.new_field("price", "text").unwrap_err();
        assert!(matches!(err, FieldsError::DuplicateName { .. }));
    }

    #[tokio::test]
    async fn save_requires_fieldtype() {
        let tmp = TempDir::new().unwrap();
        let mut ctx = open_empty(&tmp).await;

        let mut field = Field::new();
        field.set_name("orphan", &ctx.env()).unwrap();
        let err = field.save(&mut ctx).await.unwrap_err();
        assert!(matches!(err, FieldsError::MissingFieldtype { .. }));
        assert!(ctx.all_fields().is_empty());
    }

    #[tokio::test]
    async fn rename_moves_value_table() {
        let tmp = TempDir::new().unwrap();
        let mut ctx = open_empty(&tmp).await;

        let mut field = ctx.new_field("price", "integer").unwrap();
        field.save(&mut ctx).await.unwrap();
        ctx.set_value("price", 10, json!(99)).await.unwrap();

        field.set_name("cost", &ctx.env()).unwrap();
        assert_eq!(field.prev_table(), Some("field_price"));
        field.save(&mut ctx).await.unwrap();

        assert!(field.prev_table().is_none());
        assert!(ctx.get_field_by_name("price").is_none());
        assert_eq!(ctx.get_field_by_name("cost").unwrap().id(), field.id());
        assert!(!ctx.root().join("fields/price.yaml").exists());
        assert!(!ctx.root().join("tables/field_price.yaml").exists());
        assert_eq!(ctx.get_value("cost", 10).await.unwrap(), Some(json!(99)));
    }

    #[tokio::test]
    async fn draft_rename_does_not_take_another_fields_table() {
        let tmp = TempDir::new().unwrap();
        let mut ctx = open_empty(&tmp).await;

        let mut draft = ctx.new_field("a", "text").unwrap();
        draft.set_name("b", &ctx.env()).unwrap();
        assert_eq!(draft.prev_table(), Some("field_a"));

        let mut a = ctx.new_field("a", "text").unwrap();
        a.save(&mut ctx).await.unwrap();
        ctx.set_value("a", 1, json!("owned by a")).await.unwrap();

        draft.save(&mut ctx).await.unwrap();

        assert!(draft.prev_table().is_none());
        assert_eq!(ctx.get_value("a", 1).await.unwrap(), Some(json!("owned by a")));
        assert!(ctx.table_values("b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stale_copy_renames_the_stored_table() {
        let tmp = TempDir::new().unwrap();
        let mut ctx = open_empty(&tmp).await;

        let mut field = ctx.new_field("a", "text").unwrap();
        field.save(&mut ctx).await.unwrap();
        ctx.set_value("a", 1, json!("v")).await.unwrap();

        let mut first = ctx.get_field_by_name("a").unwrap().clone();
        let mut second = first.clone();

        first.set_name("b", &ctx.env()).unwrap();
        first.save(&mut ctx).await.unwrap();

        second.set_name("c", &ctx.env()).unwrap();
        second.save(&mut ctx).await.unwrap();

        assert_eq!(ctx.get_value("c", 1).await.unwrap(), Some(json!("v")));
        assert!(ctx.get_field_by_name("b").is_none());
        assert!(!ctx.root().join("tables/field_b.yaml").exists());
        assert!(!ctx.root().join("fields/b.yaml").exists());
        assert_eq!(ctx.all_fields().len(), 1);
    }

    #[tokio::test]
    async fn rename_refuses_to_overwrite_existing_table() {
        let tmp = TempDir::new().unwrap();
        let mut ctx = open_empty(&tmp).await;

        let mut field = ctx.new_field("price", "integer").unwrap();
        field.save(&mut ctx).await.unwrap();
        ctx.set_value("price", 1, json!(10)).await.unwrap();

        let leftover = ctx.root().join("tables/field_cost.yaml");
        let mut other = ValueTable::new();
        other.insert(1, json!(99));
        write_table(&leftover, &other).await.unwrap();

        field.set_name("cost", &ctx.env()).unwrap();
        let err = field.save(&mut ctx).await.unwrap_err();
        assert!(matches!(err, FieldsError::TableExists { ref table } if table == "field_cost"));

        assert_eq!(ctx.get_field_by_name("price").unwrap().id(), field.id());
        assert_eq!(ctx.get_value("price", 1).await.unwrap(), Some(json!(10)));
        assert_eq!(read_table(&leftover).await.unwrap(), other);
    }

    #[tokio::test]
    async fn retype_follows_stored_fieldtype() {
        let tmp = TempDir::new().unwrap();
        let mut ctx = open_empty(&tmp).await;

        let mut field = ctx.new_field("rating", "integer").unwrap();
        field.save(&mut ctx).await.unwrap();
        ctx.set_value("rating", 1, json!(4)).await.unwrap();

        // The marker is cleared, yet the stored record is still an integer.
        field.set_fieldtype("text", ctx.fieldtypes()).unwrap();
        field.clear_pending();
        field.save(&mut ctx).await.unwrap();

        assert_eq!(ctx.get_value("rating", 1).await.unwrap(), Some(json!("4")));
    }

    #[tokio::test]
    async fn retype_migrates_values() {
        let tmp = TempDir::new().unwrap();
        let mut ctx = open_empty(&tmp).await;

        let mut field = ctx.new_field("rating", "text").unwrap();
        field.save(&mut ctx).await.unwrap();
        ctx.set_value("rating", 1, json!("4")).await.unwrap();
        ctx.set_value("rating", 2, json!("great")).await.unwrap();

        field.set_fieldtype("integer", ctx.fieldtypes()).unwrap();
        field.save(&mut ctx).await.unwrap();

        assert!(field.prev_fieldtype().is_none());
        let values = ctx.table_values("rating").await.unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values.get(&1), Some(&json!(4)));
        assert_eq!(
            ctx.get_field_by_name("rating")
                .unwrap()
                .fieldtype()
                .unwrap()
                .name(),
            "integer"
        );
    }

    #[tokio::test]
    async fn values_require_known_field() {
        let tmp = TempDir::new().unwrap();
        let ctx = open_empty(&tmp).await;
        let err = ctx.set_value("missing", 1, json!(1)).await.unwrap_err();
        assert!(matches!(err, FieldsError::FieldNotFound { .. }));
    }

    #[tokio::test]
    async fn delete_field() {
        let tmp = TempDir::new().unwrap();
        let mut ctx = open_empty(&tmp).await;

        let mut field = ctx.new_field("price", "integer").unwrap();
        field.save(&mut ctx).await.unwrap();
        ctx.delete_field(field.id()).await.unwrap();

        assert!(ctx.all_fields().is_empty());
        assert!(ctx.get_field_by_name("price").is_none());
        assert!(!ctx.root().join("fields/price.yaml").exists());
        assert!(!ctx.root().join("tables/field_price.yaml").exists());
    }

    #[tokio::test]
    async fn delete_nonexistent_field_errors() {
        let tmp = TempDir::new().unwrap();
        let mut ctx = open_empty(&tmp).await;
        let err = ctx.delete_field(42).await.unwrap_err();
        assert!(matches!(err, FieldsError::FieldNotFoundById { id: 42 }));
    }

    #[tokio::test]
    async fn delete_field_in_use_errors() {
        let tmp = TempDir::new().unwrap();
        let mut ctx = FieldsContext::open(tmp.path().join("site"))
            .with_defaults(sample_defaults())
            .build()
            .await
            .unwrap();

        let err = ctx.delete_field(2).await.unwrap_err();
        assert!(matches!(err, FieldsError::FieldInUse { count: 1, .. }));
        assert!(ctx.get_field_by_id(2).is_some());
    }

    #[tokio::test]
    async fn delete_middle_field_fixes_indexes() {
        let tmp = TempDir::new().unwrap();
        let mut ctx = open_empty(&tmp).await;

        for name in ["a", "b", "c"] {
            let mut field = ctx.new_field(name, "text").unwrap();
            field.save(&mut ctx).await.unwrap();
        }
        let b = ctx.get_field_by_name("b").unwrap().id();
        ctx.delete_field(b).await.unwrap();

        assert_eq!(ctx.all_fields().len(), 2);
        assert!(ctx.get_field_by_name("a").is_some());
        assert!(ctx.get_field_by_name("b").is_none());
        let c = ctx.get_field_by_name("c").unwrap();
        assert_eq!(ctx.get_field_by_id(c.id()).unwrap().name(), "c");
    }

    #[tokio::test]
    async fn fieldgroup_requires_global_fields() {
        let tmp = TempDir::new().unwrap();
        let mut ctx = FieldsContext::open(tmp.path().join("site"))
            .with_defaults(sample_defaults())
            .build()
            .await
            .unwrap();

        let err = ctx
            .write_fieldgroup(&Fieldgroup::new("sidebar").with_field(2))
            .await
            .unwrap_err();
        assert!(
            matches!(err, FieldsError::MissingGlobalField { ref field, .. } if field == "title")
        );

        ctx.write_fieldgroup(&Fieldgroup::new("sidebar").with_field(1))
            .await
            .unwrap();
        assert_eq!(ctx.fields_for_fieldgroup("sidebar").len(), 1);
    }

    #[tokio::test]
    async fn fieldgroup_requires_existing_members() {
        let tmp = TempDir::new().unwrap();
        let mut ctx = open_empty(&tmp).await;
        let err = ctx
            .write_fieldgroup(&Fieldgroup::new("home").with_field(9))
            .await
            .unwrap_err();
        assert!(matches!(err, FieldsError::FieldNotFoundById { id: 9 }));
    }

    #[tokio::test]
    async fn first_open_seeds_all_defaults() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("site");

        let ctx = FieldsContext::open(&root)
            .with_defaults(sample_defaults())
            .build()
            .await
            .unwrap();

        assert_eq!(ctx.all_fields().len(), 2);
        let title = ctx.get_field_by_name("title").unwrap();
        assert!(title.flags().is_global());
        assert_eq!(title.label(), "Title");
        assert_eq!(ctx.all_fieldgroups().len(), 1);

        let names: Vec<_> = ctx
            .fields_for_fieldgroup("basic-page")
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        assert_eq!(names, vec!["title", "body"]);

        assert!(root.join("fields/title.yaml").exists());
        assert!(root.join("tables/field_body.yaml").exists());
        assert!(root.join("fieldgroups/basic-page.yaml").exists());
    }

    #[tokio::test]
    async fn renamed_default_is_not_reseeded() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("site");

        let mut ctx = FieldsContext::open(&root)
            .with_defaults(sample_defaults())
            .build()
            .await
            .unwrap();

        let mut body = ctx.get_field_by_id(2).unwrap().clone();
        body.set_name("content", &ctx.env()).unwrap();
        body.save(&mut ctx).await.unwrap();
        drop(ctx);

        let ctx = FieldsContext::open(&root)
            .with_defaults(sample_defaults())
            .build()
            .await
            .unwrap();

        assert_eq!(ctx.all_fields().len(), 2);
        assert!(ctx.get_field_by_name("body").is_none());
        assert_eq!(ctx.get_field_by_id(2).unwrap().name(), "content");
    }

    #[tokio::test]
    async fn persistence_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("site");

        {
            let mut ctx = FieldsContext::open(&root).build().await.unwrap();
            let mut field = ctx.new_field("price", "integer").unwrap();
            field.set_label("Price");
            field.data_mut().set("default", json!(5));
            field.save(&mut ctx).await.unwrap();
            ctx.set_value("price", 3, json!(12)).await.unwrap();
        }

        let ctx = FieldsContext::open(&root).build().await.unwrap();
        let price = ctx.get_field_by_name("price").unwrap();
        assert_eq!(price.label(), "Price");
        assert_eq!(price.default_value(), Some(&json!(5)));
        assert_eq!(price.fieldtype().unwrap().name(), "integer");
        assert_eq!(ctx.get_value("price", 3).await.unwrap(), Some(json!(12)));
    }

    #[tokio::test]
    async fn duplicate_definitions_are_skipped_on_load() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("site");
        fs::create_dir_all(root.join("fields")).await.unwrap();

        let rows = [
            ("one", FieldTableData::new("dup", "text").with_id(5)),
            ("two", FieldTableData::new("dup", "text").with_id(6)),
            ("three", FieldTableData::new("p", "text").with_id(7)),
            ("four", FieldTableData::new("q", "text").with_id(7)),
        ];
        for (file, row) in &rows {
            let yaml = serde_yaml::to_string(row).unwrap();
            fs::write(root.join(format!("fields/{file}.yaml")), yaml)
                .await
                .unwrap();
        }

        let ctx = FieldsContext::open(&root).build().await.unwrap();
        assert_eq!(ctx.all_fields().len(), 2);
        for field in ctx.all_fields() {
            assert_eq!(ctx.get_field_by_name(field.name()).unwrap().id(), field.id());
            assert_eq!(ctx.get_field_by_id(field.id()).unwrap().name(), field.name());
        }
    }

    #[tokio::test]
    async fn invalid_default_name_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let defaults =
            FieldDefaults::new().field(FieldTableData::new("a__b", "text").with_id(1));

        let result = FieldsContext::open(tmp.path().join("site"))
            .with_defaults(defaults)
            .build()
            .await;
        assert!(matches!(result, Err(FieldsError::InvalidName { .. })));
        assert!(!tmp.path().join("site/fields/a__b.yaml").exists());
    }

    #[tokio::test]
    async fn unknown_fieldtype_is_skipped_on_load() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("site");

        {
            let mut ctx = FieldsContext::open(&root).build().await.unwrap();
            let mut field = ctx.new_field("price", "integer").unwrap();
            field.save(&mut ctx).await.unwrap();
        }

        let ctx = FieldsContext::open(&root)
            .with_fieldtypes(FieldtypeRegistry::new())
            .build()
            .await
            .unwrap();
        assert!(ctx.all_fields().is_empty());
    }
}
