//! Inputfields: the widgets that edit a field value or a field's settings.

use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;

/// State shared by every inputfield.
///
/// `attributes` holds the configurable keys. A key is configurable when the
/// widget declares it, usually with a default, so [`Inputfield::has`] only
/// answers for keys present here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputfieldSettings {
    pub name: String,
    pub label: String,
    pub description: String,
    pub attributes: IndexMap<String, Value>,
}

impl InputfieldSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a configurable attribute with its default value.
    pub fn with_attribute(mut self, key: impl Into<String>, default: Value) -> Self {
        self.attributes.insert(key.into(), default);
        self
    }
}

/// A widget bound to a field or to one of its settings.
pub trait Inputfield: Send + Sync + fmt::Debug {
    /// Widget class, e.g. `InputfieldText`.
    fn class_name(&self) -> &'static str;

    fn settings(&self) -> &InputfieldSettings;

    fn settings_mut(&mut self) -> &mut InputfieldSettings;

    /// Inputfields that configure this widget.
    fn config_inputfields(&self) -> Vec<Box<dyn Inputfield>> {
        Vec::new()
    }

    /// Nested inputfields, for containers.
    fn children(&self) -> &[Box<dyn Inputfield>] {
        &[]
    }

    fn name(&self) -> &str {
        &self.settings().name
    }

    fn set_name(&mut self, name: &str) {
        self.settings_mut().name = name.to_string();
    }

    fn label(&self) -> &str {
        &self.settings().label
    }

    fn set_label(&mut self, label: &str) {
        self.settings_mut().label = label.to_string();
    }

    fn description(&self) -> &str {
        &self.settings().description
    }

    fn set_description(&mut self, description: &str) {
        self.settings_mut().description = description.to_string();
    }

    /// Whether `key` is a configurable attribute of this widget.
    fn has(&self, key: &str) -> bool {
        self.settings().attributes.contains_key(key)
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.settings().attributes.get(key)
    }

    fn set(&mut self, key: &str, value: Value) {
        self.settings_mut().attributes.insert(key.to_string(), value);
    }
}

/// A labelled group of inputfields.
#[derive(Debug, Default)]
pub struct InputfieldFieldset {
    settings: InputfieldSettings,
    children: Vec<Box<dyn Inputfield>>,
}

impl InputfieldFieldset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, inputfield: Box<dyn Inputfield>) {
        self.children.push(inputfield);
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl Inputfield for InputfieldFieldset {
    fn class_name(&self) -> &'static str {
        "InputfieldFieldset"
    }

    fn settings(&self) -> &InputfieldSettings {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut InputfieldSettings {
        &mut self.settings
    }

    fn children(&self) -> &[Box<dyn Inputfield>] {
        &self.children
    }
}

/// Top-level container returned for a field's configuration screen.
#[derive(Debug, Default)]
pub struct InputfieldWrapper {
    settings: InputfieldSettings,
    children: Vec<Box<dyn Inputfield>>,
}

impl InputfieldWrapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, inputfield: Box<dyn Inputfield>) {
        self.children.push(inputfield);
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// First direct child with the given label.
    pub fn find_by_label(&self, label: &str) -> Option<&dyn Inputfield> {
        self.children
            .iter()
            .find(|i| i.label() == label)
            .map(|i| i.as_ref())
    }
}

impl Inputfield for InputfieldWrapper {
    fn class_name(&self) -> &'static str {
        "InputfieldWrapper"
    }

    fn settings(&self) -> &InputfieldSettings {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut InputfieldSettings {
        &mut self.settings
    }

    fn children(&self) -> &[Box<dyn Inputfield>] {
        &self.children
    }
}
