//! Built-in fieldtypes and their inputfields.

use serde_json::{json, Value};

use crate::field::Field;
use crate::fieldtype::Fieldtype;
use crate::inputfield::{Inputfield, InputfieldSettings};
use crate::types::Page;

/// Single-line text input.
#[derive(Debug, Clone)]
pub struct InputfieldText {
    settings: InputfieldSettings,
}

impl InputfieldText {
    pub fn new() -> Self {
        Self {
            settings: InputfieldSettings::new()
                .with_attribute("value", json!(""))
                .with_attribute("size", json!(0))
                .with_attribute("maxlength", json!(2048))
                .with_attribute("placeholder", json!("")),
        }
    }
}

impl Default for InputfieldText {
    fn default() -> Self {
        Self::new()
    }
}

impl Inputfield for InputfieldText {
    fn class_name(&self) -> &'static str {
        "InputfieldText"
    }

    fn settings(&self) -> &InputfieldSettings {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut InputfieldSettings {
        &mut self.settings
    }

    fn config_inputfields(&self) -> Vec<Box<dyn Inputfield>> {
        vec![
            setting_input(self, "maxlength", "Maximum length"),
            setting_input(self, "size", "Size"),
        ]
    }
}

/// Whole-number input.
#[derive(Debug, Clone)]
pub struct InputfieldInteger {
    settings: InputfieldSettings,
}

impl InputfieldInteger {
    pub fn new() -> Self {
        Self {
            settings: InputfieldSettings::new()
                .with_attribute("value", Value::Null)
                .with_attribute("min", Value::Null)
                .with_attribute("max", Value::Null),
        }
    }
}

impl Default for InputfieldInteger {
    fn default() -> Self {
        Self::new()
    }
}

impl Inputfield for InputfieldInteger {
    fn class_name(&self) -> &'static str {
        "InputfieldInteger"
    }

    fn settings(&self) -> &InputfieldSettings {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut InputfieldSettings {
        &mut self.settings
    }

    fn config_inputfields(&self) -> Vec<Box<dyn Inputfield>> {
        vec![
            setting_input(self, "min", "Minimum value"),
            setting_input(self, "max", "Maximum value"),
        ]
    }
}

/// Integer input editing the attribute `key` of `owner`.
fn setting_input(owner: &dyn Inputfield, key: &str, label: &str) -> Box<dyn Inputfield> {
    let mut input = InputfieldInteger::new();
    input.set_name(key);
    input.set_label(label);
    input.set("value", owner.get(key).cloned().unwrap_or(Value::Null));
    Box::new(input)
}

/// Plain text values.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldtypeText;

impl Fieldtype for FieldtypeText {
    fn name(&self) -> &str {
        "text"
    }

    fn inputfield(&self, _page: &Page, _field: &Field) -> Option<Box<dyn Inputfield>> {
        Some(Box::new(InputfieldText::new()))
    }

    fn convert_value(&self, _from: &dyn Fieldtype, value: Value) -> Option<Value> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(Value::String(s)),
            Value::Bool(b) => Some(json!(if b { "1" } else { "" })),
            other => Some(Value::String(other.to_string())),
        }
    }
}

/// Whole numbers.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldtypeInteger;

impl Fieldtype for FieldtypeInteger {
    fn name(&self) -> &str {
        "integer"
    }

    fn inputfield(&self, _page: &Page, _field: &Field) -> Option<Box<dyn Inputfield>> {
        Some(Box::new(InputfieldInteger::new()))
    }

    fn config_inputfields(&self, field: &Field) -> Vec<Box<dyn Inputfield>> {
        let mut input = InputfieldInteger::new();
        input.set_name("default");
        input.set_label("Default value");
        input.set(
            "value",
            field.data().get("default").cloned().unwrap_or(Value::Null),
        );
        vec![Box::new(input)]
    }

    fn convert_value(&self, _from: &dyn Fieldtype, value: Value) -> Option<Value> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                .map(Value::from),
            Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
            Value::Bool(b) => Some(Value::from(i64::from(b))),
            _ => None,
        }
    }
}
