//! Named, ordered variable groups
//!
//! A [`VariableSet`] is what gets published and what the user edits. Values
//! are kept at full precision; `decimals` is applied only when a value is
//! rendered or serialized.

use serde_json::{json, Map, Value as JsonValue};
use std::fmt;

/// Variable flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u8);

impl Flags {
    pub const NONE: Flags = Flags(0);
    /// Part of the persisted configuration
    pub const CONFIG: Flags = Flags(1 << 0);
    /// May be changed by the user
    pub const SETTABLE: Flags = Flags(1 << 1);

    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

/// Current value of a variable
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// No reading has ever succeeded
    Missing,
    Float(f64),
    Int(i64),
    Bool(bool),
}

fn round_to(value: f64, decimals: u8) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

/// One named value plus metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub value: Value,
    pub units: String,
    pub description: String,
    pub decimals: u8,
    pub flags: Flags,
    /// False when the producing channel failed its last read
    pub ok: bool,
}

impl Variable {
    pub fn new(name: &str, value: Value) -> Self {
        Self {
            name: name.to_string(),
            value,
            units: String::new(),
            description: String::new(),
            decimals: 0,
            flags: Flags::NONE,
            ok: true,
        }
    }

    pub fn float(name: &str, value: Option<f64>, decimals: u8) -> Self {
        let value = value.map(Value::Float).unwrap_or(Value::Missing);
        Self { decimals, ..Self::new(name, value) }
    }

    pub fn with_units(mut self, units: &str) -> Self {
        self.units = units.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_ok(mut self, ok: bool) -> Self {
        self.ok = ok;
        self
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.value {
            Value::Float(v) => Some(v),
            Value::Int(v) => Some(v as f64),
            Value::Bool(v) => Some(if v { 1.0 } else { 0.0 }),
            Value::Missing => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.value {
            Value::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// Value rounded to `decimals`, as JSON
    pub fn json_value(&self) -> JsonValue {
        match self.value {
            Value::Missing => JsonValue::Null,
            Value::Float(v) if v.is_finite() => json!(round_to(v, self.decimals)),
            Value::Float(_) => JsonValue::Null,
            Value::Int(v) => json!(v),
            Value::Bool(v) => json!(v),
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Value::Missing => write!(f, "-"),
            Value::Float(v) => write!(f, "{:.*}", self.decimals as usize, v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", if v { "T" } else { "F" }),
        }
    }
}

/// Ordered collection of variables under a group name
#[derive(Debug, Clone, PartialEq)]
pub struct VariableSet {
    name: String,
    vars: Vec<Variable>,
}

impl VariableSet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            vars: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn clear(&mut self) {
        self.vars.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.vars.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.vars.iter().find(|v| v.name == name)
    }

    /// Insert `var`, replacing a variable of the same name in place
    pub fn upsert(&mut self, var: Variable) {
        match self.vars.iter_mut().find(|v| v.name == var.name) {
            Some(existing) => *existing = var,
            None => self.vars.push(var),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.vars.iter().map(|v| v.name.as_str()).collect()
    }

    /// `{name: {"value", "units", "ok"}}` in declared order
    pub fn to_json(&self) -> JsonValue {
        let mut values = Map::new();
        for var in &self.vars {
            let mut entry = Map::new();
            entry.insert("value".to_string(), var.json_value());
            if !var.units.is_empty() {
                entry.insert("units".to_string(), json!(var.units));
            }
            entry.insert("ok".to_string(), json!(var.ok));
            values.insert(var.name.clone(), JsonValue::Object(entry));
        }
        JsonValue::Object(values)
    }

    /// Plain-text table, one variable per row
    pub fn render_table(&self) -> String {
        let width = self.vars.iter().map(|v| v.name.len()).max().unwrap_or(0).max(8);
        let mut out = format!("[{}]\n", self.name);
        for var in &self.vars {
            let value = format!("{} {}", var, var.units);
            let status = if var.ok { "" } else { "  (invalid)" };
            out.push_str(&format!("  {:<width$}  {}{}\n", var.name, value.trim_end(), status, width = width));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_keeps_order() {
        let mut set = VariableSet::new("room");
        set.upsert(Variable::float("temperature", Some(21.0), 1));
        set.upsert(Variable::float("humidity", Some(40.0), 1));
        set.upsert(Variable::float("temperature", Some(22.0), 1));

        assert_eq!(set.names(), vec!["temperature", "humidity"]);
        assert_eq!(set.get("temperature").unwrap().as_f64(), Some(22.0));
    }

    #[test]
    fn test_rounding_only_at_render_time() {
        let var = Variable::float("leak_filtered", Some(12.3456), 1);
        assert_eq!(var.as_f64(), Some(12.3456));
        assert_eq!(var.json_value(), json!(12.3));
        assert_eq!(var.to_string(), "12.3");
    }

    #[test]
    fn test_json_marks_invalid_and_missing() {
        let mut set = VariableSet::new("room");
        set.upsert(Variable::float("temperature", Some(21.04), 1).with_units("°C").with_ok(false));
        set.upsert(Variable::float("light", None, 1));
        set.upsert(Variable::new("motion", Value::Bool(true)));

        let json = set.to_json();
        assert_eq!(json["temperature"]["value"], json!(21.0));
        assert_eq!(json["temperature"]["ok"], json!(false));
        assert_eq!(json["temperature"]["units"], json!("°C"));
        assert!(json["light"]["value"].is_null());
        assert_eq!(json["motion"]["value"], json!(true));

        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["temperature", "light", "motion"]);
    }

    #[test]
    fn test_flags() {
        let flags = Flags::CONFIG | Flags::SETTABLE;
        assert!(flags.contains(Flags::CONFIG));
        assert!(flags.contains(Flags::SETTABLE));
        assert!(!Flags::CONFIG.contains(Flags::SETTABLE));
    }

    #[test]
    fn test_render_table() {
        let mut set = VariableSet::new("room");
        set.upsert(Variable::float("humidity", Some(40.25), 1).with_units("%"));
        set.upsert(Variable::new("motion", Value::Bool(false)).with_ok(false));
        let table = set.render_table();
        assert!(table.starts_with("[room]\n"));
        assert!(table.contains("humidity  40.2 %") || table.contains("humidity  40.3 %"));
        assert!(table.contains("(invalid)"));
    }
}
