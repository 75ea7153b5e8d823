//! Component parameter sets.
//!
//! Every component exposes a set of named, typed parameters with
//! optional range or option-list constraints, plus read-only "readout"
//! entries the component itself updates (queue depths, dropped-frame
//! counters and the like). Setting a parameter validates type and
//! constraint, then fires the change callback.

use std::collections::BTreeMap;

use super::error::PipelineError;

/// A parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// One of a declared option list.
    Choice(String),
}

impl ParamValue {
    fn kind_name(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "int",
            ParamValue::Float(_) => "float",
            ParamValue::Str(_) => "string",
            ParamValue::Choice(_) => "choice",
        }
    }
}

#[derive(Debug, Clone)]
enum Constraint {
    None,
    IntRange { min: i64, max: i64 },
    FloatRange { min: f64, max: f64 },
    Options(Vec<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: ParamValue,
    constraint: Constraint,
    readout: bool,
}

/// Callback fired after a parameter change is accepted.
pub type ParamChangeHandler = Box<dyn Fn(&str, &ParamValue) + Send>;

/// Named typed values a component exposes for control and observation.
#[derive(Default)]
pub struct ParameterSet {
    entries: BTreeMap<String, Entry>,
    on_change: Option<ParamChangeHandler>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a boolean parameter.
    pub fn define_bool(&mut self, key: &str, default: bool) {
        self.define(key, ParamValue::Bool(default), Constraint::None, false);
    }

    /// Declares an integer parameter, optionally range-limited
    /// (inclusive).
    pub fn define_int(&mut self, key: &str, default: i64, range: Option<(i64, i64)>) {
        let constraint = match range {
            Some((min, max)) => Constraint::IntRange { min, max },
            None => Constraint::None,
        };
        self.define(key, ParamValue::Int(default), constraint, false);
    }

    /// Declares a float parameter, optionally range-limited (inclusive).
    pub fn define_float(&mut self, key: &str, default: f64, range: Option<(f64, f64)>) {
        let constraint = match range {
            Some((min, max)) => Constraint::FloatRange { min, max },
            None => Constraint::None,
        };
        self.define(key, ParamValue::Float(default), constraint, false);
    }

    /// Declares a free-form string parameter.
    pub fn define_str(&mut self, key: &str, default: &str) {
        self.define(key, ParamValue::Str(default.to_string()), Constraint::None, false);
    }

    /// Declares an enumerated parameter restricted to `options`.
    pub fn define_choice(&mut self, key: &str, default: &str, options: Vec<String>) {
        self.define(
            key,
            ParamValue::Choice(default.to_string()),
            Constraint::Options(options),
            false,
        );
    }

    /// Declares a read-only readout entry the component updates.
    pub fn define_readout(&mut self, key: &str, initial: ParamValue) {
        self.define(key, initial, Constraint::None, true);
    }

    fn define(&mut self, key: &str, value: ParamValue, constraint: Constraint, readout: bool) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                constraint,
                readout,
            },
        );
    }

    /// Installs the change callback.
    pub fn set_on_change(&mut self, handler: ParamChangeHandler) {
        self.on_change = Some(handler);
    }

    /// Sets a parameter from outside the component.
    ///
    /// Validates existence, writability, type and constraint, then
    /// stores the value and fires the change callback.
    pub fn set(&mut self, key: &str, value: ParamValue) -> Result<(), PipelineError> {
        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| PipelineError::UnknownParameter(key.to_string()))?;
        if entry.readout {
            return Err(PipelineError::ReadOnlyParameter(key.to_string()));
        }
        if std::mem::discriminant(&entry.value) != std::mem::discriminant(&value) {
            return Err(PipelineError::InvalidParameter(format!(
                "{key}: expected {}, got {}",
                entry.value.kind_name(),
                value.kind_name()
            )));
        }
        match (&entry.constraint, &value) {
            (Constraint::IntRange { min, max }, ParamValue::Int(v)) => {
                if v < min || v > max {
                    return Err(PipelineError::InvalidParameter(format!(
                        "{key}: {v} outside [{min}, {max}]"
                    )));
                }
            }
            (Constraint::FloatRange { min, max }, ParamValue::Float(v)) => {
                if v < min || v > max {
                    return Err(PipelineError::InvalidParameter(format!(
                        "{key}: {v} outside [{min}, {max}]"
                    )));
                }
            }
            (Constraint::Options(options), ParamValue::Choice(v)) => {
                if !options.contains(v) {
                    return Err(PipelineError::InvalidParameter(format!(
                        "{key}: {v:?} not one of {options:?}"
                    )));
                }
            }
            _ => {}
        }

        entry.value = value.clone();
        if let Some(handler) = &self.on_change {
            handler(key, &value);
        }
        Ok(())
    }

    /// Current value of a parameter or readout.
    pub fn get(&self, key: &str) -> Option<ParamValue> {
        self.entries.get(key).map(|e| e.value.clone())
    }

    /// Component-side update of a readout entry. Does not fire the
    /// change callback; readouts are observations, not control.
    pub fn update_readout(&mut self, key: &str, value: ParamValue) -> Result<(), PipelineError> {
        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| PipelineError::UnknownParameter(key.to_string()))?;
        entry.value = value;
        Ok(())
    }

    /// Declared keys, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }
}
