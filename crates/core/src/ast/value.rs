//! Value nodes: constants, variable references and computations.

use crate::types::{element_type, CompoundField, Type};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A value appearing in an input parameter, a filter or a computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Boolean(bool),
    String(String),
    Number(f64),
    Measure {
        value: f64,
        unit: String,
    },
    Currency {
        value: f64,
        code: String,
    },
    Date(DateValue),
    Time(TimeValue),
    Location(Location),
    Entity {
        value: Option<String>,
        entity_type: String,
        display: Option<String>,
    },
    Enum(String),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
    /// Reference to a parameter in scope (an output of a previous
    /// primitive, or a declaration argument).
    VarRef(String),
    /// `$event`, or one of its fields (`$event.type`, `$event.program_id`).
    Event(Option<String>),
    /// A hole to be filled: `$?` (local) or an unfilled remote value.
    Undefined {
        local: bool,
    },
    /// `op(operands...)`, e.g. `count(x)` or `distance(geo, $location.home)`.
    Computation {
        op: String,
        operands: Vec<Value>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DateValue {
    /// ISO 8601 timestamp.
    Absolute(String),
    Now,
    /// `start_of(unit)` / `end_of(unit)`.
    Edge { edge: DateEdge, unit: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateEdge {
    StartOf,
    EndOf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TimeValue {
    Absolute { hour: u8, minute: u8, second: u8 },
    /// A user-relative time such as `$time.morning`.
    Relative(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Location {
    Absolute {
        latitude: f64,
        longitude: f64,
        display: Option<String>,
    },
    /// A user-relative location such as `$location.home`.
    Relative(String),
}

impl Value {
    pub fn string(s: &str) -> Value {
        Value::String(s.to_string())
    }

    pub fn var_ref(name: &str) -> Value {
        Value::VarRef(name.to_string())
    }

    pub fn entity(value: &str, entity_type: &str) -> Value {
        Value::Entity {
            value: Some(value.to_string()),
            entity_type: entity_type.to_string(),
            display: None,
        }
    }

    pub fn measure(value: f64, unit: &str) -> Value {
        Value::Measure {
            value,
            unit: unit.to_string(),
        }
    }

    /// `$?`
    pub fn undefined() -> Value {
        Value::Undefined { local: true }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined { .. })
    }

    /// True for values that do not depend on the program context: no holes,
    /// no variable or event references, no computations.
    pub fn is_constant(&self) -> bool {
        match self {
            Value::Undefined { .. }
            | Value::VarRef(_)
            | Value::Event(_)
            | Value::Computation { .. } => false,
            Value::Array(items) => items.iter().all(Value::is_constant),
            Value::Object(fields) => fields.values().all(Value::is_constant),
            _ => true,
        }
    }

    /// The type of a value that needs no scope to be typed. Variable
    /// references, holes and computations report `Any`.
    pub fn get_type(&self) -> Type {
        match self {
            Value::Boolean(_) => Type::Boolean,
            Value::String(_) => Type::String,
            Value::Number(_) => Type::Number,
            Value::Measure { unit, .. } => Type::Measure(unit.clone()),
            Value::Currency { .. } => Type::Currency,
            Value::Date(_) => Type::Date,
            Value::Time(_) => Type::Time,
            Value::Location(_) => Type::Location,
            Value::Entity { entity_type, .. } => Type::entity(entity_type),
            Value::Enum(entry) => Type::Enum(vec![entry.clone()]),
            // mixed arrays have no element type; the typechecker rejects them
            Value::Array(items) => {
                Type::array(element_type(items.iter().map(Value::get_type)).unwrap_or(Type::Any))
            }
            Value::Object(fields) => Type::Compound {
                name: None,
                fields: fields
                    .iter()
                    .map(|(name, v)| (name.clone(), CompoundField::new(v.get_type())))
                    .collect(),
            },
            Value::Event(field) => match field.as_deref() {
                Some("type") => Type::entity("tt:function"),
                Some("program_id") => Type::entity("tt:program_id"),
                _ => Type::String,
            },
            Value::VarRef(_) | Value::Undefined { .. } | Value::Computation { .. } => Type::Any,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Number(n) => write!(f, "{}", n),
            Value::Measure { value, unit } => write!(f, "{}{}", value, unit),
            Value::Currency { value, code } => write!(f, "{}${}", value, code),
            Value::Date(DateValue::Absolute(iso)) => write!(f, "new Date({:?})", iso),
            Value::Date(DateValue::Now) => write!(f, "$now"),
            Value::Date(DateValue::Edge { edge, unit }) => match edge {
                DateEdge::StartOf => write!(f, "$start_of({})", unit),
                DateEdge::EndOf => write!(f, "$end_of({})", unit),
            },
            Value::Time(TimeValue::Absolute {
                hour,
                minute,
                second,
            }) => write!(f, "new Time({}, {}, {})", hour, minute, second),
            Value::Time(TimeValue::Relative(name)) => write!(f, "$time.{}", name),
            Value::Location(Location::Absolute {
                latitude,
                longitude,
                ..
            }) => write!(f, "new Location({}, {})", latitude, longitude),
            Value::Location(Location::Relative(name)) => write!(f, "$location.{}", name),
            Value::Entity {
                value: Some(value),
                entity_type,
                ..
            } => write!(f, "{:?}^^{}", value, entity_type),
            Value::Entity {
                value: None,
                entity_type,
                display,
            } => write!(
                f,
                "null^^{}({:?})",
                entity_type,
                display.as_deref().unwrap_or("")
            ),
            Value::Enum(entry) => write!(f, "enum({})", entry),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Object(fields) => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", name, value)?;
                }
                write!(f, "}}")
            }
            Value::VarRef(name) => write!(f, "{}", name),
            Value::Event(None) => write!(f, "$event"),
            Value::Event(Some(field)) => write!(f, "$event.{}", field),
            Value::Undefined { .. } => write!(f, "$?"),
            Value::Computation { op, operands } => {
                write!(f, "{}(", op)?;
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", operand)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_detection() {
        assert!(Value::string("hi").is_constant());
        assert!(!Value::undefined().is_constant());
        assert!(!Value::var_ref("x").is_constant());
        assert!(!Value::Array(vec![Value::Number(1.0), Value::undefined()]).is_constant());
        assert!(Value::Array(vec![Value::Number(1.0)]).is_constant());
    }

    #[test]
    fn array_type_skips_holes() {
        let v = Value::Array(vec![Value::undefined(), Value::measure(3.0, "h")]);
        assert_eq!(v.get_type(), Type::array(Type::measure("h")));
        assert_eq!(Value::Array(vec![]).get_type(), Type::array(Type::Any));
    }

    #[test]
    fn event_fields_are_typed() {
        assert_eq!(Value::Event(None).get_type(), Type::String);
        assert_eq!(
            Value::Event(Some("program_id".into())).get_type(),
            Type::entity("tt:program_id")
        );
        assert_eq!(
            Value::Event(Some("type".into())).get_type(),
            Type::entity("tt:function")
        );
    }

    #[test]
    fn display_is_compact() {
        let v = Value::Computation {
            op: "distance".into(),
            operands: vec![
                Value::var_ref("geo"),
                Value::Location(Location::Relative("home".into())),
            ],
        };
        assert_eq!(v.to_string(), "distance(geo, $location.home)");
        assert_eq!(Value::undefined().to_string(), "$?");
        assert_eq!(Value::entity("bob", "tt:username").to_string(), "\"bob\"^^tt:username");
    }
}
