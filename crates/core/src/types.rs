//! The ThingTalk type system.
//!
//! Types are immutable values compared structurally. Parameter matching
//! goes through [`is_assignable`], which implements the compatibility
//! relation used by the typechecker and by slot iteration.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A semantic type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Type {
    Boolean,
    String,
    Number,
    /// A physical quantity; the payload is the unit it is expressed in.
    Measure(String),
    Currency,
    Date,
    Time,
    Location,
    /// An entity; `None` is the generic entity that matches every subtype.
    Entity(Option<String>),
    /// An enumerated type; an empty list is the generic enum.
    Enum(Vec<String>),
    Array(Box<Type>),
    Compound {
        name: Option<String>,
        fields: IndexMap<String, CompoundField>,
    },
    ArgMap,
    Any,
}

/// A field of a [`Type::Compound`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompoundField {
    #[serde(rename = "type")]
    pub ty: Type,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, serde_json::Value>,
}

impl CompoundField {
    pub fn new(ty: Type) -> Self {
        CompoundField {
            ty,
            annotations: BTreeMap::new(),
        }
    }
}

impl Type {
    pub fn entity(subtype: &str) -> Type {
        Type::Entity(Some(subtype.to_string()))
    }

    pub fn measure(unit: &str) -> Type {
        Type::Measure(unit.to_string())
    }

    pub fn array(elem: Type) -> Type {
        Type::Array(Box::new(elem))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array(_))
    }

    /// Element type of an array, or `Any` for anything else.
    pub fn element(&self) -> Type {
        match self {
            Type::Array(elem) => (**elem).clone(),
            _ => Type::Any,
        }
    }

    /// True for types that admit an ordering (`<`, `>=`, sorting).
    pub fn is_comparable(&self) -> bool {
        matches!(
            self,
            Type::Number
                | Type::Measure(_)
                | Type::Currency
                | Type::Date
                | Type::Time
                | Type::String
                | Type::Any
        )
    }

    /// True for types that support arithmetic aggregation (sum, avg).
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Type::Number | Type::Measure(_) | Type::Currency | Type::Any
        )
    }
}

// ──────────────────────────────────────────────
// Units
// ──────────────────────────────────────────────

const UNITS: &[(&str, &[&str])] = &[
    ("ms", &["ms", "s", "min", "h", "day", "week", "mon", "year"]),
    ("m", &["m", "km", "mm", "cm", "mi", "in", "ft"]),
    ("mps", &["mps", "kmph", "mph"]),
    ("kg", &["kg", "g", "lb", "oz"]),
    ("Pa", &["Pa", "bar", "psi", "mmHg", "inHg", "atm"]),
    ("C", &["C", "F", "K"]),
    ("kcal", &["kcal", "kJ"]),
    ("byte", &["byte", "KB", "KiB", "MB", "MiB", "GB", "GiB", "TB", "TiB"]),
    ("m2", &["m2", "km2", "mi2", "ft2"]),
    ("m3", &["m3", "l", "dl", "cl", "ml", "floz", "qt", "gal"]),
    ("lx", &["lx"]),
    ("W", &["W", "kW"]),
];

/// The base unit of the dimension `unit` belongs to. Unknown units are
/// their own base.
pub fn base_unit(unit: &str) -> &str {
    UNITS
        .iter()
        .find(|(_, members)| members.contains(&unit))
        .map(|(base, _)| *base)
        .unwrap_or(unit)
}

// ──────────────────────────────────────────────
// Assignability
// ──────────────────────────────────────────────

/// True iff a value of type `source` may be used where `target` is expected.
pub fn is_assignable(target: &Type, source: &Type) -> bool {
    match (target, source) {
        (Type::Any, _) | (_, Type::Any) => true,
        (Type::Array(t), Type::Array(s)) => is_assignable(t, s),
        (Type::Entity(None), Type::Entity(_)) | (Type::Entity(_), Type::Entity(None)) => true,
        (Type::Entity(Some(t)), Type::Entity(Some(s))) => t == s,
        (Type::Measure(t), Type::Measure(s)) => base_unit(t) == base_unit(s),
        (Type::Enum(t), Type::Enum(s)) => {
            t.is_empty() || s.is_empty() || s.iter().all(|entry| t.contains(entry))
        }
        (Type::Compound { fields: t, .. }, Type::Compound { fields: s, .. }) => {
            t.iter().all(|(name, field)| {
                s.get(name)
                    .is_some_and(|other| is_assignable(&field.ty, &other.ty))
            })
        }
        _ => target == source,
    }
}

/// The element type of an array literal whose elements have `types`, or
/// the first pair of types with no common type.
pub fn element_type<I>(types: I) -> Result<Type, (Type, Type)>
where
    I: IntoIterator<Item = Type>,
{
    types
        .into_iter()
        .try_fold(Type::Any, |elem, ty| unify(&elem, &ty).ok_or((elem, ty)))
}

fn unify(a: &Type, b: &Type) -> Option<Type> {
    match (a, b) {
        (Type::Any, other) | (other, Type::Any) => Some(other.clone()),
        (Type::Enum(x), Type::Enum(y)) if x.is_empty() || y.is_empty() => {
            Some(Type::Enum(Vec::new()))
        }
        (Type::Enum(x), Type::Enum(y)) => {
            let mut entries = x.clone();
            entries.extend(y.iter().filter(|e| !x.contains(e)).cloned());
            Some(Type::Enum(entries))
        }
        _ if is_assignable(a, b) => Some(a.clone()),
        _ if is_assignable(b, a) => Some(b.clone()),
        _ => None,
    }
}

/// Type expected on the right-hand side of `lhs <operator> rhs`, or `None`
/// when the operator is not defined for `lhs`.
pub fn operand_type(operator: &str, lhs: &Type) -> Option<Type> {
    match operator {
        "==" | "!=" => Some(lhs.clone()),
        "<" | "<=" | ">" | ">=" if lhs.is_comparable() => Some(lhs.clone()),
        "=~" | "starts_with" | "ends_with" => match lhs {
            Type::String | Type::Entity(_) | Type::Any => Some(Type::String),
            _ => None,
        },
        "contains" => match lhs {
            Type::Array(elem) => Some((**elem).clone()),
            Type::Any => Some(Type::Any),
            _ => None,
        },
        "in_array" => Some(Type::array(lhs.clone())),
        _ => None,
    }
}

/// Result type of `op(operands...)` given the operand types.
pub fn computation_type(op: &str, operands: &[Type]) -> Type {
    match op {
        "count" => Type::Number,
        "distance" => Type::measure("m"),
        "sum" | "avg" | "max" | "min" => match operands.first() {
            Some(Type::Array(elem)) => (**elem).clone(),
            Some(other) => other.clone(),
            None => Type::Any,
        },
        _ => operands
            .iter()
            .find(|t| **t != Type::Any)
            .cloned()
            .unwrap_or(Type::Any),
    }
}

/// Result type of an aggregation over a column of type `field`.
pub fn aggregation_type(operator: &str, field: Option<&Type>) -> Type {
    match operator {
        "count" => Type::Number,
        _ => field.cloned().unwrap_or(Type::Any),
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Boolean => write!(f, "Boolean"),
            Type::String => write!(f, "String"),
            Type::Number => write!(f, "Number"),
            Type::Measure(unit) => write!(f, "Measure({})", unit),
            Type::Currency => write!(f, "Currency"),
            Type::Date => write!(f, "Date"),
            Type::Time => write!(f, "Time"),
            Type::Location => write!(f, "Location"),
            Type::Entity(None) => write!(f, "Entity"),
            Type::Entity(Some(subtype)) => write!(f, "Entity({})", subtype),
            Type::Enum(values) => write!(f, "Enum({})", values.join(",")),
            Type::Array(elem) => write!(f, "Array({})", elem),
            Type::Compound {
                name: Some(name), ..
            } => write!(f, "Compound({})", name),
            Type::Compound { name: None, .. } => write!(f, "Compound"),
            Type::ArgMap => write!(f, "ArgMap"),
            Type::Any => write!(f, "Any"),
        }
    }
}
