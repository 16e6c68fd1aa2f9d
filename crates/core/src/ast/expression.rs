//! Expression nodes: invocations, filters, tables, streams and actions.
//!
//! Each node category is a closed sum type. Children are owned through
//! `Box`/`Vec`; no node has two parents.

use crate::ast::class_def::FunctionDef;
use crate::ast::value::Value;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ──────────────────────────────────────────────
// Resolved schema annotation
// ──────────────────────────────────────────────

/// The signature attached to a node by the typechecker.
///
/// Not part of the node's structure: equality ignores it and it is not
/// serialized. The handle is shared with the class it was resolved from.
#[derive(Debug, Clone, Default)]
pub struct SchemaRef(Option<Arc<FunctionDef>>);

impl SchemaRef {
    pub fn get(&self) -> Option<&FunctionDef> {
        self.0.as_deref()
    }

    pub fn arc(&self) -> Option<Arc<FunctionDef>> {
        self.0.clone()
    }

    pub fn set(&mut self, schema: Arc<FunctionDef>) {
        self.0 = Some(schema);
    }

    pub fn is_resolved(&self) -> bool {
        self.0.is_some()
    }
}

impl PartialEq for SchemaRef {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl From<Arc<FunctionDef>> for SchemaRef {
    fn from(schema: Arc<FunctionDef>) -> Self {
        SchemaRef(Some(schema))
    }
}

// ──────────────────────────────────────────────
// Primitives
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputParam {
    pub name: String,
    pub value: Value,
}

impl InputParam {
    pub fn new(name: &str, value: Value) -> Self {
        InputParam {
            name: name.to_string(),
            value,
        }
    }
}

/// `@kind(id=..., attributes...)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selector {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<InputParam>,
}

impl Selector {
    pub fn new(kind: &str) -> Self {
        Selector {
            kind: kind.to_string(),
            id: None,
            principal: None,
            attributes: Vec::new(),
        }
    }
}

/// A device function call, the only kind of primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub selector: Selector,
    pub channel: String,
    #[serde(default)]
    pub in_params: Vec<InputParam>,
    #[serde(skip)]
    pub schema: SchemaRef,
}

impl Invocation {
    pub fn new(kind: &str, channel: &str, in_params: Vec<InputParam>) -> Self {
        Invocation {
            selector: Selector::new(kind),
            channel: channel.to_string(),
            in_params,
            schema: SchemaRef::default(),
        }
    }

    pub fn in_param(&self, name: &str) -> Option<&Value> {
        self.in_params
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }
}

/// A call to a locally declared table, stream or action (or a memory table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarRefCall {
    pub name: String,
    #[serde(default)]
    pub in_params: Vec<InputParam>,
    #[serde(skip)]
    pub schema: SchemaRef,
}

impl VarRefCall {
    pub fn new(name: &str, in_params: Vec<InputParam>) -> Self {
        VarRefCall {
            name: name.to_string(),
            in_params,
            schema: SchemaRef::default(),
        }
    }
}

// ──────────────────────────────────────────────
// Filters
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BooleanExpression {
    True,
    False,
    And(Vec<BooleanExpression>),
    Or(Vec<BooleanExpression>),
    Not(Box<BooleanExpression>),
    /// `name <operator> value`, where `name` is an output of the filtered
    /// primitive.
    Atom {
        name: String,
        operator: String,
        value: Value,
    },
    /// `lhs <operator> rhs` over computed values, e.g. `count(x) >= 3`.
    Compute {
        lhs: Value,
        operator: String,
        rhs: Value,
    },
    /// `@kind.channel(params) { filter }`: true iff some result of the
    /// invocation satisfies the subfilter.
    External(ExternalFilter),
    /// A boolean variable in scope used as a predicate.
    VarRef(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalFilter {
    pub invocation: Invocation,
    pub filter: Box<BooleanExpression>,
}

impl BooleanExpression {
    pub fn atom(name: &str, operator: &str, value: Value) -> Self {
        BooleanExpression::Atom {
            name: name.to_string(),
            operator: operator.to_string(),
            value,
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, BooleanExpression::True)
    }

    pub fn is_false(&self) -> bool {
        matches!(self, BooleanExpression::False)
    }
}

// ──────────────────────────────────────────────
// Tables
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub node: TableNode,
    #[serde(skip)]
    pub schema: SchemaRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TableNode {
    VarRef(VarRefCall),
    Invocation(Invocation),
    Filter {
        table: Box<Table>,
        filter: BooleanExpression,
    },
    Projection {
        table: Box<Table>,
        args: Vec<String>,
    },
    Compute {
        table: Box<Table>,
        expression: Value,
        alias: Option<String>,
    },
    Alias {
        table: Box<Table>,
        name: String,
    },
    Aggregation {
        table: Box<Table>,
        /// Aggregated output, or `*` for `count`.
        field: String,
        operator: String,
        alias: Option<String>,
    },
    Sort {
        table: Box<Table>,
        value: Value,
        direction: SortDirection,
    },
    Index {
        table: Box<Table>,
        indices: Vec<Value>,
    },
    Slice {
        table: Box<Table>,
        base: Value,
        limit: Value,
    },
    Join {
        lhs: Box<Table>,
        rhs: Box<Table>,
        in_params: Vec<InputParam>,
    },
    /// The last `delta` events of `stream`, starting `base` events back.
    Window {
        base: Value,
        delta: Value,
        stream: Box<Stream>,
    },
    /// The events of `stream` in the `delta` interval starting at `base`.
    TimeSeries {
        base: Value,
        delta: Value,
        stream: Box<Stream>,
    },
}

impl From<TableNode> for Table {
    fn from(node: TableNode) -> Self {
        Table {
            node,
            schema: SchemaRef::default(),
        }
    }
}

impl Table {
    pub fn invocation(invocation: Invocation) -> Self {
        TableNode::Invocation(invocation).into()
    }

    pub fn var_ref(name: &str, in_params: Vec<InputParam>) -> Self {
        TableNode::VarRef(VarRefCall::new(name, in_params)).into()
    }

    pub fn filter(table: Table, filter: BooleanExpression) -> Self {
        TableNode::Filter {
            table: Box::new(table),
            filter,
        }
        .into()
    }

    pub fn projection(table: Table, args: &[&str]) -> Self {
        TableNode::Projection {
            table: Box::new(table),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
        .into()
    }

    pub fn join(lhs: Table, rhs: Table, in_params: Vec<InputParam>) -> Self {
        TableNode::Join {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            in_params,
        }
        .into()
    }
}

// ──────────────────────────────────────────────
// Streams
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    pub node: StreamNode,
    #[serde(skip)]
    pub schema: SchemaRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamNode {
    VarRef(VarRefCall),
    Timer {
        base: Value,
        interval: Value,
        frequency: Option<Value>,
    },
    AtTimer {
        /// An array of times of day.
        time: Value,
        expiration_date: Option<Value>,
    },
    OnTimer {
        /// An array of dates.
        date: Value,
    },
    Monitor {
        table: Box<Table>,
        args: Option<Vec<String>>,
    },
    EdgeNew {
        stream: Box<Stream>,
    },
    EdgeFilter {
        stream: Box<Stream>,
        filter: BooleanExpression,
    },
    Filter {
        stream: Box<Stream>,
        filter: BooleanExpression,
    },
    Projection {
        stream: Box<Stream>,
        args: Vec<String>,
    },
    Compute {
        stream: Box<Stream>,
        expression: Value,
        alias: Option<String>,
    },
    Alias {
        stream: Box<Stream>,
        name: String,
    },
    Join {
        stream: Box<Stream>,
        table: Box<Table>,
        in_params: Vec<InputParam>,
    },
}

impl From<StreamNode> for Stream {
    fn from(node: StreamNode) -> Self {
        Stream {
            node,
            schema: SchemaRef::default(),
        }
    }
}

impl Stream {
    pub fn monitor(table: Table) -> Self {
        StreamNode::Monitor {
            table: Box::new(table),
            args: None,
        }
        .into()
    }

    pub fn filter(stream: Stream, filter: BooleanExpression) -> Self {
        StreamNode::Filter {
            stream: Box::new(stream),
            filter,
        }
        .into()
    }
}

// ──────────────────────────────────────────────
// Actions
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuiltinAction {
    Notify,
    /// Deliver results to the owner of a remote program.
    Return,
    Save,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    Builtin(BuiltinAction),
    Invocation(Invocation),
    VarRef(VarRefCall),
}

impl Action {
    pub fn notify() -> Self {
        Action::Builtin(BuiltinAction::Notify)
    }

    pub fn is_builtin(&self, which: BuiltinAction) -> bool {
        matches!(self, Action::Builtin(b) if *b == which)
    }
}
