//! Statements, programs, declarations, examples and permission rules.

use crate::ast::class_def::ClassDef;
use crate::ast::expression::{Action, BooleanExpression, SchemaRef, Stream, Table};
use crate::ast::value::Value;
use crate::types::Type;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    /// `stream => actions`
    Rule { stream: Stream, actions: Vec<Action> },
    /// `now => [table =>] actions`
    Command {
        table: Option<Table>,
        actions: Vec<Action>,
    },
    /// `let name := table;`
    Assignment { name: String, value: Table },
}

impl Statement {
    pub fn actions(&self) -> &[Action] {
        match self {
            Statement::Rule { actions, .. } | Statement::Command { actions, .. } => {
                actions.as_slice()
            }
            Statement::Assignment { .. } => &[],
        }
    }
}

/// The body of a declaration or example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Table(Table),
    Stream(Stream),
    Action(Action),
    Program(Box<Program>),
}

/// `let <kind> name(args) := value;`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    pub name: String,
    #[serde(default)]
    pub args: IndexMap<String, Type>,
    pub value: Expression,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, Value>,
}

/// A dataset example: a parametrized expression with its utterances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub id: i64,
    #[serde(default)]
    pub args: IndexMap<String, Type>,
    pub value: Expression,
    #[serde(default)]
    pub utterances: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, Value>,
}

/// One compilation unit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub classes: Vec<ClassDef>,
    #[serde(default)]
    pub declarations: Vec<Declaration>,
    pub statements: Vec<Statement>,
    /// Owner of a program executed remotely (`executor = ... :`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<Value>,
}

impl Program {
    pub fn new(statements: Vec<Statement>) -> Self {
        Program {
            statements,
            ..Program::default()
        }
    }

    pub fn class(&self, kind: &str) -> Option<&ClassDef> {
        self.classes.iter().find(|c| c.kind == kind)
    }
}

// ──────────────────────────────────────────────
// Permission rules
// ──────────────────────────────────────────────

/// `principal : query => action;`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionRule {
    pub principal: BooleanExpression,
    pub query: PermissionFunction,
    pub action: PermissionFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PermissionFunction {
    /// `now` or `notify`.
    Builtin,
    /// `*`: any function.
    Star,
    /// `@kind.*`: any function of a class.
    ClassStar(String),
    /// `@kind.channel, filter`
    Specified {
        kind: String,
        channel: String,
        filter: BooleanExpression,
        #[serde(skip)]
        schema: SchemaRef,
    },
}

impl PermissionFunction {
    pub fn is_specified(&self) -> bool {
        matches!(self, PermissionFunction::Specified { .. })
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self, PermissionFunction::Builtin)
    }
}
