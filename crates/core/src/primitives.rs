//! Primitive iteration: every device function call in a tree, tagged with
//! the role it plays.

use crate::ast::{
    Action, BooleanExpression, Declaration, Example, Expression, Invocation, Program, Statement,
    Stream, StreamNode, Table, TableNode, VarRefCall,
};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveRole {
    Query,
    Action,
    /// A query invoked under `monitor`.
    Stream,
    /// The invocation of an external filter.
    Filter,
}

impl fmt::Display for PrimitiveRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveRole::Query => write!(f, "query"),
            PrimitiveRole::Action => write!(f, "action"),
            PrimitiveRole::Stream => write!(f, "stream"),
            PrimitiveRole::Filter => write!(f, "filter"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Primitive<'a> {
    Invocation(&'a Invocation),
    /// A call to a local declaration or memory table.
    VarRef(&'a VarRefCall),
}

impl Primitive<'_> {
    /// `kind:channel` for invocations, the variable name for local calls.
    pub fn name(&self) -> String {
        match self {
            Primitive::Invocation(invocation) => {
                format!("{}:{}", invocation.selector.kind, invocation.channel)
            }
            Primitive::VarRef(call) => call.name.clone(),
        }
    }
}

enum Frame<'a> {
    Program(&'a Program),
    Expression(&'a Expression),
    Statement(&'a Statement),
    Table(&'a Table, PrimitiveRole),
    Stream(&'a Stream),
    Action(&'a Action),
    Filter(&'a BooleanExpression),
}

/// Lazy depth-first iterator over the primitives of a tree, in source
/// order. Declarations come before statements.
pub struct Primitives<'a> {
    stack: Vec<Frame<'a>>,
    include_var_refs: bool,
}

impl<'a> Primitives<'a> {
    fn new(root: Frame<'a>, include_var_refs: bool) -> Self {
        Primitives {
            stack: vec![root],
            include_var_refs,
        }
    }

    fn var_ref(
        &self,
        role: PrimitiveRole,
        call: &'a VarRefCall,
    ) -> Option<(PrimitiveRole, Primitive<'a>)> {
        self.include_var_refs
            .then_some((role, Primitive::VarRef(call)))
    }
}

impl<'a> Iterator for Primitives<'a> {
    type Item = (PrimitiveRole, Primitive<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(frame) = self.stack.pop() {
            match frame {
                Frame::Program(program) => {
                    for statement in program.statements.iter().rev() {
                        self.stack.push(Frame::Statement(statement));
                    }
                    for declaration in program.declarations.iter().rev() {
                        self.stack.push(Frame::Expression(&declaration.value));
                    }
                }
                Frame::Expression(expression) => self.stack.push(match expression {
                    Expression::Table(table) => Frame::Table(table, PrimitiveRole::Query),
                    Expression::Stream(stream) => Frame::Stream(stream),
                    Expression::Action(action) => Frame::Action(action),
                    Expression::Program(program) => Frame::Program(program),
                }),
                Frame::Statement(statement) => match statement {
                    Statement::Rule { stream, actions } => {
                        for action in actions.iter().rev() {
                            self.stack.push(Frame::Action(action));
                        }
                        self.stack.push(Frame::Stream(stream));
                    }
                    Statement::Command { table, actions } => {
                        for action in actions.iter().rev() {
                            self.stack.push(Frame::Action(action));
                        }
                        if let Some(table) = table {
                            self.stack.push(Frame::Table(table, PrimitiveRole::Query));
                        }
                    }
                    Statement::Assignment { value, .. } => {
                        self.stack.push(Frame::Table(value, PrimitiveRole::Query));
                    }
                },
                Frame::Table(table, role) => match &table.node {
                    TableNode::VarRef(call) => {
                        if let Some(item) = self.var_ref(role, call) {
                            return Some(item);
                        }
                    }
                    TableNode::Invocation(invocation) => {
                        return Some((role, Primitive::Invocation(invocation)));
                    }
                    TableNode::Filter { table, filter } => {
                        self.stack.push(Frame::Filter(filter));
                        self.stack.push(Frame::Table(table, role));
                    }
                    TableNode::Projection { table, .. }
                    | TableNode::Compute { table, .. }
                    | TableNode::Alias { table, .. }
                    | TableNode::Aggregation { table, .. }
                    | TableNode::Sort { table, .. }
                    | TableNode::Index { table, .. }
                    | TableNode::Slice { table, .. } => {
                        self.stack.push(Frame::Table(table, role));
                    }
                    TableNode::Join { lhs, rhs, .. } => {
                        self.stack.push(Frame::Table(rhs, role));
                        self.stack.push(Frame::Table(lhs, role));
                    }
                    TableNode::Window { stream, .. } | TableNode::TimeSeries { stream, .. } => {
                        self.stack.push(Frame::Stream(stream));
                    }
                },
                Frame::Stream(stream) => match &stream.node {
                    StreamNode::VarRef(call) => {
                        if let Some(item) = self.var_ref(PrimitiveRole::Stream, call) {
                            return Some(item);
                        }
                    }
                    StreamNode::Timer { .. }
                    | StreamNode::AtTimer { .. }
                    | StreamNode::OnTimer { .. } => {}
                    StreamNode::Monitor { table, .. } => {
                        self.stack.push(Frame::Table(table, PrimitiveRole::Stream));
                    }
                    StreamNode::EdgeNew { stream }
                    | StreamNode::Projection { stream, .. }
                    | StreamNode::Compute { stream, .. }
                    | StreamNode::Alias { stream, .. } => {
                        self.stack.push(Frame::Stream(stream));
                    }
                    StreamNode::EdgeFilter { stream, filter }
                    | StreamNode::Filter { stream, filter } => {
                        self.stack.push(Frame::Filter(filter));
                        self.stack.push(Frame::Stream(stream));
                    }
                    StreamNode::Join { stream, table, .. } => {
                        self.stack.push(Frame::Table(table, PrimitiveRole::Query));
                        self.stack.push(Frame::Stream(stream));
                    }
                },
                Frame::Action(action) => match action {
                    Action::Builtin(_) => {}
                    Action::Invocation(invocation) => {
                        return Some((PrimitiveRole::Action, Primitive::Invocation(invocation)));
                    }
                    Action::VarRef(call) => {
                        if let Some(item) = self.var_ref(PrimitiveRole::Action, call) {
                            return Some(item);
                        }
                    }
                },
                Frame::Filter(filter) => match filter {
                    BooleanExpression::And(operands) | BooleanExpression::Or(operands) => {
                        for operand in operands.iter().rev() {
                            self.stack.push(Frame::Filter(operand));
                        }
                    }
                    BooleanExpression::Not(inner) => self.stack.push(Frame::Filter(inner)),
                    BooleanExpression::External(external) => {
                        self.stack.push(Frame::Filter(&external.filter));
                        return Some((
                            PrimitiveRole::Filter,
                            Primitive::Invocation(&external.invocation),
                        ));
                    }
                    BooleanExpression::True
                    | BooleanExpression::False
                    | BooleanExpression::Atom { .. }
                    | BooleanExpression::Compute { .. }
                    | BooleanExpression::VarRef(_) => {}
                },
            }
        }
        None
    }
}

/// Nodes whose primitives can be iterated.
pub trait IteratePrimitives {
    fn iterate_primitives(&self, include_var_refs: bool) -> Primitives<'_>;
}

impl IteratePrimitives for Program {
    fn iterate_primitives(&self, include_var_refs: bool) -> Primitives<'_> {
        Primitives::new(Frame::Program(self), include_var_refs)
    }
}

impl IteratePrimitives for Declaration {
    fn iterate_primitives(&self, include_var_refs: bool) -> Primitives<'_> {
        Primitives::new(Frame::Expression(&self.value), include_var_refs)
    }
}

impl IteratePrimitives for Example {
    fn iterate_primitives(&self, include_var_refs: bool) -> Primitives<'_> {
        Primitives::new(Frame::Expression(&self.value), include_var_refs)
    }
}

impl IteratePrimitives for Statement {
    fn iterate_primitives(&self, include_var_refs: bool) -> Primitives<'_> {
        Primitives::new(Frame::Statement(self), include_var_refs)
    }
}

impl IteratePrimitives for Table {
    fn iterate_primitives(&self, include_var_refs: bool) -> Primitives<'_> {
        Primitives::new(Frame::Table(self, PrimitiveRole::Query), include_var_refs)
    }
}

impl IteratePrimitives for Stream {
    fn iterate_primitives(&self, include_var_refs: bool) -> Primitives<'_> {
        Primitives::new(Frame::Stream(self), include_var_refs)
    }
}

impl IteratePrimitives for Action {
    fn iterate_primitives(&self, include_var_refs: bool) -> Primitives<'_> {
        Primitives::new(Frame::Action(self), include_var_refs)
    }
}

impl IteratePrimitives for BooleanExpression {
    fn iterate_primitives(&self, include_var_refs: bool) -> Primitives<'_> {
        Primitives::new(Frame::Filter(self), include_var_refs)
    }
}
