//! Slot iteration.
//!
//! A slot is a value position in the tree that a caller may read or
//! replace: an input parameter, a device attribute, a filter operand, a
//! timer argument and so on. Traversal is depth-first in source order and
//! hands each slot to a visitor together with the nearest enclosing
//! primitive, the expected type and the scope visible at that point.
//!
//! Scopes flow bottom-up: every node returns the `(primitive, scope)` pair
//! its consumers see. A missing scope (`None`) means the outputs are not
//! known, either because the tree is not typechecked or because the node
//! (a timer) has none.

use crate::ast::{
    Action, BooleanExpression, Declaration, Example, Expression, FunctionDef, InputParam,
    Invocation, Program, Selector, Statement, Stream, StreamNode, Table, TableNode, Value,
    VarRefCall,
};
use crate::types::{aggregation_type, computation_type, operand_type, Type};
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;

/// Parameter names visible at a point of the tree, with their types.
pub type Scope = IndexMap<String, Type>;

/// The device function a slot belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveInfo {
    pub kind: String,
    pub channel: String,
    pub schema: Option<Arc<FunctionDef>>,
}

impl PrimitiveInfo {
    fn of(invocation: &Invocation) -> Self {
        PrimitiveInfo {
            kind: invocation.selector.kind.clone(),
            channel: invocation.channel.clone(),
            schema: invocation.schema.arc(),
        }
    }

    pub fn name(&self) -> String {
        format!("{}:{}", self.kind, self.channel)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    InputParam,
    DeviceAttribute,
    FilterOperand,
    ComputeOperand,
    /// One element of an array value; the whole array is visited first
    /// under the same tag.
    ArrayElement { index: usize },
    /// A structural argument: sort key, index, slice bounds, timer and
    /// window parameters.
    Field,
}

/// A mutable view of one value position.
pub struct Slot<'a> {
    pub kind: SlotKind,
    pub tag: String,
    pub primitive: Option<&'a PrimitiveInfo>,
    pub expected_type: Type,
    pub scope: Option<&'a Scope>,
    pub value: &'a mut Value,
}

impl Slot<'_> {
    pub fn get(&self) -> &Value {
        &*self.value
    }

    pub fn set(&mut self, value: Value) {
        *self.value = value;
    }

    pub fn is_undefined(&self) -> bool {
        self.value.is_undefined()
    }
}

/// One item of the slot walk.
///
/// Every slot is a value position written in the tree. References to the
/// results of earlier commands (`result.<field>` slots) are not produced:
/// values have no result-reference form, so outputs are only reachable
/// through variable references in scope.
pub enum SlotItem<'a> {
    /// The device selector of an invocation, visited between its attributes
    /// and its input parameters.
    Selector {
        selector: &'a Selector,
        primitive: &'a PrimitiveInfo,
    },
    Slot(Slot<'a>),
}

/// Owned snapshot of a [`SlotItem`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "item", rename_all = "snake_case")]
pub enum SlotInfo {
    Selector {
        kind: String,
        primitive: String,
    },
    Slot {
        kind: SlotKind,
        tag: String,
        primitive: Option<String>,
        expected_type: Type,
        value: Value,
    },
}

impl From<SlotItem<'_>> for SlotInfo {
    fn from(item: SlotItem<'_>) -> Self {
        match item {
            SlotItem::Selector {
                selector,
                primitive,
            } => SlotInfo::Selector {
                kind: selector.kind.clone(),
                primitive: primitive.name(),
            },
            SlotItem::Slot(slot) => SlotInfo::Slot {
                kind: slot.kind,
                tag: slot.tag,
                primitive: slot.primitive.map(PrimitiveInfo::name),
                expected_type: slot.expected_type,
                value: slot.value.clone(),
            },
        }
    }
}

/// Nodes whose slots can be visited.
pub trait IterateSlots {
    fn iterate_slots(&mut self, visit: &mut dyn FnMut(SlotItem<'_>));
}

/// Snapshot of every slot of `node`, in traversal order.
pub fn collect_slots<T: IterateSlots + Clone>(node: &T) -> Vec<SlotInfo> {
    let mut copy = node.clone();
    let mut slots = Vec::new();
    copy.iterate_slots(&mut |item| slots.push(SlotInfo::from(item)));
    slots
}

/// Name of the column a `compute` adds.
pub fn computed_name(expression: &Value, alias: Option<&str>) -> String {
    match (alias, expression) {
        (Some(alias), _) => alias.to_string(),
        (None, Value::Computation { op, .. }) => op.clone(),
        (None, _) => "result".to_string(),
    }
}

/// Name of the column an aggregation produces.
pub fn aggregated_name(operator: &str, alias: Option<&str>) -> String {
    alias.unwrap_or(operator).to_string()
}

// ──────────────────────────────────────────────
// Trait impls
// ──────────────────────────────────────────────

impl IterateSlots for Program {
    fn iterate_slots(&mut self, visit: &mut dyn FnMut(SlotItem<'_>)) {
        program_slots(self, visit);
    }
}

impl IterateSlots for Declaration {
    fn iterate_slots(&mut self, visit: &mut dyn FnMut(SlotItem<'_>)) {
        let scope = self.args.clone();
        expression_slots(&mut self.value, Some(&scope), visit);
    }
}

impl IterateSlots for Example {
    fn iterate_slots(&mut self, visit: &mut dyn FnMut(SlotItem<'_>)) {
        let scope = self.args.clone();
        expression_slots(&mut self.value, Some(&scope), visit);
    }
}

impl IterateSlots for Statement {
    fn iterate_slots(&mut self, visit: &mut dyn FnMut(SlotItem<'_>)) {
        statement_slots(self, Some(&Scope::new()), visit);
    }
}

impl IterateSlots for Table {
    fn iterate_slots(&mut self, visit: &mut dyn FnMut(SlotItem<'_>)) {
        table_slots(self, Some(&Scope::new()), visit);
    }
}

impl IterateSlots for Stream {
    fn iterate_slots(&mut self, visit: &mut dyn FnMut(SlotItem<'_>)) {
        stream_slots(self, Some(&Scope::new()), visit);
    }
}

impl IterateSlots for Action {
    fn iterate_slots(&mut self, visit: &mut dyn FnMut(SlotItem<'_>)) {
        action_slots(self, Some(&Scope::new()), visit);
    }
}

impl IterateSlots for BooleanExpression {
    fn iterate_slots(&mut self, visit: &mut dyn FnMut(SlotItem<'_>)) {
        filter_slots(self, None, None, visit);
    }
}

// ──────────────────────────────────────────────
// Traversal
// ──────────────────────────────────────────────

type Visit<'v> = dyn FnMut(SlotItem<'_>) + 'v;

/// What a node exposes to its consumers.
type Flow = (Option<PrimitiveInfo>, Option<Scope>);

fn emit(
    visit: &mut Visit<'_>,
    kind: SlotKind,
    tag: String,
    primitive: Option<&PrimitiveInfo>,
    expected_type: Type,
    scope: Option<&Scope>,
    value: &mut Value,
) {
    let element = expected_type.element();
    visit(SlotItem::Slot(Slot {
        kind,
        tag: tag.clone(),
        primitive,
        expected_type,
        scope,
        value: &mut *value,
    }));
    if let Value::Array(items) = value {
        for (index, item) in items.iter_mut().enumerate() {
            visit(SlotItem::Slot(Slot {
                kind: SlotKind::ArrayElement { index },
                tag: tag.clone(),
                primitive,
                expected_type: element.clone(),
                scope,
                value: item,
            }));
        }
    }
}

/// The outputs of `schema`, plus `$event`.
fn schema_scope(schema: &FunctionDef) -> Scope {
    let mut scope: Scope = schema
        .args
        .iter()
        .filter(|a| !a.is_input())
        .map(|a| (a.name.clone(), a.ty.clone()))
        .collect();
    scope.insert("$event".to_string(), Type::String);
    scope
}

fn project_scope(scope: Scope, args: &[String]) -> Scope {
    scope
        .into_iter()
        .filter(|(name, _)| name == "$event" || args.contains(name))
        .collect()
}

fn merge_scopes(lhs: Option<Scope>, rhs: Option<Scope>) -> Option<Scope> {
    match (lhs, rhs) {
        (Some(mut lhs), Some(rhs)) => {
            lhs.extend(rhs);
            Some(lhs)
        }
        _ => None,
    }
}

/// Type of `value` in `scope`, or `Any` where it cannot be told.
fn value_type(value: &Value, scope: Option<&Scope>) -> Type {
    match value {
        Value::VarRef(name) => scope
            .and_then(|s| s.get(name))
            .cloned()
            .unwrap_or(Type::Any),
        Value::Computation { op, operands } => {
            let operand_types: Vec<Type> =
                operands.iter().map(|v| value_type(v, scope)).collect();
            computation_type(op, &operand_types)
        }
        other => other.get_type(),
    }
}

fn param_slots(
    params: &mut [InputParam],
    schema: Option<&FunctionDef>,
    primitive: Option<&PrimitiveInfo>,
    scope: Option<&Scope>,
    visit: &mut Visit<'_>,
) {
    for param in params {
        let expected = schema
            .and_then(|s| s.arg(&param.name))
            .map(|a| a.ty.clone())
            .unwrap_or(Type::Any);
        emit(
            visit,
            SlotKind::InputParam,
            format!("in_param.{}", param.name),
            primitive,
            expected,
            scope,
            &mut param.value,
        );
    }
}

fn invocation_slots(
    invocation: &mut Invocation,
    scope: Option<&Scope>,
    visit: &mut Visit<'_>,
) -> (PrimitiveInfo, Option<Scope>) {
    let primitive = PrimitiveInfo::of(invocation);
    for attr in invocation.selector.attributes.iter_mut() {
        emit(
            visit,
            SlotKind::DeviceAttribute,
            format!("attribute.{}", attr.name),
            Some(&primitive),
            Type::String,
            scope,
            &mut attr.value,
        );
    }
    visit(SlotItem::Selector {
        selector: &invocation.selector,
        primitive: &primitive,
    });
    let schema = invocation.schema.arc();
    param_slots(
        &mut invocation.in_params,
        schema.as_deref(),
        Some(&primitive),
        scope,
        visit,
    );
    let own_scope = schema.as_deref().map(schema_scope);
    (primitive, own_scope)
}

fn call_slots(call: &mut VarRefCall, scope: Option<&Scope>, visit: &mut Visit<'_>) -> Option<Scope> {
    let schema = call.schema.arc();
    param_slots(&mut call.in_params, schema.as_deref(), None, scope, visit);
    schema.as_deref().map(schema_scope)
}

fn filter_slots(
    filter: &mut BooleanExpression,
    primitive: Option<&PrimitiveInfo>,
    scope: Option<&Scope>,
    visit: &mut Visit<'_>,
) {
    match filter {
        BooleanExpression::True | BooleanExpression::False | BooleanExpression::VarRef(_) => {}
        BooleanExpression::And(operands) | BooleanExpression::Or(operands) => {
            for operand in operands {
                filter_slots(operand, primitive, scope, visit);
            }
        }
        BooleanExpression::Not(inner) => filter_slots(inner, primitive, scope, visit),
        BooleanExpression::Atom {
            name,
            operator,
            value,
        } => {
            let field = scope
                .and_then(|s| s.get(name.as_str()))
                .cloned()
                .unwrap_or(Type::Any);
            let expected = operand_type(operator, &field).unwrap_or(Type::Any);
            emit(
                visit,
                SlotKind::FilterOperand,
                format!("filter.{}.{}", operator, name),
                primitive,
                expected,
                scope,
                value,
            );
        }
        BooleanExpression::Compute { lhs, operator, rhs } => {
            let lhs_type = value_type(lhs, scope);
            let rhs_type = operand_type(operator, &lhs_type).unwrap_or(Type::Any);
            emit(
                visit,
                SlotKind::ComputeOperand,
                "compute_filter.lhs".to_string(),
                primitive,
                lhs_type,
                scope,
                lhs,
            );
            emit(
                visit,
                SlotKind::ComputeOperand,
                "compute_filter.rhs".to_string(),
                primitive,
                rhs_type,
                scope,
                rhs,
            );
        }
        BooleanExpression::External(external) => {
            let (inner, inner_scope) = invocation_slots(&mut external.invocation, scope, visit);
            filter_slots(
                &mut external.filter,
                Some(&inner),
                inner_scope.as_ref(),
                visit,
            );
        }
    }
}

fn field_slot(
    visit: &mut Visit<'_>,
    tag: &str,
    primitive: Option<&PrimitiveInfo>,
    expected_type: Type,
    scope: Option<&Scope>,
    value: &mut Value,
) {
    emit(
        visit,
        SlotKind::Field,
        tag.to_string(),
        primitive,
        expected_type,
        scope,
        value,
    );
}

fn with_computed(scope: Option<Scope>, expression: &Value, alias: Option<&str>) -> Option<Scope> {
    scope.map(|mut s| {
        let ty = value_type(expression, Some(&s));
        s.insert(computed_name(expression, alias), ty);
        s
    })
}

fn table_slots(table: &mut Table, scope: Option<&Scope>, visit: &mut Visit<'_>) -> Flow {
    match &mut table.node {
        TableNode::VarRef(call) => (None, call_slots(call, scope, visit)),
        TableNode::Invocation(invocation) => {
            let (primitive, own_scope) = invocation_slots(invocation, scope, visit);
            (Some(primitive), own_scope)
        }
        TableNode::Filter { table, filter } => {
            let (primitive, inner) = table_slots(table, scope, visit);
            filter_slots(filter, primitive.as_ref(), inner.as_ref(), visit);
            (primitive, inner)
        }
        TableNode::Projection { table, args } => {
            let (primitive, inner) = table_slots(table, scope, visit);
            (primitive, inner.map(|s| project_scope(s, args)))
        }
        TableNode::Compute {
            table,
            expression,
            alias,
        } => {
            let (primitive, inner) = table_slots(table, scope, visit);
            let extended = with_computed(inner, expression, alias.as_deref());
            (primitive, extended)
        }
        TableNode::Alias { table, .. } => table_slots(table, scope, visit),
        TableNode::Aggregation {
            table,
            field,
            operator,
            alias,
        } => {
            let (primitive, inner) = table_slots(table, scope, visit);
            let aggregated = inner.map(|s| {
                let ty = aggregation_type(operator, s.get(field.as_str()));
                let mut out = Scope::new();
                out.insert(aggregated_name(operator, alias.as_deref()), ty);
                out.insert("$event".to_string(), Type::String);
                out
            });
            (primitive, aggregated)
        }
        TableNode::Sort { table, value, .. } => {
            let (primitive, inner) = table_slots(table, scope, visit);
            let expected = value_type(value, inner.as_ref());
            field_slot(visit, "sort.value", primitive.as_ref(), expected, inner.as_ref(), value);
            (primitive, inner)
        }
        TableNode::Index { table, indices } => {
            let (primitive, inner) = table_slots(table, scope, visit);
            for index in indices {
                field_slot(visit, "index", primitive.as_ref(), Type::Number, inner.as_ref(), index);
            }
            (primitive, inner)
        }
        TableNode::Slice { table, base, limit } => {
            let (primitive, inner) = table_slots(table, scope, visit);
            field_slot(visit, "slice.base", primitive.as_ref(), Type::Number, inner.as_ref(), base);
            field_slot(visit, "slice.limit", primitive.as_ref(), Type::Number, inner.as_ref(), limit);
            (primitive, inner)
        }
        TableNode::Join {
            lhs,
            rhs,
            in_params,
        } => {
            let (lhs_primitive, lhs_scope) = table_slots(lhs, scope, visit);
            let (rhs_primitive, rhs_scope) = table_slots(rhs, scope, visit);
            let rhs_schema = rhs.schema.arc();
            param_slots(
                in_params,
                rhs_schema.as_deref(),
                rhs_primitive.as_ref(),
                lhs_scope.as_ref(),
                visit,
            );
            (rhs_primitive.or(lhs_primitive), merge_scopes(lhs_scope, rhs_scope))
        }
        TableNode::Window {
            base,
            delta,
            stream,
        } => {
            field_slot(visit, "window.base", None, Type::Number, scope, base);
            field_slot(visit, "window.delta", None, Type::Number, scope, delta);
            stream_slots(stream, scope, visit)
        }
        TableNode::TimeSeries {
            base,
            delta,
            stream,
        } => {
            field_slot(visit, "timeseries.base", None, Type::Date, scope, base);
            field_slot(visit, "timeseries.delta", None, Type::measure("ms"), scope, delta);
            stream_slots(stream, scope, visit)
        }
    }
}

fn stream_slots(stream: &mut Stream, scope: Option<&Scope>, visit: &mut Visit<'_>) -> Flow {
    match &mut stream.node {
        StreamNode::VarRef(call) => (None, call_slots(call, scope, visit)),
        StreamNode::Timer {
            base,
            interval,
            frequency,
        } => {
            field_slot(visit, "timer.base", None, Type::Date, scope, base);
            field_slot(visit, "timer.interval", None, Type::measure("ms"), scope, interval);
            if let Some(frequency) = frequency {
                field_slot(visit, "timer.frequency", None, Type::Number, scope, frequency);
            }
            (None, None)
        }
        StreamNode::AtTimer {
            time,
            expiration_date,
        } => {
            field_slot(visit, "attimer.time", None, Type::array(Type::Time), scope, time);
            if let Some(expiration) = expiration_date {
                field_slot(visit, "attimer.expiration_date", None, Type::Date, scope, expiration);
            }
            (None, None)
        }
        StreamNode::OnTimer { date } => {
            field_slot(visit, "ontimer.date", None, Type::array(Type::Date), scope, date);
            (None, None)
        }
        StreamNode::Monitor { table, args } => {
            let (primitive, inner) = table_slots(table, scope, visit);
            let monitored = match args {
                Some(args) => inner.map(|s| project_scope(s, args)),
                None => inner,
            };
            (primitive, monitored)
        }
        StreamNode::EdgeNew { stream } | StreamNode::Alias { stream, .. } => {
            stream_slots(stream, scope, visit)
        }
        StreamNode::EdgeFilter { stream, filter } | StreamNode::Filter { stream, filter } => {
            let (primitive, inner) = stream_slots(stream, scope, visit);
            filter_slots(filter, primitive.as_ref(), inner.as_ref(), visit);
            (primitive, inner)
        }
        StreamNode::Projection { stream, args } => {
            let (primitive, inner) = stream_slots(stream, scope, visit);
            (primitive, inner.map(|s| project_scope(s, args)))
        }
        StreamNode::Compute {
            stream,
            expression,
            alias,
        } => {
            let (primitive, inner) = stream_slots(stream, scope, visit);
            let extended = with_computed(inner, expression, alias.as_deref());
            (primitive, extended)
        }
        StreamNode::Join {
            stream,
            table,
            in_params,
        } => {
            let (stream_primitive, stream_scope) = stream_slots(stream, scope, visit);
            let (table_primitive, table_scope) = table_slots(table, scope, visit);
            let table_schema = table.schema.arc();
            param_slots(
                in_params,
                table_schema.as_deref(),
                table_primitive.as_ref(),
                stream_scope.as_ref(),
                visit,
            );
            (
                table_primitive.or(stream_primitive),
                merge_scopes(stream_scope, table_scope),
            )
        }
    }
}

fn action_slots(action: &mut Action, scope: Option<&Scope>, visit: &mut Visit<'_>) {
    match action {
        Action::Builtin(_) => {}
        Action::Invocation(invocation) => {
            invocation_slots(invocation, scope, visit);
        }
        Action::VarRef(call) => {
            call_slots(call, scope, visit);
        }
    }
}

fn statement_slots(statement: &mut Statement, scope: Option<&Scope>, visit: &mut Visit<'_>) {
    match statement {
        Statement::Rule { stream, actions } => {
            let (_, inner) = stream_slots(stream, scope, visit);
            for action in actions {
                action_slots(action, inner.as_ref(), visit);
            }
        }
        Statement::Command { table, actions } => {
            let inner = match table {
                Some(table) => table_slots(table, scope, visit).1,
                None => scope.cloned(),
            };
            for action in actions {
                action_slots(action, inner.as_ref(), visit);
            }
        }
        Statement::Assignment { value, .. } => {
            table_slots(value, scope, visit);
        }
    }
}

fn expression_slots(expression: &mut Expression, scope: Option<&Scope>, visit: &mut Visit<'_>) {
    match expression {
        Expression::Table(table) => {
            table_slots(table, scope, visit);
        }
        Expression::Stream(stream) => {
            stream_slots(stream, scope, visit);
        }
        Expression::Action(action) => action_slots(action, scope, visit),
        Expression::Program(program) => program_slots(program, visit),
    }
}

fn program_slots(program: &mut Program, visit: &mut Visit<'_>) {
    for declaration in &mut program.declarations {
        declaration.iterate_slots(visit);
    }
    let root = Scope::new();
    for statement in &mut program.statements {
        statement_slots(statement, Some(&root), visit);
    }
}
