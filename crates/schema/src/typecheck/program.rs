//! The synchronous half of program typechecking.
//!
//! Runs after every remote signature the program mentions has been
//! resolved. Walks the tree once, in statement order, computing the
//! signature of each table and stream, checking parameters and filters
//! against it, and attaching it to the node.

use crate::error::{SchemaError, TypeError};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use thingtalk_core::ast::{
    Action, ArgDirection, ArgumentDef, BooleanExpression, ClassDef, Declaration, Expression,
    FunctionDef, FunctionType, InputParam, Invocation, Program, Statement, Stream, StreamNode,
    Table, TableNode, Value,
};
use thingtalk_core::slots::{aggregated_name, computed_name, Scope};
use thingtalk_core::types::{
    aggregation_type, computation_type, element_type, operand_type, CompoundField,
};
use thingtalk_core::{is_assignable, Type};

/// A signature the program needs from outside.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Reference {
    Function {
        kind: String,
        function_type: FunctionType,
        name: String,
    },
    Memory {
        name: String,
    },
}

impl Reference {
    pub(crate) fn function(kind: &str, function_type: FunctionType, name: &str) -> Self {
        Reference::Function {
            kind: kind.to_string(),
            function_type,
            name: name.to_string(),
        }
    }
}

/// Outcome of resolving each [`Reference`]. A memory table the delegate
/// does not know resolves to `None`.
pub(crate) type Resolved = HashMap<Reference, Result<Option<Arc<FunctionDef>>, SchemaError>>;

pub(crate) enum Located<'a> {
    Local(&'a FunctionDef),
    /// Not defined locally; ask these remote kinds, in order.
    Remote(Vec<String>),
}

/// Finds `kind.name` among the program's own classes, walking local parents
/// breadth first. Parents that are not local are returned for remote lookup.
pub(crate) fn locate<'a>(
    classes: &'a [ClassDef],
    kind: &str,
    function_type: FunctionType,
    name: &str,
) -> Located<'a> {
    let mut queue = VecDeque::from([kind.to_string()]);
    let mut visited = HashSet::new();
    let mut remote = Vec::new();
    while let Some(current) = queue.pop_front() {
        if !visited.insert(current.clone()) {
            continue;
        }
        match classes.iter().find(|c| c.kind == current) {
            Some(class) => {
                if let Some(function) = class.function(function_type, name) {
                    return Located::Local(function);
                }
                queue.extend(class.extends.iter().cloned());
            }
            None => remote.push(current),
        }
    }
    Located::Remote(remote)
}

/// Type of `value` in `scope`.
pub(crate) fn value_type(value: &Value, scope: &Scope) -> Result<Type, TypeError> {
    match value {
        Value::VarRef(name) => match scope.get(name) {
            Some(ty) => Ok(ty.clone()),
            // placeholders introduced when lifting examples
            None if name.starts_with("__const_") => Ok(Type::Any),
            None => Err(TypeError::UnknownVariable { name: name.clone() }),
        },
        Value::Undefined { .. } => Ok(Type::Any),
        Value::Computation { op, operands } => {
            let types = operands
                .iter()
                .map(|operand| value_type(operand, scope))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(computation_type(op, &types))
        }
        Value::Array(items) => {
            let types = items
                .iter()
                .map(|item| value_type(item, scope))
                .collect::<Result<Vec<_>, _>>()?;
            let elem = element_type(types).map_err(|(expected, found)| {
                TypeError::TypeMismatch {
                    context: "array element".to_string(),
                    expected,
                    found,
                }
            })?;
            Ok(Type::array(elem))
        }
        Value::Object(fields) => {
            let mut typed = IndexMap::new();
            for (name, field) in fields {
                typed.insert(name.clone(), CompoundField::new(value_type(field, scope)?));
            }
            Ok(Type::Compound {
                name: None,
                fields: typed,
            })
        }
        other => Ok(other.get_type()),
    }
}

fn expect_type(context: &str, expected: Type, value: &Value, scope: &Scope) -> Result<(), TypeError> {
    let found = value_type(value, scope)?;
    if is_assignable(&expected, &found) {
        Ok(())
    } else {
        Err(TypeError::TypeMismatch {
            context: context.to_string(),
            expected,
            found,
        })
    }
}

/// `outer` extended with the arguments of `sig` and `$event`.
fn scope_of(outer: &Scope, sig: &FunctionDef) -> Scope {
    let mut scope = outer.clone();
    for arg in &sig.args {
        scope.insert(arg.name.clone(), arg.ty.clone());
    }
    scope.insert("$event".to_string(), Type::String);
    scope
}

fn renamed(sig: &FunctionDef, name: &str, function_type: FunctionType) -> FunctionDef {
    let mut sig = sig.with_type(function_type);
    sig.name = name.to_string();
    sig.class = None;
    sig
}

pub(crate) struct ProgramChecker<'r> {
    resolved: &'r Resolved,
    classes: Vec<ClassDef>,
    declarations: HashMap<String, Arc<FunctionDef>>,
}

impl<'r> ProgramChecker<'r> {
    pub(crate) fn new(resolved: &'r Resolved, classes: Vec<ClassDef>) -> Self {
        ProgramChecker {
            resolved,
            classes,
            declarations: HashMap::new(),
        }
    }

    pub(crate) fn check_program(&mut self, program: &mut Program) -> Result<(), TypeError> {
        if let Some(principal) = &program.principal {
            expect_type(
                "program principal",
                Type::entity("tt:contact"),
                principal,
                &Scope::new(),
            )?;
        }
        for declaration in &mut program.declarations {
            let sig = self.check_declaration(declaration)?;
            self.declarations.insert(declaration.name.clone(), sig);
        }
        let root = Scope::new();
        for statement in &mut program.statements {
            self.check_statement(statement, &root)?;
        }
        Ok(())
    }

    fn check_declaration(&mut self, declaration: &mut Declaration) -> Result<Arc<FunctionDef>, TypeError> {
        let scope: Scope = declaration.args.clone();
        let body = self.check_expression(&mut declaration.value, &scope)?;
        let args = declaration
            .args
            .iter()
            .map(|(name, ty)| ArgumentDef::new(ArgDirection::InReq, name, ty.clone()))
            .collect();
        let sig = renamed(&body, &declaration.name, body.function_type).add_arguments(args);
        Ok(Arc::new(sig))
    }

    fn check_expression(
        &mut self,
        expression: &mut Expression,
        scope: &Scope,
    ) -> Result<FunctionDef, TypeError> {
        match expression {
            Expression::Table(table) => Ok(self.check_table(table, scope, &[])?.as_ref().clone()),
            Expression::Stream(stream) => {
                Ok(self.check_stream(stream, scope, &[])?.as_ref().clone())
            }
            Expression::Action(action) => {
                self.check_action(action, scope)?;
                Ok(FunctionDef::new(FunctionType::Action, "action", vec![]))
            }
            Expression::Program(program) => {
                self.check_program(program)?;
                Ok(FunctionDef::new(FunctionType::Action, "program", vec![]))
            }
        }
    }

    fn check_statement(&mut self, statement: &mut Statement, scope: &Scope) -> Result<(), TypeError> {
        match statement {
            Statement::Rule { stream, actions } => {
                let sig = self.check_stream(stream, scope, &[])?;
                let inner = scope_of(scope, &sig);
                for action in actions {
                    self.check_action(action, &inner)?;
                }
            }
            Statement::Command { table, actions } => {
                let inner = match table {
                    Some(table) => {
                        let sig = self.check_table(table, scope, &[])?;
                        scope_of(scope, &sig)
                    }
                    None => scope.clone(),
                };
                for action in actions {
                    self.check_action(action, &inner)?;
                }
            }
            Statement::Assignment { name, value } => {
                let sig = self.check_table(value, scope, &[])?;
                let sig = renamed(&sig, name, FunctionType::Query);
                self.declarations.insert(name.clone(), Arc::new(sig));
            }
        }
        Ok(())
    }

    // ──────────────────────────────────────────────
    // Primitives
    // ──────────────────────────────────────────────

    fn function(
        &self,
        kind: &str,
        function_type: FunctionType,
        name: &str,
    ) -> Result<Arc<FunctionDef>, TypeError> {
        let kinds = match locate(&self.classes, kind, function_type, name) {
            Located::Local(function) => return Ok(Arc::new(function.clone())),
            Located::Remote(kinds) => kinds,
        };
        let mut first_error = None;
        for remote in &kinds {
            match self
                .resolved
                .get(&Reference::function(remote, function_type, name))
            {
                Some(Ok(Some(function))) => return Ok(function.clone()),
                Some(Err(err)) => {
                    first_error.get_or_insert_with(|| err.clone());
                }
                _ => {}
            }
        }
        Err(first_error
            .unwrap_or_else(|| SchemaError::InvalidFunction {
                kind: kind.to_string(),
                function_type,
                name: name.to_string(),
            })
            .into())
    }

    fn var_ref(&self, name: &str) -> Result<Arc<FunctionDef>, TypeError> {
        if let Some(sig) = self.declarations.get(name) {
            return Ok(sig.clone());
        }
        match self.resolved.get(&Reference::Memory {
            name: name.to_string(),
        }) {
            Some(Ok(Some(sig))) => Ok(sig.clone()),
            Some(Err(err)) => Err(err.clone().into()),
            _ => Err(TypeError::UnknownTable {
                name: name.to_string(),
            }),
        }
    }

    /// Checks `params` against the inputs of `sig` and fills required
    /// inputs that are neither given nor in `supplied` with `$?`.
    fn check_params(
        &self,
        sig: &FunctionDef,
        params: &mut Vec<InputParam>,
        scope: &Scope,
        supplied: &[String],
    ) -> Result<(), TypeError> {
        let function = sig.qualified_name();
        let mut seen = HashSet::new();
        for param in params.iter() {
            if !seen.insert(param.name.clone()) {
                return Err(TypeError::DuplicateParameter {
                    function,
                    name: param.name.clone(),
                });
            }
            let arg = sig
                .arg(&param.name)
                .filter(|a| a.is_input())
                .ok_or_else(|| TypeError::UnknownParameter {
                    function: function.clone(),
                    name: param.name.clone(),
                })?;
            expect_type(
                &format!("{}.{}", function, param.name),
                arg.ty.clone(),
                &param.value,
                scope,
            )?;
        }
        for name in sig.in_req().keys() {
            if !seen.contains(*name) && !supplied.iter().any(|s| s.as_str() == *name) {
                params.push(InputParam::new(name, Value::Undefined { local: true }));
            }
        }
        Ok(())
    }

    fn check_invocation(
        &self,
        invocation: &mut Invocation,
        function_type: FunctionType,
        scope: &Scope,
        supplied: &[String],
    ) -> Result<Arc<FunctionDef>, TypeError> {
        let sig = self.function(&invocation.selector.kind, function_type, &invocation.channel)?;
        self.check_params(&sig, &mut invocation.in_params, scope, supplied)?;
        invocation.schema.set(sig.clone());
        Ok(sig)
    }

    fn check_action(&mut self, action: &mut Action, scope: &Scope) -> Result<(), TypeError> {
        match action {
            Action::Builtin(_) => Ok(()),
            Action::Invocation(invocation) => {
                self.check_invocation(invocation, FunctionType::Action, scope, &[])?;
                Ok(())
            }
            Action::VarRef(call) => {
                let sig = self.var_ref(&call.name)?;
                if sig.function_type != FunctionType::Action {
                    return Err(TypeError::InvalidFunction {
                        function: call.name.clone(),
                        message: format!("a {} used as an action", sig.function_type),
                    });
                }
                self.check_params(&sig, &mut call.in_params, scope, &[])?;
                call.schema.set(sig);
                Ok(())
            }
        }
    }

    // ──────────────────────────────────────────────
    // Filters
    // ──────────────────────────────────────────────

    fn check_filter(&self, filter: &mut BooleanExpression, scope: &Scope) -> Result<(), TypeError> {
        match filter {
            BooleanExpression::True | BooleanExpression::False => Ok(()),
            BooleanExpression::And(operands) | BooleanExpression::Or(operands) => {
                for operand in operands {
                    self.check_filter(operand, scope)?;
                }
                Ok(())
            }
            BooleanExpression::Not(inner) => self.check_filter(inner, scope),
            BooleanExpression::Atom {
                name,
                operator,
                value,
            } => {
                let lhs = scope
                    .get(name.as_str())
                    .cloned()
                    .ok_or_else(|| TypeError::UnknownVariable { name: name.clone() })?;
                check_operator(name, operator, &lhs, value, scope)
            }
            BooleanExpression::Compute { lhs, operator, rhs } => {
                let lhs_type = value_type(lhs, scope)?;
                check_operator(&lhs.to_string(), operator, &lhs_type, rhs, scope)
            }
            BooleanExpression::External(external) => {
                let sig =
                    self.check_invocation(&mut external.invocation, FunctionType::Query, scope, &[])?;
                self.check_filter(&mut external.filter, &scope_of(scope, &sig))
            }
            BooleanExpression::VarRef(name) => match scope.get(name.as_str()) {
                Some(Type::Boolean) | Some(Type::Any) => Ok(()),
                Some(other) => Err(TypeError::TypeMismatch {
                    context: name.clone(),
                    expected: Type::Boolean,
                    found: other.clone(),
                }),
                None => Err(TypeError::UnknownVariable { name: name.clone() }),
            },
        }
    }

    // ──────────────────────────────────────────────
    // Tables and streams
    // ──────────────────────────────────────────────

    fn check_table(
        &mut self,
        table: &mut Table,
        scope: &Scope,
        supplied: &[String],
    ) -> Result<Arc<FunctionDef>, TypeError> {
        let sig = match &mut table.node {
            TableNode::VarRef(call) => {
                let sig = self.var_ref(&call.name)?;
                if sig.function_type != FunctionType::Query {
                    return Err(TypeError::InvalidFunction {
                        function: call.name.clone(),
                        message: format!("a {} used as a table", sig.function_type),
                    });
                }
                self.check_params(&sig, &mut call.in_params, scope, supplied)?;
                call.schema.set(sig.clone());
                sig
            }
            TableNode::Invocation(invocation) => {
                self.check_invocation(invocation, FunctionType::Query, scope, supplied)?
            }
            TableNode::Filter { table, filter } => {
                let sig = self.check_table(table, scope, supplied)?;
                self.check_filter(filter, &scope_of(scope, &sig))?;
                sig
            }
            TableNode::Projection { table, args } => {
                let sig = self.check_table(table, scope, supplied)?;
                Arc::new(projected(&sig, args)?)
            }
            TableNode::Compute {
                table,
                expression,
                alias,
            } => {
                let sig = self.check_table(table, scope, supplied)?;
                Arc::new(computed(&sig, expression, alias.as_deref(), scope)?)
            }
            TableNode::Alias { table, .. } => self.check_table(table, scope, supplied)?,
            TableNode::Aggregation {
                table,
                field,
                operator,
                alias,
            } => {
                let sig = self.check_table(table, scope, supplied)?;
                Arc::new(aggregated(&sig, field, operator, alias.as_deref())?)
            }
            TableNode::Sort { table, value, .. } => {
                let sig = self.check_table(table, scope, supplied)?;
                let ty = value_type(value, &scope_of(scope, &sig))?;
                if !ty.is_comparable() {
                    return Err(TypeError::InvalidOperator {
                        operator: "sort".to_string(),
                        ty,
                    });
                }
                sig
            }
            TableNode::Index { table, indices } => {
                let sig = self.check_table(table, scope, supplied)?;
                for index in indices.iter() {
                    expect_type("index", Type::Number, index, scope)?;
                }
                sig
            }
            TableNode::Slice { table, base, limit } => {
                let sig = self.check_table(table, scope, supplied)?;
                expect_type("slice base", Type::Number, base, scope)?;
                expect_type("slice limit", Type::Number, limit, scope)?;
                sig
            }
            TableNode::Join {
                lhs,
                rhs,
                in_params,
            } => {
                let lsig = self.check_table(lhs, scope, supplied)?;
                let names: Vec<String> = in_params.iter().map(|p| p.name.clone()).collect();
                let rsig = self.check_table(rhs, scope, &names)?;
                check_join_params(&rsig, in_params, &scope_of(scope, &lsig))?;
                Arc::new(lsig.add_arguments(rsig.args.clone()))
            }
            TableNode::Window {
                base,
                delta,
                stream,
            } => {
                let sig = self.check_stream(stream, scope, supplied)?;
                expect_type("window base", Type::Number, base, scope)?;
                expect_type("window delta", Type::Number, delta, scope)?;
                Arc::new(as_history(&sig))
            }
            TableNode::TimeSeries {
                base,
                delta,
                stream,
            } => {
                let sig = self.check_stream(stream, scope, supplied)?;
                expect_type("timeseries base", Type::Date, base, scope)?;
                expect_type("timeseries delta", Type::measure("ms"), delta, scope)?;
                Arc::new(as_history(&sig))
            }
        };
        table.schema.set(sig.clone());
        Ok(sig)
    }

    fn check_stream(
        &mut self,
        stream: &mut Stream,
        scope: &Scope,
        supplied: &[String],
    ) -> Result<Arc<FunctionDef>, TypeError> {
        let sig = match &mut stream.node {
            StreamNode::VarRef(call) => {
                let sig = self.var_ref(&call.name)?;
                if sig.function_type != FunctionType::Stream {
                    return Err(TypeError::InvalidFunction {
                        function: call.name.clone(),
                        message: format!("a {} used as a stream", sig.function_type),
                    });
                }
                self.check_params(&sig, &mut call.in_params, scope, supplied)?;
                call.schema.set(sig.clone());
                sig
            }
            StreamNode::Timer {
                base,
                interval,
                frequency,
            } => {
                expect_type("timer base", Type::Date, base, scope)?;
                expect_type("timer interval", Type::measure("ms"), interval, scope)?;
                if let Some(frequency) = frequency {
                    expect_type("timer frequency", Type::Number, frequency, scope)?;
                }
                timer_signature("timer")
            }
            StreamNode::AtTimer {
                time,
                expiration_date,
            } => {
                expect_type("attimer time", Type::array(Type::Time), time, scope)?;
                if let Some(expiration) = expiration_date {
                    expect_type("attimer expiration", Type::Date, expiration, scope)?;
                }
                timer_signature("attimer")
            }
            StreamNode::OnTimer { date } => {
                expect_type("ontimer date", Type::array(Type::Date), date, scope)?;
                timer_signature("ontimer")
            }
            StreamNode::Monitor { table, args } => {
                let sig = self.check_table(table, scope, supplied)?;
                if !sig.is_monitorable {
                    return Err(TypeError::NotMonitorable {
                        function: sig.qualified_name(),
                    });
                }
                if let Some(args) = args {
                    if let Some(missing) = args.iter().find(|a| !sig.has_argument(a)) {
                        return Err(TypeError::UnknownVariable {
                            name: missing.clone(),
                        });
                    }
                }
                Arc::new(sig.with_type(FunctionType::Stream))
            }
            StreamNode::EdgeNew { stream } => self.check_stream(stream, scope, supplied)?,
            StreamNode::EdgeFilter { stream, filter } | StreamNode::Filter { stream, filter } => {
                let sig = self.check_stream(stream, scope, supplied)?;
                self.check_filter(filter, &scope_of(scope, &sig))?;
                sig
            }
            StreamNode::Projection { stream, args } => {
                let sig = self.check_stream(stream, scope, supplied)?;
                Arc::new(projected(&sig, args)?)
            }
            StreamNode::Compute {
                stream,
                expression,
                alias,
            } => {
                let sig = self.check_stream(stream, scope, supplied)?;
                Arc::new(computed(&sig, expression, alias.as_deref(), scope)?)
            }
            StreamNode::Alias { stream, .. } => self.check_stream(stream, scope, supplied)?,
            StreamNode::Join {
                stream,
                table,
                in_params,
            } => {
                let ssig = self.check_stream(stream, scope, supplied)?;
                let names: Vec<String> = in_params.iter().map(|p| p.name.clone()).collect();
                let tsig = self.check_table(table, scope, &names)?;
                check_join_params(&tsig, in_params, &scope_of(scope, &ssig))?;
                Arc::new(ssig.add_arguments(tsig.args.clone()))
            }
        };
        stream.schema.set(sig.clone());
        Ok(sig)
    }
}

fn check_operator(
    lhs_name: &str,
    operator: &str,
    lhs: &Type,
    rhs: &Value,
    scope: &Scope,
) -> Result<(), TypeError> {
    let expected = operand_type(operator, lhs).ok_or_else(|| TypeError::InvalidOperator {
        operator: operator.to_string(),
        ty: lhs.clone(),
    })?;
    expect_type(&format!("{} {}", lhs_name, operator), expected, rhs, scope)
}

fn check_join_params(
    rhs: &FunctionDef,
    in_params: &[InputParam],
    lhs_scope: &Scope,
) -> Result<(), TypeError> {
    let function = rhs.qualified_name();
    for param in in_params {
        let arg = rhs
            .arg(&param.name)
            .filter(|a| a.is_input())
            .ok_or_else(|| TypeError::UnknownParameter {
                function: function.clone(),
                name: param.name.clone(),
            })?;
        expect_type(
            &format!("{}.{}", function, param.name),
            arg.ty.clone(),
            &param.value,
            lhs_scope,
        )?;
    }
    Ok(())
}

fn projected(sig: &FunctionDef, args: &[String]) -> Result<FunctionDef, TypeError> {
    if let Some(missing) = args.iter().find(|a| !sig.has_argument(a)) {
        return Err(TypeError::UnknownVariable {
            name: missing.clone(),
        });
    }
    Ok(sig.project(args))
}

fn computed(
    sig: &FunctionDef,
    expression: &Value,
    alias: Option<&str>,
    scope: &Scope,
) -> Result<FunctionDef, TypeError> {
    let ty = value_type(expression, &scope_of(scope, sig))?;
    let name = computed_name(expression, alias);
    Ok(sig.add_arguments(vec![ArgumentDef::new(ArgDirection::Out, &name, ty)]))
}

fn aggregated(
    sig: &FunctionDef,
    field: &str,
    operator: &str,
    alias: Option<&str>,
) -> Result<FunctionDef, TypeError> {
    let field_type = if field == "*" {
        None
    } else {
        let arg = sig
            .arg(field)
            .ok_or_else(|| TypeError::UnknownVariable {
                name: field.to_string(),
            })?;
        Some(arg.ty.clone())
    };
    let supported = match (operator, &field_type) {
        ("count", _) => true,
        ("sum" | "avg", Some(ty)) => ty.is_numeric(),
        ("max" | "min", Some(ty)) => ty.is_comparable(),
        _ => false,
    };
    if !supported {
        return Err(TypeError::InvalidOperator {
            operator: operator.to_string(),
            ty: field_type.unwrap_or(Type::Any),
        });
    }
    let ty = aggregation_type(operator, field_type.as_ref());
    let mut result = sig
        .filter_arguments(|a| a.is_input())
        .add_arguments(vec![ArgumentDef::new(
            ArgDirection::Out,
            &aggregated_name(operator, alias),
            ty,
        )]);
    result.is_list = false;
    Ok(result)
}

/// The signature of a window or time series over a stream.
fn as_history(sig: &FunctionDef) -> FunctionDef {
    let mut history = sig.with_type(FunctionType::Query);
    history.is_list = true;
    history
}

fn timer_signature(name: &str) -> Arc<FunctionDef> {
    Arc::new(FunctionDef::new(FunctionType::Stream, name, vec![]).with_flags(false, true))
}
