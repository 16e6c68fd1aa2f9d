//! Lowering of the `return` action for remotely executed programs.
//!
//! A program with a principal runs on someone else's behalf. Its `return`
//! actions become calls to a synthesized `send` function that ships the
//! results back over the messaging channel, and each one produces a
//! companion program that monitors the matching `receive` function on the
//! owner's side and notifies the results.

use crate::ast::{
    Action, ArgDirection, ArgumentDef, BuiltinAction, ClassDef, FunctionDef, FunctionType,
    InputParam, Invocation, Program, SchemaRef, Statement, Stream, Table, Value,
};
use crate::error::TransformError;
use crate::primitives::IteratePrimitives;
use crate::types::Type;
use std::sync::Arc;
use tracing::debug;

/// The messaging account results are delivered to.
pub trait Messaging {
    /// Account type, e.g. `matrix`.
    fn messaging_type(&self) -> &str;
    fn account(&self) -> &str;
}

/// Allocator for dynamic class kinds and flow tokens, threaded through
/// successive lowerings so numbering never repeats.
#[derive(Debug, Clone, Default)]
pub struct LoweringContext {
    next_class: u64,
    next_flow: u64,
}

impl LoweringContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_class(&mut self) -> String {
        let kind = format!("__dyn_{}", self.next_class);
        self.next_class += 1;
        kind
    }

    fn allocate_flow(&mut self) -> u64 {
        let token = self.next_flow;
        self.next_flow += 1;
        token
    }
}

fn routing_args() -> Vec<ArgumentDef> {
    vec![
        ArgumentDef::new(ArgDirection::InReq, "__principal", Type::entity("tt:contact")),
        ArgumentDef::new(ArgDirection::InReq, "__program_id", Type::entity("tt:program_id")),
        ArgumentDef::new(ArgDirection::InReq, "__flow", Type::Number),
    ]
}

fn send_function(outputs: &[ArgumentDef]) -> FunctionDef {
    let mut args = routing_args();
    args.push(ArgumentDef::new(
        ArgDirection::InReq,
        "__kindChannel",
        Type::entity("tt:function"),
    ));
    args.push(ArgumentDef::new(ArgDirection::InOpt, "__response", Type::String));
    args.extend(
        outputs
            .iter()
            .map(|a| ArgumentDef::new(ArgDirection::InReq, &a.name, a.ty.clone())),
    );
    FunctionDef::new(FunctionType::Action, "send", args)
}

fn receive_function(outputs: &[ArgumentDef]) -> FunctionDef {
    let mut args = routing_args();
    args.push(ArgumentDef::new(
        ArgDirection::Out,
        "__kindChannel",
        Type::entity("tt:function"),
    ));
    args.extend(
        outputs
            .iter()
            .map(|a| ArgumentDef::new(ArgDirection::Out, &a.name, a.ty.clone())),
    );
    FunctionDef::new(FunctionType::Query, "receive", args).with_flags(true, true)
}

/// The schema results are taken from: the query or stream of `statement`,
/// when it calls at least one primitive. Timers alone produce no results.
fn result_source(statement: &Statement) -> Option<&SchemaRef> {
    match statement {
        Statement::Rule { stream, .. } => stream
            .iterate_primitives(true)
            .next()
            .map(|_| &stream.schema),
        Statement::Command {
            table: Some(table), ..
        } => table.iterate_primitives(true).next().map(|_| &table.schema),
        Statement::Command { table: None, .. } | Statement::Assignment { .. } => None,
    }
}

fn returns(statement: &Statement) -> bool {
    statement
        .actions()
        .iter()
        .any(|a| a.is_builtin(BuiltinAction::Return))
}

/// Rewrites every `return` action of `program` and returns the companion
/// programs, one per rewritten action, in statement order.
///
/// Without a principal, or when the statement has no query or stream to
/// take results from, `return` becomes `notify`. Fails, leaving `program`
/// untouched, when a statement that needs lowering was never typechecked.
pub fn lower_return(
    program: &mut Program,
    messaging: &dyn Messaging,
    ctx: &mut LoweringContext,
) -> Result<Vec<Program>, TransformError> {
    let principal = program.principal.clone();
    if principal.is_some() {
        for (index, statement) in program.statements.iter().enumerate() {
            let unresolved = result_source(statement).is_some_and(|s| !s.is_resolved());
            if unresolved && returns(statement) {
                return Err(TransformError::MissingSchema {
                    node: format!("statement {}", index),
                });
            }
        }
    }

    let owner = Value::Entity {
        value: Some(format!(
            "{}-account:{}",
            messaging.messaging_type(),
            messaging.account()
        )),
        entity_type: "tt:contact".to_string(),
        display: None,
    };
    let mut send_classes = Vec::new();
    let mut companions = Vec::new();

    for statement in program.statements.iter_mut() {
        let schema = result_source(statement).and_then(SchemaRef::arc);
        let actions = match statement {
            Statement::Rule { actions, .. } | Statement::Command { actions, .. } => actions,
            Statement::Assignment { .. } => continue,
        };

        for action in actions.iter_mut() {
            if !action.is_builtin(BuiltinAction::Return) {
                continue;
            }
            let (remote, schema) = match (&principal, &schema) {
                (Some(remote), Some(schema)) => (remote, schema),
                _ => {
                    *action = Action::notify();
                    continue;
                }
            };
            let outputs: Vec<ArgumentDef> = schema
                .args
                .iter()
                .filter(|a| !a.is_input())
                .cloned()
                .collect();

            let token = ctx.allocate_flow();
            let send_class = ClassDef::new(
                &ctx.allocate_class(),
                vec![],
                vec![],
                vec![send_function(&outputs)],
            );
            let receive_class = ClassDef::new(
                &ctx.allocate_class(),
                vec![],
                vec![receive_function(&outputs)],
                vec![],
            );
            debug!(
                token,
                send = %send_class.kind,
                receive = %receive_class.kind,
                "lowered return"
            );

            let mut send_params = vec![
                InputParam::new("__principal", owner.clone()),
                InputParam::new("__program_id", Value::Event(Some("program_id".into()))),
                InputParam::new("__flow", Value::Number(token as f64)),
                InputParam::new("__kindChannel", Value::Event(Some("type".into()))),
            ];
            send_params.extend(
                outputs
                    .iter()
                    .map(|a| InputParam::new(&a.name, Value::var_ref(&a.name))),
            );
            let mut send = Invocation::new(&send_class.kind, "send", send_params);
            if let Some(def) = send_class.actions.get("send") {
                send.schema.set(Arc::new(def.clone()));
            }
            *action = Action::Invocation(send);

            let receive_schema: SchemaRef = receive_class
                .queries
                .get("receive")
                .map(|def| Arc::new(def.clone()).into())
                .unwrap_or_default();
            let mut receive = Invocation::new(
                &receive_class.kind,
                "receive",
                vec![
                    InputParam::new("__principal", remote.clone()),
                    InputParam::new("__program_id", Value::Event(Some("program_id".into()))),
                    InputParam::new("__flow", Value::Number(token as f64)),
                ],
            );
            receive.schema = receive_schema.clone();
            let mut table = Table::invocation(receive);
            table.schema = receive_schema.clone();
            let mut stream = Stream::monitor(table);
            stream.schema = receive_schema;

            companions.push(Program {
                classes: vec![receive_class],
                ..Program::new(vec![Statement::Rule {
                    stream,
                    actions: vec![Action::notify()],
                }])
            });
            send_classes.push(send_class);
        }
    }

    program.classes.extend(send_classes);
    Ok(companions)
}
