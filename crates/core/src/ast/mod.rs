//! The ThingTalk abstract syntax tree.
//!
//! Nodes are produced by the parser (or by the transformations in this
//! crate) and annotated in place by the typechecker. Every node is `Clone`
//! (deep copy), structurally comparable, and has a JSON interchange form.

pub mod class_def;
pub mod expression;
pub mod program;
pub mod value;

pub use class_def::{
    AnnotationMap, ArgDirection, ArgumentDef, ClassDef, FunctionDef, FunctionType, MixinArg,
    MixinDef, MixinImport,
};
pub use expression::{
    Action, BooleanExpression, BuiltinAction, ExternalFilter, InputParam, Invocation, SchemaRef,
    Selector, SortDirection, Stream, StreamNode, Table, TableNode, VarRefCall,
};
pub use program::{
    Declaration, Example, Expression, PermissionFunction, PermissionRule, Program, Statement,
};
pub use value::{DateEdge, DateValue, Location, TimeValue, Value};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn sample_program() -> Program {
        let comic = Table::filter(
            Table::invocation(Invocation::new(
                "com.xkcd",
                "get_comic",
                vec![InputParam::new("number", Value::Number(42.0))],
            )),
            BooleanExpression::And(vec![
                BooleanExpression::atom("title", "=~", Value::string("cat")),
                BooleanExpression::Not(Box::new(BooleanExpression::atom(
                    "alt_text",
                    "==",
                    Value::undefined(),
                ))),
            ]),
        );
        Program::new(vec![
            Statement::Command {
                table: Some(comic),
                actions: vec![Action::notify()],
            },
            Statement::Rule {
                stream: StreamNode::AtTimer {
                    time: Value::Array(vec![
                        Value::Time(TimeValue::Absolute {
                            hour: 8,
                            minute: 30,
                            second: 0,
                        }),
                        Value::undefined(),
                    ]),
                    expiration_date: None,
                }
                .into(),
                actions: vec![Action::Invocation(Invocation::new(
                    "com.twitter",
                    "post",
                    vec![InputParam::new("status", Value::string("good morning"))],
                ))],
            },
        ])
    }

    #[test]
    fn interchange_round_trip_is_structural_identity() {
        let program = sample_program();
        let json = serde_json::to_string(&program).unwrap();
        let back: Program = serde_json::from_str(&json).unwrap();
        assert_eq!(back, program);
    }

    #[test]
    fn equality_ignores_resolved_schemas() {
        let program = sample_program();
        let mut annotated = program.clone();
        if let Statement::Command {
            table: Some(table), ..
        } = &mut annotated.statements[0]
        {
            table.schema.set(Arc::new(FunctionDef::new(
                FunctionType::Query,
                "get_comic",
                vec![],
            )));
        }
        assert_eq!(annotated, program);
    }

    #[test]
    fn clone_is_deep() {
        let program = sample_program();
        let mut copy = program.clone();
        if let Statement::Rule { actions, .. } = &mut copy.statements[1] {
            actions.push(Action::notify());
        }
        assert_ne!(copy, program);
        assert_eq!(program.statements[1].actions().len(), 1);
    }
}
