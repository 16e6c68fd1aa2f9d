//! Turning declarations and dataset examples into runnable programs.

use crate::ast::{Action, Declaration, Example, Expression, Program, Statement, Value};
use crate::slots::{IterateSlots, SlotItem, SlotKind};
use crate::types::Type;
use indexmap::IndexMap;

/// Name given to the placeholder for the `index`-th declared argument.
pub fn const_slot_name(index: usize) -> String {
    format!("__const_SLOT_{}", index)
}

pub trait ToProgram {
    fn to_program(&self) -> Program;
}

impl ToProgram for Declaration {
    fn to_program(&self) -> Program {
        to_program(&self.args, &self.value)
    }
}

impl ToProgram for Example {
    fn to_program(&self) -> Program {
        to_program(&self.args, &self.value)
    }
}

/// Wraps `value` into a program and replaces every reference to one of
/// `args` with its `__const_SLOT_<i>` placeholder, `i` being the position
/// of the argument in declaration order.
pub fn to_program(args: &IndexMap<String, Type>, value: &Expression) -> Program {
    let mut program = match value {
        Expression::Action(action) => Program::new(vec![Statement::Command {
            table: None,
            actions: vec![action.clone()],
        }]),
        Expression::Table(table) => Program::new(vec![Statement::Command {
            table: Some(table.clone()),
            actions: vec![Action::notify()],
        }]),
        Expression::Stream(stream) => Program::new(vec![Statement::Rule {
            stream: stream.clone(),
            actions: vec![Action::notify()],
        }]),
        Expression::Program(program) => (**program).clone(),
    };

    program.iterate_slots(&mut |item| match item {
        SlotItem::Selector { .. } => {}
        SlotItem::Slot(slot) => {
            // array elements were already handled with the whole array
            if !matches!(slot.kind, SlotKind::ArrayElement { .. }) {
                rename_arguments(slot.value, args);
            }
        }
    });
    program
}

fn rename_arguments(value: &mut Value, args: &IndexMap<String, Type>) {
    match value {
        Value::VarRef(name) => {
            if let Some(index) = args.get_index_of(name.as_str()) {
                *name = const_slot_name(index);
            }
        }
        Value::Array(items) => {
            for item in items {
                rename_arguments(item, args);
            }
        }
        Value::Computation { operands, .. } => {
            for operand in operands {
                rename_arguments(operand, args);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BooleanExpression, InputParam, Invocation, Stream, Table};

    fn search_example() -> Example {
        let mut args = IndexMap::new();
        args.insert("p_count".to_string(), Type::Number);
        args.insert("p_query".to_string(), Type::String);
        Example {
            id: 7,
            args,
            value: Expression::Table(Table::filter(
                Table::invocation(Invocation::new(
                    "com.bing",
                    "web_search",
                    vec![
                        InputParam::new("query", Value::var_ref("p_query")),
                        InputParam::new("count", Value::var_ref("p_count")),
                    ],
                )),
                BooleanExpression::atom(
                    "title",
                    "in_array",
                    Value::Array(vec![Value::var_ref("p_query"), Value::var_ref("title")]),
                ),
            )),
            utterances: vec!["search ${p_query}".into()],
            annotations: Default::default(),
        }
    }

    #[test]
    fn table_becomes_command_with_placeholders() {
        let program = search_example().to_program();
        let expected = Program::new(vec![Statement::Command {
            table: Some(Table::filter(
                Table::invocation(Invocation::new(
                    "com.bing",
                    "web_search",
                    vec![
                        InputParam::new("query", Value::var_ref("__const_SLOT_1")),
                        InputParam::new("count", Value::var_ref("__const_SLOT_0")),
                    ],
                )),
                BooleanExpression::atom(
                    "title",
                    "in_array",
                    Value::Array(vec![Value::var_ref("__const_SLOT_1"), Value::var_ref("title")]),
                ),
            )),
            actions: vec![Action::notify()],
        }]);
        assert_eq!(program, expected);
    }

    #[test]
    fn conversion_is_deterministic() {
        let example = search_example();
        assert_eq!(example.to_program(), example.to_program());
    }

    #[test]
    fn actions_and_streams_are_wrapped() {
        let post = Action::Invocation(Invocation::new(
            "com.twitter",
            "post",
            vec![InputParam::new("status", Value::var_ref("p_status"))],
        ));
        let declaration = Declaration {
            name: "tweet".into(),
            args: [("p_status".to_string(), Type::String)].into_iter().collect(),
            value: Expression::Action(post),
            annotations: Default::default(),
        };
        let program = declaration.to_program();
        match &program.statements[..] {
            [Statement::Command {
                table: None,
                actions,
            }] => match &actions[..] {
                [Action::Invocation(invocation)] => assert_eq!(
                    invocation.in_param("status"),
                    Some(&Value::var_ref("__const_SLOT_0"))
                ),
                other => panic!("unexpected actions {:?}", other),
            },
            other => panic!("unexpected statements {:?}", other),
        }

        let stream = Stream::monitor(Table::invocation(Invocation::new(
            "com.xkcd",
            "get_comic",
            vec![],
        )));
        let program = to_program(&IndexMap::new(), &Expression::Stream(stream.clone()));
        assert_eq!(
            program.statements,
            vec![Statement::Rule {
                stream,
                actions: vec![Action::notify()],
            }]
        );
    }
}
