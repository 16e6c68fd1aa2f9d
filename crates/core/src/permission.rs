//! Deriving a permission rule from a single-statement program.
//!
//! A remote user asking to run a program is granted the narrowest rule
//! that covers it: the same query and action, with the concrete input
//! parameters pinned and the program's filters kept.

use crate::ast::{
    Action, BooleanExpression, Invocation, PermissionFunction, PermissionRule, Program, Statement,
    Stream, StreamNode, Table, TableNode, Value,
};
use crate::optimize::Optimize;
use tracing::debug;

/// What a query or stream reduces to once its wrappers are stripped.
enum Source<'a> {
    /// `now`, or a timer.
    Builtin,
    Invocation(&'a Invocation),
}

/// The permission rule allowing `principal` (a `tt:contact` entity value)
/// to run `program`, or `None` when the program has no permission
/// equivalent.
pub fn convert_to_permission_rule(
    program: &Program,
    principal: &str,
    contact_name: Option<&str>,
) -> Option<PermissionRule> {
    let statement = match &program.statements[..] {
        [statement] => statement,
        statements => {
            debug!(count = statements.len(), "permission rules need exactly one statement");
            return None;
        }
    };

    let mut query_filters = Vec::new();
    let (source, actions) = match statement {
        Statement::Rule { stream, actions } => {
            (stream_source(stream, &mut query_filters)?, actions)
        }
        Statement::Command {
            table: Some(table),
            actions,
        } => (table_source(table, &mut query_filters)?, actions),
        Statement::Command {
            table: None,
            actions,
        } => (Source::Builtin, actions),
        Statement::Assignment { name, .. } => {
            debug!(%name, "assignments have no permission equivalent");
            return None;
        }
    };

    let action = match &actions[..] {
        [action] => action_function(action)?,
        actions => {
            debug!(count = actions.len(), "permission rules need exactly one action");
            return None;
        }
    };

    let query = match source {
        Source::Builtin => PermissionFunction::Builtin,
        Source::Invocation(invocation) => specified(invocation, query_filters),
    };

    Some(PermissionRule {
        principal: BooleanExpression::atom(
            "source",
            "==",
            Value::Entity {
                value: Some(principal.to_string()),
                entity_type: "tt:contact".to_string(),
                display: contact_name.map(str::to_string),
            },
        ),
        query,
        action,
    })
}

/// Pins every constant input parameter of `invocation` and conjoins the
/// result with `filters`.
fn specified(invocation: &Invocation, filters: Vec<BooleanExpression>) -> PermissionFunction {
    let mut operands: Vec<BooleanExpression> = invocation
        .in_params
        .iter()
        .filter(|p| p.value.is_constant())
        .map(|p| BooleanExpression::atom(&p.name, "==", p.value.clone()))
        .collect();
    operands.extend(filters);
    PermissionFunction::Specified {
        kind: invocation.selector.kind.clone(),
        channel: invocation.channel.clone(),
        filter: BooleanExpression::And(operands).optimize(),
        schema: invocation.schema.clone(),
    }
}

fn action_function(action: &Action) -> Option<PermissionFunction> {
    match action {
        Action::Builtin(_) => Some(PermissionFunction::Builtin),
        Action::Invocation(invocation) => Some(specified(invocation, Vec::new())),
        Action::VarRef(call) => {
            debug!(name = %call.name, "local actions have no permission equivalent");
            None
        }
    }
}

fn table_source<'a>(table: &'a Table, filters: &mut Vec<BooleanExpression>) -> Option<Source<'a>> {
    match &table.node {
        TableNode::Invocation(invocation) => Some(Source::Invocation(invocation)),
        TableNode::Filter { table, filter } => {
            filters.push(filter.clone());
            table_source(table, filters)
        }
        TableNode::Projection { table, .. }
        | TableNode::Compute { table, .. }
        | TableNode::Alias { table, .. } => table_source(table, filters),
        TableNode::Join { .. } => {
            debug!("joins have no permission equivalent");
            None
        }
        TableNode::VarRef(_)
        | TableNode::Aggregation { .. }
        | TableNode::Sort { .. }
        | TableNode::Index { .. }
        | TableNode::Slice { .. }
        | TableNode::Window { .. }
        | TableNode::TimeSeries { .. } => {
            debug!(node = table_node_name(&table.node), "query has no permission equivalent");
            None
        }
    }
}

fn stream_source<'a>(
    stream: &'a Stream,
    filters: &mut Vec<BooleanExpression>,
) -> Option<Source<'a>> {
    match &stream.node {
        StreamNode::Timer { .. } | StreamNode::AtTimer { .. } | StreamNode::OnTimer { .. } => {
            Some(Source::Builtin)
        }
        StreamNode::Monitor { table, .. } => table_source(table, filters),
        StreamNode::Filter { stream, filter } | StreamNode::EdgeFilter { stream, filter } => {
            filters.push(filter.clone());
            stream_source(stream, filters)
        }
        StreamNode::EdgeNew { stream }
        | StreamNode::Projection { stream, .. }
        | StreamNode::Compute { stream, .. }
        | StreamNode::Alias { stream, .. } => stream_source(stream, filters),
        StreamNode::Join { .. } => {
            debug!("joins have no permission equivalent");
            None
        }
        StreamNode::VarRef(call) => {
            debug!(name = %call.name, "local streams have no permission equivalent");
            None
        }
    }
}

fn table_node_name(node: &TableNode) -> &'static str {
    match node {
        TableNode::VarRef(_) => "var_ref",
        TableNode::Invocation(_) => "invocation",
        TableNode::Filter { .. } => "filter",
        TableNode::Projection { .. } => "projection",
        TableNode::Compute { .. } => "compute",
        TableNode::Alias { .. } => "alias",
        TableNode::Aggregation { .. } => "aggregation",
        TableNode::Sort { .. } => "sort",
        TableNode::Index { .. } => "index",
        TableNode::Slice { .. } => "slice",
        TableNode::Join { .. } => "join",
        TableNode::Window { .. } => "window",
        TableNode::TimeSeries { .. } => "timeseries",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{InputParam, SchemaRef};

    fn post(status: Value) -> Action {
        Action::Invocation(Invocation::new(
            "com.twitter",
            "post",
            vec![InputParam::new("status", status)],
        ))
    }

    fn source(principal: &str, display: Option<&str>) -> BooleanExpression {
        BooleanExpression::atom(
            "source",
            "==",
            Value::Entity {
                value: Some(principal.to_string()),
                entity_type: "tt:contact".to_string(),
                display: display.map(str::to_string),
            },
        )
    }

    #[test]
    fn command_action_pins_its_parameters() {
        let program = Program::new(vec![Statement::Command {
            table: None,
            actions: vec![post(Value::string("hi"))],
        }]);
        let rule = convert_to_permission_rule(&program, "test", None).unwrap();
        assert_eq!(
            rule,
            PermissionRule {
                principal: source("test", None),
                query: PermissionFunction::Builtin,
                action: PermissionFunction::Specified {
                    kind: "com.twitter".into(),
                    channel: "post".into(),
                    filter: BooleanExpression::atom("status", "==", Value::string("hi")),
                    schema: SchemaRef::default(),
                },
            }
        );
    }

    #[test]
    fn query_filters_and_parameters_are_conjoined() {
        let table = Table::projection(
            Table::filter(
                Table::invocation(Invocation::new(
                    "com.bing",
                    "web_search",
                    vec![
                        InputParam::new("query", Value::string("cats")),
                        InputParam::new("count", Value::undefined()),
                    ],
                )),
                BooleanExpression::And(vec![
                    BooleanExpression::atom("title", "=~", Value::string("funny")),
                    BooleanExpression::True,
                ]),
            ),
            &["title"],
        );
        let program = Program::new(vec![Statement::Command {
            table: Some(table),
            actions: vec![Action::notify()],
        }]);
        let rule = convert_to_permission_rule(&program, "bob", Some("Bob")).unwrap();
        assert_eq!(rule.principal, source("bob", Some("Bob")));
        assert_eq!(rule.action, PermissionFunction::Builtin);
        match rule.query {
            PermissionFunction::Specified {
                kind,
                channel,
                filter,
                ..
            } => {
                assert_eq!((kind.as_str(), channel.as_str()), ("com.bing", "web_search"));
                assert_eq!(
                    filter,
                    BooleanExpression::And(vec![
                        BooleanExpression::atom("query", "==", Value::string("cats")),
                        BooleanExpression::atom("title", "=~", Value::string("funny")),
                    ])
                );
            }
            other => panic!("unexpected query {:?}", other),
        }
    }

    #[test]
    fn joins_have_no_rule() {
        let join = Table::join(
            Table::invocation(Invocation::new("com.xkcd", "get_comic", vec![])),
            Table::invocation(Invocation::new("com.yandex", "translate", vec![])),
            vec![InputParam::new("text", Value::var_ref("title"))],
        );
        let program = Program::new(vec![Statement::Command {
            table: Some(join),
            actions: vec![Action::notify()],
        }]);
        assert!(convert_to_permission_rule(&program, "test", None).is_none());
    }

    #[test]
    fn multiple_statements_or_actions_have_no_rule() {
        let command = Statement::Command {
            table: None,
            actions: vec![post(Value::string("a")), post(Value::string("b"))],
        };
        let program = Program::new(vec![command]);
        assert!(convert_to_permission_rule(&program, "test", None).is_none());

        let single = Statement::Command {
            table: None,
            actions: vec![Action::notify()],
        };
        let program = Program::new(vec![single.clone(), single]);
        assert!(convert_to_permission_rule(&program, "test", None).is_none());
    }

    #[test]
    fn timer_rules_use_builtin_query() {
        let program = Program::new(vec![Statement::Rule {
            stream: StreamNode::Timer {
                base: Value::Date(crate::ast::DateValue::Now),
                interval: Value::measure(1.0, "h"),
                frequency: None,
            }
            .into(),
            actions: vec![post(Value::var_ref("text"))],
        }]);
        let rule = convert_to_permission_rule(&program, "test", None).unwrap();
        assert_eq!(rule.query, PermissionFunction::Builtin);
        match rule.action {
            PermissionFunction::Specified { filter, .. } => {
                assert_eq!(filter, BooleanExpression::True)
            }
            other => panic!("unexpected action {:?}", other),
        }
    }
}
