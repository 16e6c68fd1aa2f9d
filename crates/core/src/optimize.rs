//! Boolean simplification and filter merging.
//!
//! Every rewrite here shrinks the tree, and the result of `optimize` is a
//! fixed point: optimizing it again changes nothing.

use crate::ast::{
    BooleanExpression, Declaration, Expression, ExternalFilter, Program, Statement, Stream,
    StreamNode, Table, TableNode,
};

pub trait Optimize: Sized {
    fn optimize(self) -> Self;
}

fn boxed<T: Optimize>(node: Box<T>) -> Box<T> {
    Box::new((*node).optimize())
}

fn collapse(
    mut operands: Vec<BooleanExpression>,
    empty: BooleanExpression,
    make: fn(Vec<BooleanExpression>) -> BooleanExpression,
) -> BooleanExpression {
    match operands.len() {
        0 => empty,
        1 => operands.swap_remove(0),
        _ => make(operands),
    }
}

impl Optimize for BooleanExpression {
    fn optimize(self) -> Self {
        match self {
            BooleanExpression::And(operands) => {
                let mut flat = Vec::with_capacity(operands.len());
                for operand in operands {
                    match operand.optimize() {
                        BooleanExpression::True => {}
                        BooleanExpression::False => return BooleanExpression::False,
                        BooleanExpression::And(inner) => flat.extend(inner),
                        other => flat.push(other),
                    }
                }
                collapse(flat, BooleanExpression::True, BooleanExpression::And)
            }
            BooleanExpression::Or(operands) => {
                let mut flat = Vec::with_capacity(operands.len());
                for operand in operands {
                    match operand.optimize() {
                        BooleanExpression::False => {}
                        BooleanExpression::True => return BooleanExpression::True,
                        BooleanExpression::Or(inner) => flat.extend(inner),
                        other => flat.push(other),
                    }
                }
                collapse(flat, BooleanExpression::False, BooleanExpression::Or)
            }
            BooleanExpression::Not(inner) => match (*inner).optimize() {
                BooleanExpression::True => BooleanExpression::False,
                BooleanExpression::False => BooleanExpression::True,
                BooleanExpression::Not(negated) => *negated,
                other => BooleanExpression::Not(Box::new(other)),
            },
            BooleanExpression::External(ExternalFilter { invocation, filter }) => {
                BooleanExpression::External(ExternalFilter {
                    invocation,
                    filter: boxed(filter),
                })
            }
            leaf @ (BooleanExpression::True
            | BooleanExpression::False
            | BooleanExpression::Atom { .. }
            | BooleanExpression::Compute { .. }
            | BooleanExpression::VarRef(_)) => leaf,
        }
    }
}

impl Optimize for Table {
    fn optimize(self) -> Self {
        let Table { node, schema } = self;
        let node = match node {
            TableNode::Filter { table, filter } => {
                let inner = (*table).optimize();
                let filter = filter.optimize();
                if filter.is_true() {
                    return inner;
                }
                match inner.node {
                    TableNode::Filter {
                        table: innermost,
                        filter: first,
                    } => TableNode::Filter {
                        table: innermost,
                        filter: BooleanExpression::And(vec![first, filter]).optimize(),
                    },
                    node => TableNode::Filter {
                        table: Box::new(Table {
                            node,
                            schema: inner.schema,
                        }),
                        filter,
                    },
                }
            }
            TableNode::Projection { table, args } => TableNode::Projection {
                table: boxed(table),
                args,
            },
            TableNode::Compute {
                table,
                expression,
                alias,
            } => TableNode::Compute {
                table: boxed(table),
                expression,
                alias,
            },
            TableNode::Alias { table, name } => TableNode::Alias {
                table: boxed(table),
                name,
            },
            TableNode::Aggregation {
                table,
                field,
                operator,
                alias,
            } => TableNode::Aggregation {
                table: boxed(table),
                field,
                operator,
                alias,
            },
            TableNode::Sort {
                table,
                value,
                direction,
            } => TableNode::Sort {
                table: boxed(table),
                value,
                direction,
            },
            TableNode::Index { table, indices } => TableNode::Index {
                table: boxed(table),
                indices,
            },
            TableNode::Slice { table, base, limit } => TableNode::Slice {
                table: boxed(table),
                base,
                limit,
            },
            TableNode::Join {
                lhs,
                rhs,
                in_params,
            } => TableNode::Join {
                lhs: boxed(lhs),
                rhs: boxed(rhs),
                in_params,
            },
            TableNode::Window {
                base,
                delta,
                stream,
            } => TableNode::Window {
                base,
                delta,
                stream: boxed(stream),
            },
            TableNode::TimeSeries {
                base,
                delta,
                stream,
            } => TableNode::TimeSeries {
                base,
                delta,
                stream: boxed(stream),
            },
            leaf @ (TableNode::VarRef(_) | TableNode::Invocation(_)) => leaf,
        };
        Table { node, schema }
    }
}

impl Optimize for Stream {
    fn optimize(self) -> Self {
        let Stream { node, schema } = self;
        let node = match node {
            StreamNode::Filter { stream, filter } => {
                let inner = (*stream).optimize();
                let filter = filter.optimize();
                if filter.is_true() {
                    return inner;
                }
                match inner.node {
                    StreamNode::Filter {
                        stream: innermost,
                        filter: first,
                    } => StreamNode::Filter {
                        stream: innermost,
                        filter: BooleanExpression::And(vec![first, filter]).optimize(),
                    },
                    node => StreamNode::Filter {
                        stream: Box::new(Stream {
                            node,
                            schema: inner.schema,
                        }),
                        filter,
                    },
                }
            }
            StreamNode::EdgeFilter { stream, filter } => StreamNode::EdgeFilter {
                stream: boxed(stream),
                filter: filter.optimize(),
            },
            StreamNode::Monitor { table, args } => StreamNode::Monitor {
                table: boxed(table),
                args,
            },
            StreamNode::EdgeNew { stream } => StreamNode::EdgeNew {
                stream: boxed(stream),
            },
            StreamNode::Projection { stream, args } => StreamNode::Projection {
                stream: boxed(stream),
                args,
            },
            StreamNode::Compute {
                stream,
                expression,
                alias,
            } => StreamNode::Compute {
                stream: boxed(stream),
                expression,
                alias,
            },
            StreamNode::Alias { stream, name } => StreamNode::Alias {
                stream: boxed(stream),
                name,
            },
            StreamNode::Join {
                stream,
                table,
                in_params,
            } => StreamNode::Join {
                stream: boxed(stream),
                table: boxed(table),
                in_params,
            },
            leaf @ (StreamNode::VarRef(_)
            | StreamNode::Timer { .. }
            | StreamNode::AtTimer { .. }
            | StreamNode::OnTimer { .. }) => leaf,
        };
        Stream { node, schema }
    }
}

impl Optimize for Statement {
    fn optimize(self) -> Self {
        match self {
            Statement::Rule { stream, actions } => Statement::Rule {
                stream: stream.optimize(),
                actions,
            },
            Statement::Command { table, actions } => Statement::Command {
                table: table.map(Optimize::optimize),
                actions,
            },
            Statement::Assignment { name, value } => Statement::Assignment {
                name,
                value: value.optimize(),
            },
        }
    }
}

impl Optimize for Expression {
    fn optimize(self) -> Self {
        match self {
            Expression::Table(table) => Expression::Table(table.optimize()),
            Expression::Stream(stream) => Expression::Stream(stream.optimize()),
            Expression::Action(action) => Expression::Action(action),
            Expression::Program(program) => Expression::Program(boxed(program)),
        }
    }
}

impl Optimize for Declaration {
    fn optimize(self) -> Self {
        Declaration {
            value: self.value.optimize(),
            ..self
        }
    }
}

impl Optimize for Program {
    fn optimize(self) -> Self {
        Program {
            declarations: self.declarations.into_iter().map(Optimize::optimize).collect(),
            statements: self.statements.into_iter().map(Optimize::optimize).collect(),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Action, Invocation, Value};

    fn atom(name: &str) -> BooleanExpression {
        BooleanExpression::atom(name, "==", Value::string(name))
    }

    fn news() -> Table {
        Table::invocation(Invocation::new("com.nytimes", "get_front_page", vec![]))
    }

    #[test]
    fn nested_conjunctions_are_flattened() {
        let filter = BooleanExpression::And(vec![
            atom("a"),
            BooleanExpression::And(vec![atom("b"), BooleanExpression::True, atom("c")]),
        ]);
        assert_eq!(
            filter.optimize(),
            BooleanExpression::And(vec![atom("a"), atom("b"), atom("c")])
        );
    }

    #[test]
    fn constants_absorb_or_vanish() {
        let filter = BooleanExpression::Or(vec![atom("a"), BooleanExpression::True]);
        assert_eq!(filter.optimize(), BooleanExpression::True);
        let filter = BooleanExpression::And(vec![atom("a"), BooleanExpression::False]);
        assert_eq!(filter.optimize(), BooleanExpression::False);
        let filter = BooleanExpression::Or(vec![BooleanExpression::False, atom("a")]);
        assert_eq!(filter.optimize(), atom("a"));
        assert_eq!(BooleanExpression::And(vec![]).optimize(), BooleanExpression::True);
        assert_eq!(BooleanExpression::Or(vec![]).optimize(), BooleanExpression::False);
    }

    #[test]
    fn negations_fold() {
        let double = BooleanExpression::Not(Box::new(BooleanExpression::Not(Box::new(atom("a")))));
        assert_eq!(double.optimize(), atom("a"));
        let constant = BooleanExpression::Not(Box::new(BooleanExpression::And(vec![])));
        assert_eq!(constant.optimize(), BooleanExpression::False);
    }

    #[test]
    fn true_filters_are_dropped() {
        let table = Table::filter(news(), BooleanExpression::Or(vec![BooleanExpression::True]));
        assert_eq!(table.optimize(), news());
    }

    #[test]
    fn stacked_filters_merge() {
        let table = Table::filter(Table::filter(news(), atom("a")), atom("b"));
        assert_eq!(
            table.optimize(),
            Table::filter(news(), BooleanExpression::And(vec![atom("a"), atom("b")]))
        );

        let stream = Stream::filter(
            Stream::filter(Stream::monitor(Table::filter(news(), BooleanExpression::True)), atom("a")),
            atom("b"),
        );
        assert_eq!(
            stream.optimize(),
            Stream::filter(
                Stream::monitor(news()),
                BooleanExpression::And(vec![atom("a"), atom("b")])
            )
        );
    }

    #[test]
    fn optimize_is_idempotent() {
        let samples = vec![
            Program::new(vec![Statement::Command {
                table: Some(Table::filter(
                    Table::filter(
                        news(),
                        BooleanExpression::Or(vec![
                            BooleanExpression::Or(vec![atom("a"), atom("b")]),
                            BooleanExpression::Not(Box::new(BooleanExpression::Not(Box::new(
                                atom("c"),
                            )))),
                        ]),
                    ),
                    BooleanExpression::And(vec![atom("d"), BooleanExpression::True]),
                )),
                actions: vec![Action::notify()],
            }]),
            Program::new(vec![Statement::Rule {
                stream: Stream::filter(
                    Stream::monitor(news()),
                    BooleanExpression::Not(Box::new(BooleanExpression::And(vec![
                        atom("a"),
                        BooleanExpression::Not(Box::new(BooleanExpression::False)),
                    ]))),
                ),
                actions: vec![Action::notify()],
            }]),
        ];
        for program in samples {
            let once = program.optimize();
            let twice = once.clone().optimize();
            assert_eq!(once, twice);
        }
    }
}
