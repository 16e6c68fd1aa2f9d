//! Program typechecking.
//!
//! [`Typechecker::typecheck_program`] works in three phases:
//!
//! 1. local classes are validated;
//! 2. every remote function and memory table the program mentions is
//!    resolved, concurrently, so the retriever folds the lookups into one
//!    batch per dimension;
//! 3. a synchronous walk checks the tree against the resolved signatures,
//!    fills missing required parameters with `$?` and attaches a schema to
//!    every invocation, table and stream.

mod class;
mod program;

pub use class::check_class;

use crate::error::{SchemaError, TypeError};
use crate::retriever::SchemaRetriever;
use class::check_class_with_locals;
use program::{locate, Located, ProgramChecker, Reference, Resolved};
use std::collections::HashSet;
use std::sync::Arc;
use thingtalk_core::ast::{FunctionDef, FunctionType, Program, Statement, Value};
use thingtalk_core::{IteratePrimitives, Primitive, PrimitiveRole};
use tokio::task::JoinSet;
use tracing::debug;

pub struct Typechecker {
    retriever: SchemaRetriever,
    use_meta: bool,
}

impl Typechecker {
    pub fn new(retriever: SchemaRetriever) -> Self {
        Typechecker {
            retriever,
            use_meta: false,
        }
    }

    /// A typechecker that attaches signatures with natural-language
    /// metadata.
    pub fn with_metadata(retriever: SchemaRetriever) -> Self {
        Typechecker {
            retriever,
            use_meta: true,
        }
    }

    pub fn retriever(&self) -> &SchemaRetriever {
        &self.retriever
    }

    /// Typechecks `program` in place.
    pub async fn typecheck_program(&self, program: &mut Program) -> Result<(), TypeError> {
        for class in &program.classes {
            check_class_with_locals(class, &self.retriever, &program.classes).await?;
        }

        let references = collect_references(program);
        debug!(count = references.len(), "resolving program references");
        let principal = match &program.principal {
            Some(Value::Entity {
                value: Some(value), ..
            }) => Some(value.clone()),
            _ => None,
        };
        let resolved = self.resolve(references, principal).await?;

        ProgramChecker::new(&resolved, program.classes.clone()).check_program(program)
    }

    async fn resolve(
        &self,
        references: HashSet<Reference>,
        principal: Option<String>,
    ) -> Result<Resolved, TypeError> {
        let mut tasks = JoinSet::new();
        for reference in references {
            let retriever = self.retriever.clone();
            let use_meta = self.use_meta;
            let principal = principal.clone();
            tasks.spawn(async move {
                let outcome = resolve_one(&retriever, &reference, use_meta, principal.as_deref()).await;
                (reference, outcome)
            });
        }

        let mut resolved = Resolved::new();
        while let Some(joined) = tasks.join_next().await {
            let (reference, outcome) = joined
                .map_err(|e| SchemaError::Transport(format!("schema lookup task failed: {}", e)))?;
            resolved.insert(reference, outcome);
        }
        Ok(resolved)
    }
}

async fn resolve_one(
    retriever: &SchemaRetriever,
    reference: &Reference,
    use_meta: bool,
    principal: Option<&str>,
) -> Result<Option<Arc<FunctionDef>>, SchemaError> {
    match reference {
        Reference::Function {
            kind,
            function_type,
            name,
        } => {
            let function = if use_meta {
                retriever.get_meta(kind, *function_type, name).await?
            } else {
                retriever
                    .get_schema_and_names(kind, *function_type, name)
                    .await?
            };
            Ok(Some(function))
        }
        Reference::Memory { name } => retriever.get_memory_schema(name, principal).await,
    }
}

/// Remote functions and memory tables mentioned anywhere in `program`.
fn collect_references(program: &Program) -> HashSet<Reference> {
    let locals: HashSet<&str> = program
        .declarations
        .iter()
        .map(|d| d.name.as_str())
        .chain(program.statements.iter().filter_map(|s| match s {
            Statement::Assignment { name, .. } => Some(name.as_str()),
            _ => None,
        }))
        .collect();

    let mut references = HashSet::new();
    for (role, primitive) in program.iterate_primitives(true) {
        match primitive {
            Primitive::Invocation(invocation) => {
                // streams are looked up as queries; monitorability is
                // checked on the tree
                let function_type = match role {
                    PrimitiveRole::Action => FunctionType::Action,
                    PrimitiveRole::Query | PrimitiveRole::Stream | PrimitiveRole::Filter => {
                        FunctionType::Query
                    }
                };
                let kind = &invocation.selector.kind;
                let channel = &invocation.channel;
                if let Located::Remote(kinds) =
                    locate(&program.classes, kind, function_type, channel)
                {
                    for remote in kinds {
                        references.insert(Reference::function(&remote, function_type, channel));
                    }
                }
            }
            Primitive::VarRef(call) => {
                if !locals.contains(call.name.as_str()) {
                    references.insert(Reference::Memory {
                        name: call.name.clone(),
                    });
                }
            }
        }
    }
    references
}
