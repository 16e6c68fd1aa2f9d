use thingtalk_core::{FunctionType, Type};

/// Errors produced while resolving class and function signatures.
///
/// `Clone` so a cached failure can be handed to every later caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    /// The registry does not know the class.
    #[error("invalid kind @{kind}")]
    InvalidKind { kind: String },

    /// The class (and its parents) has no such function.
    #[error("class @{kind} has no {function_type} {name}")]
    InvalidFunction {
        kind: String,
        function_type: FunctionType,
        name: String,
    },

    /// The class was returned but failed to typecheck.
    #[error("invalid class @{kind}: {message}")]
    InvalidClass { kind: String, message: String },

    /// A stream was requested from a query that cannot be monitored.
    #[error("@{kind}.{name} is not monitorable")]
    NotMonitorable { kind: String, name: String },

    /// The transport failed; never cached.
    #[error("schema transport error: {0}")]
    Transport(String),

    /// The transport answered with something that is not a class list.
    #[error("malformed schema response: {0}")]
    Parse(String),

    /// The batch serving this request went away without answering.
    #[error("request for @{kind} was abandoned")]
    Abandoned { kind: String },
}

/// Errors reported by the typechecker.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("{function} has no input parameter {name}")]
    UnknownParameter { function: String, name: String },

    #[error("duplicate parameter {name} for {function}")]
    DuplicateParameter { function: String, name: String },

    #[error("duplicate argument {name} in {function}")]
    DuplicateArgument { function: String, name: String },

    #[error("type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        context: String,
        expected: Type,
        found: Type,
    },

    #[error("unknown variable {name}")]
    UnknownVariable { name: String },

    #[error("operator {operator} is not defined on {ty}")]
    InvalidOperator { operator: String, ty: Type },

    #[error("invalid function {function}: {message}")]
    InvalidFunction { function: String, message: String },

    #[error("unknown table {name}")]
    UnknownTable { name: String },

    #[error("{function} is not monitorable")]
    NotMonitorable { function: String },

    #[error("class @{kind} extends itself")]
    SelfInheritance { kind: String },

    #[error("unknown mixin {module}")]
    UnknownMixin { module: String },

    #[error("mixin {module} does not provide {facet}")]
    UnsupportedFacet { module: String, facet: String },

    #[error("mixin {module} requires parameter {name}")]
    MissingMixinParameter { module: String, name: String },
}
