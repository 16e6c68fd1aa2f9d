use thiserror::Error;

/// A transformation that cannot be applied to the given tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    /// The tree has not been typechecked: a node that must carry a schema
    /// does not.
    #[error("{node} has no schema; typecheck the program first")]
    MissingSchema { node: String },
}
