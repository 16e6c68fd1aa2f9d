//! Schema transports: where class definitions come from.
//!
//! The retriever talks to a [`SchemaTransport`], which returns class
//! definitions as text in the interchange JSON form (an array of classes).
//! Implementations:
//! - [`static_transport::StaticSchemaTransport`] -- in-memory classes
//! - [`file::FileSchemaTransport`] -- a directory of `<kind>.json` files
//! - [`http::HttpSchemaTransport`] -- a Thingpedia-compatible registry
//!
//! Memory tables (tables created at runtime by `let` statements on another
//! device) are described separately by a [`MemoryDelegate`].

pub mod file;
pub mod http;
pub mod static_transport;

use crate::error::SchemaError;
use async_trait::async_trait;
use std::collections::HashMap;
use thingtalk_core::ast::{ClassDef, MixinDef};
use thingtalk_core::Type;

// ──────────────────────────────────────────────
// SchemaTransport trait
// ──────────────────────────────────────────────

/// Fetches class definitions from a registry.
///
/// Retry and timeout policy belong to the implementation.
#[async_trait]
pub trait SchemaTransport: Send + Sync {
    /// Full source of one device class.
    async fn get_device_code(&self, kind: &str) -> Result<String, SchemaError>;

    /// The classes of `kinds` as a JSON array. Kinds the registry does not
    /// know are left out of the answer.
    async fn get_schemas(&self, kinds: &[String], with_metadata: bool)
        -> Result<String, SchemaError>;

    /// Every mixin the registry offers, keyed by mixin kind.
    async fn get_mixins(&self) -> Result<HashMap<String, MixinDef>, SchemaError>;
}

// ──────────────────────────────────────────────
// Memory tables
// ──────────────────────────────────────────────

/// Signature of a memory table: parallel lists of output names and types.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryTableSchema {
    pub arg_names: Vec<String>,
    pub arg_types: Vec<Type>,
}

#[async_trait]
pub trait MemoryDelegate: Send + Sync {
    async fn get_schema(
        &self,
        table: &str,
        principal: Option<&str>,
    ) -> Result<Option<MemoryTableSchema>, SchemaError>;
}

// ──────────────────────────────────────────────
// Parsing
// ──────────────────────────────────────────────

/// Parses a `get_schemas` answer. Classes come back normalized.
pub fn parse_classes(text: &str) -> Result<Vec<ClassDef>, SchemaError> {
    let classes: Vec<ClassDef> =
        serde_json::from_str(text).map_err(|e| SchemaError::Parse(e.to_string()))?;
    Ok(classes.into_iter().map(ClassDef::normalized).collect())
}

/// Parses a `get_device_code` answer.
pub fn parse_class(text: &str) -> Result<ClassDef, SchemaError> {
    let class: ClassDef =
        serde_json::from_str(text).map_err(|e| SchemaError::Parse(e.to_string()))?;
    Ok(class.normalized())
}

fn render_classes(classes: &[ClassDef]) -> Result<String, SchemaError> {
    serde_json::to_string(classes).map_err(|e| SchemaError::Parse(e.to_string()))
}
