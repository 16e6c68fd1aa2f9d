//! In-memory transport over a fixed set of classes.
//!
//! Every batch request is recorded, so callers (tests, mostly) can check
//! how lookups were coalesced.

use super::{render_classes, SchemaTransport};
use crate::error::SchemaError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use thingtalk_core::ast::{ClassDef, MixinDef};

/// One `get_schemas` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRequest {
    pub kinds: Vec<String>,
    pub with_metadata: bool,
}

pub struct StaticSchemaTransport {
    classes: HashMap<String, ClassDef>,
    mixins: HashMap<String, MixinDef>,
    requests: Mutex<Vec<SchemaRequest>>,
}

impl StaticSchemaTransport {
    pub fn new(classes: Vec<ClassDef>) -> Self {
        StaticSchemaTransport {
            classes: classes
                .into_iter()
                .map(|c| (c.kind.clone(), c.normalized()))
                .collect(),
            mixins: HashMap::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_mixins(mut self, mixins: Vec<MixinDef>) -> Self {
        self.mixins = mixins.into_iter().map(|m| (m.kind.clone(), m)).collect();
        self
    }

    /// Batch requests received so far, in order.
    pub fn requests(&self) -> Vec<SchemaRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl SchemaTransport for StaticSchemaTransport {
    async fn get_device_code(&self, kind: &str) -> Result<String, SchemaError> {
        let class = self.classes.get(kind).ok_or_else(|| SchemaError::InvalidKind {
            kind: kind.to_string(),
        })?;
        serde_json::to_string(class).map_err(|e| SchemaError::Parse(e.to_string()))
    }

    async fn get_schemas(
        &self,
        kinds: &[String],
        with_metadata: bool,
    ) -> Result<String, SchemaError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SchemaRequest {
                kinds: kinds.to_vec(),
                with_metadata,
            });

        let found: Vec<ClassDef> = kinds
            .iter()
            .filter_map(|kind| self.classes.get(kind))
            .map(|class| {
                if with_metadata {
                    class.clone()
                } else {
                    class.without_metadata()
                }
            })
            .collect();
        render_classes(&found)
    }

    async fn get_mixins(&self) -> Result<HashMap<String, MixinDef>, SchemaError> {
        Ok(self.mixins.clone())
    }
}
