//! HTTP transport for a Thingpedia-compatible registry.
//!
//! Uses `ureq` (sync) wrapped in `tokio::task::spawn_blocking` to avoid
//! blocking the async runtime. Endpoints, relative to the base URL:
//! - `GET /v3/schema/<kind>,<kind>,...?meta=<0|1>` -- class array
//! - `GET /v3/devices/code/<kind>` -- one class
//! - `GET /v3/mixins/all` -- mixin array

use super::SchemaTransport;
use crate::error::SchemaError;
use async_trait::async_trait;
use std::collections::HashMap;
use thingtalk_core::ast::MixinDef;

/// Environment variable consulted when no developer key is configured.
pub const DEVELOPER_KEY_ENV: &str = "THINGTALK_DEVELOPER_KEY";

pub struct HttpSchemaTransport {
    base_url: String,
    developer_key: Option<String>,
}

impl HttpSchemaTransport {
    /// Creates a transport for the registry at `base_url`.
    ///
    /// The developer key (needed to see unapproved devices) comes from
    /// `developer_key`, then from `THINGTALK_DEVELOPER_KEY`.
    pub fn new(base_url: &str, developer_key: Option<String>) -> Self {
        let developer_key = developer_key.or_else(|| std::env::var(DEVELOPER_KEY_ENV).ok());
        HttpSchemaTransport {
            base_url: base_url.trim_end_matches('/').to_string(),
            developer_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// GETs `url` on a blocking task and returns the body. A 404 maps to
    /// `not_found`.
    async fn get(
        &self,
        url: String,
        query: Vec<(&'static str, String)>,
        not_found: SchemaError,
    ) -> Result<String, SchemaError> {
        let developer_key = self.developer_key.clone();

        tokio::task::spawn_blocking(move || {
            let agent = ureq::Agent::new_with_defaults();
            let mut request = agent.get(&url);
            for (key, value) in &query {
                request = request.query(key, value);
            }
            if let Some(ref key) = developer_key {
                request = request.query("developer_key", key);
            }

            let response = match request.call() {
                Ok(response) => response,
                Err(ureq::Error::StatusCode(404)) => return Err(not_found),
                Err(e) => {
                    return Err(SchemaError::Transport(format!("GET {} failed: {}", url, e)))
                }
            };

            response
                .into_body()
                .read_to_string()
                .map_err(|e| SchemaError::Transport(format!("failed to read response: {}", e)))
        })
        .await
        .map_err(|e| SchemaError::Transport(format!("task join error: {}", e)))?
    }
}

#[async_trait]
impl SchemaTransport for HttpSchemaTransport {
    async fn get_device_code(&self, kind: &str) -> Result<String, SchemaError> {
        self.get(
            self.url(&format!("v3/devices/code/{}", kind)),
            Vec::new(),
            SchemaError::InvalidKind {
                kind: kind.to_string(),
            },
        )
        .await
    }

    async fn get_schemas(
        &self,
        kinds: &[String],
        with_metadata: bool,
    ) -> Result<String, SchemaError> {
        let meta = if with_metadata { "1" } else { "0" };
        self.get(
            self.url(&format!("v3/schema/{}", kinds.join(","))),
            vec![("meta", meta.to_string())],
            // an unknown batch is an empty batch
            SchemaError::Parse("registry returned 404 for a schema batch".to_string()),
        )
        .await
    }

    async fn get_mixins(&self) -> Result<HashMap<String, MixinDef>, SchemaError> {
        let text = self
            .get(
                self.url("v3/mixins/all"),
                Vec::new(),
                SchemaError::Transport("registry has no mixin endpoint".to_string()),
            )
            .await?;
        let mixins: Vec<MixinDef> =
            serde_json::from_str(&text).map_err(|e| SchemaError::Parse(e.to_string()))?;
        Ok(mixins.into_iter().map(|m| (m.kind.clone(), m)).collect())
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
