//! Directory-backed transport.
//!
//! Layout: one `<kind>.json` file per class (a single class object) and an
//! optional `mixins.json` holding an array of mixins.

use super::{parse_class, render_classes, SchemaTransport};
use crate::error::SchemaError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thingtalk_core::ast::{ClassDef, MixinDef};

pub struct FileSchemaTransport {
    dir: PathBuf,
}

impl FileSchemaTransport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileSchemaTransport { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn class_path(&self, kind: &str) -> Result<PathBuf, SchemaError> {
        if kind.is_empty() || kind.contains(['/', '\\']) || kind.starts_with('.') {
            return Err(SchemaError::InvalidKind {
                kind: kind.to_string(),
            });
        }
        Ok(self.dir.join(format!("{}.json", kind)))
    }

    /// File contents, or `None` when the file does not exist.
    async fn read(path: &Path) -> Result<Option<String>, SchemaError> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SchemaError::Transport(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

#[async_trait]
impl SchemaTransport for FileSchemaTransport {
    async fn get_device_code(&self, kind: &str) -> Result<String, SchemaError> {
        let path = self.class_path(kind)?;
        Self::read(&path).await?.ok_or_else(|| SchemaError::InvalidKind {
            kind: kind.to_string(),
        })
    }

    async fn get_schemas(
        &self,
        kinds: &[String],
        with_metadata: bool,
    ) -> Result<String, SchemaError> {
        let mut classes: Vec<ClassDef> = Vec::new();
        for kind in kinds {
            let Ok(path) = self.class_path(kind) else {
                continue;
            };
            if let Some(text) = Self::read(&path).await? {
                let class = parse_class(&text)?;
                classes.push(if with_metadata {
                    class
                } else {
                    class.without_metadata()
                });
            }
        }
        render_classes(&classes)
    }

    async fn get_mixins(&self) -> Result<HashMap<String, MixinDef>, SchemaError> {
        let path = self.dir.join("mixins.json");
        let Some(text) = Self::read(&path).await? else {
            return Ok(HashMap::new());
        };
        let mixins: Vec<MixinDef> =
            serde_json::from_str(&text).map_err(|e| SchemaError::Parse(e.to_string()))?;
        Ok(mixins.into_iter().map(|m| (m.kind.clone(), m)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::parse_classes;
    use thingtalk_core::ast::{ArgDirection, ArgumentDef, FunctionDef, FunctionType};
    use thingtalk_core::Type;

    fn write_class(dir: &Path, class: &ClassDef) {
        let text = serde_json::to_string_pretty(class).unwrap();
        std::fs::write(dir.join(format!("{}.json", class.kind)), text).unwrap();
    }

    #[tokio::test]
    async fn reads_known_kinds_and_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        let mut comic = FunctionDef::new(
            FunctionType::Query,
            "get_comic",
            vec![ArgumentDef::new(ArgDirection::Out, "title", Type::String)],
        );
        comic
            .nl_annotations
            .insert("canonical".into(), serde_json::json!("xkcd comic"));
        write_class(dir.path(), &ClassDef::new("com.xkcd", vec![], vec![comic], vec![]));

        let transport = FileSchemaTransport::new(dir.path());
        let text = transport
            .get_schemas(&["com.xkcd".into(), "com.missing".into()], false)
            .await
            .unwrap();
        let classes = parse_classes(&text).unwrap();
        assert_eq!(classes.len(), 1);
        assert!(classes[0].queries["get_comic"].nl_annotations.is_empty());

        let text = transport
            .get_schemas(&["com.xkcd".into()], true)
            .await
            .unwrap();
        let classes = parse_classes(&text).unwrap();
        assert!(!classes[0].queries["get_comic"].nl_annotations.is_empty());
    }

    #[tokio::test]
    async fn device_code_of_missing_kind_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FileSchemaTransport::new(dir.path());
        assert_eq!(
            transport.get_device_code("com.missing").await,
            Err(SchemaError::InvalidKind {
                kind: "com.missing".into()
            })
        );
        assert!(matches!(
            transport.get_device_code("../etc/passwd").await,
            Err(SchemaError::InvalidKind { .. })
        ));
    }

    #[tokio::test]
    async fn mixins_default_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FileSchemaTransport::new(dir.path());
        assert!(transport.get_mixins().await.unwrap().is_empty());

        std::fs::write(
            dir.path().join("mixins.json"),
            r#"[{"kind": "org.thingpedia.config.form", "facets": ["config"],
                 "args": [{"name": "params", "type": "ArgMap", "required": true}]}]"#,
        )
        .unwrap();
        let mixins = transport.get_mixins().await.unwrap();
        assert_eq!(mixins["org.thingpedia.config.form"].args.len(), 1);
    }
}
