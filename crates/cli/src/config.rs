//! Configuration file and schema source selection.
//!
//! ```toml
//! [schema]
//! dir = "schemas"
//! thingpedia_url = "https://thingpedia.example.org/thingpedia/api"
//! developer_key = "..."
//!
//! [retriever]
//! positive_ttl_secs = 86400
//! negative_ttl_secs = 600
//! ```
//!
//! `--schemas` and `--thingpedia` override the file; a directory wins over a
//! registry URL.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thingtalk_schema::{
    FileSchemaTransport, HttpSchemaTransport, RetrieverConfig, SchemaRetriever, SchemaTransport,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ConfigFile {
    pub schema: SchemaSection,
    pub retriever: RetrieverConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct SchemaSection {
    pub dir: Option<PathBuf>,
    pub thingpedia_url: Option<String>,
    pub developer_key: Option<String>,
}

impl ConfigFile {
    pub(crate) fn load(path: &Path) -> Result<ConfigFile, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("error reading config '{}': {}", path.display(), e))?;
        toml::from_str(&text).map_err(|e| format!("error parsing config '{}': {}", path.display(), e))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SchemaSource {
    Dir(PathBuf),
    Thingpedia {
        url: String,
        developer_key: Option<String>,
    },
}

/// Effective settings after merging flags over the config file.
#[derive(Debug)]
pub(crate) struct Settings {
    pub source: Option<SchemaSource>,
    pub retriever: RetrieverConfig,
}

impl Settings {
    pub(crate) fn resolve(
        config: Option<&Path>,
        schemas: Option<PathBuf>,
        thingpedia: Option<String>,
    ) -> Result<Settings, String> {
        let file = match config {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::default(),
        };
        Ok(Settings::merge(file, schemas, thingpedia))
    }

    fn merge(file: ConfigFile, schemas: Option<PathBuf>, thingpedia: Option<String>) -> Settings {
        let developer_key = file.schema.developer_key;
        let source = match (schemas, thingpedia) {
            (Some(dir), _) => Some(SchemaSource::Dir(dir)),
            (None, Some(url)) => Some(SchemaSource::Thingpedia { url, developer_key }),
            (None, None) => match (file.schema.dir, file.schema.thingpedia_url) {
                (Some(dir), _) => Some(SchemaSource::Dir(dir)),
                (None, Some(url)) => Some(SchemaSource::Thingpedia { url, developer_key }),
                (None, None) => None,
            },
        };
        Settings {
            source,
            retriever: file.retriever,
        }
    }

    /// A retriever over the configured source, if any.
    pub(crate) fn retriever(&self) -> Option<SchemaRetriever> {
        let transport: Arc<dyn SchemaTransport> = match self.source.as_ref()? {
            SchemaSource::Dir(dir) => Arc::new(FileSchemaTransport::new(dir.clone())),
            SchemaSource::Thingpedia { url, developer_key } => {
                Arc::new(HttpSchemaTransport::new(url, developer_key.clone()))
            }
        };
        Some(SchemaRetriever::new(transport, self.retriever.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_file_sections_are_optional() {
        let file: ConfigFile = toml::from_str("[retriever]\nnegative_ttl_secs = 5\n").unwrap();
        assert!(file.schema.dir.is_none());
        assert_eq!(file.retriever.negative_ttl_secs, 5);
        assert_eq!(file.retriever.positive_ttl_secs, 86400);
    }

    #[test]
    fn flags_override_the_file() {
        let file: ConfigFile = toml::from_str(
            "[schema]\ndir = \"from-file\"\nthingpedia_url = \"https://example.org\"\ndeveloper_key = \"k\"\n",
        )
        .unwrap();
        let settings = Settings::merge(file, None, Some("https://other.example.org".into()));
        assert_eq!(
            settings.source,
            Some(SchemaSource::Thingpedia {
                url: "https://other.example.org".into(),
                developer_key: Some("k".into())
            })
        );
    }

    #[test]
    fn directory_wins_over_registry() {
        let file: ConfigFile = toml::from_str(
            "[schema]\ndir = \"from-file\"\nthingpedia_url = \"https://example.org\"\n",
        )
        .unwrap();
        let settings = Settings::merge(file, None, None);
        assert_eq!(settings.source, Some(SchemaSource::Dir("from-file".into())));
        assert!(settings.retriever().is_some());
    }

    #[test]
    fn no_source_means_no_retriever() {
        let settings = Settings::merge(ConfigFile::default(), None, None);
        assert!(settings.retriever().is_none());
    }
}
