//! thingtalk-schema: schema resolution and typechecking for ThingTalk.
//!
//! - [`SchemaRetriever`] -- batching, caching access to class signatures
//! - [`SchemaTransport`] implementations: [`StaticSchemaTransport`],
//!   [`FileSchemaTransport`], [`HttpSchemaTransport`]
//! - [`Typechecker`] and [`check_class`]
//! - [`SchemaError`] and [`TypeError`]

pub mod config;
pub mod error;
pub mod retriever;
pub mod transport;
pub mod typecheck;

pub use config::RetrieverConfig;
pub use error::{SchemaError, TypeError};
pub use retriever::SchemaRetriever;
pub use transport::file::FileSchemaTransport;
pub use transport::http::HttpSchemaTransport;
pub use transport::static_transport::StaticSchemaTransport;
pub use transport::{MemoryDelegate, MemoryTableSchema, SchemaTransport};
pub use typecheck::{check_class, Typechecker};
