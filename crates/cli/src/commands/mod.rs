//! Subcommand implementations and the helpers they share.
//!
//! Every command reads a JSON document, reports failures through
//! [`report_error`] and exits with status 1.

pub(crate) mod lower;
pub(crate) mod optimize;
pub(crate) mod permission;
pub(crate) mod primitives;
pub(crate) mod slots;
pub(crate) mod to_program;
pub(crate) mod typecheck;

use std::path::Path;
use std::process;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thingtalk_core::Program;
use thingtalk_schema::Typechecker;
use tracing::debug;

use crate::config::Settings;
use crate::{report_error, OutputFormat};

/// Reads and parses the JSON document at `path`, exiting on failure.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path, output: OutputFormat, quiet: bool) -> T {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("error reading file '{}': {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(e) => {
            let msg = format!("error parsing JSON in '{}': {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

pub(crate) fn print_json<T: Serialize>(value: &T) {
    let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        serde_json::json!({ "error": format!("serialization: {}", e) }).to_string()
    });
    println!("{}", pretty);
}

/// Typechecks `program` against the configured schema source.
///
/// Without a source the program is left untouched, unless `required`, in
/// which case the command fails.
pub(crate) fn typecheck(
    program: &mut Program,
    settings: &Settings,
    required: bool,
    output: OutputFormat,
    quiet: bool,
) {
    let Some(retriever) = settings.retriever() else {
        if required {
            report_error(
                "no schema source: pass --schemas, --thingpedia or a config file",
                output,
                quiet,
            );
            process::exit(1);
        }
        return;
    };

    // single-threaded so concurrent lookups share one batch
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            report_error(&format!("failed to start runtime: {}", e), output, quiet);
            process::exit(1);
        }
    };
    let typechecker = Typechecker::new(retriever);
    if let Err(e) = runtime.block_on(typechecker.typecheck_program(program)) {
        report_error(&format!("type error: {}", e), output, quiet);
        process::exit(1);
    }
    debug!(source = ?settings.source, statements = program.statements.len(), "typechecked");
}
