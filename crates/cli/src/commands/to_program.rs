use std::path::Path;
use std::process;

use thingtalk_core::{Declaration, Example, ToProgram};

use super::{print_json, read_json};
use crate::{report_error, OutputFormat};

pub(crate) fn cmd_to_program(file: &Path, output: OutputFormat, quiet: bool) {
    let document: serde_json::Value = read_json(file, output, quiet);

    // examples carry an id, declarations a name
    let program = if document.get("id").is_some() {
        serde_json::from_value::<Example>(document).map(|e| e.to_program())
    } else {
        serde_json::from_value::<Declaration>(document).map(|d| d.to_program())
    };

    match program {
        Ok(program) => print_json(&program),
        Err(e) => {
            let msg = format!("'{}' is not a declaration or example: {}", file.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}
