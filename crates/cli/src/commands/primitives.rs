use std::path::Path;

use serde_json::json;
use thingtalk_core::{IteratePrimitives, Program};

use super::{print_json, read_json};
use crate::OutputFormat;

pub(crate) fn cmd_primitives(file: &Path, include_var_refs: bool, output: OutputFormat, quiet: bool) {
    let program: Program = read_json(file, output, quiet);
    let primitives: Vec<(String, String)> = program
        .iterate_primitives(include_var_refs)
        .map(|(role, primitive)| (role.to_string(), primitive.name()))
        .collect();

    match output {
        OutputFormat::Json => {
            let entries: Vec<_> = primitives
                .iter()
                .map(|(role, name)| json!({ "role": role, "name": name }))
                .collect();
            print_json(&entries);
        }
        OutputFormat::Text => {
            for (role, name) in &primitives {
                println!("{} {}", role, name);
            }
        }
    }
}
