use std::path::Path;

use thingtalk_core::Program;

use super::{print_json, read_json, typecheck};
use crate::config::Settings;
use crate::OutputFormat;

pub(crate) fn cmd_typecheck(file: &Path, settings: &Settings, output: OutputFormat, quiet: bool) {
    let mut program: Program = read_json(file, output, quiet);
    typecheck(&mut program, settings, true, output, quiet);

    match output {
        OutputFormat::Json => print_json(&program),
        OutputFormat::Text => {
            if !quiet {
                println!("ok: {} statement(s)", program.statements.len());
            }
        }
    }
}
