use std::path::Path;
use std::process;

use thingtalk_core::{convert_to_permission_rule, Program};

use super::{print_json, read_json, typecheck};
use crate::config::Settings;
use crate::{report_error, OutputFormat};

pub(crate) fn cmd_permission(
    file: &Path,
    principal: &str,
    contact_name: Option<&str>,
    settings: &Settings,
    output: OutputFormat,
    quiet: bool,
) {
    let mut program: Program = read_json(file, output, quiet);
    typecheck(&mut program, settings, false, output, quiet);

    match convert_to_permission_rule(&program, principal, contact_name) {
        Some(rule) => print_json(&rule),
        None => {
            report_error("program has no permission rule equivalent", output, quiet);
            process::exit(1);
        }
    }
}
