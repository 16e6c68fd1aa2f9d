use std::path::Path;

use thingtalk_core::{Optimize, Program};

use super::{print_json, read_json};
use crate::OutputFormat;

pub(crate) fn cmd_optimize(file: &Path, output: OutputFormat, quiet: bool) {
    let program: Program = read_json(file, output, quiet);
    // programs have no text rendering; both formats print the tree
    print_json(&program.optimize());
}
