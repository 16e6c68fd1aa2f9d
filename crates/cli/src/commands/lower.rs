use std::path::Path;
use std::process;

use serde_json::json;
use thingtalk_core::{lower_return, LoweringContext, Messaging, Program};

use super::{print_json, read_json, typecheck};
use crate::config::Settings;
use crate::{report_error, OutputFormat};

struct Account<'a> {
    messaging_type: &'a str,
    account: &'a str,
}

impl Messaging for Account<'_> {
    fn messaging_type(&self) -> &str {
        self.messaging_type
    }

    fn account(&self) -> &str {
        self.account
    }
}

pub(crate) fn cmd_lower(
    file: &Path,
    messaging_type: &str,
    account: &str,
    settings: &Settings,
    output: OutputFormat,
    quiet: bool,
) {
    let mut program: Program = read_json(file, output, quiet);
    typecheck(&mut program, settings, false, output, quiet);

    let messaging = Account {
        messaging_type,
        account,
    };
    let mut ctx = LoweringContext::new();
    match lower_return(&mut program, &messaging, &mut ctx) {
        Ok(companions) => print_json(&json!({
            "program": program,
            "companions": companions,
        })),
        Err(e) => {
            report_error(&format!("lowering failed: {}", e), output, quiet);
            process::exit(1);
        }
    }
}
