use std::path::Path;

use thingtalk_core::{collect_slots, Program, SlotInfo, SlotKind};

use super::{print_json, read_json, typecheck};
use crate::config::Settings;
use crate::OutputFormat;

pub(crate) fn cmd_slots(file: &Path, settings: &Settings, output: OutputFormat, quiet: bool) {
    let mut program: Program = read_json(file, output, quiet);
    // expected types are only known on typechecked programs
    typecheck(&mut program, settings, false, output, quiet);
    let slots = collect_slots(&program);

    match output {
        OutputFormat::Json => print_json(&slots),
        OutputFormat::Text => {
            for slot in &slots {
                println!("{}", describe(slot));
            }
        }
    }
}

fn describe(slot: &SlotInfo) -> String {
    match slot {
        SlotInfo::Selector { kind, primitive } => format!("selector @{} ({})", kind, primitive),
        SlotInfo::Slot {
            kind,
            tag,
            primitive,
            expected_type,
            value,
        } => {
            let tag = match kind {
                SlotKind::ArrayElement { index } => format!("{}[{}]", tag, index),
                _ => tag.clone(),
            };
            match primitive {
                Some(primitive) => {
                    format!("{}: {} = {} ({})", tag, expected_type, value, primitive)
                }
                None => format!("{}: {} = {}", tag, expected_type, value),
            }
        }
    }
}
