//! Programs in the JSON interchange form, read the way the command line
//! front end reads them, then walked and rewritten.

use thingtalk_core::{
    collect_slots, Declaration, IteratePrimitives, IterateSlots, Optimize, Program, SlotInfo,
    SlotItem, Statement, TableNode, ToProgram, Value,
};

/// `now => @com.xkcd.get_comic(number=$?), title =~ "cat" && true => notify`
const COMIC_FILTER: &str = r#"{
    "statements": [{
        "Command": {
            "table": {"node": {"Filter": {
                "table": {"node": {"Invocation": {
                    "selector": {"kind": "com.xkcd"},
                    "channel": "get_comic",
                    "in_params": [{"name": "number", "value": {"Undefined": {"local": true}}}]
                }}},
                "filter": {"And": [
                    {"Atom": {"name": "title", "operator": "=~", "value": {"String": "cat"}}},
                    "True"
                ]}
            }}},
            "actions": [{"Builtin": "notify"}]
        }
    }]
}"#;

/// `let search(p_query : String) := @com.bing.web_search(query=p_query);`
const SEARCH_DECLARATION: &str = r#"{
    "name": "search",
    "args": {"p_query": "String"},
    "value": {"Table": {"node": {"Invocation": {
        "selector": {"kind": "com.bing"},
        "channel": "web_search",
        "in_params": [{"name": "query", "value": {"VarRef": "p_query"}}]
    }}}}
}"#;

fn comic_filter() -> Program {
    serde_json::from_str(COMIC_FILTER).unwrap()
}

#[test]
fn interchange_round_trip_is_structural() {
    let program = comic_filter();
    let text = serde_json::to_string(&program).unwrap();
    let back: Program = serde_json::from_str(&text).unwrap();
    assert_eq!(program, back);
}

#[test]
fn slots_follow_source_order() {
    let slots = collect_slots(&comic_filter());
    let tags: Vec<String> = slots
        .iter()
        .map(|slot| match slot {
            SlotInfo::Selector { kind, .. } => format!("@{}", kind),
            SlotInfo::Slot { tag, .. } => tag.clone(),
        })
        .collect();
    assert_eq!(tags, ["@com.xkcd", "in_param.number", "filter.=~.title"]);
}

#[test]
fn filling_slots_edits_the_program() {
    let mut program = comic_filter();
    program.iterate_slots(&mut |item| {
        if let SlotItem::Slot(mut slot) = item {
            if slot.is_undefined() {
                slot.set(Value::Number(1.0));
            }
        }
    });

    let mut remaining = 0;
    program.iterate_slots(&mut |item| {
        if let SlotItem::Slot(slot) = item {
            if slot.is_undefined() {
                remaining += 1;
            }
        }
    });
    assert_eq!(remaining, 0);
    assert_ne!(program, comic_filter());
}

#[test]
fn optimized_programs_are_stable() {
    let once = comic_filter().optimize();
    let twice = once.clone().optimize();
    assert_eq!(once, twice);

    match &once.statements[0] {
        Statement::Command {
            table: Some(table), ..
        } => match &table.node {
            TableNode::Filter { filter, .. } => {
                assert!(matches!(filter, thingtalk_core::BooleanExpression::Atom { .. }))
            }
            other => panic!("expected a filter, got {:?}", other),
        },
        other => panic!("expected a command, got {:?}", other),
    }
}

#[test]
fn declarations_become_programs_deterministically() {
    let declaration: Declaration = serde_json::from_str(SEARCH_DECLARATION).unwrap();
    let first = declaration.to_program();
    let second = declaration.to_program();
    assert_eq!(first, second);

    let names: Vec<String> = first.iterate_primitives(false).map(|(_, p)| p.name()).collect();
    assert_eq!(names, ["com.bing:web_search"]);

    let slots = collect_slots(&first);
    let values: Vec<&Value> = slots
        .iter()
        .filter_map(|slot| match slot {
            SlotInfo::Slot { value, .. } => Some(value),
            SlotInfo::Selector { .. } => None,
        })
        .collect();
    assert_eq!(values, [&Value::var_ref("__const_SLOT_0")]);
}
