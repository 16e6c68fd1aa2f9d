//! CLI integration tests for every subcommand.
//!
//! Uses `assert_cmd` to spawn the `thingtalk` binary against programs and
//! class definitions written to a temporary directory.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn thingtalk() -> Command {
    cargo_bin_cmd!("thingtalk")
}

fn write(dir: &Path, name: &str, value: &Value) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path
}

/// A schema directory with `com.xkcd` and `com.twitter`.
fn schemas(root: &TempDir) -> PathBuf {
    let dir = root.path().join("schemas");
    fs::create_dir(&dir).unwrap();
    write(
        &dir,
        "com.xkcd.json",
        &json!({
            "kind": "com.xkcd",
            "queries": {
                "get_comic": {
                    "name": "get_comic",
                    "function_type": "query",
                    "args": [
                        {"name": "number", "direction": "in_opt", "type": "Number"},
                        {"name": "title", "direction": "out", "type": "String"}
                    ],
                    "is_monitorable": true
                }
            }
        }),
    );
    write(
        &dir,
        "com.twitter.json",
        &json!({
            "kind": "com.twitter",
            "actions": {
                "post": {
                    "name": "post",
                    "function_type": "action",
                    "args": [{"name": "status", "direction": "in_req", "type": "String"}]
                }
            }
        }),
    );
    dir
}

fn invocation(kind: &str, channel: &str, in_params: Value) -> Value {
    json!({
        "selector": {"kind": kind},
        "channel": channel,
        "in_params": in_params
    })
}

/// `now => @com.xkcd.get_comic() => @com.twitter.post(...)`
fn comic_to_twitter(post_params: Value) -> Value {
    json!({
        "statements": [{
            "Command": {
                "table": {"node": {"Invocation": invocation("com.xkcd", "get_comic", json!([]))}},
                "actions": [{"Invocation": invocation("com.twitter", "post", post_params)}]
            }
        }]
    })
}

fn post_hi() -> Value {
    json!({
        "statements": [{
            "Command": {
                "table": null,
                "actions": [{"Invocation": invocation(
                    "com.twitter",
                    "post",
                    json!([{"name": "status", "value": {"String": "hi"}}])
                )}]
            }
        }]
    })
}

// ──────────────────────────────────────────────
// Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    thingtalk()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ThingTalk program toolchain"));
}

#[test]
fn version_exits_0() {
    thingtalk()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("thingtalk"));
}

// ──────────────────────────────────────────────
// typecheck
// ──────────────────────────────────────────────

#[test]
fn typecheck_fills_missing_parameters() {
    let root = TempDir::new().unwrap();
    let schemas = schemas(&root);
    let program = write(root.path(), "program.json", &comic_to_twitter(json!([])));

    let assert = thingtalk()
        .args(["--output", "json", "typecheck"])
        .arg(&program)
        .arg("--schemas")
        .arg(&schemas)
        .assert()
        .success();
    let out: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    let params = &out["statements"][0]["Command"]["actions"][0]["Invocation"]["in_params"];
    assert_eq!(params[0]["name"], "status");
    assert_eq!(params[0]["value"], json!({"Undefined": {"local": true}}));
}

#[test]
fn typecheck_reports_type_errors() {
    let root = TempDir::new().unwrap();
    let schemas = schemas(&root);
    let program = write(
        root.path(),
        "program.json",
        &comic_to_twitter(json!([{"name": "status", "value": {"Number": 3.0}}])),
    );

    thingtalk()
        .arg("typecheck")
        .arg(&program)
        .arg("--schemas")
        .arg(&schemas)
        .assert()
        .failure()
        .stderr(predicate::str::contains("type mismatch"));
}

#[test]
fn typecheck_without_schemas_fails() {
    let root = TempDir::new().unwrap();
    let program = write(root.path(), "program.json", &post_hi());

    thingtalk()
        .arg("typecheck")
        .arg(&program)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no schema source"));
}

#[test]
fn typecheck_reads_schema_dir_from_config() {
    let root = TempDir::new().unwrap();
    let schemas = schemas(&root);
    let program = write(root.path(), "program.json", &post_hi());
    let config = root.path().join("thingtalk.toml");
    fs::write(
        &config,
        format!("[schema]\ndir = {:?}\n", schemas.display().to_string()),
    )
    .unwrap();

    thingtalk()
        .arg("--config")
        .arg(&config)
        .arg("typecheck")
        .arg(&program)
        .assert()
        .success()
        .stdout(predicate::str::contains("ok: 1 statement(s)"));
}

#[test]
fn malformed_program_is_rejected() {
    let root = TempDir::new().unwrap();
    let program = root.path().join("program.json");
    fs::write(&program, "{ not json").unwrap();

    thingtalk()
        .arg("primitives")
        .arg(&program)
        .assert()
        .failure()
        .stderr(predicate::str::contains("error parsing JSON"));
}

#[test]
fn json_errors_are_valid_json() {
    let root = TempDir::new().unwrap();
    let missing = root.path().join("say \"hi\".json");

    let assert = thingtalk()
        .args(["--output", "json", "primitives"])
        .arg(&missing)
        .assert()
        .failure();
    let err: Value = serde_json::from_slice(&assert.get_output().stderr).unwrap();
    let message = err["error"].as_str().unwrap();
    assert!(message.starts_with("error reading file"), "got {}", message);
    assert!(message.contains("say \"hi\".json"), "got {}", message);
}

// ──────────────────────────────────────────────
// slots, primitives, optimize
// ──────────────────────────────────────────────

#[test]
fn slots_list_selectors_and_parameters() {
    let root = TempDir::new().unwrap();
    let schemas = schemas(&root);
    let program = write(
        root.path(),
        "program.json",
        &json!({
            "statements": [{
                "Command": {
                    "table": {"node": {"Invocation": invocation(
                        "com.xkcd",
                        "get_comic",
                        json!([{"name": "number", "value": {"Undefined": {"local": true}}}])
                    )}},
                    "actions": [{"Builtin": "notify"}]
                }
            }]
        }),
    );

    thingtalk()
        .arg("slots")
        .arg(&program)
        .arg("--schemas")
        .arg(&schemas)
        .assert()
        .success()
        .stdout(predicate::str::contains("selector @com.xkcd"))
        .stdout(predicate::str::contains(
            "in_param.number: Number = $? (com.xkcd:get_comic)",
        ));
}

#[test]
fn primitives_are_listed_with_roles() {
    let root = TempDir::new().unwrap();
    let program = write(root.path(), "program.json", &comic_to_twitter(json!([])));

    thingtalk()
        .arg("primitives")
        .arg(&program)
        .assert()
        .success()
        .stdout(predicate::str::contains("query com.xkcd:get_comic"))
        .stdout(predicate::str::contains("action com.twitter:post"));
}

#[test]
fn optimize_drops_true_filters() {
    let root = TempDir::new().unwrap();
    let program = write(
        root.path(),
        "program.json",
        &json!({
            "statements": [{
                "Command": {
                    "table": {"node": {"Filter": {
                        "table": {"node": {"Invocation": invocation("com.xkcd", "get_comic", json!([]))}},
                        "filter": {"And": ["True", "True"]}
                    }}},
                    "actions": [{"Builtin": "notify"}]
                }
            }]
        }),
    );

    let assert = thingtalk().arg("optimize").arg(&program).assert().success();
    let out: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    let node = &out["statements"][0]["Command"]["table"]["node"];
    assert!(node.get("Invocation").is_some(), "got {}", node);
}

// ──────────────────────────────────────────────
// permission, lower, to-program
// ──────────────────────────────────────────────

#[test]
fn permission_pins_action_parameters() {
    let root = TempDir::new().unwrap();
    let program = write(root.path(), "program.json", &post_hi());

    let assert = thingtalk()
        .arg("permission")
        .arg(&program)
        .args(["--principal", "test", "--contact-name", "Test"])
        .assert()
        .success();
    let rule: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(rule["query"], json!("Builtin"));
    assert_eq!(rule["action"]["Specified"]["kind"], "com.twitter");
    assert_eq!(
        rule["action"]["Specified"]["filter"]["Atom"]["value"],
        json!({"String": "hi"})
    );
}

#[test]
fn permission_fails_for_multiple_statements() {
    let root = TempDir::new().unwrap();
    let mut doc = post_hi();
    let statement = doc["statements"][0].clone();
    doc["statements"].as_array_mut().unwrap().push(statement);
    let program = write(root.path(), "program.json", &doc);

    thingtalk()
        .arg("permission")
        .arg(&program)
        .args(["--principal", "test"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no permission rule"));
}

#[test]
fn lower_rewrites_return_into_send() {
    let root = TempDir::new().unwrap();
    let schemas = schemas(&root);
    let program = write(
        root.path(),
        "program.json",
        &json!({
            "principal": {"Entity": {
                "value": "matrix-account:@alice:example.org",
                "entity_type": "tt:contact",
                "display": null
            }},
            "statements": [{
                "Command": {
                    "table": {"node": {"Invocation": invocation("com.xkcd", "get_comic", json!([]))}},
                    "actions": [{"Builtin": "return"}]
                }
            }]
        }),
    );

    let assert = thingtalk()
        .arg("lower")
        .arg(&program)
        .args(["--messaging-type", "matrix", "--account", "@bob:example.org"])
        .arg("--schemas")
        .arg(&schemas)
        .assert()
        .success();
    let out: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    let action = &out["program"]["statements"][0]["Command"]["actions"][0];
    assert_eq!(action["Invocation"]["channel"], "send");
    assert_eq!(out["companions"].as_array().unwrap().len(), 1);
}

#[test]
fn lower_needs_schemas_for_remote_returns() {
    let root = TempDir::new().unwrap();
    let program = write(
        root.path(),
        "program.json",
        &json!({
            "principal": {"Entity": {
                "value": "matrix-account:@alice:example.org",
                "entity_type": "tt:contact",
                "display": null
            }},
            "statements": [{
                "Command": {
                    "table": {"node": {"Invocation": invocation("com.xkcd", "get_comic", json!([]))}},
                    "actions": [{"Builtin": "return"}]
                }
            }]
        }),
    );

    thingtalk()
        .arg("lower")
        .arg(&program)
        .args(["--messaging-type", "matrix", "--account", "@bob:example.org"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("lowering failed"));
}

#[test]
fn to_program_replaces_arguments_with_placeholders() {
    let root = TempDir::new().unwrap();
    let example = write(
        root.path(),
        "example.json",
        &json!({
            "id": 7,
            "args": {"p_status": "String"},
            "value": {"Action": {"Invocation": invocation(
                "com.twitter",
                "post",
                json!([{"name": "status", "value": {"VarRef": "p_status"}}])
            )}},
            "utterances": ["tweet ${p_status}"]
        }),
    );

    let assert = thingtalk().arg("to-program").arg(&example).assert().success();
    let out: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    let params = &out["statements"][0]["Command"]["actions"][0]["Invocation"]["in_params"];
    assert_eq!(params[0]["value"], json!({"VarRef": "__const_SLOT_0"}));
}
