//! End-to-end: classes on disk, typechecking, then the transformations that
//! need typechecked trees.

use std::path::Path;
use std::sync::Arc;
use thingtalk_core::{
    convert_to_permission_rule, lower_return, Action, ArgDirection, ArgumentDef, BuiltinAction,
    ClassDef, FunctionDef, FunctionType, InputParam, Invocation, LoweringContext, Messaging,
    PermissionFunction, Program, Statement, Table, Type, Value,
};
use thingtalk_schema::{FileSchemaTransport, RetrieverConfig, SchemaRetriever, Typechecker};

fn write_class(dir: &Path, class: &ClassDef) {
    let text = serde_json::to_string_pretty(class).unwrap();
    std::fs::write(dir.join(format!("{}.json", class.kind)), text).unwrap();
}

fn registry(dir: &Path) {
    write_class(
        dir,
        &ClassDef::new(
            "com.xkcd",
            vec![],
            vec![FunctionDef::new(
                FunctionType::Query,
                "get_comic",
                vec![
                    ArgumentDef::new(ArgDirection::InOpt, "number", Type::Number),
                    ArgumentDef::new(ArgDirection::Out, "title", Type::String),
                    ArgumentDef::new(ArgDirection::Out, "picture_url", Type::entity("tt:picture")),
                ],
            )
            .with_flags(false, true)],
            vec![],
        ),
    );
    write_class(
        dir,
        &ClassDef::new(
            "com.twitter",
            vec![],
            vec![],
            vec![FunctionDef::new(
                FunctionType::Action,
                "post",
                vec![ArgumentDef::new(ArgDirection::InReq, "status", Type::String)],
            )],
        ),
    );
}

fn typechecker(dir: &Path) -> Typechecker {
    let transport = Arc::new(FileSchemaTransport::new(dir));
    Typechecker::new(SchemaRetriever::new(transport, RetrieverConfig::default()))
}

struct Matrix;

impl Messaging for Matrix {
    fn messaging_type(&self) -> &str {
        "matrix"
    }

    fn account(&self) -> &str {
        "@bob:example.org"
    }
}

#[tokio::test]
async fn remote_program_is_lowered_into_typecheckable_programs() {
    let dir = tempfile::tempdir().unwrap();
    registry(dir.path());
    let typechecker = typechecker(dir.path());

    let mut program = Program {
        principal: Some(Value::entity("matrix-account:@alice:example.org", "tt:contact")),
        ..Program::new(vec![Statement::Command {
            table: Some(Table::invocation(Invocation::new("com.xkcd", "get_comic", vec![]))),
            actions: vec![Action::Builtin(BuiltinAction::Return)],
        }])
    };
    typechecker.typecheck_program(&mut program).await.unwrap();

    let mut ctx = LoweringContext::new();
    let companions = lower_return(&mut program, &Matrix, &mut ctx).unwrap();
    assert_eq!(companions.len(), 1);
    assert_eq!(program.classes.len(), 1);
    assert!(!program.statements[0].actions()[0].is_builtin(BuiltinAction::Return));

    let mut lowered = program.clone();
    typechecker.typecheck_program(&mut lowered).await.unwrap();

    let mut companion = companions[0].clone();
    typechecker.typecheck_program(&mut companion).await.unwrap();
}

#[tokio::test]
async fn permission_rules_keep_resolved_schemas() {
    let dir = tempfile::tempdir().unwrap();
    registry(dir.path());
    let typechecker = typechecker(dir.path());

    let mut program = Program::new(vec![Statement::Command {
        table: None,
        actions: vec![Action::Invocation(Invocation::new(
            "com.twitter",
            "post",
            vec![InputParam::new("status", Value::string("hi"))],
        ))],
    }]);
    typechecker.typecheck_program(&mut program).await.unwrap();

    let rule = convert_to_permission_rule(&program, "matrix-account:@alice:example.org", None)
        .unwrap();
    assert!(rule.query.is_builtin());
    match rule.action {
        PermissionFunction::Specified { kind, schema, .. } => {
            assert_eq!(kind, "com.twitter");
            assert!(schema.is_resolved());
        }
        other => panic!("expected a specified action, got {:?}", other),
    }
}

#[tokio::test]
async fn unknown_kinds_on_disk_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    registry(dir.path());
    let typechecker = typechecker(dir.path());

    let mut program = Program::new(vec![Statement::Command {
        table: Some(Table::invocation(Invocation::new("com.nowhere", "list", vec![]))),
        actions: vec![Action::notify()],
    }]);
    let err = typechecker.typecheck_program(&mut program).await.unwrap_err();
    assert_eq!(err.to_string(), "invalid kind @com.nowhere");
}
