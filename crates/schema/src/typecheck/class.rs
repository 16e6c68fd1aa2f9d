//! Class validation.

use crate::error::TypeError;
use crate::retriever::SchemaRetriever;
use std::collections::HashSet;
use thingtalk_core::ast::{ClassDef, FunctionDef, FunctionType, MixinImport, Value};
use thingtalk_core::{is_assignable, Type};

/// Validates a class fetched from the registry. Parents are resolved
/// through `retriever`.
pub async fn check_class(class: &ClassDef, retriever: &SchemaRetriever) -> Result<(), TypeError> {
    check_class_with_locals(class, retriever, &[]).await
}

/// Validates a class; parents found in `locals` are not fetched.
pub(crate) async fn check_class_with_locals(
    class: &ClassDef,
    retriever: &SchemaRetriever,
    locals: &[ClassDef],
) -> Result<(), TypeError> {
    for (key, function) in &class.queries {
        check_function(class, key, function, FunctionType::Query)?;
    }
    for (key, function) in &class.actions {
        check_function(class, key, function, FunctionType::Action)?;
    }

    for parent in &class.extends {
        if *parent == class.kind {
            return Err(TypeError::SelfInheritance {
                kind: class.kind.clone(),
            });
        }
        if locals.iter().any(|local| local.kind == *parent) {
            continue;
        }
        retriever.get_full_schema(parent).await?;
    }

    if !class.imports.is_empty() {
        let mixins = retriever.get_mixins().await?;
        for import in &class.imports {
            let mixin = mixins
                .get(&import.module)
                .ok_or_else(|| TypeError::UnknownMixin {
                    module: import.module.clone(),
                })?;
            check_import(import, &mixin.facets, &mixin.args)?;
        }
    }
    Ok(())
}

fn check_function(
    class: &ClassDef,
    key: &str,
    function: &FunctionDef,
    expected: FunctionType,
) -> Result<(), TypeError> {
    let qualified = format!("{}:{}", class.kind, key);
    let invalid = |message: String| TypeError::InvalidFunction {
        function: qualified.clone(),
        message,
    };

    if function.name != key {
        return Err(invalid(format!("declared as {}", function.name)));
    }
    if function.function_type != expected {
        return Err(invalid(format!(
            "{} listed among the {}s",
            function.function_type, expected
        )));
    }
    if let Some(name) = function.duplicate_arguments().first() {
        return Err(TypeError::DuplicateArgument {
            function: qualified.clone(),
            name: name.to_string(),
        });
    }
    if expected == FunctionType::Action && (function.is_list || function.is_monitorable) {
        return Err(invalid("actions cannot be lists or monitorable".to_string()));
    }
    Ok(())
}

fn check_import(
    import: &MixinImport,
    facets: &[String],
    args: &[thingtalk_core::ast::MixinArg],
) -> Result<(), TypeError> {
    let module = &import.module;
    if let Some(facet) = import.facets.iter().find(|f| !facets.contains(f)) {
        return Err(TypeError::UnsupportedFacet {
            module: module.clone(),
            facet: facet.clone(),
        });
    }

    let mut seen = HashSet::new();
    for param in &import.in_params {
        if !seen.insert(param.name.as_str()) {
            return Err(TypeError::DuplicateParameter {
                function: module.clone(),
                name: param.name.clone(),
            });
        }
        let arg = args
            .iter()
            .find(|a| a.name == param.name)
            .ok_or_else(|| TypeError::UnknownParameter {
                function: module.clone(),
                name: param.name.clone(),
            })?;
        // argument maps are written as object literals
        if arg.ty == Type::ArgMap && matches!(param.value, Value::Object(_)) {
            continue;
        }
        let found = param.value.get_type();
        if !is_assignable(&arg.ty, &found) {
            return Err(TypeError::TypeMismatch {
                context: format!("{}.{}", module, param.name),
                expected: arg.ty.clone(),
                found,
            });
        }
    }

    if let Some(missing) = args
        .iter()
        .find(|a| a.required && !seen.contains(a.name.as_str()))
    {
        return Err(TypeError::MissingMixinParameter {
            module: module.clone(),
            name: missing.name.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrieverConfig;
    use crate::transport::static_transport::StaticSchemaTransport;
    use std::sync::Arc;
    use thingtalk_core::ast::{ArgDirection, ArgumentDef, InputParam, MixinArg, MixinDef};

    fn retriever() -> SchemaRetriever {
        let transport = StaticSchemaTransport::new(vec![ClassDef::new(
            "org.thingpedia.builtin.thingengine",
            vec![],
            vec![],
            vec![],
        )])
        .with_mixins(vec![MixinDef {
            kind: "org.thingpedia.config.form".into(),
            facets: vec!["config".into()],
            args: vec![MixinArg {
                name: "params".into(),
                ty: Type::ArgMap,
                required: true,
            }],
        }]);
        SchemaRetriever::new(Arc::new(transport), RetrieverConfig::default())
    }

    fn with_import(facets: &[&str], module: &str, in_params: Vec<InputParam>) -> ClassDef {
        let mut class = ClassDef::new("com.example", vec![], vec![], vec![]);
        class.imports.push(MixinImport {
            facets: facets.iter().map(|f| f.to_string()).collect(),
            module: module.into(),
            in_params,
        });
        class
    }

    fn params() -> InputParam {
        InputParam::new("params", Value::Object(Default::default()))
    }

    #[tokio::test]
    async fn valid_class_passes() {
        let class = ClassDef::new(
            "com.example",
            vec!["org.thingpedia.builtin.thingengine".into()],
            vec![FunctionDef::new(
                FunctionType::Query,
                "q",
                vec![ArgumentDef::new(ArgDirection::Out, "x", Type::Number)],
            )
            .with_flags(true, true)],
            vec![],
        );
        assert_eq!(check_class(&class, &retriever()).await, Ok(()));
    }

    #[tokio::test]
    async fn class_cannot_extend_itself() {
        let class = ClassDef::new("com.example", vec!["com.example".into()], vec![], vec![]);
        assert_eq!(
            check_class(&class, &retriever()).await,
            Err(TypeError::SelfInheritance {
                kind: "com.example".into()
            })
        );
    }

    #[tokio::test]
    async fn unknown_parent_is_reported() {
        let class = ClassDef::new("com.example", vec!["com.missing".into()], vec![], vec![]);
        assert!(matches!(
            check_class(&class, &retriever()).await,
            Err(TypeError::Schema(_))
        ));
    }

    #[tokio::test]
    async fn local_parents_are_not_fetched() {
        let parent = ClassDef::new("com.parent", vec![], vec![], vec![]);
        let child = ClassDef::new("com.child", vec!["com.parent".into()], vec![], vec![]);
        let locals = vec![parent, child.clone()];
        assert_eq!(
            check_class_with_locals(&child, &retriever(), &locals).await,
            Ok(())
        );
    }

    #[tokio::test]
    async fn actions_are_not_monitorable() {
        let class = ClassDef::new(
            "com.example",
            vec![],
            vec![],
            vec![FunctionDef::new(FunctionType::Action, "do_it", vec![]).with_flags(false, true)],
        );
        assert!(matches!(
            check_class(&class, &retriever()).await,
            Err(TypeError::InvalidFunction { .. })
        ));
    }

    #[tokio::test]
    async fn duplicate_arguments_are_rejected() {
        let class = ClassDef::new(
            "com.example",
            vec![],
            vec![FunctionDef::new(
                FunctionType::Query,
                "q",
                vec![
                    ArgumentDef::new(ArgDirection::Out, "x", Type::Number),
                    ArgumentDef::new(ArgDirection::InOpt, "x", Type::Number),
                ],
            )],
            vec![],
        );
        assert_eq!(
            check_class(&class, &retriever()).await,
            Err(TypeError::DuplicateArgument {
                function: "com.example:q".into(),
                name: "x".into()
            })
        );
    }

    #[tokio::test]
    async fn mismatched_function_names_are_rejected() {
        let mut class = ClassDef::new("com.example", vec![], vec![], vec![]);
        class.queries.insert(
            "q".into(),
            FunctionDef::new(FunctionType::Query, "other", vec![]),
        );
        assert!(matches!(
            check_class(&class, &retriever()).await,
            Err(TypeError::InvalidFunction { .. })
        ));
    }

    #[tokio::test]
    async fn mixin_imports_are_validated() {
        let retriever = retriever();
        let ok = with_import(&["config"], "org.thingpedia.config.form", vec![params()]);
        assert_eq!(check_class(&ok, &retriever).await, Ok(()));

        let unknown = with_import(&["config"], "org.thingpedia.config.nope", vec![]);
        assert_eq!(
            check_class(&unknown, &retriever).await,
            Err(TypeError::UnknownMixin {
                module: "org.thingpedia.config.nope".into()
            })
        );

        let facet = with_import(&["loader"], "org.thingpedia.config.form", vec![params()]);
        assert!(matches!(
            check_class(&facet, &retriever).await,
            Err(TypeError::UnsupportedFacet { .. })
        ));

        let missing = with_import(&["config"], "org.thingpedia.config.form", vec![]);
        assert_eq!(
            check_class(&missing, &retriever).await,
            Err(TypeError::MissingMixinParameter {
                module: "org.thingpedia.config.form".into(),
                name: "params".into()
            })
        );

        let extra = with_import(
            &["config"],
            "org.thingpedia.config.form",
            vec![params(), InputParam::new("color", Value::string("red"))],
        );
        assert!(matches!(
            check_class(&extra, &retriever).await,
            Err(TypeError::UnknownParameter { .. })
        ));

        let mistyped = with_import(
            &["config"],
            "org.thingpedia.config.form",
            vec![InputParam::new("params", Value::Number(3.0))],
        );
        assert!(matches!(
            check_class(&mistyped, &retriever).await,
            Err(TypeError::TypeMismatch { .. })
        ));
    }
}
