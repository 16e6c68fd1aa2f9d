//! Class and function signatures.
//!
//! A [`ClassDef`] exclusively owns its [`FunctionDef`]s. The reverse link
//! (function to class) is the class kind stored in [`FunctionDef::class`],
//! a lookup handle only.

use crate::ast::InputParam;
use crate::types::Type;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type AnnotationMap = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionType {
    Query,
    Action,
    Stream,
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionType::Query => write!(f, "query"),
            FunctionType::Action => write!(f, "action"),
            FunctionType::Stream => write!(f, "stream"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgDirection {
    InReq,
    InOpt,
    Out,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentDef {
    pub name: String,
    pub direction: ArgDirection,
    #[serde(rename = "type")]
    pub ty: Type,
    #[serde(default, skip_serializing_if = "AnnotationMap::is_empty")]
    pub nl_annotations: AnnotationMap,
    #[serde(default, skip_serializing_if = "AnnotationMap::is_empty")]
    pub impl_annotations: AnnotationMap,
}

impl ArgumentDef {
    pub fn new(direction: ArgDirection, name: &str, ty: Type) -> Self {
        ArgumentDef {
            name: name.to_string(),
            direction,
            ty,
            nl_annotations: AnnotationMap::new(),
            impl_annotations: AnnotationMap::new(),
        }
    }

    pub fn is_input(&self) -> bool {
        self.direction != ArgDirection::Out
    }

    pub fn is_required(&self) -> bool {
        self.direction == ArgDirection::InReq
    }
}

/// The signature of a query, action or stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub function_type: FunctionType,
    pub args: Vec<ArgumentDef>,
    #[serde(default)]
    pub is_list: bool,
    #[serde(default)]
    pub is_monitorable: bool,
    /// Kind of the owning class; `None` for functions without a class
    /// (memory tables, derived signatures).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "AnnotationMap::is_empty")]
    pub nl_annotations: AnnotationMap,
    #[serde(default, skip_serializing_if = "AnnotationMap::is_empty")]
    pub impl_annotations: AnnotationMap,
}

impl FunctionDef {
    pub fn new(function_type: FunctionType, name: &str, args: Vec<ArgumentDef>) -> Self {
        FunctionDef {
            name: name.to_string(),
            function_type,
            args,
            is_list: false,
            is_monitorable: false,
            class: None,
            nl_annotations: AnnotationMap::new(),
            impl_annotations: AnnotationMap::new(),
        }
    }

    pub fn with_flags(mut self, is_list: bool, is_monitorable: bool) -> Self {
        self.is_list = is_list;
        self.is_monitorable = is_monitorable;
        self
    }

    /// `kind:name`, or the bare name for classless functions.
    pub fn qualified_name(&self) -> String {
        match &self.class {
            Some(kind) => format!("{}:{}", kind, self.name),
            None => self.name.clone(),
        }
    }

    pub fn arg(&self, name: &str) -> Option<&ArgumentDef> {
        self.args.iter().find(|a| a.name == name)
    }

    pub fn has_argument(&self, name: &str) -> bool {
        self.arg(name).is_some()
    }

    fn view(&self, direction: ArgDirection) -> IndexMap<&str, &Type> {
        self.args
            .iter()
            .filter(|a| a.direction == direction)
            .map(|a| (a.name.as_str(), &a.ty))
            .collect()
    }

    pub fn in_req(&self) -> IndexMap<&str, &Type> {
        self.view(ArgDirection::InReq)
    }

    pub fn in_opt(&self) -> IndexMap<&str, &Type> {
        self.view(ArgDirection::InOpt)
    }

    pub fn out(&self) -> IndexMap<&str, &Type> {
        self.view(ArgDirection::Out)
    }

    /// A copy keeping only the arguments accepted by `keep`.
    pub fn filter_arguments(&self, keep: impl Fn(&ArgumentDef) -> bool) -> FunctionDef {
        let mut clone = self.clone();
        clone.args.retain(|a| keep(a));
        clone
    }

    /// A copy keeping every input and only the named outputs.
    pub fn project(&self, names: &[String]) -> FunctionDef {
        self.filter_arguments(|a| a.is_input() || names.contains(&a.name))
    }

    /// A copy with `args` added; an argument replaces any existing one with
    /// the same name.
    pub fn add_arguments(&self, args: Vec<ArgumentDef>) -> FunctionDef {
        let mut clone = self.clone();
        for arg in args {
            clone.args.retain(|a| a.name != arg.name);
            clone.args.push(arg);
        }
        clone
    }

    pub fn with_type(&self, function_type: FunctionType) -> FunctionDef {
        let mut clone = self.clone();
        clone.function_type = function_type;
        clone
    }

    pub fn without_metadata(&self) -> FunctionDef {
        let mut clone = self.clone();
        clone.nl_annotations.clear();
        for arg in &mut clone.args {
            arg.nl_annotations.clear();
        }
        clone
    }

    /// Argument names that appear more than once.
    pub fn duplicate_arguments(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        let mut dups = Vec::new();
        for arg in &self.args {
            if seen.contains(&arg.name.as_str()) {
                dups.push(arg.name.as_str());
            } else {
                seen.push(arg.name.as_str());
            }
        }
        dups
    }
}

/// `import <facets> from @<module>(params);` inside a class body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixinImport {
    pub facets: Vec<String>,
    pub module: String,
    #[serde(default)]
    pub in_params: Vec<InputParam>,
}

/// A mixin advertised by the schema registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixinDef {
    pub kind: String,
    pub facets: Vec<String>,
    #[serde(default)]
    pub args: Vec<MixinArg>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixinArg {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    pub kind: String,
    #[serde(default)]
    pub extends: Vec<String>,
    #[serde(default)]
    pub imports: Vec<MixinImport>,
    #[serde(default)]
    pub queries: IndexMap<String, FunctionDef>,
    #[serde(default)]
    pub actions: IndexMap<String, FunctionDef>,
    #[serde(default, skip_serializing_if = "AnnotationMap::is_empty")]
    pub nl_annotations: AnnotationMap,
    #[serde(default, skip_serializing_if = "AnnotationMap::is_empty")]
    pub impl_annotations: AnnotationMap,
    #[serde(default)]
    pub is_abstract: bool,
}

impl ClassDef {
    pub fn new(
        kind: &str,
        extends: Vec<String>,
        queries: Vec<FunctionDef>,
        actions: Vec<FunctionDef>,
    ) -> Self {
        ClassDef {
            kind: kind.to_string(),
            extends,
            imports: Vec::new(),
            queries: queries.into_iter().map(|f| (f.name.clone(), f)).collect(),
            actions: actions.into_iter().map(|f| (f.name.clone(), f)).collect(),
            nl_annotations: AnnotationMap::new(),
            impl_annotations: AnnotationMap::new(),
            is_abstract: false,
        }
        .normalized()
    }

    /// Re-parents every function to this class and aligns function names
    /// with their map keys. Deserialized classes go through this before use.
    pub fn normalized(mut self) -> Self {
        let kind = self.kind.clone();
        for (name, function) in self.queries.iter_mut() {
            function.name = name.clone();
            function.class = Some(kind.clone());
            if function.function_type == FunctionType::Action {
                function.function_type = FunctionType::Query;
            }
        }
        for (name, function) in self.actions.iter_mut() {
            function.name = name.clone();
            function.class = Some(kind.clone());
            function.function_type = FunctionType::Action;
        }
        self
    }

    /// Looks up a function declared directly on this class. Streams are
    /// monitorable queries.
    pub fn function(&self, function_type: FunctionType, name: &str) -> Option<&FunctionDef> {
        match function_type {
            FunctionType::Query => self.queries.get(name),
            FunctionType::Stream => self.queries.get(name).filter(|f| f.is_monitorable),
            FunctionType::Action => self.actions.get(name),
        }
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDef> {
        self.queries.values().chain(self.actions.values())
    }

    pub fn without_metadata(&self) -> ClassDef {
        let mut clone = self.clone();
        clone.nl_annotations.clear();
        for function in clone.queries.values_mut().chain(clone.actions.values_mut()) {
            *function = function.without_metadata();
        }
        clone
    }
}
