//! thingtalk-core: the ThingTalk language core.
//!
//! Provides the abstract syntax tree, the type system, slot and primitive
//! iteration, and the program transformations that run on typechecked
//! trees.
//!
//! # Public API
//!
//! Key types are re-exported at the crate root for convenience:
//!
//! - AST types: [`Program`], [`Statement`], [`Table`], [`Stream`],
//!   [`Action`], [`BooleanExpression`], [`Value`], [`ClassDef`],
//!   [`FunctionDef`]
//! - [`Type`] and [`is_assignable`]
//! - [`IterateSlots`] and [`IteratePrimitives`] -- the iteration engine
//! - [`Optimize`], [`to_program`], [`convert_to_permission_rule`],
//!   [`lower_return`] -- transformations
//! - [`TransformError`] -- transformation error type

pub mod ast;
pub mod error;
pub mod lower;
pub mod optimize;
pub mod permission;
pub mod primitives;
pub mod slots;
pub mod to_program;
pub mod types;

// ── Convenience re-exports: key types ────────────────────────────────

pub use ast::{
    Action, ArgDirection, ArgumentDef, BooleanExpression, BuiltinAction, ClassDef, Declaration,
    Example, Expression, FunctionDef, FunctionType, InputParam, Invocation, PermissionFunction,
    PermissionRule, Program, SchemaRef, Selector, Statement, Stream, StreamNode, Table,
    TableNode, Value, VarRefCall,
};
pub use error::TransformError;
pub use types::{is_assignable, Type};

// ── Convenience re-exports: iteration and transformations ────────────

pub use lower::{lower_return, LoweringContext, Messaging};
pub use optimize::Optimize;
pub use permission::convert_to_permission_rule;
pub use primitives::{IteratePrimitives, Primitive, PrimitiveRole, Primitives};
pub use slots::{collect_slots, IterateSlots, PrimitiveInfo, Scope, Slot, SlotInfo, SlotItem, SlotKind};
pub use to_program::{to_program, ToProgram};
