//! file: core/src/ir/mod.rs
//! description: typed model of EAST3 documents.

pub mod annotation;
pub mod display;
pub mod err;
pub mod expr;
pub mod module;
pub mod opaque;
pub mod stmt;
pub mod symbol;
pub mod walk;

pub use annotation::{CallsiteAnnotation, EscapeSummary, ReserveHint};
pub use expr::{CallMeta, CastRule, Comprehension, Expr, ExprKind, Keyword};
pub use module::{BindingKind, ImportBinding, Module, ModuleMeta, EAST_STAGE, module_from_value};
pub use opaque::OpaqueNode;
pub use stmt::{ClassDef, ForCore, FunctionDef, IterPlan, Stmt, TargetPlan};
pub use symbol::Symbol;
