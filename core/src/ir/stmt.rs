//! file: core/src/ir/stmt.rs
//! description: EAST3 statement nodes and loop iteration plans.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;

use crate::ir::annotation::{EscapeSummary, ReserveHint};
use crate::ir::expr::{Expr, ExprKind};
use crate::ir::opaque::{OpaqueNode, split_known};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escape_summary: Option<EscapeSummary>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, JsonValue>,
}

impl FunctionMeta {
    pub fn is_empty(&self) -> bool {
        self.escape_summary.is_none() && self.extra.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    #[serde(default)]
    pub arg_order: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(default)]
    pub body: Vec<Stmt>,
    #[serde(default, skip_serializing_if = "FunctionMeta::is_empty")]
    pub meta: FunctionMeta,
}

impl FunctionDef {
    pub fn new(name: impl Into<String>, arg_order: &[&str], body: Vec<Stmt>) -> Self {
        Self {
            name: name.into(),
            arg_order: arg_order.iter().map(|s| s.to_string()).collect(),
            return_type: None,
            body,
            meta: FunctionMeta::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default)]
    pub body: Vec<Stmt>,
}

/// How a `ForCore` loop walks its iterable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum IterPlan {
    StaticRangeForPlan {
        start: Expr,
        stop: Expr,
        step: Expr,
        /// `"ascending"`, `"descending"`, or empty when unknown.
        #[serde(default)]
        range_mode: String,
    },
    RuntimeIterForPlan {
        iter_expr: Expr,
    },
}

/// Loop variable binding pattern of a `ForCore` loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum TargetPlan {
    NameTarget {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_type: Option<String>,
    },
    TupleTarget {
        #[serde(default)]
        elements: Vec<TargetPlan>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_type: Option<String>,
    },
    /// Any other assignable expression (attribute, subscript, ...).
    ExprTarget {
        target: Expr,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_type: Option<String>,
    },
}

fn expr_target_names(target: &Expr, out: &mut Vec<String>) {
    match &target.kind {
        ExprKind::Name { id } if !id.is_empty() => out.push(id.clone()),
        ExprKind::Tuple { elements } | ExprKind::List { elements } => {
            elements.iter().for_each(|e| expr_target_names(e, out));
        }
        ExprKind::Starred { value } => expr_target_names(value, out),
        _ => {}
    }
}

impl TargetPlan {
    /// Every name bound by this target.
    pub fn names(&self, out: &mut Vec<String>) {
        match self {
            TargetPlan::NameTarget { id, .. } => {
                if !id.is_empty() {
                    out.push(id.clone());
                }
            }
            TargetPlan::TupleTarget { elements, .. } => {
                for element in elements {
                    element.names(out);
                }
            }
            TargetPlan::ExprTarget { target, .. } => expr_target_names(target, out),
        }
    }
}

/// Lowered `for` loop with an explicit iteration plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForCore {
    #[serde(default)]
    pub iter_mode: String,
    pub iter_plan: IterPlan,
    pub target_plan: TargetPlan,
    #[serde(default)]
    pub body: Vec<Stmt>,
    #[serde(default)]
    pub orelse: Vec<Stmt>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reserve_hints: Vec<ReserveHint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptHandler {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<Expr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithItem {
    pub context_expr: Expr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional_vars: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportAlias {
    pub name: String,
    #[serde(default)]
    pub asname: Option<String>,
}

/// Statement kinds with a typed payload. Anything else is read as
/// [`Stmt::Opaque`].
pub const STMT_KINDS: [&str; 23] = [
    "FunctionDef", "ClassDef", "Return", "Expr", "Assign", "AnnAssign", "AugAssign", "Swap", "If",
    "While", "For", "ForRange", "ForCore", "Try", "With", "Raise", "Import", "ImportFrom", "Pass",
    "Break", "Continue", "Global", "Nonlocal",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", remote = "Self")]
pub enum Stmt {
    FunctionDef(FunctionDef),
    ClassDef(ClassDef),
    Return {
        #[serde(default)]
        value: Option<Expr>,
    },
    Expr {
        value: Expr,
    },
    Assign {
        target: Expr,
        value: Expr,
    },
    AnnAssign {
        target: Expr,
        #[serde(default)]
        annotation: String,
        #[serde(default)]
        value: Option<Expr>,
        #[serde(default)]
        declare: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        declare_init: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        decl_type: Option<String>,
    },
    AugAssign {
        target: Expr,
        op: String,
        value: Expr,
    },
    /// `a, b = b, a` on two plain names.
    Swap {
        left: Expr,
        right: Expr,
    },
    If {
        test: Expr,
        #[serde(default)]
        body: Vec<Stmt>,
        #[serde(default)]
        orelse: Vec<Stmt>,
    },
    While {
        test: Expr,
        #[serde(default)]
        body: Vec<Stmt>,
        #[serde(default)]
        orelse: Vec<Stmt>,
    },
    For {
        target: Expr,
        iter: Expr,
        #[serde(default)]
        body: Vec<Stmt>,
        #[serde(default)]
        orelse: Vec<Stmt>,
    },
    /// Pre-lowering `for x in range(...)` loop.
    ForRange {
        target: Expr,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_type: Option<String>,
        start: Expr,
        stop: Expr,
        step: Expr,
        #[serde(default)]
        range_mode: String,
        #[serde(default)]
        body: Vec<Stmt>,
        #[serde(default)]
        orelse: Vec<Stmt>,
    },
    ForCore(ForCore),
    Try {
        #[serde(default)]
        body: Vec<Stmt>,
        #[serde(default)]
        handlers: Vec<ExceptHandler>,
        #[serde(default)]
        orelse: Vec<Stmt>,
        #[serde(default)]
        finalbody: Vec<Stmt>,
    },
    With {
        #[serde(default)]
        items: Vec<WithItem>,
        #[serde(default)]
        body: Vec<Stmt>,
    },
    Raise {
        #[serde(default)]
        exc: Option<Expr>,
    },
    Import {
        #[serde(default)]
        names: Vec<ImportAlias>,
    },
    ImportFrom {
        #[serde(default)]
        module: String,
        #[serde(default)]
        names: Vec<ImportAlias>,
        #[serde(default)]
        level: u32,
    },
    Global {
        #[serde(default)]
        names: Vec<String>,
    },
    Nonlocal {
        #[serde(default)]
        names: Vec<String>,
    },
    Pass,
    Break,
    Continue,
    #[serde(skip)]
    Opaque(OpaqueNode),
}

impl Serialize for Stmt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Stmt::Opaque(node) => node.serialize(serializer),
            typed => Stmt::serialize(typed, serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Stmt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = serde_json::Map::deserialize(deserializer)?;
        split_known(fields, &STMT_KINDS, |value| Stmt::deserialize(value), Stmt::Opaque)
    }
}

impl Stmt {
    pub fn expr(value: Expr) -> Self {
        Stmt::Expr { value }
    }

    pub fn ret(value: Option<Expr>) -> Self {
        Stmt::Return { value }
    }

    pub fn assign(target: Expr, value: Expr) -> Self {
        Stmt::Assign { target, value }
    }

    /// Whether this statement introduces control flow that may skip or
    /// repeat its siblings.
    pub fn is_control_flow(&self) -> bool {
        matches!(
            self,
            Stmt::If { .. }
                | Stmt::While { .. }
                | Stmt::For { .. }
                | Stmt::ForRange { .. }
                | Stmt::ForCore(_)
                | Stmt::Try { .. }
                | Stmt::With { .. }
                | Stmt::Opaque(_)
        )
    }

    /// Expressions owned directly by this statement, in source order. A
    /// `Return` yields its value first so callers can tell it apart.
    pub fn exprs(&self) -> Vec<&Expr> {
        match self {
            Stmt::FunctionDef(_) | Stmt::ClassDef(_) => Vec::new(),
            Stmt::Return { value } | Stmt::Raise { exc: value } => value.iter().collect(),
            Stmt::Expr { value } => vec![value],
            Stmt::Assign { target, value } | Stmt::AugAssign { target, value, .. } => {
                vec![target, value]
            }
            Stmt::Swap { left, right } => vec![left, right],
            Stmt::AnnAssign { target, value, .. } => {
                let mut out = vec![target];
                out.extend(value.iter());
                out
            }
            Stmt::If { test, .. } | Stmt::While { test, .. } => vec![test],
            Stmt::For { target, iter, .. } => vec![target, iter],
            Stmt::ForRange { target, start, stop, step, .. } => vec![target, start, stop, step],
            Stmt::ForCore(fc) => {
                let mut out = match &fc.iter_plan {
                    IterPlan::StaticRangeForPlan { start, stop, step, .. } => vec![start, stop, step],
                    IterPlan::RuntimeIterForPlan { iter_expr } => vec![iter_expr],
                };
                if let TargetPlan::ExprTarget { target, .. } = &fc.target_plan {
                    out.push(target);
                }
                out
            }
            Stmt::Try { handlers, .. } => handlers.iter().filter_map(|h| h.type_.as_ref()).collect(),
            Stmt::With { items, .. } => items
                .iter()
                .flat_map(|item| std::iter::once(&item.context_expr).chain(item.optional_vars.iter()))
                .collect(),
            Stmt::Import { .. }
            | Stmt::ImportFrom { .. }
            | Stmt::Global { .. }
            | Stmt::Nonlocal { .. }
            | Stmt::Pass
            | Stmt::Break
            | Stmt::Continue
            | Stmt::Opaque(_) => Vec::new(),
        }
    }

    /// Mutable counterpart of [`Stmt::exprs`], same order.
    pub fn exprs_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Stmt::FunctionDef(_) | Stmt::ClassDef(_) => Vec::new(),
            Stmt::Return { value } | Stmt::Raise { exc: value } => value.iter_mut().collect(),
            Stmt::Expr { value } => vec![value],
            Stmt::Assign { target, value } | Stmt::AugAssign { target, value, .. } => {
                vec![target, value]
            }
            Stmt::Swap { left, right } => vec![left, right],
            Stmt::AnnAssign { target, value, .. } => {
                let mut out = vec![target];
                out.extend(value.iter_mut());
                out
            }
            Stmt::If { test, .. } | Stmt::While { test, .. } => vec![test],
            Stmt::For { target, iter, .. } => vec![target, iter],
            Stmt::ForRange { target, start, stop, step, .. } => vec![target, start, stop, step],
            Stmt::ForCore(fc) => {
                let mut out = match &mut fc.iter_plan {
                    IterPlan::StaticRangeForPlan { start, stop, step, .. } => vec![start, stop, step],
                    IterPlan::RuntimeIterForPlan { iter_expr } => vec![iter_expr],
                };
                if let TargetPlan::ExprTarget { target, .. } = &mut fc.target_plan {
                    out.push(target);
                }
                out
            }
            Stmt::Try { handlers, .. } => {
                handlers.iter_mut().filter_map(|h| h.type_.as_mut()).collect()
            }
            Stmt::With { items, .. } => items
                .iter_mut()
                .flat_map(|item| {
                    std::iter::once(&mut item.context_expr).chain(item.optional_vars.iter_mut())
                })
                .collect(),
            Stmt::Import { .. }
            | Stmt::ImportFrom { .. }
            | Stmt::Global { .. }
            | Stmt::Nonlocal { .. }
            | Stmt::Pass
            | Stmt::Break
            | Stmt::Continue
            | Stmt::Opaque(_) => Vec::new(),
        }
    }

    /// Nested statement blocks, in source order.
    pub fn blocks(&self) -> Vec<&Vec<Stmt>> {
        match self {
            Stmt::FunctionDef(f) => vec![&f.body],
            Stmt::ClassDef(c) => vec![&c.body],
            Stmt::If { body, orelse, .. }
            | Stmt::While { body, orelse, .. }
            | Stmt::For { body, orelse, .. }
            | Stmt::ForRange { body, orelse, .. } => vec![body, orelse],
            Stmt::ForCore(fc) => vec![&fc.body, &fc.orelse],
            Stmt::Try { body, handlers, orelse, finalbody } => {
                let mut out = vec![body];
                out.extend(handlers.iter().map(|h| &h.body));
                out.push(orelse);
                out.push(finalbody);
                out
            }
            Stmt::With { body, .. } => vec![body],
            _ => Vec::new(),
        }
    }

    /// Mutable counterpart of [`Stmt::blocks`], same order.
    pub fn blocks_mut(&mut self) -> Vec<&mut Vec<Stmt>> {
        match self {
            Stmt::FunctionDef(f) => vec![&mut f.body],
            Stmt::ClassDef(c) => vec![&mut c.body],
            Stmt::If { body, orelse, .. }
            | Stmt::While { body, orelse, .. }
            | Stmt::For { body, orelse, .. }
            | Stmt::ForRange { body, orelse, .. } => vec![body, orelse],
            Stmt::ForCore(fc) => vec![&mut fc.body, &mut fc.orelse],
            Stmt::Try { body, handlers, orelse, finalbody } => {
                let mut out = vec![body];
                out.extend(handlers.iter_mut().map(|h| &mut h.body));
                out.push(orelse);
                out.push(finalbody);
                out
            }
            Stmt::With { body, .. } => vec![body],
            _ => Vec::new(),
        }
    }
}
