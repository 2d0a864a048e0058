//! file: core/src/ir/expr.rs
//! description: EAST3 expression nodes.
//!
//! Every expression carries the attributes the front-end resolved for it
//! (`resolved_type`, `borrow_kind`, implicit `casts`, and the source text in
//! `repr`). The node-specific payload lives in [`ExprKind`], which is
//! flattened into the same JSON object and discriminated by `"kind"`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;

use crate::ir::annotation::CallsiteAnnotation;
use crate::ir::opaque::{OpaqueNode, split_known};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    #[serde(flatten)]
    pub kind: ExprKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub borrow_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub casts: Vec<CastRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repr: Option<String>,
}

/// An implicit numeric promotion applied to one operand of a binary node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastRule {
    /// `"left"` or `"right"`.
    pub on: String,
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg: Option<String>,
    pub value: Expr,
}

/// Metadata slots written by the optimizer onto call nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_escape_callsite: Option<CallsiteAnnotation>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, JsonValue>,
}

impl CallMeta {
    pub fn is_empty(&self) -> bool {
        self.non_escape_callsite.is_none() && self.extra.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comprehension {
    pub target: Expr,
    pub iter: Expr,
    #[serde(default)]
    pub ifs: Vec<Expr>,
}

impl Comprehension {
    fn children(&self) -> impl Iterator<Item = &Expr> {
        [&self.target, &self.iter].into_iter().chain(self.ifs.iter())
    }

    fn children_mut(&mut self) -> impl Iterator<Item = &mut Expr> {
        [&mut self.target, &mut self.iter].into_iter().chain(self.ifs.iter_mut())
    }

    /// Names bound by the comprehension target.
    pub fn target_names(&self) -> Vec<&str> {
        fn walk<'a>(target: &'a Expr, out: &mut Vec<&'a str>) {
            match &target.kind {
                ExprKind::Name { id } if !id.is_empty() => out.push(id),
                ExprKind::Tuple { elements } | ExprKind::List { elements } => {
                    elements.iter().for_each(|e| walk(e, out));
                }
                ExprKind::Starred { value } => walk(value, out),
                _ => {}
            }
        }
        let mut out = Vec::new();
        walk(&self.target, &mut out);
        out
    }

    /// Comprehension clauses of `kind`, if it is a comprehension.
    pub fn of(kind: &ExprKind) -> &[Comprehension] {
        match kind {
            ExprKind::ListComp { generators, .. }
            | ExprKind::SetComp { generators, .. }
            | ExprKind::DictComp { generators, .. } => generators.as_slice(),
            _ => &[],
        }
    }
}

/// Expression kinds with a typed payload. Anything else is read as
/// [`ExprKind::Opaque`].
pub const EXPR_KINDS: [&str; 23] = [
    "Constant", "Name", "Attribute", "Call", "UnaryOp", "BinOp", "Compare", "BoolOp", "IfExp",
    "List", "Tuple", "Set", "Dict", "Subscript", "Slice", "ListComp", "SetComp", "DictComp",
    "Lambda", "JoinedStr", "FormattedValue", "RangeExpr", "Starred",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", remote = "Self")]
pub enum ExprKind {
    Constant {
        #[serde(default)]
        value: JsonValue,
    },
    Name {
        id: String,
    },
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Call {
        func: Box<Expr>,
        #[serde(default)]
        args: Vec<Expr>,
        #[serde(default)]
        keywords: Vec<Keyword>,
        /// `"BuiltinCall"` when the front-end lowered the call to a runtime builtin.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lowered_kind: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        builtin_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        runtime_call: Option<String>,
        #[serde(default, skip_serializing_if = "CallMeta::is_empty")]
        meta: CallMeta,
    },
    UnaryOp {
        op: String,
        operand: Box<Expr>,
    },
    BinOp {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Compare {
        left: Box<Expr>,
        ops: Vec<String>,
        comparators: Vec<Expr>,
    },
    BoolOp {
        op: String,
        values: Vec<Expr>,
    },
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    List {
        #[serde(default)]
        elements: Vec<Expr>,
    },
    Tuple {
        #[serde(default)]
        elements: Vec<Expr>,
    },
    Set {
        #[serde(default)]
        elements: Vec<Expr>,
    },
    Dict {
        #[serde(default)]
        keys: Vec<Expr>,
        #[serde(default)]
        values: Vec<Expr>,
    },
    Subscript {
        value: Box<Expr>,
        slice: Box<Expr>,
    },
    Slice {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lower: Option<Box<Expr>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        upper: Option<Box<Expr>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<Box<Expr>>,
    },
    ListComp {
        elt: Box<Expr>,
        #[serde(default)]
        generators: Vec<Comprehension>,
    },
    SetComp {
        elt: Box<Expr>,
        #[serde(default)]
        generators: Vec<Comprehension>,
    },
    DictComp {
        key: Box<Expr>,
        value: Box<Expr>,
        #[serde(default)]
        generators: Vec<Comprehension>,
    },
    Lambda {
        #[serde(default)]
        arg_order: Vec<String>,
        body: Box<Expr>,
    },
    /// f-string: literal `Constant` parts interleaved with `FormattedValue`s.
    JoinedStr {
        #[serde(default)]
        values: Vec<Expr>,
    },
    FormattedValue {
        value: Box<Expr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format_spec: Option<Box<Expr>>,
    },
    /// `range(...)` used as a value rather than as a loop source.
    RangeExpr {
        start: Box<Expr>,
        stop: Box<Expr>,
        step: Box<Expr>,
        #[serde(default)]
        range_mode: String,
    },
    Starred {
        value: Box<Expr>,
    },
    #[serde(skip)]
    Opaque(OpaqueNode),
}

impl Serialize for ExprKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ExprKind::Opaque(node) => node.serialize(serializer),
            typed => ExprKind::serialize(typed, serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ExprKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = serde_json::Map::deserialize(deserializer)?;
        split_known(fields, &EXPR_KINDS, |value| ExprKind::deserialize(value), ExprKind::Opaque)
    }
}

const INT_LIKE_TYPES: [&str; 9] = [
    "int8", "uint8", "int16", "uint16", "int32", "uint32", "int64", "uint64", "int",
];

const FLOAT_TYPES: [&str; 3] = ["float32", "float64", "float"];

/// Trims a type name, mapping empty or missing values to `"unknown"`.
pub fn normalize_type_name(value: Option<&str>) -> &str {
    match value.map(str::trim) {
        Some(text) if !text.is_empty() => text,
        _ => "unknown",
    }
}

pub fn is_int_like_type(value: Option<&str>) -> bool {
    INT_LIKE_TYPES.contains(&normalize_type_name(value))
}

/// Canonical numeric type (`int` -> `int64`, `float` -> `float64`), or
/// `None` when the type is not numeric.
pub fn canonical_numeric_type(value: Option<&str>) -> Option<String> {
    match normalize_type_name(value) {
        "int" => Some("int64".to_string()),
        "float" => Some("float64".to_string()),
        t if INT_LIKE_TYPES.contains(&t) || FLOAT_TYPES.contains(&t) => Some(t.to_string()),
        _ => None,
    }
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self { kind, resolved_type: None, borrow_kind: None, casts: Vec::new(), repr: None }
    }

    pub fn with_type(mut self, resolved_type: impl Into<String>) -> Self {
        self.resolved_type = Some(resolved_type.into());
        self
    }

    pub fn with_borrow(mut self, borrow_kind: impl Into<String>) -> Self {
        self.borrow_kind = Some(borrow_kind.into());
        self
    }

    pub fn with_repr(mut self, repr: impl Into<String>) -> Self {
        self.repr = Some(repr.into());
        self
    }

    /// An `int64` literal the way the front-end emits it.
    pub fn int(value: i64) -> Self {
        Expr::new(ExprKind::Constant { value: JsonValue::from(value) })
            .with_type("int64")
            .with_borrow("value")
            .with_repr(value.to_string())
    }

    pub fn float(value: f64) -> Self {
        Expr::new(ExprKind::Constant { value: JsonValue::from(value) })
            .with_type("float64")
            .with_borrow("value")
            .with_repr(value.to_string())
    }

    pub fn name(id: impl Into<String>) -> Self {
        let id = id.into();
        Expr::new(ExprKind::Name { id: id.clone() }).with_repr(id)
    }

    pub fn attribute(value: Expr, attr: impl Into<String>) -> Self {
        Expr::new(ExprKind::Attribute { value: Box::new(value), attr: attr.into() })
    }

    /// A plain (not builtin-lowered) call.
    pub fn call(func: Expr, args: Vec<Expr>) -> Self {
        Expr::new(ExprKind::Call {
            func: Box::new(func),
            args,
            keywords: Vec::new(),
            lowered_kind: None,
            builtin_name: None,
            runtime_call: None,
            meta: CallMeta::default(),
        })
    }

    /// A call the front-end lowered to a runtime builtin.
    pub fn builtin_call(
        builtin_name: impl Into<String>,
        runtime_call: impl Into<String>,
        args: Vec<Expr>,
    ) -> Self {
        let builtin_name = builtin_name.into();
        Expr::new(ExprKind::Call {
            func: Box::new(Expr::name(builtin_name.clone()).with_type("unknown")),
            args,
            keywords: Vec::new(),
            lowered_kind: Some("BuiltinCall".to_string()),
            builtin_name: Some(builtin_name),
            runtime_call: Some(runtime_call.into()),
            meta: CallMeta::default(),
        })
    }

    pub fn binop(op: impl Into<String>, left: Expr, right: Expr) -> Self {
        Expr::new(ExprKind::BinOp { op: op.into(), left: Box::new(left), right: Box::new(right) })
    }

    pub fn unary(op: impl Into<String>, operand: Expr) -> Self {
        Expr::new(ExprKind::UnaryOp { op: op.into(), operand: Box::new(operand) })
    }

    pub fn compare(op: impl Into<String>, left: Expr, right: Expr) -> Self {
        Expr::new(ExprKind::Compare {
            left: Box::new(left),
            ops: vec![op.into()],
            comparators: vec![right],
        })
    }

    pub fn if_exp(test: Expr, body: Expr, orelse: Expr) -> Self {
        Expr::new(ExprKind::IfExp {
            test: Box::new(test),
            body: Box::new(body),
            orelse: Box::new(orelse),
        })
    }

    /// The integer value of a `Constant` node, if it holds one.
    pub fn const_int(&self) -> Option<i64> {
        match &self.kind {
            ExprKind::Constant { value } => value.as_i64(),
            _ => None,
        }
    }

    /// Whether this is an int, float or bool literal.
    pub fn is_numeric_constant(&self) -> bool {
        match &self.kind {
            ExprKind::Constant { value } => value.is_number() || value.is_boolean(),
            _ => false,
        }
    }

    pub fn name_id(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Name { id } if !id.is_empty() => Some(id.as_str()),
            _ => None,
        }
    }

    /// Whether the front-end lowered this node into a runtime builtin call
    /// named `runtime_call`.
    pub fn is_builtin_runtime_call(&self, runtime_call_name: &str) -> bool {
        match &self.kind {
            ExprKind::Call { lowered_kind, runtime_call, .. } => {
                lowered_kind.as_deref() == Some("BuiltinCall")
                    && normalize_type_name(runtime_call.as_deref()) == runtime_call_name
            }
            _ => false,
        }
    }

    /// Canonical textual key used to compare expressions structurally:
    /// the source `repr` when present, otherwise the rendered node.
    pub fn canonical_key(&self) -> String {
        match self.repr.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => self.to_string(),
        }
    }

    /// Direct sub-expressions in evaluation order. Call nodes yield the
    /// callee first, then positional args, then keyword values.
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Constant { .. } | ExprKind::Name { .. } => Vec::new(),
            ExprKind::Attribute { value, .. } => vec![value.as_ref()],
            ExprKind::Call { func, args, keywords, .. } => {
                let mut out = vec![func.as_ref()];
                out.extend(args.iter());
                out.extend(keywords.iter().map(|k| &k.value));
                out
            }
            ExprKind::UnaryOp { operand, .. } => vec![operand.as_ref()],
            ExprKind::BinOp { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            ExprKind::Compare { left, comparators, .. } => {
                let mut out = vec![left.as_ref()];
                out.extend(comparators.iter());
                out
            }
            ExprKind::BoolOp { values, .. } => values.iter().collect(),
            ExprKind::IfExp { test, body, orelse } => {
                vec![test.as_ref(), body.as_ref(), orelse.as_ref()]
            }
            ExprKind::List { elements }
            | ExprKind::Tuple { elements }
            | ExprKind::Set { elements } => elements.iter().collect(),
            ExprKind::Dict { keys, values } => keys.iter().chain(values.iter()).collect(),
            ExprKind::Subscript { value, slice } => vec![value.as_ref(), slice.as_ref()],
            ExprKind::Slice { lower, upper, step } => {
                [lower, upper, step].into_iter().flatten().map(|e| &**e).collect()
            }
            ExprKind::ListComp { elt, generators } | ExprKind::SetComp { elt, generators } => {
                let mut out = vec![elt.as_ref()];
                for generator in generators {
                    out.extend(generator.children());
                }
                out
            }
            ExprKind::DictComp { key, value, generators } => {
                let mut out = vec![key.as_ref(), value.as_ref()];
                for generator in generators {
                    out.extend(generator.children());
                }
                out
            }
            ExprKind::Lambda { body, .. } => vec![body.as_ref()],
            ExprKind::JoinedStr { values } => values.iter().collect(),
            ExprKind::FormattedValue { value, format_spec } => {
                std::iter::once(value).chain(format_spec).map(|e| &**e).collect()
            }
            ExprKind::RangeExpr { start, stop, step, .. } => {
                vec![start.as_ref(), stop.as_ref(), step.as_ref()]
            }
            ExprKind::Starred { value } => vec![value.as_ref()],
            ExprKind::Opaque(_) => Vec::new(),
        }
    }

    /// Mutable counterpart of [`Expr::children`], same order.
    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match &mut self.kind {
            ExprKind::Constant { .. } | ExprKind::Name { .. } => Vec::new(),
            ExprKind::Attribute { value, .. } => vec![value.as_mut()],
            ExprKind::Call { func, args, keywords, .. } => {
                let mut out = vec![func.as_mut()];
                out.extend(args.iter_mut());
                out.extend(keywords.iter_mut().map(|k| &mut k.value));
                out
            }
            ExprKind::UnaryOp { operand, .. } => vec![operand.as_mut()],
            ExprKind::BinOp { left, right, .. } => vec![left.as_mut(), right.as_mut()],
            ExprKind::Compare { left, comparators, .. } => {
                let mut out = vec![left.as_mut()];
                out.extend(comparators.iter_mut());
                out
            }
            ExprKind::BoolOp { values, .. } => values.iter_mut().collect(),
            ExprKind::IfExp { test, body, orelse } => {
                vec![test.as_mut(), body.as_mut(), orelse.as_mut()]
            }
            ExprKind::List { elements }
            | ExprKind::Tuple { elements }
            | ExprKind::Set { elements } => elements.iter_mut().collect(),
            ExprKind::Dict { keys, values } => keys.iter_mut().chain(values.iter_mut()).collect(),
            ExprKind::Subscript { value, slice } => vec![value.as_mut(), slice.as_mut()],
            ExprKind::Slice { lower, upper, step } => {
                [lower, upper, step].into_iter().flatten().map(|e| &mut **e).collect()
            }
            ExprKind::ListComp { elt, generators } | ExprKind::SetComp { elt, generators } => {
                let mut out = vec![elt.as_mut()];
                for generator in generators {
                    out.extend(generator.children_mut());
                }
                out
            }
            ExprKind::DictComp { key, value, generators } => {
                let mut out = vec![key.as_mut(), value.as_mut()];
                for generator in generators {
                    out.extend(generator.children_mut());
                }
                out
            }
            ExprKind::Lambda { body, .. } => vec![body.as_mut()],
            ExprKind::JoinedStr { values } => values.iter_mut().collect(),
            ExprKind::FormattedValue { value, format_spec } => {
                std::iter::once(value).chain(format_spec).map(|e| &mut **e).collect()
            }
            ExprKind::RangeExpr { start, stop, step, .. } => {
                vec![start.as_mut(), stop.as_mut(), step.as_mut()]
            }
            ExprKind::Starred { value } => vec![value.as_mut()],
            ExprKind::Opaque(_) => Vec::new(),
        }
    }
}
