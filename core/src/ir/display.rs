//! Source-like rendering of expressions, used as a canonical key when a
//! node carries no `repr`.

use std::fmt;

use crate::ir::expr::{Comprehension, Expr, ExprKind};

fn binop_symbol(op: &str) -> &str {
    match op {
        "Add" => "+",
        "Sub" => "-",
        "Mult" => "*",
        "Div" => "/",
        "FloorDiv" => "//",
        "Mod" => "%",
        "Pow" => "**",
        "LShift" => "<<",
        "RShift" => ">>",
        "BitAnd" => "&",
        "BitOr" => "|",
        "BitXor" => "^",
        other => other,
    }
}

fn cmpop_symbol(op: &str) -> &str {
    match op {
        "Eq" => "==",
        "NotEq" => "!=",
        "Lt" => "<",
        "LtE" => "<=",
        "Gt" => ">",
        "GtE" => ">=",
        "Is" => "is",
        "IsNot" => "is not",
        "In" => "in",
        "NotIn" => "not in",
        other => other,
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

fn write_generators(f: &mut fmt::Formatter<'_>, generators: &[Comprehension]) -> fmt::Result {
    for generator in generators {
        write!(f, " for {} in {}", generator.target, generator.iter)?;
        for cond in &generator.ifs {
            write!(f, " if {}", cond)?;
        }
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Constant { value } => match value {
                serde_json::Value::Null => write!(f, "None"),
                serde_json::Value::Bool(true) => write!(f, "True"),
                serde_json::Value::Bool(false) => write!(f, "False"),
                other => write!(f, "{}", other),
            },
            ExprKind::Name { id } => write!(f, "{}", id),
            ExprKind::Attribute { value, attr } => write!(f, "{}.{}", value, attr),
            ExprKind::Call { func, args, keywords, runtime_call, .. } => {
                // builtin-lowered casts render with their target type so that
                // `int(x)` and `float(x)` never share a key
                match (runtime_call.as_deref(), self.resolved_type.as_deref()) {
                    (Some("static_cast"), Some(ty)) => write!(f, "static_cast<{}>(", ty)?,
                    _ => write!(f, "{}(", func)?,
                }
                write_list(f, args)?;
                for (i, keyword) in keywords.iter().enumerate() {
                    if i > 0 || !args.is_empty() {
                        write!(f, ", ")?;
                    }
                    match &keyword.arg {
                        Some(name) => write!(f, "{}={}", name, keyword.value)?,
                        None => write!(f, "**{}", keyword.value)?,
                    }
                }
                write!(f, ")")
            }
            ExprKind::UnaryOp { op, operand } => {
                let sym = match op.as_str() {
                    "UAdd" => "+",
                    "USub" => "-",
                    "Not" => "not ",
                    "Invert" => "~",
                    other => other,
                };
                write!(f, "({}{})", sym, operand)
            }
            ExprKind::BinOp { op, left, right } => {
                write!(f, "({} {} {})", left, binop_symbol(op), right)
            }
            ExprKind::Compare { left, ops, comparators } => {
                write!(f, "({}", left)?;
                for (op, rhs) in ops.iter().zip(comparators) {
                    write!(f, " {} {}", cmpop_symbol(op), rhs)?;
                }
                write!(f, ")")
            }
            ExprKind::BoolOp { op, values } => {
                let joiner = if op == "And" { " and " } else { " or " };
                write!(f, "(")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{}", joiner)?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, ")")
            }
            ExprKind::IfExp { test, body, orelse } => {
                write!(f, "({} if {} else {})", body, test, orelse)
            }
            ExprKind::List { elements } => {
                write!(f, "[")?;
                write_list(f, elements)?;
                write!(f, "]")
            }
            ExprKind::Tuple { elements } => {
                write!(f, "(")?;
                write_list(f, elements)?;
                if elements.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            ExprKind::Set { elements } => {
                write!(f, "{{")?;
                write_list(f, elements)?;
                write!(f, "}}")
            }
            ExprKind::Dict { keys, values } => {
                write!(f, "{{")?;
                for (i, (k, v)) in keys.iter().zip(values).enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            ExprKind::Subscript { value, slice } => write!(f, "{}[{}]", value, slice),
            ExprKind::Slice { lower, upper, step } => {
                if let Some(lower) = lower {
                    write!(f, "{}", lower)?;
                }
                write!(f, ":")?;
                if let Some(upper) = upper {
                    write!(f, "{}", upper)?;
                }
                if let Some(step) = step {
                    write!(f, ":{}", step)?;
                }
                Ok(())
            }
            ExprKind::ListComp { elt, generators } => {
                write!(f, "[{}", elt)?;
                write_generators(f, generators)?;
                write!(f, "]")
            }
            ExprKind::SetComp { elt, generators } => {
                write!(f, "{{{}", elt)?;
                write_generators(f, generators)?;
                write!(f, "}}")
            }
            ExprKind::DictComp { key, value, generators } => {
                write!(f, "{{{}: {}", key, value)?;
                write_generators(f, generators)?;
                write!(f, "}}")
            }
            ExprKind::Lambda { arg_order, body } => {
                write!(f, "(lambda {}: {})", arg_order.join(", "), body)
            }
            ExprKind::JoinedStr { values } => {
                write!(f, "f\"")?;
                for value in values {
                    match &value.kind {
                        ExprKind::Constant { value: serde_json::Value::String(text) } => {
                            write!(f, "{}", text)?
                        }
                        _ => write!(f, "{}", value)?,
                    }
                }
                write!(f, "\"")
            }
            ExprKind::FormattedValue { value, format_spec } => match format_spec {
                Some(spec) => write!(f, "{{{}:{}}}", value, spec),
                None => write!(f, "{{{}}}", value),
            },
            ExprKind::RangeExpr { start, stop, step, .. } => {
                write!(f, "range({}, {}, {})", start, stop, step)
            }
            ExprKind::Starred { value } => write!(f, "*{}", value),
            ExprKind::Opaque(node) => {
                write!(f, "<{} {}>", node.kind, serde_json::Value::Object(node.fields.clone()))
            }
        }
    }
}
