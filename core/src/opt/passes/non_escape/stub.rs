//! Import-only stub documents for dependencies the IR builder cannot load.
//!
//! The stub keeps just enough of a module (its import bindings) for
//! re-export chains through it to stay resolvable.

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::ir::module::{ImportBinding, Module};

#[derive(Parser)]
#[grammar = "opt/passes/non_escape/import_stub.pest"]
pub struct ImportStubParser;

/// Absolute module id for `from <dots><name> import ...` written inside
/// `module_id`. `None` when the dots climb past the top-level package.
fn resolve_relative(module_id: &str, level: usize, name: &str, is_package: bool) -> Option<String> {
    if level == 0 {
        return Some(name.to_string());
    }
    let parts: Vec<&str> = module_id.split('.').filter(|p| !p.is_empty()).collect();
    // inside a package `__init__`, one dot names the package itself
    let drop = if is_package { level - 1 } else { level };
    if drop > parts.len() {
        return None;
    }
    let base = parts[..parts.len() - drop].join(".");
    Some(match (base.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (false, true) => base,
        (false, false) => format!("{}.{}", base, name),
    })
}

fn alias_of(pair: Pair<'_, Rule>) -> (String, Option<String>) {
    let mut inner = pair.into_inner();
    let name = inner.next().map(|p| p.as_str().to_string()).unwrap_or_default();
    let alias = inner.next().map(|p| p.as_str().to_string());
    (name, alias)
}

/// Parses the top-level imports of `source`, the text of module `module_id`.
pub fn parse_import_bindings(
    source: &str,
    module_id: &str,
    is_package: bool,
) -> Result<Vec<ImportBinding>, String> {
    let mut pairs = ImportStubParser::parse(Rule::file, source).map_err(|e| e.to_string())?;
    let Some(file) = pairs.next() else {
        return Ok(Vec::new());
    };

    let mut bindings = Vec::new();
    for stmt in file.into_inner() {
        match stmt.as_rule() {
            Rule::import_stmt => {
                for module_alias in stmt.into_inner() {
                    let (target, alias) = alias_of(module_alias);
                    // `import a.b` binds `a`
                    let local = alias.unwrap_or_else(|| {
                        target.split('.').next().unwrap_or_default().to_string()
                    });
                    bindings.push(ImportBinding::module(target, local));
                }
            }
            Rule::from_stmt => {
                let mut inner = stmt.into_inner();
                let Some(from_module) = inner.next() else {
                    continue;
                };
                let mut level = 0;
                let mut name = "";
                for part in from_module.into_inner() {
                    match part.as_rule() {
                        Rule::dots => level = part.as_str().len(),
                        Rule::dotted => name = part.as_str(),
                        _ => {}
                    }
                }
                let Some(target) = resolve_relative(module_id, level, name, is_package) else {
                    continue;
                };
                for item in inner {
                    if item.as_rule() != Rule::name_alias {
                        continue;
                    }
                    let (export, alias) = alias_of(item);
                    let local = alias.unwrap_or_else(|| export.clone());
                    bindings.push(ImportBinding::symbol(target.clone(), export, local));
                }
            }
            _ => {}
        }
    }
    Ok(bindings)
}

/// A module with no body whose metadata only records import bindings.
pub fn import_only_stub(
    module_id: &str,
    source_path: &str,
    source: &str,
) -> Result<Module, String> {
    let is_package = source_path.ends_with("__init__.py");
    let bindings = parse_import_bindings(source, module_id, is_package)?;
    let mut stub = Module::new(module_id, Vec::new()).with_source_path(source_path);
    stub.meta.import_bindings = bindings;
    Ok(stub)
}
