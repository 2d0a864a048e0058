//! file: core/src/opt/passes/non_escape/closure.rs
//! description: discovers and loads the modules a root document imports.
//!
//! Dependencies are searched on disk relative to the importing module's
//! `source_path`. A candidate file is lowered through an [`IrBuilder`]; if
//! that fails, an import-only stub is parsed from the source text instead so
//! re-export chains through the module keep resolving.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::ir::module::Module;
use crate::opt::passes::non_escape::stub::import_only_stub;

/// Turns a source file into an EAST3 document.
pub trait IrBuilder {
    fn build_ir(&self, path: &Path) -> Result<Module, String>;
}

impl<F> IrBuilder for F
where
    F: Fn(&Path) -> Result<Module, String>,
{
    fn build_ir(&self, path: &Path) -> Result<Module, String> {
        self(path)
    }
}

/// Reads a pre-lowered document stored next to the source file:
/// `pkg/b.py` is loaded from `pkg/b.east3.json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SidecarIrBuilder;

impl SidecarIrBuilder {
    pub fn sidecar_path(source: &Path) -> PathBuf {
        source.with_extension("east3.json")
    }
}

impl IrBuilder for SidecarIrBuilder {
    fn build_ir(&self, path: &Path) -> Result<Module, String> {
        let sidecar = Self::sidecar_path(path);
        let text = fs::read_to_string(&sidecar)
            .map_err(|e| format!("cannot read {}: {}", sidecar.display(), e))?;
        let doc = Module::from_json_str(&text).map_err(|e| e.message())?;
        doc.validate().map_err(|e| e.message())?;
        Ok(doc)
    }
}

/// Every module reachable from a root, keyed by module id. The root itself
/// is not included.
#[derive(Debug, Clone, Default)]
pub struct ModuleClosure {
    pub modules: BTreeMap<String, Module>,
    /// Ids loaded as import-only stubs.
    pub stubbed: Vec<String>,
    /// Ids that were imported but could not be located or read.
    pub missing: Vec<String>,
    pub warnings: Vec<String>,
}

/// Files that may hold module `module_id`, searched from `importer`'s
/// directory up through each of its ancestors.
pub fn candidate_paths(importer: &Path, module_id: &str) -> Vec<PathBuf> {
    let rel: PathBuf = module_id.split('.').collect();
    let start = importer.parent().unwrap_or_else(|| Path::new(""));
    let mut out = Vec::new();
    for dir in start.ancestors() {
        for root in [dir.to_path_buf(), dir.join("src")] {
            let base = root.join(&rel);
            out.push(base.with_extension("py"));
            out.push(base.join("__init__.py"));
        }
    }
    out
}

fn find_candidate(importer: &Path, module_id: &str) -> Option<PathBuf> {
    candidate_paths(importer, module_id).into_iter().find(|p| p.is_file())
}

impl ModuleClosure {
    fn contains(&self, root_id: &str, module_id: &str) -> bool {
        module_id == root_id || self.modules.contains_key(module_id)
    }

    fn load_one(&mut self, module_id: &str, importer: Option<&str>, builder: &dyn IrBuilder) {
        let Some(importer) = importer else {
            debug!("non_escape: importer of {} has no source_path", module_id);
            self.missing.push(module_id.to_string());
            return;
        };
        let Some(candidate) = find_candidate(Path::new(importer), module_id) else {
            debug!("non_escape: no source found for {}", module_id);
            self.missing.push(module_id.to_string());
            return;
        };
        let path_text = candidate.display().to_string();

        let reason = match builder.build_ir(&candidate) {
            Ok(mut doc) => {
                if doc.meta.module_id.trim().is_empty() {
                    doc.meta.module_id = module_id.to_string();
                }
                if doc.source_path.is_none() {
                    doc.source_path = Some(path_text);
                }
                self.modules.insert(module_id.to_string(), doc);
                return;
            }
            Err(reason) => reason,
        };

        let stub = fs::read_to_string(&candidate)
            .map_err(|e| e.to_string())
            .and_then(|source| import_only_stub(module_id, &path_text, &source));
        match stub {
            Ok(stub) => {
                let message = format!(
                    "non_escape: import-only stub for {} ({}): {}",
                    module_id, path_text, reason
                );
                warn!("{}", message);
                self.warnings.push(message);
                self.stubbed.push(module_id.to_string());
                self.modules.insert(module_id.to_string(), stub);
            }
            Err(e) => {
                let message = format!("non_escape: cannot load {} ({}): {}", module_id, path_text, e);
                warn!("{}", message);
                self.warnings.push(message);
                self.missing.push(module_id.to_string());
            }
        }
    }
}

/// Loads every module transitively imported by `root`, starting from the
/// documents pre-supplied in `meta.non_escape_import_closure`.
pub fn load_module_closure(root: &Module, builder: &dyn IrBuilder) -> ModuleClosure {
    let root_id = root.module_id();
    let mut closure = ModuleClosure::default();
    for (key, doc) in &root.meta.non_escape_import_closure {
        if *key == root_id {
            continue;
        }
        let mut doc = doc.clone();
        if doc.meta.module_id.trim().is_empty() {
            doc.meta.module_id = key.clone();
        }
        closure.modules.insert(key.clone(), doc);
    }

    let mut attempted = BTreeSet::new();
    loop {
        // pending id -> source_path of the first importer that has one
        let mut pending: BTreeMap<String, Option<String>> = BTreeMap::new();
        let importers = std::iter::once(root).chain(closure.modules.values());
        for doc in importers {
            for binding in &doc.meta.import_bindings {
                let target = binding.module_id.trim();
                if target.is_empty()
                    || closure.contains(&root_id, target)
                    || attempted.contains(target)
                {
                    continue;
                }
                let slot = pending.entry(target.to_string()).or_insert(None);
                if slot.is_none() {
                    *slot = doc.source_path.clone();
                }
            }
        }
        if pending.is_empty() {
            break;
        }
        for (module_id, importer) in pending {
            attempted.insert(module_id.clone());
            closure.load_one(&module_id, importer.as_deref(), builder);
        }
    }
    closure
}
