//! CommonJS bundling of browser scripts.
//!
//! Every entry and each module it `require`s becomes its own function scope
//! in a single module table. Entries run in order against a shared module
//! cache, so a module required from several places executes once.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use crate::task::TaskError;

const PRELUDE: &str = r#"(function (modules, entries) {
  var cache = {};
  function load(id) {
    if (cache[id]) return cache[id].exports;
    var module = (cache[id] = { exports: {} });
    var deps = modules[id][1];
    modules[id][0].call(
      module.exports,
      function (name) {
        if (!(name in deps)) throw new Error("Cannot find module '" + name + "'");
        return load(deps[name]);
      },
      module,
      module.exports
    );
    return module.exports;
  }
  for (var i = 0; i < entries.length; i++) load(entries[i]);
})"#;

/// Module body after transformation, with the specifiers it `require`s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleSource {
    pub code: String,
    pub requires: Vec<String>,
}

/// One module of the bundle.
#[derive(Debug, Clone)]
pub struct Module {
    /// Position in the module table
    pub id: usize,

    /// Source file
    pub path: PathBuf,

    /// Transformed module body
    pub code: String,

    /// Specifier -> module id
    pub deps: BTreeMap<String, usize>,
}

/// Resolves `require` specifiers and assembles the bundle.
#[derive(Debug, Clone)]
pub struct Bundler {
    node_modules: PathBuf,
}

impl Bundler {
    /// Create a bundler that resolves bare specifiers in `node_modules`.
    pub fn new(node_modules: impl Into<PathBuf>) -> Self {
        Self {
            node_modules: node_modules.into(),
        }
    }

    /// Collect the module graph reachable from `entries`.
    ///
    /// `transform` receives each module's path and source and returns the
    /// code placed in the module table along with the specifiers that code
    /// requires. Dependencies are read from the transformed code, so
    /// anything the transform introduces is bundled too.
    pub fn collect<F>(&self, entries: &[PathBuf], mut transform: F) -> Result<Vec<Module>, TaskError>
    where
        F: FnMut(&Path, &str) -> Result<ModuleSource, TaskError>,
    {
        let mut ids: HashMap<PathBuf, usize> = HashMap::new();
        let mut queue: VecDeque<(usize, PathBuf)> = VecDeque::new();
        let mut modules: Vec<Module> = Vec::new();

        for entry in entries {
            let next = ids.len();
            if let Entry::Vacant(slot) = ids.entry(module_key(entry)) {
                slot.insert(next);
                queue.push_back((next, entry.clone()));
            }
        }

        while let Some((id, path)) = queue.pop_front() {
            let source = fs::read_to_string(&path).map_err(|e| TaskError::io(&path, e))?;

            let compiled = if path.extension().and_then(|e| e.to_str()) == Some("json") {
                ModuleSource {
                    code: format!("module.exports = {};", source.trim()),
                    requires: Vec::new(),
                }
            } else {
                transform(&path, &source)?
            };

            let mut deps = BTreeMap::new();
            for specifier in compiled.requires {
                let resolved = self.resolve(&path, &specifier).ok_or_else(|| {
                    TaskError::Resolve {
                        path: path.display().to_string(),
                        specifier: specifier.clone(),
                    }
                })?;

                let next = ids.len();
                let dep_id = match ids.entry(module_key(&resolved)) {
                    Entry::Occupied(existing) => *existing.get(),
                    Entry::Vacant(slot) => {
                        slot.insert(next);
                        queue.push_back((next, resolved));
                        next
                    }
                };
                deps.insert(specifier, dep_id);
            }

            tracing::debug!(module = id, path = %path.display(), deps = deps.len(), "Bundled module");

            modules.push(Module {
                id,
                path,
                code: compiled.code,
                deps,
            });
        }

        modules.sort_by_key(|m| m.id);
        Ok(modules)
    }

    /// Resolve `specifier` as required from `from`.
    pub fn resolve(&self, from: &Path, specifier: &str) -> Option<PathBuf> {
        if specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/')
        {
            let base = from.parent().unwrap_or(Path::new("")).join(specifier);
            return resolve_file(&base);
        }

        let package = self.node_modules.join(specifier);
        if let Some(main) = package_main(&package) {
            if let Some(found) = resolve_file(&package.join(main)) {
                return Some(found);
            }
        }
        resolve_file(&package)
    }
}

/// Render the module table and runtime as one script.
pub fn render(modules: &[Module], entry_count: usize) -> String {
    let mut out = String::from(PRELUDE);
    out.push_str("({\n");

    for module in modules {
        let deps = serde_json::to_string(&module.deps).unwrap_or_else(|_| "{}".to_string());
        out.push_str(&format!(
            "{}: [function (require, module, exports) {{\n{}\n}}, {}],\n",
            module.id, module.code, deps
        ));
    }

    let entries: Vec<String> = (0..entry_count).map(|i| i.to_string()).collect();
    out.push_str(&format!("}}, [{}]);\n", entries.join(", ")));
    out
}

fn resolve_file(base: &Path) -> Option<PathBuf> {
    let with_suffix = |suffix: &str| {
        let mut name = base.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    };

    let candidates = [
        base.to_path_buf(),
        with_suffix(".js"),
        with_suffix(".json"),
        base.join("index.js"),
    ];

    candidates.into_iter().find(|c| c.is_file())
}

fn package_main(package: &Path) -> Option<String> {
    let manifest = fs::read_to_string(package.join("package.json")).ok()?;
    let json: serde_json::Value = serde_json::from_str(&manifest).ok()?;
    json.get("main")?.as_str().map(|s| s.to_string())
}

fn module_key(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
