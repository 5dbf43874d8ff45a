//! Script transpiling, bundling and minification into `main.js`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use oxc_allocator::Allocator;
use oxc_ast::ast::{Argument, Expression, Program};
use oxc_ast::AstKind;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc_parser::{Parser, ParserReturn};
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{TransformOptions, Transformer};

use crate::bundle::{self, Bundler, ModuleSource};
use crate::esm;
use crate::fileset;
use crate::paths::{Category, PathTable};
use crate::task::{ReloadKind, Task, TaskError, TaskName, TaskReport};

/// Name of the bundled script.
pub const OUTPUT_FILE: &str = "main.js";

/// Default syntax target for transpiling.
pub const DEFAULT_TARGET: &str = "es2015";

/// Bundles the top-level scripts into a minified `main.js`.
#[derive(Debug, Clone)]
pub struct ScriptTask {
    paths: Arc<PathTable>,
    target: String,
    node_modules: PathBuf,
}

impl ScriptTask {
    pub fn new(paths: Arc<PathTable>, target: impl Into<String>) -> Self {
        let project_root = paths.src_root().parent().unwrap_or(Path::new("")).to_path_buf();
        Self {
            paths,
            target: target.into(),
            node_modules: project_root.join("node_modules"),
        }
    }

    /// Resolve bare `require` specifiers in `dir` instead.
    pub fn with_node_modules(mut self, dir: impl Into<PathBuf>) -> Self {
        self.node_modules = dir.into();
        self
    }
}

impl Task for ScriptTask {
    fn name(&self) -> TaskName {
        TaskName::Scripts
    }

    fn reload(&self) -> ReloadKind {
        ReloadKind::Full
    }

    fn run(&self) -> Result<TaskReport, TaskError> {
        let start = Instant::now();
        let mapping = self.paths.get(Category::Script);

        let entries: Vec<PathBuf> = fileset::collect(&mapping.source, Category::Script.input_glob())?
            .into_iter()
            .map(|f| f.path)
            .collect();

        let options = TransformOptions::from_target(&self.target).map_err(|e| TaskError::Compile {
            path: self.target.clone(),
            message: format!("invalid script target: {}", e),
        })?;

        let bundler = Bundler::new(&self.node_modules);
        let modules = bundler.collect(&entries, |path, source| compile_module(path, source, &options))?;

        let code = if modules.is_empty() {
            String::new()
        } else {
            minify(&bundle::render(&modules, entries.len()))?
        };

        let out = mapping.dest.join(OUTPUT_FILE);
        fileset::write_file(&out, &code)?;

        let mut report = TaskReport::new(TaskName::Scripts);
        report.outputs = vec![out];
        report.duration_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            task = "scripts",
            entries = entries.len(),
            modules = modules.len(),
            bytes = code.len(),
            "Bundled {} in {}ms",
            OUTPUT_FILE,
            report.duration_ms
        );

        Ok(report)
    }
}

fn parse<'a>(
    allocator: &'a Allocator,
    path: &Path,
    source: &'a str,
    source_type: SourceType,
) -> Result<ParserReturn<'a>, TaskError> {
    let ret = Parser::new(allocator, source, source_type).parse();

    if ret.panicked || !ret.errors.is_empty() {
        return Err(TaskError::Compile {
            path: path.display().to_string(),
            message: join_errors(&ret.errors),
        });
    }

    Ok(ret)
}

/// Compile one module for the bundle.
///
/// ES module syntax is rewritten to CommonJS first, then the module is
/// lowered to the configured target. The returned specifiers come from the
/// lowered program, so helper modules the transformer imports are included.
pub fn compile_module(
    path: &Path,
    source: &str,
    options: &TransformOptions,
) -> Result<ModuleSource, TaskError> {
    let converted = {
        let allocator = Allocator::default();
        let program = parse(&allocator, path, source, SourceType::unambiguous())?.program;
        esm::to_commonjs(&program, source)
    };
    let source = converted.as_deref().unwrap_or(source);

    let allocator = Allocator::default();
    let mut program = parse(&allocator, path, source, SourceType::cjs())?.program;

    let scoping = SemanticBuilder::new()
        .build(&program)
        .semantic
        .into_scoping();

    let ret = Transformer::new(&allocator, path, options).build_with_scoping(scoping, &mut program);
    if !ret.errors.is_empty() {
        return Err(TaskError::Compile {
            path: path.display().to_string(),
            message: join_errors(&ret.errors),
        });
    }

    let requires = collect_requires(&program);
    let code = Codegen::new().build(&program).code;

    Ok(ModuleSource { code, requires })
}

/// Specifiers of `require("...")` calls in `program`, without duplicates.
///
/// Calls with anything other than one string literal argument are ignored.
pub fn collect_requires(program: &Program<'_>) -> Vec<String> {
    let semantic = SemanticBuilder::new().build(program).semantic;

    let mut found: Vec<String> = Vec::new();
    for node in semantic.nodes().iter() {
        let AstKind::CallExpression(call) = node.kind() else {
            continue;
        };
        let Expression::Identifier(callee) = &call.callee else {
            continue;
        };
        if callee.name.as_str() != "require" || call.arguments.len() != 1 {
            continue;
        }
        if let Some(Argument::StringLiteral(specifier)) = call.arguments.first() {
            let specifier = specifier.value.to_string();
            if !found.contains(&specifier) {
                found.push(specifier);
            }
        }
    }
    found
}

/// Compress and print without renaming any identifier.
pub fn minify(source: &str) -> Result<String, TaskError> {
    let allocator = Allocator::default();
    let mut program = parse(&allocator, Path::new(OUTPUT_FILE), source, SourceType::cjs())?.program;

    let options = MinifierOptions {
        mangle: None,
        compress: Some(CompressOptions::default()),
    };
    Minifier::new(options).build(&allocator, &mut program);

    let code = Codegen::new()
        .with_options(CodegenOptions {
            minify: true,
            ..CodegenOptions::default()
        })
        .build(&program)
        .code;

    Ok(code)
}

fn join_errors<E: std::fmt::Display>(errors: &[E]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, Arc<PathTable>) {
        let temp = tempdir().unwrap();
        let paths = Arc::new(PathTable::new(
            temp.path().join("src"),
            temp.path().join("dist"),
        ));
        fs::create_dir_all(paths.source(Category::Script)).unwrap();
        (temp, paths)
    }

    fn write_js(paths: &PathTable, name: &str, source: &str) {
        let path = paths.source(Category::Script).join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, source).unwrap();
    }

    fn output(paths: &PathTable) -> String {
        fs::read_to_string(paths.dest(Category::Script).join(OUTPUT_FILE)).unwrap()
    }

    #[test]
    fn keeps_identifier_names() {
        let (_temp, paths) = setup();
        write_js(
            &paths,
            "app.js",
            r#"
            function greetVisitor(visitorName) {
                var greetingText = "hi " + visitorName;
                document.title = greetingText;
                return greetingText;
            }
            window.greetVisitor = greetVisitor;
            greetVisitor(location.hash);
            "#,
        );

        ScriptTask::new(paths.clone(), DEFAULT_TARGET).run().unwrap();

        let js = output(&paths);
        assert!(js.contains("greetVisitor"));
        assert!(js.contains("visitorName"));
        assert!(!js.contains("\n    "), "output should be minified");
    }

    #[test]
    fn bundles_nested_requires() {
        let (_temp, paths) = setup();
        write_js(
            &paths,
            "app.js",
            "var util = require('./lib/util');\nwindow.answer = util.double(21);\n",
        );
        write_js(
            &paths,
            "lib/util.js",
            "exports.double = function (value) { return value * 2; };\n",
        );

        ScriptTask::new(paths.clone(), DEFAULT_TARGET).run().unwrap();

        let js = output(&paths);
        assert!(js.contains("./lib/util"));
        assert!(js.contains("double"));
        assert!(js.contains("value"));
    }

    #[test]
    fn only_top_level_files_are_entries() {
        let (_temp, paths) = setup();
        write_js(&paths, "a.js", "window.entryMarker = 'from-a';\n");
        write_js(&paths, "nested/ignored.js", "window.skippedMarker = 'never';\n");

        ScriptTask::new(paths.clone(), DEFAULT_TARGET).run().unwrap();

        let js = output(&paths);
        assert!(js.contains("from-a"));
        assert!(!js.contains("never"));
    }

    #[test]
    fn syntax_error_reports_file() {
        let (_temp, paths) = setup();
        write_js(&paths, "broken.js", "function (\n");

        let err = ScriptTask::new(paths, DEFAULT_TARGET).run().unwrap_err();

        match err {
            TaskError::Compile { path, .. } => assert!(path.ends_with("broken.js")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_directory_writes_empty_bundle() {
        let (_temp, paths) = setup();

        ScriptTask::new(paths.clone(), DEFAULT_TARGET).run().unwrap();

        assert_eq!(output(&paths), "");
    }

    fn compile_source(source: &str) -> Result<ModuleSource, TaskError> {
        let options = TransformOptions::from_target(DEFAULT_TARGET).unwrap();
        compile_module(Path::new("app.js"), source, &options)
    }

    #[test]
    fn finds_literal_requires_only() {
        let compiled = compile_source(
            r#"
            // require('./commented')
            var a = require('./a');
            var b = require( "b-pkg" );
            var again = require("./a");
            var text = "require('./in-string')";
            var dynamic = require(name);
            "#,
        )
        .unwrap();

        assert_eq!(compiled.requires, vec!["./a", "b-pkg"]);
    }

    #[test]
    fn es_modules_are_bundled_as_commonjs() {
        let (_temp, paths) = setup();
        write_js(
            &paths,
            "app.js",
            "import { double } from './lib/util';\nwindow.answer = double(21);\n",
        );
        write_js(
            &paths,
            "lib/util.js",
            "export function double(value) { return value * 2; }\n",
        );

        ScriptTask::new(paths.clone(), DEFAULT_TARGET).run().unwrap();

        let js = output(&paths);
        assert!(js.contains("./lib/util"));
        assert!(js.contains("double"));
        assert!(!js.contains("import "));
        assert!(!js.contains("export "));
    }

    #[test]
    fn transform_helpers_are_module_dependencies() {
        let compiled = compile_source("var merged = { ...defaults, extra: true };\n").unwrap();

        assert!(!compiled.requires.is_empty());
        for specifier in &compiled.requires {
            assert!(compiled.code.contains(specifier.as_str()));
        }
    }

    #[test]
    fn transform_helpers_resolve_from_node_modules() {
        let (temp, paths) = setup();
        write_js(&paths, "app.js", "window.merged = { ...window.defaults, extra: true };\n");
        let node_modules = temp.path().join("node_modules");
        let task = ScriptTask::new(paths.clone(), DEFAULT_TARGET).with_node_modules(&node_modules);

        let helper = match task.run().unwrap_err() {
            TaskError::Resolve { specifier, .. } => specifier,
            other => panic!("unexpected error: {other}"),
        };
        let stub = node_modules.join(format!("{}.js", helper));
        fs::create_dir_all(stub.parent().unwrap()).unwrap();
        fs::write(
            &stub,
            "module.exports = function (target) { target.helperMarker = true; return target; };\n",
        )
        .unwrap();

        task.run().unwrap();

        let js = output(&paths);
        assert!(js.contains("helperMarker"));
        assert!(js.contains(helper.as_str()));
    }
}
