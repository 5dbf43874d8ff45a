//! SCSS compilation into a single prefixed, minified `main.css`.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use lightningcss::rules::CssRuleList;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use parcel_sourcemap::SourceMap;

use crate::fileset::{self, SourceFile};
use crate::paths::{Category, PathTable};
use crate::task::{ReloadKind, Task, TaskError, TaskName, TaskReport};

/// Name of the concatenated stylesheet.
pub const OUTPUT_FILE: &str = "main.css";

/// Name of the emitted source map.
pub const MAP_FILE: &str = "main.css.map";

/// Compiled output of the style pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCss {
    /// Minified CSS, ending with the source map reference
    pub css: String,

    /// Source map JSON
    pub map: String,
}

/// Compiles the SCSS tree into `main.css` and `main.css.map`.
#[derive(Debug, Clone)]
pub struct StyleTask {
    paths: Arc<PathTable>,
}

impl StyleTask {
    pub fn new(paths: Arc<PathTable>) -> Self {
        Self { paths }
    }
}

impl Task for StyleTask {
    fn name(&self) -> TaskName {
        TaskName::Styles
    }

    fn reload(&self) -> ReloadKind {
        ReloadKind::Css
    }

    fn run(&self) -> Result<TaskReport, TaskError> {
        let start = Instant::now();
        let mapping = self.paths.get(Category::Style);

        let files: Vec<SourceFile> =
            fileset::collect(&mapping.source, Category::Style.input_glob())?
                .into_iter()
                .filter(is_stylesheet_entry)
                .collect();

        let compiled = compile(&mapping.source, &files)?;

        let css_path = mapping.dest.join(OUTPUT_FILE);
        let map_path = mapping.dest.join(MAP_FILE);
        fileset::write_file(&css_path, &compiled.css)?;
        fileset::write_file(&map_path, &compiled.map)?;

        let mut report = TaskReport::new(TaskName::Styles);
        report.outputs = vec![css_path, map_path];
        report.duration_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            task = "styles",
            sources = files.len(),
            bytes = compiled.css.len(),
            "Compiled {} in {}ms",
            OUTPUT_FILE,
            report.duration_ms
        );

        Ok(report)
    }
}

/// Entry stylesheets: `.scss`/`.css` files that are not partials.
fn is_stylesheet_entry(file: &SourceFile) -> bool {
    let name = file
        .path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    let ext = file.path.extension().and_then(|e| e.to_str()).unwrap_or("");

    !name.starts_with('_') && matches!(ext, "scss" | "css")
}

/// Browsers the vendor prefixer targets.
fn browser_targets() -> Targets {
    const fn version(major: u32) -> Option<u32> {
        Some(major << 16)
    }

    Targets::from(Browsers {
        chrome: version(80),
        edge: version(88),
        firefox: version(78),
        safari: version(13),
        ios_saf: version(13),
        samsung: version(12),
        ..Browsers::default()
    })
}

/// Run the whole style pipeline over `files`, in order.
///
/// Every file is compiled on its own, so a broken file aborts the run before
/// anything is written. The source map points into the CSS grass produced for
/// each entry, and that CSS is embedded as the source content.
pub fn compile(scss_dir: &Path, files: &[SourceFile]) -> Result<CompiledCss, TaskError> {
    let options = grass::Options::default()
        .style(grass::OutputStyle::Expanded)
        .load_path(scss_dir);

    let mut sources = Vec::with_capacity(files.len());
    let mut chunks = Vec::with_capacity(files.len());

    for file in files {
        let css = grass::from_path(&file.path, &options).map_err(|e| {
            let err = TaskError::Compile {
                path: file.path.display().to_string(),
                message: e.to_string(),
            };
            tracing::error!("{}", err);
            err
        })?;

        sources.push(fileset::slash_path(&file.relative));
        chunks.push(css);
    }

    let mut source_map = SourceMap::new("/");
    for (index, (name, chunk)) in sources.iter().zip(&chunks).enumerate() {
        source_map.add_source(name);
        source_map
            .set_source_content(index, chunk)
            .map_err(|e| map_error(name, e))?;
    }

    let mut rules = CssRuleList(Vec::new());
    for (index, (name, chunk)) in sources.iter().zip(&chunks).enumerate() {
        let mut sheet = StyleSheet::parse(
            chunk,
            ParserOptions {
                filename: name.clone(),
                source_index: index as u32,
                ..ParserOptions::default()
            },
        )
        .map_err(|e| TaskError::Compile {
            path: name.clone(),
            message: e.to_string(),
        })?;

        rules.0.append(&mut sheet.rules.0);
    }

    let targets = browser_targets();
    let mut merged = StyleSheet::new(sources.clone(), rules, ParserOptions::default());

    merged
        .minify(MinifyOptions {
            targets,
            ..MinifyOptions::default()
        })
        .map_err(|e| TaskError::Compile {
            path: OUTPUT_FILE.to_string(),
            message: e.to_string(),
        })?;

    let printed = merged
        .to_css(PrinterOptions {
            minify: true,
            source_map: Some(&mut source_map),
            targets,
            ..PrinterOptions::default()
        })
        .map_err(|e| TaskError::Compile {
            path: OUTPUT_FILE.to_string(),
            message: e.to_string(),
        })?;

    let map = source_map
        .to_json(None)
        .map_err(|e| map_error(MAP_FILE, e))?;

    let css = format!("{}\n/*# sourceMappingURL={} */\n", printed.code, MAP_FILE);

    Ok(CompiledCss { css, map })
}

fn map_error(path: &str, err: parcel_sourcemap::SourceMapError) -> TaskError {
    TaskError::Compile {
        path: path.to_string(),
        message: format!("source map error: {:?}", err),
    }
}
