//! Template rendering of the site's HTML pages.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use minijinja::{context, path_loader, Environment, Value};
use rayon::prelude::*;

use crate::fileset::{self, SourceFile};
use crate::paths::{Category, PathTable};
use crate::task::{ReloadKind, Task, TaskError, TaskName, TaskReport};

/// Template engine using minijinja, loading layouts from a directory.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    /// Create an engine whose `extends`/`include`/`import` resolve in
    /// `templates_dir`.
    pub fn new(templates_dir: &Path) -> Self {
        let mut env = Environment::new();
        env.set_loader(path_loader(templates_dir.to_path_buf()));
        env.set_keep_trailing_newline(true);

        Self { env }
    }

    /// Render one page from its source text.
    pub fn render_page(
        &self,
        name: &str,
        source: &str,
        data: &Value,
    ) -> Result<String, minijinja::Error> {
        self.env.render_named_str(
            name,
            source,
            context! {
                page => name,
                ..data.clone()
            },
        )
    }
}

/// Renders every page under the site root into the destination root.
///
/// Layouts are loaded fresh on every run, so edits under the templates
/// directory show up in the next render.
pub struct HtmlTask {
    paths: Arc<PathTable>,
    data: Value,
}

impl HtmlTask {
    pub fn new(paths: Arc<PathTable>, data: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            paths,
            data: Value::from_serialize(&data),
        }
    }

    fn render_file(
        &self,
        engine: &TemplateEngine,
        file: &SourceFile,
    ) -> Result<std::path::PathBuf, String> {
        let name = fileset::slash_path(&file.relative);
        let source = std::fs::read_to_string(&file.path).map_err(|e| e.to_string())?;

        let html = engine
            .render_page(&name, &source, &self.data)
            .map_err(|e| format!("{:#}", e))?;

        let target = self.paths.dest(Category::Html).join(&file.relative);
        fileset::write_file(&target, html).map_err(|e| e.to_string())?;
        Ok(target)
    }
}

impl Task for HtmlTask {
    fn name(&self) -> TaskName {
        TaskName::Html
    }

    fn reload(&self) -> ReloadKind {
        ReloadKind::Full
    }

    fn run(&self) -> Result<TaskReport, TaskError> {
        let start = Instant::now();
        let mapping = self.paths.get(Category::Html);
        let templates = self.paths.source(Category::Templates);

        let files = fileset::collect_excluding(
            &mapping.source,
            Category::Html.input_glob(),
            Some(templates),
        )?;
        fileset::ensure_dir(&mapping.dest)?;

        let engine = TemplateEngine::new(templates);
        let results: Vec<(&SourceFile, Result<_, String>)> = files
            .par_iter()
            .map(|file| (file, self.render_file(&engine, file)))
            .collect();

        let mut report = TaskReport::new(TaskName::Html);
        for (file, result) in results {
            match result {
                Ok(path) => report.outputs.push(path),
                Err(message) => {
                    tracing::error!(path = %file.path.display(), "Failed to render page: {}", message);
                    report.failed += 1;
                }
            }
        }
        report.duration_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            task = "html",
            pages = report.outputs.len(),
            failed = report.failed,
            "Rendered pages in {}ms",
            report.duration_ms
        );

        if report.failed > 0 {
            return Err(TaskError::Render {
                count: report.failed,
            });
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, Arc<PathTable>) {
        let temp = tempdir().unwrap();
        let paths = Arc::new(PathTable::new(
            temp.path().join("src"),
            temp.path().join("dist"),
        ));
        fs::create_dir_all(paths.source(Category::Templates)).unwrap();
        fs::write(
            paths.source(Category::Templates).join("base.html"),
            "<html><title>{{ site_name }}</title><body>{% block content %}{% endblock %}</body></html>\n",
        )
        .unwrap();
        fs::write(
            paths.source(Category::Templates).join("footer.html"),
            "<footer>{{ page }}</footer>",
        )
        .unwrap();
        (temp, paths)
    }

    fn data() -> BTreeMap<String, serde_json::Value> {
        let mut data = BTreeMap::new();
        data.insert("site_name".to_string(), serde_json::json!("Plinth"));
        data
    }

    #[test]
    fn renders_inheritance_and_includes() {
        let (_temp, paths) = setup();
        let src = paths.source(Category::Html);
        fs::create_dir_all(src.join("blog")).unwrap();
        fs::write(
            src.join("blog/post.html"),
            "{% extends \"base.html\" %}{% block content %}<p>Hi</p>{% include \"footer.html\" %}{% endblock %}",
        )
        .unwrap();

        HtmlTask::new(paths.clone(), data()).run().unwrap();

        let html = fs::read_to_string(paths.dest(Category::Html).join("blog/post.html")).unwrap();
        assert_eq!(
            html,
            "<html><title>Plinth</title><body><p>Hi</p><footer>blog/post.html</footer></body></html>\n"
        );
    }

    #[test]
    fn skips_the_templates_directory() {
        let (_temp, paths) = setup();
        fs::write(paths.source(Category::Html).join("index.html"), "<p>home</p>").unwrap();

        let report = HtmlTask::new(paths.clone(), data()).run().unwrap();

        assert_eq!(report.outputs.len(), 1);
        assert!(!paths.dest(Category::Html).join("templates").exists());
    }

    #[test]
    fn broken_page_does_not_stop_others() {
        let (_temp, paths) = setup();
        let src = paths.source(Category::Html);
        fs::write(src.join("good.html"), "<p>{{ site_name }}</p>").unwrap();
        fs::write(src.join("bad.html"), "{% extends \"missing.html\" %}").unwrap();

        let err = HtmlTask::new(paths.clone(), data()).run().unwrap_err();

        assert!(matches!(err, TaskError::Render { count: 1 }));
        let good = fs::read_to_string(paths.dest(Category::Html).join("good.html")).unwrap();
        assert_eq!(good, "<p>Plinth</p>");
        assert!(!paths.dest(Category::Html).join("bad.html").exists());
    }

    #[test]
    fn layout_edits_apply_on_the_next_run() {
        let (_temp, paths) = setup();
        let src = paths.source(Category::Html);
        fs::write(
            src.join("index.html"),
            "{% extends \"base.html\" %}{% block content %}home{% endblock %}",
        )
        .unwrap();
        let task = HtmlTask::new(paths.clone(), data());
        let out = paths.dest(Category::Html).join("index.html");

        task.run().unwrap();
        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            "<html><title>Plinth</title><body>home</body></html>\n"
        );

        fs::write(
            paths.source(Category::Templates).join("base.html"),
            "<main>{% block content %}{% endblock %}</main>\n",
        )
        .unwrap();
        task.run().unwrap();

        assert_eq!(fs::read_to_string(&out).unwrap(), "<main>home</main>\n");
    }
}
