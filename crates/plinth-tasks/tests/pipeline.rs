use std::fs;
use std::path::Path;

use plinth_tasks::{default_graph, BuildConfig, BuildError, Builder, TaskError, TaskName};
use tempfile::tempdir;

fn scaffold(src: &Path) {
    for dir in [
        "assets/fonts",
        "assets/scss",
        "assets/images",
        "assets/js",
        "assets/lib",
        "assets/video",
        "assets/favicon",
        "templates",
    ] {
        fs::create_dir_all(src.join(dir)).unwrap();
    }

    fs::write(src.join("assets/fonts/inter.woff2"), [0u8, 1, 2, 3]).unwrap();
    fs::write(src.join("assets/scss/site.scss"), "body { margin: 0; }\n").unwrap();
    fs::write(src.join("assets/js/app.js"), "window.siteReady = true;\n").unwrap();
    fs::write(src.join("assets/lib/vendor.js"), "/* vendor */").unwrap();
    fs::write(src.join("assets/favicon/favicon.ico"), [9u8; 4]).unwrap();
    fs::write(
        src.join("templates/layout.html"),
        "<main>{% block body %}{% endblock %}</main>",
    )
    .unwrap();
    fs::write(
        src.join("index.html"),
        "{% extends \"layout.html\" %}{% block body %}{{ title }}{% endblock %}",
    )
    .unwrap();
}

fn config(root: &Path) -> BuildConfig {
    let mut config = BuildConfig {
        src_dir: root.join("src"),
        output_dir: root.join("dist"),
        ..Default::default()
    };
    config
        .template_data
        .insert("title".to_string(), serde_json::json!("Home"));
    config
}

#[tokio::test]
async fn full_build_regenerates_output_from_scratch() {
    let temp = tempdir().unwrap();
    scaffold(&temp.path().join("src"));
    let dist = temp.path().join("dist");
    fs::create_dir_all(dist.join("assets")).unwrap();
    fs::write(dist.join("assets/stale.css"), "old").unwrap();

    let config = config(temp.path());
    let builder = Builder::new(default_graph(&config).unwrap());
    let result = builder.build(config.output_dir.clone()).await.unwrap();

    assert!(!dist.join("assets/stale.css").exists());
    assert_eq!(result.reports[0].task, TaskName::Clean);
    assert_eq!(
        fs::read(dist.join("assets/fonts/inter.woff2")).unwrap(),
        vec![0u8, 1, 2, 3]
    );
    assert!(dist.join("assets/main.css").exists());
    assert!(dist.join("assets/main.css.map").exists());
    assert!(dist.join("assets/main.js").exists());
    assert!(dist.join("assets/lib/vendor.js").exists());
    assert!(dist.join("assets/favicon/favicon.ico").exists());
    assert!(dist.join("assets/images").is_dir());
    assert_eq!(
        fs::read_to_string(dist.join("index.html")).unwrap(),
        "<main>Home</main>"
    );
}

#[tokio::test]
async fn missing_source_directory_fails_the_build() {
    let temp = tempdir().unwrap();
    let src = temp.path().join("src");
    scaffold(&src);
    fs::remove_dir_all(src.join("assets/video")).unwrap();

    let config = config(temp.path());
    let builder = Builder::new(default_graph(&config).unwrap());
    let err = builder.build(config.output_dir.clone()).await.unwrap_err();

    match err {
        BuildError::Task { task, source } => {
            assert_eq!(task, TaskName::Video);
            assert!(matches!(source, TaskError::MissingSource(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    // Tasks ordered before video already produced their output.
    assert!(temp.path().join("dist/assets/favicon/favicon.ico").exists());
}

#[tokio::test]
async fn single_task_reruns_in_place() {
    let temp = tempdir().unwrap();
    scaffold(&temp.path().join("src"));
    let config = config(temp.path());
    let builder = Builder::new(default_graph(&config).unwrap());
    builder.build(config.output_dir.clone()).await.unwrap();

    fs::write(
        temp.path().join("src/assets/scss/site.scss"),
        "body { margin: 1px; }\n",
    )
    .unwrap();
    builder.run(TaskName::Styles).await.unwrap();

    let css = fs::read_to_string(temp.path().join("dist/assets/main.css")).unwrap();
    assert!(css.starts_with("body{margin:1px}"));
    assert!(temp.path().join("dist/index.html").exists());
}
