//! Source and destination layout of a site.

use std::fmt;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::task::TaskName;

/// Logical asset categories known to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Html,
    Fonts,
    Style,
    Images,
    Script,
    Lib,
    Video,
    Favicon,
    Templates,
}

impl Category {
    /// Every category, in path table order.
    pub const ALL: [Category; 9] = [
        Category::Html,
        Category::Fonts,
        Category::Style,
        Category::Images,
        Category::Script,
        Category::Lib,
        Category::Video,
        Category::Favicon,
        Category::Templates,
    ];

    /// Categories in the order a changed path is matched against them.
    ///
    /// Asset trees come first so `**/*.html` only catches what is left.
    const WATCH_PRIORITY: [Category; 9] = [
        Category::Style,
        Category::Script,
        Category::Images,
        Category::Video,
        Category::Fonts,
        Category::Lib,
        Category::Favicon,
        Category::Templates,
        Category::Html,
    ];

    /// Glob selecting task inputs, relative to the category source dir.
    pub fn input_glob(self) -> &'static str {
        match self {
            Category::Html => "**/*.html",
            Category::Fonts => "*.*",
            Category::Style => "**/*.*",
            Category::Images => "**/*.*",
            Category::Script => "*.js",
            Category::Lib => "*.js",
            Category::Video => "**/*.*",
            Category::Favicon => "**/*.*",
            Category::Templates => "**/*.html",
        }
    }

    /// Glob matched by the watcher, relative to the source root.
    pub fn watch_glob(self) -> &'static str {
        match self {
            Category::Html => "**/*.html",
            Category::Fonts => "assets/fonts/*",
            Category::Style => "assets/scss/**/*.scss",
            Category::Images => "assets/images/**/*",
            Category::Script => "assets/js/**/*.js",
            Category::Lib => "assets/lib/*.js",
            Category::Video => "assets/video/**/*",
            Category::Favicon => "assets/favicon/**/*",
            Category::Templates => "templates/**/*.html",
        }
    }

    /// The task that rebuilds this category.
    pub fn task(self) -> TaskName {
        match self {
            Category::Html | Category::Templates => TaskName::Html,
            Category::Fonts => TaskName::Fonts,
            Category::Style => TaskName::Styles,
            Category::Images => TaskName::Images,
            Category::Script => TaskName::Scripts,
            Category::Lib => TaskName::Library,
            Category::Video => TaskName::Video,
            Category::Favicon => TaskName::Favicon,
        }
    }

    fn source_suffix(self) -> &'static str {
        match self {
            Category::Html => "",
            Category::Fonts => "assets/fonts",
            Category::Style => "assets/scss",
            Category::Images => "assets/images",
            Category::Script => "assets/js",
            Category::Lib => "assets/lib",
            Category::Video => "assets/video",
            Category::Favicon => "assets/favicon",
            Category::Templates => "templates",
        }
    }

    fn dest_suffix(self) -> &'static str {
        match self {
            Category::Html | Category::Templates => "",
            Category::Fonts => "assets/fonts",
            Category::Style | Category::Script => "assets",
            Category::Images => "assets/images",
            Category::Lib => "assets/lib",
            Category::Video => "assets/video",
            Category::Favicon => "assets/favicon",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Html => "html",
            Category::Fonts => "fonts",
            Category::Style => "style",
            Category::Images => "images",
            Category::Script => "script",
            Category::Lib => "lib",
            Category::Video => "video",
            Category::Favicon => "favicon",
            Category::Templates => "templates",
        };
        f.write_str(name)
    }
}

/// Source and destination directory of one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapping {
    pub source: PathBuf,
    pub dest: PathBuf,
}

/// Static mapping of every [`Category`] to its directories.
#[derive(Debug, Clone)]
pub struct PathTable {
    src_root: PathBuf,
    dest_root: PathBuf,
    mappings: Vec<PathMapping>,
    watch_set: GlobSet,
    watch_order: Vec<Category>,
}

impl PathTable {
    /// Lay out every category under the given roots.
    pub fn new(src_root: impl Into<PathBuf>, dest_root: impl Into<PathBuf>) -> Self {
        let src_root = src_root.into();
        let dest_root = dest_root.into();

        let mappings = Category::ALL
            .iter()
            .map(|c| PathMapping {
                source: join_suffix(&src_root, c.source_suffix()),
                dest: join_suffix(&dest_root, c.dest_suffix()),
            })
            .collect();

        let (watch_set, watch_order) = watch_matcher();

        Self {
            src_root,
            dest_root,
            mappings,
            watch_set,
            watch_order,
        }
    }

    pub fn get(&self, category: Category) -> &PathMapping {
        &self.mappings[category as usize]
    }

    pub fn source(&self, category: Category) -> &Path {
        &self.get(category).source
    }

    pub fn dest(&self, category: Category) -> &Path {
        &self.get(category).dest
    }

    pub fn src_root(&self) -> &Path {
        &self.src_root
    }

    pub fn dest_root(&self) -> &Path {
        &self.dest_root
    }

    /// Find the category a changed file belongs to.
    ///
    /// `relative` is the path relative to the source root, with `/`
    /// separators.
    pub fn categorize(&self, relative: &str) -> Option<Category> {
        self.watch_set
            .matches(relative)
            .into_iter()
            .min()
            .map(|index| self.watch_order[index])
    }
}

/// One matcher over every watch glob; match indices follow `watch_order`.
fn watch_matcher() -> (GlobSet, Vec<Category>) {
    let mut builder = GlobSetBuilder::new();
    let mut order = Vec::with_capacity(Category::WATCH_PRIORITY.len());

    for category in Category::WATCH_PRIORITY {
        match GlobBuilder::new(category.watch_glob())
            .literal_separator(true)
            .build()
        {
            Ok(glob) => {
                builder.add(glob);
                order.push(category);
            }
            Err(e) => tracing::warn!(%category, "Invalid watch glob: {}", e),
        }
    }

    match builder.build() {
        Ok(set) => (set, order),
        Err(e) => {
            tracing::warn!("Failed to build watch matcher: {}", e);
            (GlobSet::empty(), Vec::new())
        }
    }
}

impl Default for PathTable {
    fn default() -> Self {
        Self::new("src", "dist")
    }
}

fn join_suffix(root: &Path, suffix: &str) -> PathBuf {
    if suffix.is_empty() {
        root.to_path_buf()
    } else {
        root.join(suffix)
    }
}
