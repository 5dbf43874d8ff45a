//! Build tasks for the plinth asset pipeline.
//!
//! Each task copies, compiles or renders one category of site sources into
//! the output directory. Tasks are assembled into a [`TaskGraph`] whose run
//! order is derived from explicit dependency edges.

pub mod builder;
pub mod bundle;
pub mod clean;
pub mod copy;
pub mod deploy;
pub mod esm;
pub mod fileset;
pub mod graph;
pub mod images;
pub mod paths;
pub mod scripts;
pub mod styles;
pub mod task;
pub mod templates;

pub use builder::{default_graph, run_task, BuildConfig, BuildError, BuildResult, Builder};
pub use deploy::{deploy, DeployConfig, DeployOutcome};
pub use graph::{GraphError, TaskGraph};
pub use paths::{Category, PathMapping, PathTable};
pub use task::{ReloadKind, Task, TaskError, TaskName, TaskReport};
