//! Task graph with explicit dependency edges.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::task::{Task, TaskName};

/// Errors found while assembling or ordering a graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Task {0} is registered twice")]
    Duplicate(TaskName),

    #[error("Task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: TaskName, dependency: TaskName },

    #[error("Dependency cycle through: {0}")]
    Cycle(String),

    #[error("Task {0} does not run after clean")]
    NotAfterClean(TaskName),

    #[error("Task {0} is not in the graph")]
    Missing(TaskName),
}

struct TaskNode {
    task: Arc<dyn Task>,
    deps: Vec<TaskName>,
}

/// Tasks and the edges between them.
///
/// Insertion order breaks ties, so two tasks with no edge between them run
/// in the order they were added.
#[derive(Default)]
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
}

impl fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.nodes.iter().map(|n| (n.task.name(), &n.deps)))
            .finish()
    }
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `task`, to run after every task in `after`.
    pub fn add(&mut self, task: Arc<dyn Task>, after: &[TaskName]) -> Result<&mut Self, GraphError> {
        let name = task.name();
        if self.contains(name) {
            return Err(GraphError::Duplicate(name));
        }

        self.nodes.push(TaskNode {
            task,
            deps: after.to_vec(),
        });
        Ok(self)
    }

    pub fn contains(&self, name: TaskName) -> bool {
        self.nodes.iter().any(|n| n.task.name() == name)
    }

    pub fn get(&self, name: TaskName) -> Option<Arc<dyn Task>> {
        self.nodes
            .iter()
            .find(|n| n.task.name() == name)
            .map(|n| Arc::clone(&n.task))
    }

    /// Task names in insertion order.
    pub fn names(&self) -> Vec<TaskName> {
        self.nodes.iter().map(|n| n.task.name()).collect()
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, name: TaskName) -> &[TaskName] {
        self.nodes
            .iter()
            .find(|n| n.task.name() == name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task.
    pub fn dependents_of(&self, name: TaskName) -> Vec<TaskName> {
        self.nodes
            .iter()
            .filter(|n| n.deps.contains(&name))
            .map(|n| n.task.name())
            .collect()
    }

    /// Derive the run order from the edges.
    pub fn execution_order(&self) -> Result<Vec<Arc<dyn Task>>, GraphError> {
        for node in &self.nodes {
            for dep in &node.deps {
                if !self.contains(*dep) {
                    return Err(GraphError::UnknownDependency {
                        task: node.task.name(),
                        dependency: *dep,
                    });
                }
            }
        }

        let mut done: HashSet<TaskName> = HashSet::new();
        let mut order = Vec::with_capacity(self.nodes.len());

        while order.len() < self.nodes.len() {
            let next = self.nodes.iter().find(|n| {
                !done.contains(&n.task.name()) && n.deps.iter().all(|d| done.contains(d))
            });

            match next {
                Some(node) => {
                    done.insert(node.task.name());
                    order.push(Arc::clone(&node.task));
                }
                None => {
                    let stuck: Vec<String> = self
                        .nodes
                        .iter()
                        .filter(|n| !done.contains(&n.task.name()))
                        .map(|n| n.task.name().to_string())
                        .collect();
                    return Err(GraphError::Cycle(stuck.join(", ")));
                }
            }
        }

        Ok(order)
    }

    /// Check that the graph orders and that every task runs after `clean`.
    pub fn validate(&self) -> Result<(), GraphError> {
        self.execution_order()?;

        if !self.contains(TaskName::Clean) {
            return Ok(());
        }

        for name in self.names() {
            if name != TaskName::Clean && !self.depends_on(name, TaskName::Clean) {
                return Err(GraphError::NotAfterClean(name));
            }
        }
        Ok(())
    }

    /// Whether `name` transitively depends on `target`.
    pub fn depends_on(&self, name: TaskName, target: TaskName) -> bool {
        let mut stack: Vec<TaskName> = self.dependencies_of(name).to_vec();
        let mut seen: HashSet<TaskName> = HashSet::new();

        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if seen.insert(current) {
                stack.extend_from_slice(self.dependencies_of(current));
            }
        }
        false
    }
}
