//! Task DAG (Directed Acyclic Graph) for dependency management.
//!
//! The TaskDag represents planner-declared dependencies as a directed
//! acyclic graph so independent tasks can run in parallel. It is validated
//! once at plan load: duplicate ids, references to unknown tasks, and
//! cycles are all rejected before any workspace is created.

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::core::task::{Task, TaskId};
use crate::error::{Error, Result};

/// The task dependency graph.
///
/// Nodes are tasks; an edge `A -> B` means B depends on A. Immutable after
/// construction; all execution state lives in the scheduler.
#[derive(Debug)]
pub struct TaskDag {
    graph: DiGraph<Task, ()>,
    index: HashMap<TaskId, NodeIndex>,
}

impl TaskDag {
    /// Build and validate the graph from planner tasks.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error when two tasks normalize to the same id,
    /// when a `depends_on` entry names a task that does not exist (a dangling
    /// reference would otherwise stall its dependent forever), or when the
    /// dependencies form a cycle.
    pub fn from_tasks(tasks: Vec<Task>) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for task in tasks {
            let id = task.id.clone();
            if index.contains_key(&id) {
                return Err(Error::Validation(format!(
                    "duplicate task id after normalization: {}",
                    id
                )));
            }
            let node = graph.add_node(task);
            index.insert(id, node);
        }

        let nodes: Vec<NodeIndex> = graph.node_indices().collect();
        for node in nodes {
            let (task_id, deps) = {
                let task = &graph[node];
                (task.id.clone(), task.depends_on.clone())
            };
            let mut seen = HashSet::new();
            for dep in deps {
                if !seen.insert(dep.clone()) {
                    continue;
                }
                let dep_node = index.get(&dep).ok_or_else(|| {
                    Error::Validation(format!(
                        "task {} depends on unknown task {}",
                        task_id, dep
                    ))
                })?;
                graph.add_edge(*dep_node, node, ());
            }
        }

        if let Err(cycle) = toposort(&graph, None) {
            let culprit = &graph[cycle.node_id()].id;
            return Err(Error::Validation(format!(
                "dependency cycle involving task {}",
                culprit
            )));
        }

        Ok(Self { graph, index })
    }

    /// Get a task by its id.
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.index.get(id).map(|&node| &self.graph[node])
    }

    /// All tasks in plan order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.graph.node_weights()
    }

    /// All task ids in plan order.
    pub fn ids(&self) -> Vec<TaskId> {
        self.graph.node_weights().map(|t| t.id.clone()).collect()
    }

    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.index.contains_key(id)
    }

    /// Ids of tasks whose every dependency is in `done`, excluding tasks
    /// already in `done`.
    ///
    /// Recomputed from scratch on every call; readiness is never memoized,
    /// so each integration event is fully reflected.
    pub fn ready_ids(&self, done: &HashSet<TaskId>) -> Vec<TaskId> {
        self.graph
            .node_indices()
            .filter_map(|node| {
                let task = &self.graph[node];
                if done.contains(&task.id) {
                    return None;
                }
                let deps_satisfied = self
                    .graph
                    .neighbors_directed(node, petgraph::Direction::Incoming)
                    .all(|dep| done.contains(&self.graph[dep].id));
                deps_satisfied.then(|| task.id.clone())
            })
            .collect()
    }
}
