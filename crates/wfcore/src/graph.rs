//! Compiled task graph and the backward traversal that builds it.

use crate::{ArgBinding, NodeKey, ProcessNode, WorkflowError, WorkflowProcess};
use std::collections::HashMap;

/// Stringified insertion index of a node at compile time
pub type TaskId = String;

pub(crate) fn task_id(index: usize) -> TaskId {
    index.to_string()
}

/// One executable entry: the wrapped node plus the ids it depends on.
///
/// `dependencies[i]` produces the positional argument bound by
/// `process.named_args()[i]`, so the same id can appear more than once.
#[derive(Debug, Clone)]
pub struct Task {
    pub process: WorkflowProcess,
    pub dependencies: Vec<TaskId>,
}

impl Task {
    /// Dependencies with duplicates removed, first occurrence kept.
    pub fn unique_dependencies(&self) -> Vec<&TaskId> {
        let mut seen = Vec::with_capacity(self.dependencies.len());
        for dep in &self.dependencies {
            if !seen.contains(&dep) {
                seen.push(dep);
            }
        }
        seen
    }
}

/// Mapping from task id to task, in insertion order.
///
/// Every dependency id is inserted before the first task referencing it.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    tasks: Vec<(TaskId, Task)>,
    index: HashMap<TaskId, usize>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, id: TaskId, task: Task) {
        self.index.insert(id.clone(), self.tasks.len());
        self.tasks.push((id, task));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.index.get(id).map(|&i| &self.tasks[i].1)
    }

    pub fn dependencies(&self, id: &str) -> Option<&[TaskId]> {
        self.get(id).map(|t| t.dependencies.as_slice())
    }

    /// Task id of the task wrapping `node`
    pub fn id_of(&self, node: &str) -> Option<&TaskId> {
        self.tasks
            .iter()
            .find(|(_, task)| task.process.node() == node)
            .map(|(id, _)| id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TaskId, &Task)> {
        self.tasks.iter().map(|(id, task)| (id, task))
    }

    pub fn ids(&self) -> impl Iterator<Item = &TaskId> {
        self.tasks.iter().map(|(id, _)| id)
    }

    /// Dependency relation expressed with node keys, in task order.
    pub fn node_dependencies(&self) -> Vec<(NodeKey, Vec<NodeKey>)> {
        self.tasks
            .iter()
            .map(|(_, task)| {
                let deps = task
                    .dependencies
                    .iter()
                    .filter_map(|dep| self.get(dep))
                    .map(|dep| dep.process.node().to_string())
                    .collect();
                (task.process.node().to_string(), deps)
            })
            .collect()
    }

    pub fn into_tasks(self) -> Vec<(TaskId, Task)> {
        self.tasks
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Unvisited,
    InProgress,
    Done,
}

/// Memoised post-order traversal over `map_inputs` edges.
pub(crate) struct GraphCompiler<'a> {
    nodes: &'a [ProcessNode],
    positions: &'a HashMap<NodeKey, usize>,
    state: Vec<Visit>,
    stack: Vec<usize>,
    graph: TaskGraph,
    islocal: bool,
}

impl<'a> GraphCompiler<'a> {
    pub(crate) fn new(
        nodes: &'a [ProcessNode],
        positions: &'a HashMap<NodeKey, usize>,
        islocal: bool,
    ) -> Self {
        Self {
            nodes,
            positions,
            state: vec![Visit::Unvisited; nodes.len()],
            stack: Vec::new(),
            graph: TaskGraph::new(),
            islocal,
        }
    }

    pub(crate) fn visit(&mut self, index: usize) -> Result<(), WorkflowError> {
        match self.state[index] {
            Visit::Done => return Ok(()),
            Visit::InProgress => return Err(self.cycle_through(index)),
            Visit::Unvisited => {}
        }

        self.state[index] = Visit::InProgress;
        self.stack.push(index);

        let nodes = self.nodes;
        let node = &nodes[index];
        let mut dependencies = Vec::new();
        let mut named_args = Vec::new();

        for input in node.inputs() {
            for (input_name, source) in &input.map_inputs {
                let parent = *self
                    .positions
                    .get(&source.node)
                    .ok_or_else(|| WorkflowError::NodeNotFound(source.node.clone()))?;
                self.visit(parent)?;
                dependencies.push(task_id(parent));
                named_args.push(ArgBinding {
                    input: input_name.clone(),
                    source: source.clone(),
                });
            }
        }

        self.stack.pop();
        self.state[index] = Visit::Done;

        let process = WorkflowProcess::new(node, named_args, self.islocal);
        tracing::debug!(
            "Compiled task {} for {} with dependencies {:?}",
            index,
            node.key(),
            dependencies
        );
        self.graph.insert(
            task_id(index),
            Task {
                process,
                dependencies,
            },
        );
        Ok(())
    }

    fn cycle_through(&self, index: usize) -> WorkflowError {
        let start = self
            .stack
            .iter()
            .position(|&i| i == index)
            .unwrap_or_default();
        let mut path: Vec<String> = self.stack[start..]
            .iter()
            .map(|&i| self.nodes[i].key().to_string())
            .collect();
        path.push(self.nodes[index].key().to_string());
        WorkflowError::Cycle { path }
    }

    pub(crate) fn finish(self) -> TaskGraph {
        self.graph
    }
}
