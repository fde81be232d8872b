//! petgraph view of a compiled task graph, for validation and DOT export.

use petgraph::algo::toposort;
use petgraph::dot::Dot;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use wfcore::{FlowError, TaskGraph, TaskId};

/// Task graph mirrored into a `DiGraph`; edges point from producer to
/// consumer and carry the consuming input name.
pub struct TaskDiGraph {
    graph: DiGraph<String, String>,
    ids: Vec<TaskId>,
}

impl TaskDiGraph {
    pub fn build(tasks: &TaskGraph) -> Result<Self, FlowError> {
        let mut graph = DiGraph::new();
        let mut ids = Vec::with_capacity(tasks.len());
        let mut index: HashMap<&TaskId, NodeIndex> = HashMap::new();

        for (id, task) in tasks.iter() {
            let idx = graph.add_node(format!("{} [{}]", task.process.node(), id));
            ids.push(id.clone());
            index.insert(id, idx);
        }

        for (id, task) in tasks.iter() {
            let to = index[id];
            for (dep, arg) in task.dependencies.iter().zip(task.process.named_args()) {
                let from = index.get(dep).ok_or_else(|| {
                    FlowError::Translation(format!("task {} depends on unknown task {}", id, dep))
                })?;
                graph.add_edge(*from, to, arg.input.clone());
            }
        }

        Ok(Self { graph, ids })
    }

    /// Task ids in a dependency-respecting order.
    pub fn topological_order(&self) -> Result<Vec<TaskId>, FlowError> {
        let sorted = toposort(&self.graph, None).map_err(|cycle| {
            FlowError::Translation(format!(
                "task graph contains a cycle through task {}",
                self.ids[cycle.node_id().index()]
            ))
        })?;
        Ok(sorted
            .into_iter()
            .map(|idx| self.ids[idx.index()].clone())
            .collect())
    }

    pub fn to_dot(&self) -> String {
        format!("{}", Dot::new(&self.graph))
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}
