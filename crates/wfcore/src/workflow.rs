use crate::graph::{task_id, GraphCompiler};
use crate::{
    BindingError, NodeKey, Output, PortRef, ProcessNode, ProcessingPlugin, TaskGraph, Value,
    WorkflowError,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Named dataflow graph of processing nodes
pub struct Workflow {
    name: String,
    nodes: Vec<ProcessNode>,
    positions: HashMap<NodeKey, usize>,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a node keyed by its plugin type name.
    pub fn add_process(
        &mut self,
        plugin: Arc<dyn ProcessingPlugin>,
    ) -> Result<NodeKey, WorkflowError> {
        let key = plugin.node_type().to_string();
        self.add_process_as(key, plugin)
    }

    /// Adds a node under an explicit key, allowing several instances of
    /// one plugin type in the same workflow.
    pub fn add_process_as(
        &mut self,
        key: impl Into<NodeKey>,
        plugin: Arc<dyn ProcessingPlugin>,
    ) -> Result<NodeKey, WorkflowError> {
        let key = key.into();
        if self.positions.contains_key(&key) {
            return Err(WorkflowError::DuplicateNode(key));
        }
        tracing::debug!("Adding node {} ({}) to {}", key, plugin.node_type(), self.name);
        self.positions.insert(key.clone(), self.nodes.len());
        self.nodes.push(ProcessNode::new(key.clone(), plugin));
        Ok(key)
    }

    pub fn node(&self, key: &str) -> Option<&ProcessNode> {
        self.positions.get(key).map(|&i| &self.nodes[i])
    }

    pub fn node_mut(&mut self, key: &str) -> Option<&mut ProcessNode> {
        let index = *self.positions.get(key)?;
        self.nodes.get_mut(index)
    }

    pub fn nodes(&self) -> &[ProcessNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Binds `from_node.output` to `to_node.input`.
    ///
    /// A declared kind mismatch is only logged. Binding the same pair
    /// twice is rejected; binding a second source to an input is allowed
    /// and the most recently bound source wins at evaluation.
    pub fn connect(
        &mut self,
        from_node: &str,
        output: &str,
        to_node: &str,
        input: &str,
    ) -> Result<(), BindingError> {
        let from = *self
            .positions
            .get(from_node)
            .ok_or_else(|| BindingError::UnknownNode(from_node.to_string()))?;
        let to = *self
            .positions
            .get(to_node)
            .ok_or_else(|| BindingError::UnknownNode(to_node.to_string()))?;

        let output_kind = self.nodes[from]
            .params
            .output(output)
            .ok_or_else(|| BindingError::UnknownOutput {
                node: from_node.to_string(),
                output: output.to_string(),
            })?
            .kind;

        let source = PortRef::new(from_node, output);
        let target = PortRef::new(to_node, input);

        {
            let consumer = self.nodes[to].params.input_mut(input).ok_or_else(|| {
                BindingError::UnknownInput {
                    node: to_node.to_string(),
                    input: input.to_string(),
                }
            })?;

            if consumer.sources().any(|s| *s == source) {
                return Err(BindingError::AlreadyBound {
                    node: to_node.to_string(),
                    input: input.to_string(),
                    bound_to: source.to_string(),
                });
            }
            if let (Some(produced), Some(expected)) = (output_kind, consumer.kind) {
                if produced != expected {
                    tracing::warn!(
                        "Binding {} ({}) to {} ({}): kind mismatch",
                        source,
                        produced,
                        target,
                        expected
                    );
                }
            }
            if consumer.is_bound() {
                tracing::debug!("{} already has a source; {} will take precedence", target, source);
            }
            consumer.map_inputs.push((input.to_string(), source.clone()));
        }

        if let Some(producer) = self.nodes[from].params.output_mut(output) {
            producer.subscriptions.push(target);
        }
        tracing::debug!("Connected {} -> {}.{}", source, to_node, input);
        Ok(())
    }

    /// Overrides the current value of an unbound or bound input.
    pub fn set_input(
        &mut self,
        node: &str,
        input: &str,
        value: impl Into<Value>,
    ) -> Result<(), WorkflowError> {
        let index = *self
            .positions
            .get(node)
            .ok_or_else(|| WorkflowError::NodeNotFound(node.to_string()))?;
        let slot = self.nodes[index]
            .params
            .input_mut(input)
            .ok_or_else(|| BindingError::UnknownInput {
                node: node.to_string(),
                input: input.to_string(),
            })?;
        slot.value = value.into();
        Ok(())
    }

    pub fn output_value(&self, node: &str, output: &str) -> Option<&Value> {
        self.node(node)
            .and_then(|n| n.output(output))
            .map(|o| &o.value)
    }

    /// Copies evaluated output values onto the node; bindings are untouched.
    pub fn apply_outputs(&mut self, node: &str, outputs: &[Output]) -> Result<(), WorkflowError> {
        let index = *self
            .positions
            .get(node)
            .ok_or_else(|| WorkflowError::NodeNotFound(node.to_string()))?;
        let params = &mut self.nodes[index].params;
        for produced in outputs {
            if let Some(slot) = params.output_mut(&produced.name) {
                slot.value = produced.value.clone();
            }
        }
        Ok(())
    }

    /// Nodes whose outputs feed no other node, in insertion order.
    pub fn find_end_tasks(&self) -> Vec<NodeKey> {
        let dependency_nodes: HashSet<&str> = self
            .nodes
            .iter()
            .flat_map(|node| {
                node.inputs()
                    .iter()
                    .flat_map(|i| i.sources())
                    .filter(move |source| source.node != node.key())
                    .map(|source| source.node.as_str())
            })
            .collect();

        self.nodes
            .iter()
            .filter(|n| !dependency_nodes.contains(n.key()))
            .map(|n| n.key().to_string())
            .collect()
    }

    /// Compiles the workflow into a task graph plus its end tasks.
    pub fn convert_graph(&mut self) -> Result<(TaskGraph, Vec<NodeKey>), WorkflowError> {
        self.convert_graph_with(false)
    }

    /// Like [`convert_graph`](Self::convert_graph), marking every process
    /// as local or remote.
    pub fn convert_graph_with(
        &mut self,
        islocal: bool,
    ) -> Result<(TaskGraph, Vec<NodeKey>), WorkflowError> {
        for (index, node) in self.nodes.iter_mut().enumerate() {
            node.id = Some(task_id(index));
        }

        let end_tasks = self.find_end_tasks();
        let mut compiler = GraphCompiler::new(&self.nodes, &self.positions, islocal);

        for key in &end_tasks {
            let index = *self
                .positions
                .get(key)
                .ok_or_else(|| WorkflowError::NodeNotFound(key.clone()))?;
            compiler.visit(index)?;
        }
        // Nodes not reachable from a sink can only sit on a cycle.
        for index in 0..self.nodes.len() {
            compiler.visit(index)?;
        }

        let graph = compiler.finish();
        tracing::info!(
            "Compiled workflow {}: {} tasks, end tasks {:?}",
            self.name,
            graph.len(),
            end_tasks
        );
        Ok((graph, end_tasks))
    }

    /// Checks that every subscription has a matching `map_inputs` entry and
    /// every `map_inputs` entry a matching subscription.
    pub fn check_consistency(&self) -> Result<(), WorkflowError> {
        for node in &self.nodes {
            for output in node.outputs() {
                let source = PortRef::new(node.key(), output.name.as_str());
                for target in &output.subscriptions {
                    let bound = self
                        .node(&target.node)
                        .and_then(|n| n.input(&target.port))
                        .map_or(false, |i| i.sources().any(|s| *s == source));
                    if !bound {
                        return Err(WorkflowError::Invalid(format!(
                            "{} subscribes {} without a matching binding",
                            source, target
                        )));
                    }
                }
            }
            for input in node.inputs() {
                let target = PortRef::new(node.key(), input.name.as_str());
                for source in input.sources() {
                    let subscribed = self
                        .node(&source.node)
                        .and_then(|n| n.output(&source.port))
                        .map_or(false, |o| o.subscriptions.contains(&target));
                    if !subscribed {
                        return Err(WorkflowError::Invalid(format!(
                            "{} reads {} without a matching subscription",
                            target, source
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Serializable description of nodes, input values and bindings.
    pub fn to_definition(&self) -> WorkflowDefinition {
        let nodes = self
            .nodes
            .iter()
            .map(|node| NodeDefinition {
                key: node.key().to_string(),
                node_type: node.node_type().to_string(),
                inputs: node
                    .inputs()
                    .iter()
                    .filter(|i| i.value != i.default)
                    .map(|i| (i.name.clone(), i.value.clone()))
                    .collect(),
            })
            .collect();

        let bindings = self
            .nodes
            .iter()
            .flat_map(|node| {
                node.inputs().iter().flat_map(move |input| {
                    input.sources().map(move |source| BindingDefinition {
                        from_node: source.node.clone(),
                        output: source.port.clone(),
                        to_node: node.key().to_string(),
                        input: input.name.clone(),
                    })
                })
            })
            .collect();

        WorkflowDefinition {
            name: self.name.clone(),
            nodes,
            bindings,
        }
    }

    /// Builds a workflow from a definition, resolving plugin types with
    /// `resolve`.
    pub fn from_definition<F>(
        definition: &WorkflowDefinition,
        mut resolve: F,
    ) -> Result<Self, WorkflowError>
    where
        F: FnMut(&str) -> Result<Arc<dyn ProcessingPlugin>, WorkflowError>,
    {
        let mut workflow = Workflow::new(definition.name.clone());
        for node in &definition.nodes {
            let plugin = resolve(&node.node_type)?;
            let key = workflow.add_process_as(node.key.clone(), plugin)?;
            for (input, value) in &node.inputs {
                workflow.set_input(&key, input, value.clone())?;
            }
        }
        for binding in &definition.bindings {
            workflow.connect(
                &binding.from_node,
                &binding.output,
                &binding.to_node,
                &binding.input,
            )?;
        }
        Ok(workflow)
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("nodes", &self.nodes)
            .finish()
    }
}

/// Complete workflow definition as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowDefinition {
    pub name: String,
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub bindings: Vec<BindingDefinition>,
}

/// One node entry in a workflow definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeDefinition {
    pub key: NodeKey,
    pub node_type: String,
    /// Input values overriding the declared defaults
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BindingDefinition {
    pub from_node: NodeKey,
    pub output: String,
    pub to_node: NodeKey,
    pub input: String,
}
