//! Input/output parameter descriptors and the binding bookkeeping they carry.

use crate::{NodeError, Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key of a node inside a workflow
pub type NodeKey = String;

/// Address of one parameter: `node.port`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub node: NodeKey,
    pub port: String,
}

impl PortRef {
    pub fn new(node: impl Into<NodeKey>, port: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            port: port.into(),
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.port)
    }
}

/// Named input slot of a processing node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Input {
    pub name: String,
    pub description: String,
    pub unit: Option<String>,
    pub default: Value,
    pub value: Value,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub kind: Option<ValueKind>,
    /// Upstream sources in the order they were bound
    pub map_inputs: Vec<(String, PortRef)>,
}

impl Input {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Sets the default; the current value starts out equal to it.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self.value = self.default.clone();
        self
    }

    pub fn with_min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn with_max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// Overrides both `min` and `max`.
    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn with_kind(mut self, kind: ValueKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn is_bound(&self) -> bool {
        !self.map_inputs.is_empty()
    }

    pub fn sources(&self) -> impl Iterator<Item = &PortRef> {
        self.map_inputs.iter().map(|(_, source)| source)
    }

    /// Non-numeric values are always considered in bounds.
    pub fn in_bounds(&self, value: &Value) -> bool {
        match value.as_f64() {
            Some(n) => {
                self.min.map_or(true, |min| n >= min) && self.max.map_or(true, |max| n <= max)
            }
            None => true,
        }
    }

    pub fn reset(&mut self) {
        self.value = self.default.clone();
    }
}

/// Named output slot of a processing node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Output {
    pub name: String,
    pub description: String,
    pub unit: Option<String>,
    pub kind: Option<ValueKind>,
    /// `Null` until the owning node has been evaluated
    pub value: Value,
    /// Inputs fed by this output
    pub subscriptions: Vec<PortRef>,
}

impl Output {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_kind(mut self, kind: ValueKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// Parameters declared by a plugin type.
///
/// Each declaration is stored under the key it was declared with. A
/// parameter left without a name takes its key when a node is created
/// from the signature.
#[derive(Debug, Clone, Default)]
pub struct Signature {
    inputs: Vec<(String, Input)>,
    outputs: Vec<(String, Output)>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    /// Redeclaring a key replaces the earlier declaration in place.
    pub fn input(mut self, key: impl Into<String>, input: Input) -> Self {
        let key = key.into();
        match self.inputs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = input,
            None => self.inputs.push((key, input)),
        }
        self
    }

    pub fn output(mut self, key: impl Into<String>, output: Output) -> Self {
        let key = key.into();
        match self.outputs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = output,
            None => self.outputs.push((key, output)),
        }
        self
    }

    pub fn declared_inputs(&self) -> impl Iterator<Item = &(String, Input)> {
        self.inputs.iter()
    }

    pub fn declared_outputs(&self) -> impl Iterator<Item = &(String, Output)> {
        self.outputs.iter()
    }

    /// Fresh per-node copy of every declared parameter, names resolved.
    pub fn instantiate(&self) -> Parameters {
        let mut params = Parameters::default();
        for (key, input) in &self.inputs {
            let mut input = input.clone();
            if input.name.is_empty() {
                input.name = key.clone();
            }
            params.insert_input(input);
        }
        for (key, output) in &self.outputs {
            let mut output = output.clone();
            if output.name.is_empty() {
                output.name = key.clone();
            }
            params.insert_output(output);
        }
        params
    }
}

/// Parameter storage owned by a single node instance, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    inputs: Vec<Input>,
    outputs: Vec<Output>,
}

impl Parameters {
    fn insert_input(&mut self, input: Input) {
        match self.inputs.iter_mut().find(|i| i.name == input.name) {
            Some(slot) => *slot = input,
            None => self.inputs.push(input),
        }
    }

    fn insert_output(&mut self, output: Output) {
        match self.outputs.iter_mut().find(|o| o.name == output.name) {
            Some(slot) => *slot = output,
            None => self.outputs.push(output),
        }
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn input(&self, name: &str) -> Option<&Input> {
        self.inputs.iter().find(|i| i.name == name)
    }

    pub fn input_mut(&mut self, name: &str) -> Option<&mut Input> {
        self.inputs.iter_mut().find(|i| i.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&Output> {
        self.outputs.iter().find(|o| o.name == name)
    }

    pub fn output_mut(&mut self, name: &str) -> Option<&mut Output> {
        self.outputs.iter_mut().find(|o| o.name == name)
    }

    /// Current value of an input, `MissingInput` if undeclared or still null.
    pub fn require_input(&self, name: &str) -> Result<&Value, NodeError> {
        self.input(name)
            .map(|i| &i.value)
            .filter(|v| !v.is_null())
            .ok_or_else(|| NodeError::MissingInput(name.to_string()))
    }

    pub fn set_output(&mut self, name: &str, value: impl Into<Value>) -> Result<(), NodeError> {
        let output = self
            .output_mut(name)
            .ok_or_else(|| NodeError::UnknownPort(name.to_string()))?;
        output.value = value.into();
        Ok(())
    }
}
