//! Workflow templates and node injection.

use crate::error::{json_type_name, Error, Result};
use serde_json::{Map, Value};
use std::path::Path;

/// A workflow template: a JSON object keyed by node id.
///
/// Templates are loaded once per run and never mutated. Payloads are built
/// from them with [`inject`], which returns a new document.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowTemplate {
    nodes: Map<String, Value>,
}

impl WorkflowTemplate {
    /// Load a template from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::template_not_found(path));
        }

        let content = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&content)?;
        match value {
            Value::Object(nodes) => Ok(Self { nodes }),
            _ => Err(Error::NotANodeMap {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Build a template from an in-memory JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(nodes) => Ok(Self { nodes }),
            other => Err(Error::InvalidTemplate(format!(
                "expected a JSON object keyed by node id, found {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Whether the template contains the given node.
    pub fn has_node(&self, node: &str) -> bool {
        self.nodes.contains_key(node)
    }

    /// Read `nodes[node].inputs[key]`.
    pub fn input(&self, node: &str, key: &str) -> Option<&Value> {
        self.nodes.get(node)?.get("inputs")?.get(key)
    }

    /// Read an input as a number, accepting numeric strings.
    pub fn input_f64(&self, node: &str, key: &str) -> Option<f64> {
        match self.input(node, key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Number of nodes in the template.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the template has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The template as a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.nodes.clone())
    }
}

/// One value to write into `nodes[node].inputs[key]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Injection {
    pub node: String,
    pub key: String,
    pub value: Value,
}

impl Injection {
    /// Create an injection.
    pub fn new(node: impl Into<String>, key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            node: node.into(),
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Result of [`inject`]: the new payload and the injections that had no target.
#[derive(Debug, Clone, PartialEq)]
pub struct Injected {
    pub workflow: Value,
    pub skipped: Vec<Injection>,
}

/// Apply injections to a copy of the template.
///
/// Injections naming a node the template lacks are returned in
/// [`Injected::skipped`] and leave the payload untouched. A node without an
/// `inputs` map gets one. The template itself is never modified.
pub fn inject(template: &WorkflowTemplate, injections: &[Injection]) -> Injected {
    let mut nodes = template.nodes.clone();
    let mut skipped = Vec::new();

    for injection in injections {
        let Some(Value::Object(node)) = nodes.get_mut(&injection.node) else {
            skipped.push(injection.clone());
            continue;
        };

        let inputs = node
            .entry("inputs")
            .or_insert_with(|| Value::Object(Map::new()));
        if !inputs.is_object() {
            *inputs = Value::Object(Map::new());
        }
        if let Value::Object(inputs) = inputs {
            inputs.insert(injection.key.clone(), injection.value.clone());
        }
    }

    Injected {
        workflow: Value::Object(nodes),
        skipped,
    }
}
