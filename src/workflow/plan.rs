//! Compiled execution plan
//!
//! Turns the untyped `"$node.field"` strings of a definition into explicit
//! reference edges, and checks them against declaration order with a petgraph
//! dependency graph. The engine still runs nodes in declared order; the plan
//! only reports (or, in strict mode, rejects) references that order cannot
//! satisfy.

use crate::workflow::types::{NodeInputs, NodeResults, WorkflowDefinition};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Where one input parameter gets its value
#[derive(Debug, Clone, PartialEq)]
pub enum InputBinding {
    Literal(Value),
    Reference(NodeReference),
}

/// A parsed `"$<nodeId>.<field>"` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReference {
    pub node_id: String,
    /// Everything after the first `.`; `None` when the reference has no dot
    pub field: Option<String>,
}

impl NodeReference {
    /// Parse a reference string. Returns `None` for anything that is not a
    /// string starting with `$` (i.e. a literal).
    pub fn parse(value: &Value) -> Option<Self> {
        let raw = value.as_str()?.strip_prefix('$')?;
        let (node_id, field) = match raw.split_once('.') {
            Some((node, field)) => (node, Some(field.to_string())),
            None => (raw, None),
        };
        Some(Self {
            node_id: node_id.to_string(),
            field,
        })
    }

    /// Look the reference up in the results gathered so far.
    ///
    /// Missing node, missing field or a dot-less reference all resolve to
    /// `Value::Null`; absence is not an error.
    pub fn resolve(&self, results: &NodeResults) -> Value {
        let Some(field) = &self.field else {
            return Value::Null;
        };
        results
            .get(&self.node_id)
            .and_then(|output| output.get(field))
            .cloned()
            .unwrap_or(Value::Null)
    }
}

impl fmt::Display for NodeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "${}.{}", self.node_id, field),
            None => write!(f, "${}", self.node_id),
        }
    }
}

/// Problems found while compiling a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanIssue {
    DuplicateNodeId(String),
    /// Reference to a node that does not exist in the workflow
    MissingReference { node_id: String, input: String, reference: String },
    /// Reference to the node itself or to a node declared after it
    ForwardReference { node_id: String, input: String, reference: String },
    /// References form a cycle
    Cycle,
}

impl fmt::Display for PlanIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanIssue::DuplicateNodeId(id) => write!(f, "duplicate node id '{}'", id),
            PlanIssue::MissingReference { node_id, input, reference } => write!(
                f,
                "node '{}' input '{}' references unknown node ({})",
                node_id, input, reference
            ),
            PlanIssue::ForwardReference { node_id, input, reference } => write!(
                f,
                "node '{}' input '{}' references a node that has not run yet ({})",
                node_id, input, reference
            ),
            PlanIssue::Cycle => write!(f, "node references form a cycle"),
        }
    }
}

/// One step of the plan, in declaration order
#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub node_id: String,
    pub node_type: String,
    pub config: Value,
    pub bindings: Vec<(String, InputBinding)>,
}

impl PlannedStep {
    /// Build this step's inputs from literals and earlier results
    pub fn resolve_inputs(&self, results: &NodeResults) -> NodeInputs {
        self.bindings
            .iter()
            .map(|(name, binding)| {
                let value = match binding {
                    InputBinding::Literal(value) => value.clone(),
                    InputBinding::Reference(reference) => {
                        let value = reference.resolve(results);
                        if value.is_null() {
                            tracing::debug!("🕳️ Reference {} for '{}.{}' resolved to null", reference, self.node_id, name);
                        }
                        value
                    }
                };
                (name.clone(), value)
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowPlan {
    pub workflow_id: String,
    pub steps: Vec<PlannedStep>,
    pub issues: Vec<PlanIssue>,
}

impl WorkflowPlan {
    /// Compile a definition. Never fails: problems are collected in `issues`.
    pub fn compile(workflow: &WorkflowDefinition) -> Self {
        let mut issues = Vec::new();
        let mut graph: DiGraph<String, ()> = DiGraph::new();
        let mut positions: HashMap<&str, (usize, NodeIndex)> = HashMap::new();

        for (position, node) in workflow.nodes.iter().enumerate() {
            if positions.contains_key(node.id.as_str()) {
                issues.push(PlanIssue::DuplicateNodeId(node.id.clone()));
                continue;
            }
            let index = graph.add_node(node.id.clone());
            positions.insert(node.id.as_str(), (position, index));
        }

        let mut steps = Vec::with_capacity(workflow.nodes.len());
        for (position, node) in workflow.nodes.iter().enumerate() {
            let mut bindings = Vec::with_capacity(node.inputs.len());

            for (input, value) in &node.inputs {
                let Some(reference) = NodeReference::parse(value) else {
                    bindings.push((input.clone(), InputBinding::Literal(value.clone())));
                    continue;
                };

                match positions.get(reference.node_id.as_str()) {
                    None => issues.push(PlanIssue::MissingReference {
                        node_id: node.id.clone(),
                        input: input.clone(),
                        reference: reference.to_string(),
                    }),
                    Some(&(target_position, target_index)) => {
                        if target_position >= position {
                            issues.push(PlanIssue::ForwardReference {
                                node_id: node.id.clone(),
                                input: input.clone(),
                                reference: reference.to_string(),
                            });
                        }
                        if let Some(&(_, consumer_index)) = positions.get(node.id.as_str()) {
                            graph.add_edge(target_index, consumer_index, ());
                        }
                    }
                }

                bindings.push((input.clone(), InputBinding::Reference(reference)));
            }

            steps.push(PlannedStep {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
                config: node.config.clone(),
                bindings,
            });
        }

        if toposort(&graph, None).is_err() {
            issues.push(PlanIssue::Cycle);
        }

        Self {
            workflow_id: workflow.id.clone(),
            steps,
            issues,
        }
    }

    pub fn is_sound(&self) -> bool {
        self.issues.is_empty()
    }
}
