use crate::error::EngineError;
use crate::types::Workflow;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};

/// DAG view of a workflow's `next` edges, plus the set of error-handler
/// targets. Built at registration (validation) and once per execution
/// (reverse-dependency index).
#[derive(Debug)]
pub struct WorkflowDag {
    graph: DiGraph<String, ()>,
    step_indices: HashMap<String, NodeIndex>,
    error_targets: HashSet<String>,
}

impl WorkflowDag {
    /// Build and validate the DAG for a workflow.
    ///
    /// Rejects duplicate step ids, `next`/`on_error` edges naming undefined
    /// steps, and cycles among `next` edges. `on_error` edges do not
    /// participate in the cycle check: the per-execution claim set already
    /// makes re-admission through them a no-op.
    pub fn from_workflow(workflow: &Workflow) -> Result<Self, EngineError> {
        let mut graph = DiGraph::new();
        let mut step_indices = HashMap::new();

        for step in &workflow.steps {
            if step.id.is_empty() {
                return Err(EngineError::InvalidWorkflow(
                    "step id cannot be empty".to_string(),
                ));
            }
            if step_indices.contains_key(&step.id) {
                return Err(EngineError::InvalidWorkflow(format!(
                    "duplicate step id {}",
                    step.id
                )));
            }
            let node = graph.add_node(step.id.clone());
            step_indices.insert(step.id.clone(), node);
        }

        let mut error_targets = HashSet::new();
        for step in &workflow.steps {
            let from = step_indices[&step.id];
            for next_id in &step.next {
                let to = step_indices.get(next_id).ok_or_else(|| {
                    EngineError::InvalidWorkflow(format!(
                        "step {} lists undefined next step {}",
                        step.id, next_id
                    ))
                })?;
                graph.add_edge(from, *to, ());
            }
            for error_id in &step.on_error {
                if !step_indices.contains_key(error_id) {
                    return Err(EngineError::InvalidWorkflow(format!(
                        "step {} lists undefined on_error step {}",
                        step.id, error_id
                    )));
                }
                error_targets.insert(error_id.clone());
            }
        }

        if petgraph::algo::is_cyclic_directed(&graph) {
            return Err(EngineError::InvalidWorkflow(
                "step graph contains a cycle".to_string(),
            ));
        }

        Ok(Self {
            graph,
            step_indices,
            error_targets,
        })
    }

    /// Prerequisites of a step: every step that names it in `next`.
    pub fn prerequisites(&self, step_id: &str) -> Vec<String> {
        let Some(node) = self.step_indices.get(step_id) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(*node, petgraph::Direction::Incoming)
            .map(|n| self.graph[n].clone())
            .collect()
    }

    /// Reverse-dependency index: step id -> prerequisite step ids.
    pub fn prerequisite_index(&self) -> HashMap<String, Vec<String>> {
        self.step_indices
            .keys()
            .map(|id| (id.clone(), self.prerequisites(id)))
            .collect()
    }

    /// Steps runnable at execution start: no incoming `next` edge and not
    /// an error-handler target (handlers wait for the error path to fire).
    pub fn initial_steps(&self) -> Vec<String> {
        self.graph
            .node_indices()
            .filter(|&n| {
                self.graph
                    .neighbors_directed(n, petgraph::Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|n| self.graph[n].clone())
            .filter(|id| !self.error_targets.contains(id))
            .collect()
    }
}
