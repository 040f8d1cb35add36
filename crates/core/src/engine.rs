use crate::error::{EngineError, EngineResult};
use crate::steps::ExecutorRegistry;
use crate::types::{Workflow, WorkflowResult, WorkflowStatus};
use crate::workflow::dag::WorkflowDag;
use crate::workflow::scheduler::WorkflowExecutor;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// The workflow registry: holds registered definitions and the latest result
/// per workflow id, and hands definitions to the scheduler on execute.
///
/// An explicit component instance, cheap to clone and share; create one per
/// process (or several, e.g. in tests). All mutations go through a single
/// read-write lock over both maps.
#[derive(Clone)]
pub struct WorkflowEngine {
    state: Arc<RwLock<EngineState>>,
    executor: Arc<WorkflowExecutor>,
}

struct EngineState {
    workflows: HashMap<String, Workflow>,
    results: HashMap<String, WorkflowResult>,
}

impl WorkflowEngine {
    /// An engine with the built-in step executors registered.
    pub fn new() -> Self {
        Self::with_executors(ExecutorRegistry::builtin())
    }

    /// An engine dispatching steps through the given executor registry.
    pub fn with_executors(executors: ExecutorRegistry) -> Self {
        Self {
            state: Arc::new(RwLock::new(EngineState {
                workflows: HashMap::new(),
                results: HashMap::new(),
            })),
            executor: Arc::new(WorkflowExecutor::new(Arc::new(executors))),
        }
    }

    /// Register a workflow definition.
    ///
    /// Rejects an empty or already-taken id, edges naming undefined steps,
    /// and cyclic step graphs. On success the stored definition is Pending
    /// and immutable.
    pub async fn register(&self, mut workflow: Workflow) -> EngineResult<()> {
        if workflow.id.is_empty() {
            return Err(EngineError::InvalidWorkflow(
                "workflow id cannot be empty".to_string(),
            ));
        }
        WorkflowDag::from_workflow(&workflow)?;

        let mut state = self.state.write().await;
        if state.workflows.contains_key(&workflow.id) {
            return Err(EngineError::InvalidWorkflow(format!(
                "workflow {} already exists",
                workflow.id
            )));
        }

        workflow.status = WorkflowStatus::Pending;
        workflow.created_at = Utc::now();
        workflow.updated_at = workflow.created_at;

        tracing::info!(workflow_id = %workflow.id, steps = workflow.steps.len(), "registered workflow");
        state.results.remove(&workflow.id);
        state.workflows.insert(workflow.id.clone(), workflow);
        Ok(())
    }

    /// Fetch a registered workflow by id.
    pub async fn get(&self, id: &str) -> Option<Workflow> {
        self.state.read().await.workflows.get(id).cloned()
    }

    /// Remove a workflow and its stored result.
    pub async fn delete(&self, id: &str) -> EngineResult<()> {
        let mut state = self.state.write().await;
        if state.workflows.remove(id).is_none() {
            return Err(EngineError::NotFound(id.to_string()));
        }
        state.results.remove(id);
        tracing::info!(workflow_id = %id, "deleted workflow");
        Ok(())
    }

    /// Latest stored result for a workflow, if it has run.
    pub async fn last_result(&self, id: &str) -> Option<WorkflowResult> {
        self.state.read().await.results.get(id).cloned()
    }

    /// Execute a registered workflow, blocking until it finishes or the
    /// cancellation token fires.
    ///
    /// Step-level failures live inside the returned result; the only call
    /// error is `NotFound`. The latest result per workflow id is stored
    /// last-write-wins; concurrent executions stay distinguishable through
    /// `WorkflowResult::execution_id`.
    pub async fn execute(
        &self,
        cancel: CancellationToken,
        id: &str,
    ) -> EngineResult<WorkflowResult> {
        let workflow = {
            let mut state = self.state.write().await;
            let workflow = state
                .workflows
                .get_mut(id)
                .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
            workflow.status = WorkflowStatus::Running;
            workflow.updated_at = Utc::now();
            workflow.clone()
        };

        // The registry lock is not held while the execution runs.
        let result = self.executor.execute(&workflow, cancel).await?;

        let mut state = self.state.write().await;
        // A delete that raced the execution wins: don't resurrect its slot.
        if let Some(stored) = state.workflows.get_mut(id) {
            stored.status = result.status;
            stored.updated_at = Utc::now();
            state.results.insert(id.to_string(), result.clone());
        }
        Ok(result)
    }
}

impl Default for WorkflowEngine {
    fn default() -> Self {
        Self::new()
    }
}
