//! Step executor contract and the built-in executors.
//!
//! The scheduler never inspects a step's `type` tag itself: it resolves an
//! executor through the [`ExecutorRegistry`] and dispatches through the
//! [`StepExecutor`] trait. New step kinds are added by registering an
//! implementation, not by touching the scheduler.

pub mod echo;
pub mod http;
pub mod transform;

pub use echo::EchoExecutor;
pub use http::HttpCallExecutor;
pub use transform::TransformExecutor;

use crate::types::StepConfig;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Ambient context handed to every step attempt: the data payloads of the
/// steps that have already completed in this execution, keyed by step id.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub workflow_id: String,
    pub execution_id: Uuid,
    steps: HashMap<String, serde_json::Value>,
}

impl RunContext {
    pub fn new(
        workflow_id: impl Into<String>,
        execution_id: Uuid,
        steps: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            execution_id,
            steps,
        }
    }

    /// Data payload recorded for a completed step, if any.
    pub fn step_data(&self, step_id: &str) -> Option<&serde_json::Value> {
        self.steps.get(step_id)
    }

    /// Resolve a dotted path expression against the context.
    ///
    /// The first segment names a step; the rest descend into its data
    /// payload, with numeric segments indexing arrays (`fetch.items.0.name`).
    pub fn lookup(&self, path: &str) -> Option<&serde_json::Value> {
        let mut segments = path.split('.');
        let mut current = self.steps.get(segments.next()?)?;

        for segment in segments {
            current = match current {
                serde_json::Value::Object(map) => map.get(segment)?,
                serde_json::Value::Array(items) => {
                    items.get(segment.parse::<usize>().ok()?)?
                }
                _ => return None,
            };
        }
        Some(current)
    }
}

/// Capability every step type implements: turn a configuration and the run
/// context into a data payload, or fail. Failures are retried per the step's
/// policy by the caller; executors stay oblivious to scheduling.
#[async_trait::async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, config: &StepConfig, ctx: &RunContext) -> Result<serde_json::Value>;
}

/// Maps step `type` tags to executor implementations.
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn StepExecutor>>,
}

impl ExecutorRegistry {
    /// An empty registry; callers register their own executors.
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// A registry with the built-in executors: `echo`, `http`, `transform`.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("echo", Arc::new(EchoExecutor));
        registry.register("http", Arc::new(HttpCallExecutor::new()));
        registry.register("transform", Arc::new(TransformExecutor));
        registry
    }

    pub fn register(&mut self, step_type: impl Into<String>, executor: Arc<dyn StepExecutor>) {
        self.executors.insert(step_type.into(), executor);
    }

    pub fn get(&self, step_type: &str) -> Option<Arc<dyn StepExecutor>> {
        self.executors.get(step_type).cloned()
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
