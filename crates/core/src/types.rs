use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Lifecycle status shared by workflows, executions, and steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Opaque configuration bag interpreted by the step's executor
pub type StepConfig = serde_json::Map<String, serde_json::Value>;

/// A registered workflow: an immutable DAG of steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<Step>,
    #[serde(default = "default_status")]
    pub status: WorkflowStatus,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

fn default_status() -> WorkflowStatus {
    WorkflowStatus::Pending
}

/// A single unit of work within a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub name: String,
    /// Tag selecting the executor capability (e.g. "echo", "http", "transform")
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(default)]
    pub config: StepConfig,
    /// Successor step ids, followed on success
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next: Vec<String>,
    /// Error-handler step ids, followed on exhausted failure
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_error: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
    /// Per-attempt timeout in milliseconds
    #[serde(rename = "timeout", skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// When true, this step's exhausted failure fails the whole workflow
    #[serde(default)]
    pub required: bool,
}

/// Retry policy for a failing step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Base delay between attempts, milliseconds
    #[serde(rename = "delay")]
    pub delay_ms: u64,
    /// Cap on the grown delay, milliseconds
    #[serde(rename = "max_delay", skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
    /// Multiplicative backoff factor; values <= 0 keep the delay constant
    #[serde(default)]
    pub multiplier: f64,
}

/// Result of one workflow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub workflow_id: String,
    /// Correlation id distinguishing concurrent executions of the same workflow
    pub execution_id: Uuid,
    pub status: WorkflowStatus,
    pub step_results: HashMap<String, StepResult>,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowResult {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            execution_id: Uuid::new_v4(),
            status: WorkflowStatus::Running,
            step_results: HashMap::new(),
            start_time: Utc::now(),
            end_time: None,
            error: None,
        }
    }
}

/// Result of one step attempt sequence within an execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub status: WorkflowStatus,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}
