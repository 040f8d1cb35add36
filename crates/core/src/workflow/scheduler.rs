use crate::error::{EngineError, EngineResult};
use crate::steps::{ExecutorRegistry, RunContext};
use crate::types::{Step, StepResult, Workflow, WorkflowResult, WorkflowStatus};
use crate::workflow::dag::WorkflowDag;
use crate::workflow::retry::{run_with_retry, RetryOutcome};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Drives one workflow execution: launches eligible steps concurrently,
/// enforces prerequisite ordering, routes failures to error handlers, and
/// aggregates per-step results into a `WorkflowResult`.
pub struct WorkflowExecutor {
    executors: Arc<ExecutorRegistry>,
}

impl WorkflowExecutor {
    pub fn new(executors: Arc<ExecutorRegistry>) -> Self {
        Self { executors }
    }

    /// Execute a workflow to completion or cancellation.
    ///
    /// Step-level failures are reported inside the result, never as a call
    /// error; a cancelled run comes back with status `Failed`, the
    /// cancellation message, and every already-recorded step result intact.
    pub async fn execute(
        &self,
        workflow: &Workflow,
        cancel: CancellationToken,
    ) -> EngineResult<WorkflowResult> {
        let dag = WorkflowDag::from_workflow(workflow)?;
        let mut result = WorkflowResult::new(&workflow.id);

        if workflow.steps.is_empty() {
            result.status = WorkflowStatus::Completed;
            result.end_time = Some(Utc::now());
            return Ok(result);
        }

        tracing::info!(
            workflow_id = %workflow.id,
            execution_id = %result.execution_id,
            steps = workflow.steps.len(),
            "starting workflow execution"
        );

        let execution = Arc::new(Execution {
            workflow_id: workflow.id.clone(),
            execution_id: result.execution_id,
            steps: workflow
                .steps
                .iter()
                .map(|s| (s.id.clone(), s.clone()))
                .collect(),
            prereqs: dag.prerequisite_index(),
            executors: Arc::clone(&self.executors),
            cancel: cancel.clone(),
            state: Mutex::new(ExecState::default()),
            drained: Notify::new(),
        });

        {
            let mut state = execution.state.lock().await;
            let initial = dag.initial_steps();
            for id in &initial {
                state.parked.insert(id.clone());
            }
            for id in &initial {
                Execution::try_admit(&execution, &mut state, id);
            }
        }

        // Drain: each completion re-evaluates dependents and notifies when the
        // running count reaches zero. Cancellation unwinds in-flight waits, so
        // the count always drains.
        loop {
            let drained = execution.drained.notified();
            if execution.state.lock().await.running == 0 {
                break;
            }
            drained.await;
        }

        let state = execution.state.lock().await;
        result.step_results = state.results.clone();
        result.end_time = Some(Utc::now());
        if cancel.is_cancelled() {
            result.status = WorkflowStatus::Failed;
            result.error = Some(EngineError::Cancelled.to_string());
        } else if state.failed {
            result.status = WorkflowStatus::Failed;
            result.error = state.error.clone();
        } else {
            result.status = WorkflowStatus::Completed;
        }

        tracing::info!(
            workflow_id = %workflow.id,
            execution_id = %result.execution_id,
            status = ?result.status,
            steps_run = result.step_results.len(),
            "workflow execution finished"
        );

        Ok(result)
    }
}

/// Shared state of one execution, scoped to it alone. Guarded by a single
/// mutex; `drained` wakes the supervising future when the last task ends.
struct Execution {
    workflow_id: String,
    execution_id: Uuid,
    steps: HashMap<String, Step>,
    /// Reverse-dependency index: step id -> steps naming it in `next`.
    prereqs: HashMap<String, Vec<String>>,
    executors: Arc<ExecutorRegistry>,
    cancel: CancellationToken,
    state: Mutex<ExecState>,
    drained: Notify,
}

#[derive(Default)]
struct ExecState {
    /// Steps with a recorded result, either outcome. The eligibility gate.
    completed: HashSet<String>,
    /// At-most-once guard: a step spawns only on the unclaimed -> claimed
    /// transition under the state lock.
    claimed: HashSet<String>,
    /// Routed-to steps waiting for their prerequisites to complete.
    parked: HashSet<String>,
    /// Parked via an `on_error` edge; exempt from the required-failure halt.
    handler_exempt: HashSet<String>,
    results: HashMap<String, StepResult>,
    running: usize,
    /// Set on a required step's exhausted failure: stop admitting new work.
    halted: bool,
    failed: bool,
    error: Option<String>,
}

impl Execution {
    /// Claim and spawn a parked step if every prerequisite has completed.
    /// No-op for unparked, already-claimed, or halt-blocked steps.
    fn try_admit(execution: &Arc<Self>, state: &mut ExecState, step_id: &str) {
        if state.claimed.contains(step_id) || !state.parked.contains(step_id) {
            return;
        }
        if execution.cancel.is_cancelled() {
            return;
        }
        if state.halted && !state.handler_exempt.contains(step_id) {
            return;
        }
        let eligible = execution
            .prereqs
            .get(step_id)
            .map(|p| p.iter().all(|id| state.completed.contains(id)))
            .unwrap_or(true);
        if !eligible {
            return;
        }

        state.parked.remove(step_id);
        state.claimed.insert(step_id.to_string());
        state.running += 1;

        // Snapshot the run context under the lock, so the step observes a
        // consistent prefix of completions.
        let data = state
            .results
            .iter()
            .filter_map(|(id, r)| r.data.clone().map(|d| (id.clone(), d)))
            .collect();
        let ctx = RunContext::new(execution.workflow_id.clone(), execution.execution_id, data);

        let step = execution.steps[step_id].clone();
        let execution = Arc::clone(execution);
        tokio::spawn(async move {
            execution.run_step(step, ctx).await;
        });
    }

    async fn run_step(self: Arc<Self>, step: Step, ctx: RunContext) {
        let start_time = Utc::now();
        tracing::info!(
            workflow_id = %self.workflow_id,
            execution_id = %self.execution_id,
            step_id = %step.id,
            step_type = %step.step_type,
            "executing step"
        );

        // Resolve the executor before any retry: an unknown type fails the
        // step immediately and is not re-attempted.
        let outcome = match self.executors.get(&step.step_type) {
            Some(executor) => {
                run_with_retry(
                    executor.as_ref(),
                    &step.config,
                    &ctx,
                    step.retry.as_ref(),
                    step.timeout_ms,
                    &self.cancel,
                )
                .await
            }
            None => RetryOutcome {
                data: None,
                attempts: 1,
                error: Some(anyhow::anyhow!(EngineError::UnknownStepType(
                    step.step_type.clone()
                ))),
            },
        };

        self.finish_step(step, start_time, outcome).await;
    }

    /// Record the step's result, route its edges, and admit whatever became
    /// eligible. Runs entirely under the state lock: completion is linearized
    /// before any dependent is admitted.
    async fn finish_step(
        self: Arc<Self>,
        step: Step,
        start_time: DateTime<Utc>,
        outcome: RetryOutcome,
    ) {
        let mut state = self.state.lock().await;

        let error_message = outcome.error.as_ref().map(|e| format!("{e:#}"));
        let succeeded = outcome.error.is_none();

        state.results.insert(
            step.id.clone(),
            StepResult {
                step_id: step.id.clone(),
                status: if succeeded {
                    WorkflowStatus::Completed
                } else {
                    WorkflowStatus::Failed
                },
                start_time,
                end_time: Some(Utc::now()),
                data: outcome.data,
                error: error_message.clone(),
                attempts: outcome.attempts,
                metadata: None,
            },
        );
        state.completed.insert(step.id.clone());

        if succeeded {
            for id in &step.next {
                state.parked.insert(id.clone());
            }
        } else {
            tracing::warn!(
                workflow_id = %self.workflow_id,
                step_id = %step.id,
                attempts = outcome.attempts,
                required = step.required,
                error = error_message.as_deref().unwrap_or(""),
                "step failed"
            );
            // Error handlers run regardless of the required flag.
            for id in &step.on_error {
                state.parked.insert(id.clone());
                state.handler_exempt.insert(id.clone());
            }
            if step.required {
                state.halted = true;
                if !state.failed {
                    state.failed = true;
                    state.error = Some(
                        EngineError::StepFailed {
                            step_id: step.id.clone(),
                            attempts: outcome.attempts,
                            message: error_message.unwrap_or_default(),
                        }
                        .to_string(),
                    );
                }
            }
        }

        // Re-evaluate exactly the steps this completion can unblock: the
        // edges just routed, plus `next` successors parked by an earlier
        // trigger that were still waiting on this step.
        if !self.cancel.is_cancelled() {
            let mut candidates = step.next.clone();
            candidates.extend(step.on_error.iter().cloned());
            for id in &candidates {
                Execution::try_admit(&self, &mut state, id);
            }
        }

        state.running -= 1;
        if state.running == 0 {
            self.drained.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::StepExecutor;
    use crate::types::{RetryPolicy, StepConfig};
    use anyhow::anyhow;
    use std::time::Duration;

    struct FailingExecutor;

    #[async_trait::async_trait]
    impl StepExecutor for FailingExecutor {
        async fn execute(
            &self,
            _config: &StepConfig,
            _ctx: &RunContext,
        ) -> anyhow::Result<serde_json::Value> {
            Err(anyhow!("boom"))
        }
    }

    struct SlowExecutor {
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl StepExecutor for SlowExecutor {
        async fn execute(
            &self,
            config: &StepConfig,
            _ctx: &RunContext,
        ) -> anyhow::Result<serde_json::Value> {
            tokio::time::sleep(self.delay).await;
            Ok(config.get("message").cloned().unwrap_or(serde_json::Value::Null))
        }
    }

    fn registry() -> Arc<ExecutorRegistry> {
        let mut registry = ExecutorRegistry::builtin();
        registry.register("fail", Arc::new(FailingExecutor));
        registry.register(
            "slow",
            Arc::new(SlowExecutor {
                delay: Duration::from_millis(100),
            }),
        );
        Arc::new(registry)
    }

    fn echo_step(id: &str, next: &[&str]) -> Step {
        let mut config = StepConfig::new();
        config.insert(
            "message".to_string(),
            serde_json::json!(format!("hello from {id}")),
        );
        Step {
            id: id.to_string(),
            name: id.to_string(),
            step_type: "echo".to_string(),
            config,
            next: next.iter().map(|s| s.to_string()).collect(),
            on_error: Vec::new(),
            retry: None,
            timeout_ms: None,
            required: false,
        }
    }

    fn typed_step(id: &str, step_type: &str, next: &[&str]) -> Step {
        Step {
            step_type: step_type.to_string(),
            ..echo_step(id, next)
        }
    }

    fn workflow(id: &str, steps: Vec<Step>) -> Workflow {
        Workflow {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            steps,
            status: WorkflowStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            metadata: None,
        }
    }

    async fn run(workflow: &Workflow) -> WorkflowResult {
        WorkflowExecutor::new(registry())
            .execute(workflow, CancellationToken::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_three_echo_scenario() {
        // step1 standalone, step2 -> step3: two independent initial chains
        let wf = workflow(
            "hello",
            vec![
                echo_step("step1", &[]),
                echo_step("step2", &["step3"]),
                echo_step("step3", &[]),
            ],
        );
        let result = run(&wf).await;

        assert_eq!(result.status, WorkflowStatus::Completed);
        assert_eq!(result.step_results.len(), 3);
        for id in ["step1", "step2", "step3"] {
            let step = &result.step_results[id];
            assert_eq!(step.status, WorkflowStatus::Completed);
            assert_eq!(step.attempts, 1);
            assert_eq!(
                step.data,
                Some(serde_json::json!(format!("hello from {id}")))
            );
        }
        // step2 finished before step3 began
        let step2_end = result.step_results["step2"].end_time.unwrap();
        let step3_start = result.step_results["step3"].start_time;
        assert!(step2_end <= step3_start);
    }

    #[tokio::test]
    async fn test_zero_step_workflow_completes_immediately() {
        let result = run(&workflow("empty", vec![])).await;
        assert_eq!(result.status, WorkflowStatus::Completed);
        assert!(result.step_results.is_empty());
        assert!(result.end_time.is_some());
    }

    #[tokio::test]
    async fn test_join_waits_for_all_prerequisites() {
        // a and b both feed c; c must start after both recorded results
        let wf = workflow(
            "diamond",
            vec![
                echo_step("a", &["c"]),
                echo_step("b", &["c"]),
                echo_step("c", &["d"]),
                echo_step("d", &[]),
            ],
        );
        let result = run(&wf).await;

        assert_eq!(result.status, WorkflowStatus::Completed);
        assert_eq!(result.step_results.len(), 4);
        let c_start = result.step_results["c"].start_time;
        assert!(result.step_results["a"].end_time.unwrap() <= c_start);
        assert!(result.step_results["b"].end_time.unwrap() <= c_start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_steps_overlap() {
        let wf = workflow("parallel", vec![
            typed_step("a", "slow", &[]),
            typed_step("b", "slow", &[]),
        ]);
        let start = tokio::time::Instant::now();
        let result = run(&wf).await;

        assert_eq!(result.status, WorkflowStatus::Completed);
        // two 100ms steps in parallel, not in sequence
        assert!(start.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_required_failure_fails_workflow_and_blocks_successors() {
        let mut failing = typed_step("a", "fail", &["b"]);
        failing.required = true;
        let wf = workflow("required", vec![failing, echo_step("b", &[])]);
        let result = run(&wf).await;

        assert_eq!(result.status, WorkflowStatus::Failed);
        assert!(result.error.as_ref().unwrap().contains("step a failed"));
        let a = &result.step_results["a"];
        assert_eq!(a.status, WorkflowStatus::Failed);
        assert!(a.error.is_some());
        assert!(!result.step_results.contains_key("b"));
    }

    #[tokio::test]
    async fn test_optional_failure_is_isolated() {
        // A fails (optional) -> B; C is independent
        let wf = workflow(
            "optional",
            vec![
                typed_step("a", "fail", &["b"]),
                echo_step("b", &[]),
                echo_step("c", &[]),
            ],
        );
        let result = run(&wf).await;

        assert_eq!(result.status, WorkflowStatus::Completed);
        assert_eq!(result.step_results["a"].status, WorkflowStatus::Failed);
        assert_eq!(result.step_results["c"].status, WorkflowStatus::Completed);
        assert!(!result.step_results.contains_key("b"));
    }

    #[tokio::test]
    async fn test_error_path_routing() {
        let mut failing = typed_step("a", "fail", &[]);
        failing.on_error = vec!["handler".to_string()];
        let wf = workflow("onerror", vec![failing, echo_step("handler", &[])]);
        let result = run(&wf).await;

        assert_eq!(result.step_results["a"].status, WorkflowStatus::Failed);
        assert_eq!(
            result.step_results["handler"].status,
            WorkflowStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_error_handler_runs_even_for_required_failure() {
        let mut failing = typed_step("a", "fail", &["b"]);
        failing.required = true;
        failing.on_error = vec!["handler".to_string()];
        let wf = workflow(
            "required-onerror",
            vec![failing, echo_step("b", &[]), echo_step("handler", &[])],
        );
        let result = run(&wf).await;

        assert_eq!(result.status, WorkflowStatus::Failed);
        assert_eq!(
            result.step_results["handler"].status,
            WorkflowStatus::Completed
        );
        assert!(!result.step_results.contains_key("b"));
    }

    #[tokio::test]
    async fn test_handler_stays_idle_when_step_succeeds() {
        let mut ok = echo_step("a", &[]);
        ok.on_error = vec!["handler".to_string()];
        let wf = workflow("no-error", vec![ok, echo_step("handler", &[])]);
        let result = run(&wf).await;

        assert_eq!(result.status, WorkflowStatus::Completed);
        assert_eq!(result.step_results.len(), 1);
        assert!(!result.step_results.contains_key("handler"));
    }

    #[tokio::test]
    async fn test_failed_prerequisite_still_satisfies_join() {
        // a succeeds into c; b fails (optional). c joins on both and is
        // admitted via a's success once b has a recorded result.
        let wf = workflow(
            "join-after-failure",
            vec![
                echo_step("a", &["c"]),
                typed_step("b", "fail", &["c"]),
                echo_step("c", &[]),
            ],
        );
        let result = run(&wf).await;

        assert_eq!(result.status, WorkflowStatus::Completed);
        assert_eq!(result.step_results["b"].status, WorkflowStatus::Failed);
        assert_eq!(result.step_results["c"].status, WorkflowStatus::Completed);
    }

    #[tokio::test]
    async fn test_unknown_step_type_fails_without_retry() {
        let mut step = typed_step("a", "soap", &[]);
        step.retry = Some(RetryPolicy {
            max_attempts: 5,
            delay_ms: 10,
            max_delay_ms: None,
            multiplier: 2.0,
        });
        let result = run(&workflow("unknown", vec![step])).await;

        let a = &result.step_results["a"];
        assert_eq!(a.status, WorkflowStatus::Failed);
        assert_eq!(a.attempts, 1);
        assert!(a.error.as_ref().unwrap().contains("unknown step type: soap"));
    }

    #[tokio::test]
    async fn test_retry_policy_records_attempts() {
        let mut step = typed_step("a", "fail", &[]);
        step.retry = Some(RetryPolicy {
            max_attempts: 3,
            delay_ms: 1,
            max_delay_ms: None,
            multiplier: 1.0,
        });
        let result = run(&workflow("retries", vec![step])).await;

        let a = &result.step_results["a"];
        assert_eq!(a.status, WorkflowStatus::Failed);
        assert_eq!(a.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_preserves_partial_results() {
        // a completes instantly; b hangs until the token fires
        let wf = workflow(
            "cancelled",
            vec![echo_step("a", &[]), typed_step("b", "slow", &["c"]), echo_step("c", &[])],
        );

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let result = WorkflowExecutor::new(registry())
            .execute(&wf, cancel)
            .await
            .unwrap();

        assert_eq!(result.status, WorkflowStatus::Failed);
        assert!(result.error.as_ref().unwrap().contains("cancelled"));
        assert_eq!(result.step_results["a"].status, WorkflowStatus::Completed);
        let b = &result.step_results["b"];
        assert_eq!(b.status, WorkflowStatus::Failed);
        assert!(b.error.as_ref().unwrap().contains("cancelled"));
        assert!(!result.step_results.contains_key("c"));
    }

    #[tokio::test]
    async fn test_downstream_sees_upstream_data() {
        let mut transform = typed_step("format", "transform", &[]);
        transform.config = serde_json::json!({
            "template": "got: {{msg}}",
            "mapping": {"msg": "greet"}
        })
        .as_object()
        .unwrap()
        .clone();

        let wf = workflow(
            "context",
            vec![echo_step("greet", &["format"]), transform],
        );
        let result = run(&wf).await;

        assert_eq!(result.status, WorkflowStatus::Completed);
        assert_eq!(
            result.step_results["format"].data,
            Some(serde_json::json!("got: hello from greet"))
        );
    }
}
