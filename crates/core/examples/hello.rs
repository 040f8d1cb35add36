//! Hello-world workflow example.
//!
//! Registers a three-step echo workflow (one standalone step plus a
//! two-step chain) and executes it, printing each step's payload.
//!
//! Run with: cargo run --example hello

use tokio_util::sync::CancellationToken;
use weir_core::{Step, StepConfig, Workflow, WorkflowEngine, WorkflowStatus};

fn echo_step(id: &str, name: &str, message: &str, next: &[&str]) -> Step {
    let mut config = StepConfig::new();
    config.insert("message".to_string(), serde_json::json!(message));
    Step {
        id: id.to_string(),
        name: name.to_string(),
        step_type: "echo".to_string(),
        config,
        next: next.iter().map(|s| s.to_string()).collect(),
        on_error: Vec::new(),
        retry: None,
        timeout_ms: None,
        required: false,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let engine = WorkflowEngine::new();

    let workflow = Workflow {
        id: "hello-world".to_string(),
        name: "Hello World Workflow".to_string(),
        description: "A simple example workflow".to_string(),
        steps: vec![
            echo_step("step1", "Greet", "Hello, World!", &[]),
            echo_step("step2", "Process", "Processing...", &["step3"]),
            echo_step("step3", "Farewell", "Goodbye, World!", &[]),
        ],
        status: WorkflowStatus::Pending,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
        metadata: None,
    };

    engine.register(workflow).await?;

    let result = engine
        .execute(CancellationToken::new(), "hello-world")
        .await?;

    println!("Workflow finished with status: {:?}", result.status);
    for (step_id, step) in &result.step_results {
        println!(
            "  {}: {:?} ({} attempt(s)) -> {}",
            step_id,
            step.status,
            step.attempts,
            step.data.as_ref().map(|d| d.to_string()).unwrap_or_default()
        );
    }

    Ok(())
}
