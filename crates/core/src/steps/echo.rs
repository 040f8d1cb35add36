use super::{RunContext, StepExecutor};
use crate::types::StepConfig;
use anyhow::{anyhow, Result};

/// Returns the configured `message` string as the step's data payload.
pub struct EchoExecutor;

#[async_trait::async_trait]
impl StepExecutor for EchoExecutor {
    async fn execute(&self, config: &StepConfig, _ctx: &RunContext) -> Result<serde_json::Value> {
        let message = config
            .get("message")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("echo step requires a string 'message' in config"))?;

        Ok(serde_json::Value::String(message.to_string()))
    }
}
