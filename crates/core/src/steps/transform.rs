use super::{RunContext, StepExecutor};
use crate::types::StepConfig;
use anyhow::{anyhow, Result};
use std::collections::HashMap;

/// Renders a template against values extracted from the run context.
///
/// Config fields: `template` (a string with `{{key}}` placeholders) and
/// `mapping` (placeholder key -> dotted path expression evaluated against
/// the data of already-completed steps, e.g. `"city": "fetch.data.name"`).
pub struct TransformExecutor;

#[async_trait::async_trait]
impl StepExecutor for TransformExecutor {
    async fn execute(&self, config: &StepConfig, ctx: &RunContext) -> Result<serde_json::Value> {
        let template = config
            .get("template")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("transform step requires a string 'template' in config"))?;
        let mapping = config
            .get("mapping")
            .and_then(|v| v.as_object())
            .ok_or_else(|| anyhow!("transform step requires an object 'mapping' in config"))?;

        let mut values = HashMap::new();
        for (key, path) in mapping {
            let path = path
                .as_str()
                .ok_or_else(|| anyhow!("mapping for '{key}' must be a string path"))?;
            let value = ctx
                .lookup(path)
                .ok_or_else(|| anyhow!("path '{path}' for '{key}' not found in run context"))?;
            values.insert(key.clone(), render_value(value));
        }

        Ok(serde_json::Value::String(render_template(template, &values)))
    }
}

/// Render a context value for interpolation: strings bare, the rest as JSON.
fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Replace `{{key}}` placeholders with their mapped values.
fn render_template(template: &str, values: &HashMap<String, String>) -> String {
    let mut result = template.to_string();
    for (key, value) in values {
        let placeholder = format!("{{{{{}}}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}
