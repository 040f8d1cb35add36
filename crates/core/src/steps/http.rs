use super::{RunContext, StepExecutor};
use crate::types::StepConfig;
use anyhow::{anyhow, Context, Result};

/// Performs an outbound HTTP call described by the step config.
///
/// Recognized config fields: `method`, `url` (supporting `${ENV_VAR}`
/// substitution), `params` (query parameters to inject), `headers`, `body`
/// (sent as JSON). Non-2xx responses fail the step, which makes them
/// retryable under the step's policy.
pub struct HttpCallExecutor {
    client: reqwest::Client,
}

impl HttpCallExecutor {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpCallExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl StepExecutor for HttpCallExecutor {
    async fn execute(&self, config: &StepConfig, _ctx: &RunContext) -> Result<serde_json::Value> {
        let method = config
            .get("method")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("http step requires a string 'method' in config"))?;
        let raw_url = config
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("http step requires a string 'url' in config"))?;

        let mut url = url::Url::parse(&substitute_env(raw_url))
            .with_context(|| format!("invalid url {raw_url}"))?;

        if let Some(params) = config.get("params").and_then(|v| v.as_object()) {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, &scalar_string(value));
            }
        }

        let method = reqwest::Method::from_bytes(method.to_uppercase().as_bytes())
            .with_context(|| format!("invalid http method {method}"))?;

        let mut request = self.client.request(method, url);

        if let Some(headers) = config.get("headers").and_then(|v| v.as_object()) {
            for (key, value) in headers {
                request = request.header(key.as_str(), scalar_string(value));
            }
        }
        if let Some(body) = config.get("body") {
            request = request.json(body);
        }

        let response = request.send().await.context("request failed")?;
        let status = response.status();
        let body = response.text().await.context("failed to read response body")?;

        if !status.is_success() {
            return Err(anyhow!("request failed with status {}: {}", status.as_u16(), body));
        }

        // JSON where possible, raw text otherwise
        Ok(serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body)))
    }
}

/// Render a scalar config value as a query/header string.
fn scalar_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Replace `${NAME}` references with the named environment variable.
/// Unset or empty variables leave the reference untouched.
fn substitute_env(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(value) if !value.is_empty() => result.push_str(&value),
                    _ => {
                        result.push_str("${");
                        result.push_str(name);
                        result.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    result.push_str(rest);
    result
}
