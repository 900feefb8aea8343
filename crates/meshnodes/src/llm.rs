use async_trait::async_trait;
use meshcore::{template, ExecutionContext, Node, NodeError, NodeResult};
use meshruntime::{NodeFactory, NodeTypeInfo};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::time::Duration;

/// Chat-completion node for OpenAI-compatible endpoints.
///
/// Prompt, system prompt and api key are all templated; the output is the
/// first choice's message content, with model and token usage kept as
/// diagnostics.
pub struct LlmNode {
    id: String,
    config: LlmConfig,
    client: reqwest::Client,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
    pub prompt: Option<String>,
    pub system_prompt: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub retry: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_timeout() -> u64 {
    60_000
}

fn default_retry_delay() -> u64 {
    1_000
}

#[async_trait]
impl Node for LlmNode {
    fn node_id(&self) -> &str {
        &self.id
    }

    fn node_type(&self) -> &str {
        "llm"
    }

    fn validate(&self) -> bool {
        !self.config.model.trim().is_empty() && self.config.prompt.is_some()
    }

    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeResult, NodeError> {
        let cfg = &self.config;
        let prompt = cfg
            .prompt
            .as_deref()
            .map(|p| template::render_template(p, ctx))
            .ok_or_else(|| NodeError::Configuration("llm node requires a prompt".to_string()))?;
        let api_key = template::render_template(&cfg.api_key, ctx);

        let mut messages = Vec::new();
        if let Some(system) = &cfg.system_prompt {
            messages.push(json!({
                "role": "system",
                "content": template::render_template(system, ctx),
            }));
        }
        messages.push(json!({"role": "user", "content": prompt}));

        let mut payload = json!({
            "model": cfg.model,
            "messages": messages,
        });
        if let Some(temperature) = cfg.temperature {
            payload["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = cfg.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }

        let url = format!("{}/chat/completions", cfg.base_url.trim_end_matches('/'));
        let max_attempts = cfg.retry + 1;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&api_key)
                .json(&payload)
                .timeout(Duration::from_millis(cfg.timeout))
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.as_u16() < 500 {
                        let body: Value = match response.json().await {
                            Ok(body) => body,
                            Err(e) => {
                                return Ok(NodeResult::failure(format!(
                                    "failed to decode completion response: {}",
                                    e
                                ))
                                .with("status_code", status.as_u16()));
                            }
                        };
                        return Ok(self.completion_result(status.as_u16(), body));
                    }
                    last_error = format!("server returned status {}", status.as_u16());
                    tracing::warn!(node_id = %self.id, status = status.as_u16(), attempt, "llm attempt failed");
                }
                Err(e) => {
                    last_error = format!("request error: {}", e);
                    tracing::warn!(node_id = %self.id, attempt, error = %last_error, "llm attempt failed");
                }
            }
            if attempt < max_attempts {
                tokio::time::sleep(Duration::from_millis(cfg.retry_delay)).await;
            }
        }

        Ok(NodeResult::failure(last_error).with("status_code", 503))
    }
}

impl LlmNode {
    fn completion_result(&self, status: u16, body: Value) -> NodeResult {
        if !(200..300).contains(&status) {
            let message = body
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("completion request rejected");
            return NodeResult::failure(message).with("status_code", status);
        }
        let content = body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str);
        match content {
            Some(content) => NodeResult::success(content)
                .with("model", body.get("model").cloned().unwrap_or(Value::Null))
                .with("usage", body.get("usage").cloned().unwrap_or(Value::Null))
                .with("status_code", status),
            None => {
                NodeResult::failure("malformed completion response").with("status_code", status)
            }
        }
    }
}

pub struct LlmNodeFactory;

impl NodeFactory for LlmNodeFactory {
    fn create(
        &self,
        node_id: &str,
        config: &Map<String, Value>,
    ) -> Result<Box<dyn Node>, NodeError> {
        let config: LlmConfig = serde_json::from_value(Value::Object(config.clone()))
            .map_err(|e| NodeError::Configuration(format!("invalid llm config: {}", e)))?;
        Ok(Box::new(LlmNode {
            id: node_id.to_string(),
            config,
            client: reqwest::Client::new(),
        }))
    }

    fn node_type(&self) -> &str {
        "llm"
    }

    fn metadata(&self) -> NodeTypeInfo {
        NodeTypeInfo {
            description: "Call an OpenAI-compatible chat completion endpoint".to_string(),
            category: "ai".to_string(),
        }
    }
}
