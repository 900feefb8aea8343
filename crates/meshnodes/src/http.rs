use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use meshcore::{template, ExecutionContext, Node, NodeError, NodeResult};
use meshruntime::{NodeFactory, NodeTypeInfo};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::time::Duration;

const ALLOWED_METHODS: [&str; 7] = ["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"];

/// HTTP request node.
///
/// Renders url/headers/body/query against the context, executes with
/// bounded retries (only ≥500 responses and transport errors retry; 4xx
/// returns immediately), and captures the outcome into its result.
pub struct HttpNode {
    id: String,
    config: HttpConfig,
    client: reqwest::Client,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: Map<String, Value>,
    #[serde(default)]
    pub query_params: Map<String, Value>,
    pub body: Option<Value>,
    /// Per-attempt timeout, milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub retry: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub response_format: ResponseFormat,
    #[serde(default = "default_success_codes")]
    pub success_codes: Vec<u16>,
    pub output_path: Option<String>,
    #[serde(default = "default_true")]
    pub follow_redirects: bool,
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    Bearer {
        token: String,
    },
    Basic {
        username: String,
        password: String,
    },
    ApiKey {
        key: String,
        #[serde(default = "default_api_key_header")]
        header: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    Json,
    Text,
    #[default]
    Auto,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_timeout() -> u64 {
    30_000
}

fn default_retry_delay() -> u64 {
    1_000
}

fn default_success_codes() -> Vec<u16> {
    vec![200, 201, 202, 204]
}

fn default_true() -> bool {
    true
}

fn default_api_key_header() -> String {
    "X-API-Key".to_string()
}

#[async_trait]
impl Node for HttpNode {
    fn node_id(&self) -> &str {
        &self.id
    }

    fn node_type(&self) -> &str {
        "http"
    }

    fn validate(&self) -> bool {
        !self.config.url.trim().is_empty()
            && ALLOWED_METHODS.contains(&self.config.method.to_uppercase().as_str())
    }

    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeResult, NodeError> {
        let cfg = &self.config;
        let url = template::render_template(&cfg.url, ctx);
        let method = cfg.method.to_uppercase();

        let mut headers: Vec<(String, String)> = cfg
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), rendered_string(v, ctx)))
            .collect();
        headers.extend(self.auth_headers(ctx));
        let query: Vec<(String, String)> = cfg
            .query_params
            .iter()
            .map(|(k, v)| (k.clone(), rendered_string(v, ctx)))
            .collect();
        let body = cfg.body.as_ref().map(|b| template::render_value(b, ctx));

        let max_attempts = cfg.retry + 1;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let request = self.build_request(&method, &url, &headers, &query, body.as_ref())?;
            match request.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    // Anything below 500 is final, success or not.
                    if status < 500 {
                        return self.process_response(response, &url, &method).await;
                    }
                    last_error = format!("server returned status {}", status);
                    tracing::warn!(node_id = %self.id, status, attempt, "http attempt failed");
                }
                Err(e) => {
                    last_error = if e.is_timeout() {
                        format!("request timed out after {}ms", cfg.timeout)
                    } else {
                        format!("request error: {}", e)
                    };
                    tracing::warn!(node_id = %self.id, attempt, error = %last_error, "http attempt failed");
                }
            }
            if attempt < max_attempts {
                tokio::time::sleep(Duration::from_millis(cfg.retry_delay)).await;
            }
        }

        Ok(NodeResult::failure(last_error)
            .with("status_code", 503)
            .with("url", url)
            .with("method", method))
    }
}

impl HttpNode {
    fn auth_headers(&self, ctx: &ExecutionContext) -> Vec<(String, String)> {
        match &self.config.auth {
            None => Vec::new(),
            Some(AuthConfig::Bearer { token }) => {
                let token = template::render_template(token, ctx);
                vec![("Authorization".to_string(), format!("Bearer {}", token))]
            }
            Some(AuthConfig::Basic { username, password }) => {
                let pair = format!(
                    "{}:{}",
                    template::render_template(username, ctx),
                    template::render_template(password, ctx)
                );
                vec![(
                    "Authorization".to_string(),
                    format!("Basic {}", STANDARD.encode(pair)),
                )]
            }
            Some(AuthConfig::ApiKey { key, header }) => {
                vec![(header.clone(), template::render_template(key, ctx))]
            }
        }
    }

    fn build_request(
        &self,
        method: &str,
        url: &str,
        headers: &[(String, String)],
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<reqwest::RequestBuilder, NodeError> {
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| NodeError::Configuration(format!("unsupported method: {}", method)))?;
        let has_body_slot = matches!(method.as_str(), "POST" | "PUT" | "PATCH");

        let mut request = self.client.request(method, url);
        if !query.is_empty() {
            request = request.query(query);
        }
        for (key, value) in headers {
            request = request.header(key, value);
        }

        if has_body_slot {
            if let Some(body) = body.filter(|b| !b.is_null()) {
                let content_type = headers
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
                    .map(|(_, v)| v.to_lowercase())
                    .unwrap_or_default();
                request = if content_type.contains("application/json") {
                    request.json(body)
                } else if content_type.contains("application/x-www-form-urlencoded") {
                    let form: Vec<(String, String)> = body
                        .as_object()
                        .map(|m| {
                            m.iter()
                                .map(|(k, v)| (k.clone(), plain_string(v)))
                                .collect()
                        })
                        .unwrap_or_default();
                    request.form(&form)
                } else {
                    request.body(plain_string(body))
                };
            }
        }

        Ok(request.timeout(Duration::from_millis(self.config.timeout)))
    }

    async fn process_response(
        &self,
        response: reqwest::Response,
        url: &str,
        method: &str,
    ) -> Result<NodeResult, NodeError> {
        let status = response.status().as_u16();
        let headers: Map<String, Value> = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.to_string(),
                    Value::String(v.to_str().unwrap_or("").to_string()),
                )
            })
            .collect();
        let content_type = headers
            .get("content-type")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_lowercase();

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                return Ok(NodeResult::failure(format!("failed to read response body: {}", e))
                    .with("status_code", status)
                    .with("url", url)
                    .with("method", method));
            }
        };

        let wants_json = self.config.response_format == ResponseFormat::Json
            || (self.config.response_format == ResponseFormat::Auto
                && content_type.contains("application/json"));
        let mut parse_error = None;
        let parsed = if wants_json {
            match serde_json::from_str::<Value>(&text) {
                Ok(value) => value,
                Err(e) => {
                    parse_error = Some(e.to_string());
                    Value::String(text)
                }
            }
        } else {
            Value::String(text)
        };

        let output = match self.config.output_path.as_deref() {
            Some(path) if !path.trim().is_empty() => apply_output_path(&parsed, path),
            _ => parsed,
        };

        let success = self.config.success_codes.contains(&status);
        let mut result = if success {
            NodeResult::success(output)
        } else {
            NodeResult::failure(format!("status {} not accepted", status)).with("output", output)
        };
        if let Some(parse_error) = parse_error {
            result = result.with("parse_error", parse_error);
        }
        Ok(result
            .with("status_code", status)
            .with("headers", Value::Object(headers))
            .with("url", url)
            .with("method", method))
    }
}

/// Walk a simplified JSONPath (`$.a.b[0].c`) into a response body.
/// Absent locations yield null; an empty path yields the whole body.
fn apply_output_path(body: &Value, path: &str) -> Value {
    let mut path = path.trim();
    path = path
        .strip_prefix("$.")
        .or_else(|| path.strip_prefix('$'))
        .unwrap_or(path);
    if path.is_empty() {
        return body.clone();
    }

    let mut segments: Vec<&str> = Vec::new();
    for part in path.split('.') {
        for (i, piece) in part.split('[').enumerate() {
            let piece = if i == 0 {
                piece
            } else {
                piece.trim_end_matches(']')
            };
            if !piece.is_empty() {
                segments.push(piece);
            }
        }
    }

    template::lookup_segments(body, &segments)
        .cloned()
        .unwrap_or(Value::Null)
}

/// Rendered string form for header/query values.
fn rendered_string(value: &Value, ctx: &ExecutionContext) -> String {
    plain_string(&template::render_value(value, ctx))
}

fn plain_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub struct HttpNodeFactory;

impl NodeFactory for HttpNodeFactory {
    fn create(
        &self,
        node_id: &str,
        config: &Map<String, Value>,
    ) -> Result<Box<dyn Node>, NodeError> {
        let config: HttpConfig = serde_json::from_value(Value::Object(config.clone()))
            .map_err(|e| NodeError::Configuration(format!("invalid http config: {}", e)))?;

        let mut builder = reqwest::Client::builder();
        if !config.follow_redirects {
            builder = builder.redirect(reqwest::redirect::Policy::none());
        }
        if !config.verify_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder
            .build()
            .map_err(|e| NodeError::Configuration(format!("failed to build http client: {}", e)))?;

        Ok(Box::new(HttpNode {
            id: node_id.to_string(),
            config,
            client,
        }))
    }

    fn node_type(&self) -> &str {
        "http"
    }

    fn metadata(&self) -> NodeTypeInfo {
        NodeTypeInfo {
            description: "Make HTTP requests with templated config".to_string(),
            category: "network".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(config: Value) -> HttpNode {
        HttpNode {
            id: "req".to_string(),
            config: serde_json::from_value(config).unwrap(),
            client: reqwest::Client::new(),
        }
    }

    #[test]
    fn output_path_walks_objects_and_indices() {
        let body = json!({"data": {"items": [{"id": 42}]}});
        assert_eq!(apply_output_path(&body, "$.data.items[0].id"), json!(42));
        assert_eq!(apply_output_path(&body, "data.items[0].id"), json!(42));
        assert_eq!(apply_output_path(&body, "$"), body);
        assert_eq!(apply_output_path(&body, ""), body);
        assert_eq!(apply_output_path(&body, "$.data.missing"), Value::Null);
        assert_eq!(apply_output_path(&body, "$.data.items[9].id"), Value::Null);
    }

    #[test]
    fn config_defaults() {
        let config: HttpConfig =
            serde_json::from_value(json!({"url": "http://example.com"})).unwrap();
        assert_eq!(config.method, "GET");
        assert_eq!(config.timeout, 30_000);
        assert_eq!(config.retry, 0);
        assert_eq!(config.retry_delay, 1_000);
        assert_eq!(config.success_codes, vec![200, 201, 202, 204]);
        assert_eq!(config.response_format, ResponseFormat::Auto);
        assert!(config.follow_redirects);
        assert!(config.verify_ssl);
    }

    #[test]
    fn validate_requires_url_and_known_method() {
        assert!(node(json!({"url": "http://example.com"})).validate());
        assert!(node(json!({"url": "http://example.com", "method": "patch"})).validate());
        assert!(!node(json!({"url": ""})).validate());
        assert!(!node(json!({"url": "http://example.com", "method": "BREW"})).validate());
    }

    #[test]
    fn api_key_auth_uses_configured_header() {
        let ctx = ExecutionContext::default();
        let n = node(json!({
            "url": "http://example.com",
            "auth": {"type": "api_key", "key": "k123", "header": "X-Custom"}
        }));
        assert_eq!(
            n.auth_headers(&ctx),
            vec![("X-Custom".to_string(), "k123".to_string())]
        );
    }

    #[test]
    fn basic_auth_is_base64_of_pair() {
        let ctx = ExecutionContext::default();
        let n = node(json!({
            "url": "http://example.com",
            "auth": {"type": "basic", "username": "u", "password": "p"}
        }));
        let headers = n.auth_headers(&ctx);
        assert_eq!(headers[0].1, format!("Basic {}", STANDARD.encode("u:p")));
    }
}
