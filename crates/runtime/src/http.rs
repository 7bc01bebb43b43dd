use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use orbitflow_expression::Environment;
use reqwest::Method;
use serde_json::{Map, Value};

use crate::context::NodeContext;
use crate::error::EngineError;
use crate::node_executor::NodeExecutor;

const DEFAULT_SUCCESS_CODES: [u16; 4] = [200, 201, 202, 204];

fn render_str(text: &str, env: &Environment) -> Result<String, EngineError> {
    let rendered = orbitflow_expression::render_template(text, env)
        .map_err(|error| EngineError::Permanent(error.to_string()))?;
    Ok(match rendered {
        Value::String(text) => text,
        other => other.to_string(),
    })
}

fn render_str_map(value: Option<&Value>, env: &Environment) -> Result<Vec<(String, String)>, EngineError> {
    let Some(Value::Object(fields)) = value else {
        return Ok(Vec::new());
    };

    fields
        .iter()
        .map(|(key, field)| {
            let text = field.as_str().unwrap_or_default();
            render_str(text, env).map(|rendered| (key.clone(), rendered))
        })
        .collect()
}

fn classify_status(status: reqwest::StatusCode) -> EngineError {
    let code = status.as_u16();
    let message = format!("HTTP {code} {}", status.canonical_reason().unwrap_or(""));
    if code >= 500 || code == 429 || code == 408 {
        EngineError::Transient(message)
    } else {
        EngineError::Permanent(message)
    }
}

fn classify_transport_error(error: &reqwest::Error) -> EngineError {
    if error.is_timeout() || error.is_connect() {
        EngineError::Transient(error.to_string())
    } else {
        EngineError::Permanent(error.to_string())
    }
}

/// `action:http` — issues an HTTP request with every templated field
/// expanded from the environment first.
pub struct HttpActionExecutor;

#[async_trait]
impl NodeExecutor for HttpActionExecutor {
    async fn execute(
        &self,
        ctx: &NodeContext,
        config: &Value,
        env: &Environment,
    ) -> Result<Value, EngineError> {
        let method_text = config
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::Permanent("action:http requires a \"method\" string".to_owned()))?;
        let method = Method::from_bytes(method_text.as_bytes())
            .map_err(|_| EngineError::Permanent(format!("action:http invalid method: {method_text}")))?;

        let url_text = config
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::Permanent("action:http requires a \"url\" string".to_owned()))?;
        let url = render_str(url_text, env)?;

        let headers = render_str_map(config.get("headers"), env)?;
        let query = render_str_map(config.get("query"), env)?;

        let body = resolve_body(config, env)?;

        let timeout_seconds = config.get("timeout").and_then(Value::as_f64);

        let mut request = ctx.http_client.request(method, &url);
        for (key, value) in &query {
            request = request.query(&[(key.as_str(), value.as_str())]);
        }
        for (key, value) in &headers {
            request = request.header(key.as_str(), value.as_str());
        }
        if let Some(timeout_seconds) = timeout_seconds {
            request = request.timeout(Duration::from_secs_f64(timeout_seconds.max(0.0)));
        }
        if let Some(body) = &body {
            request = request.json(body);
        }

        if ctx.cancellation.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let response = request.send().await.map_err(|error| classify_transport_error(&error))?;
        let status = response.status();

        let success = match config.get("success_codes").and_then(Value::as_array) {
            Some(codes) => {
                let codes: Vec<u16> = codes.iter().filter_map(Value::as_u64).map(|code| code as u16).collect();
                codes.contains(&status.as_u16())
            }
            None => status.is_success() || DEFAULT_SUCCESS_CODES.contains(&status.as_u16()),
        };

        let mut response_headers = Map::new();
        for (key, value) in response.headers() {
            if !response_headers.contains_key(key.as_str()) {
                response_headers.insert(
                    key.as_str().to_owned(),
                    Value::String(value.to_str().unwrap_or_default().to_owned()),
                );
            }
        }

        if !success {
            return Err(classify_status(status));
        }

        let response_type = config.get("response_type").and_then(Value::as_str).unwrap_or("json");
        let body_bytes = response
            .bytes()
            .await
            .map_err(|error| classify_transport_error(&error))?;

        let response_body = match response_type {
            "binary" => Value::String(STANDARD.encode(&body_bytes)),
            "text" => Value::String(String::from_utf8_lossy(&body_bytes).into_owned()),
            _ => serde_json::from_slice(&body_bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body_bytes).into_owned())),
        };

        Ok(serde_json::json!({
            "status_code": status.as_u16(),
            "status": status.canonical_reason().unwrap_or(""),
            "headers": Value::Object(response_headers),
            "body": response_body,
        }))
    }
}

fn resolve_body(config: &Value, env: &Environment) -> Result<Option<Value>, EngineError> {
    if let Some(template) = config.get("body_template").and_then(Value::as_str) {
        let rendered = orbitflow_expression::render_template(template, env)
            .map_err(|error| EngineError::Permanent(error.to_string()))?;
        return Ok(Some(match rendered {
            Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
            other => other,
        }));
    }

    Ok(config.get("body").cloned())
}
