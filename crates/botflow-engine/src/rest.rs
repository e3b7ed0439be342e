//! Outbound HTTP step execution.
//!
//! Failures never escape this module as errors: a network fault or a
//! non-2xx status becomes a structured `RestOutcome`, and the interpreter
//! routes it via the `"error"` edge so authors can design explicit
//! error-handling paths.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};
use tracing::{debug, warn};

use botflow_core::error::{FlowError, Result};
use botflow_graph::{BodyEncoding, HttpMethod, RestPayload};

use crate::arith::fold_arithmetic;
use crate::vars::{get_path, resolve_templates, value_text};

/// Structured result of one REST step.
#[derive(Debug, Clone)]
pub struct RestOutcome {
    pub success: bool,
    pub status: Option<u16>,
    pub data: Value,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl RestOutcome {
    fn failure(status: Option<u16>, error: String, elapsed_ms: u64) -> Self {
        Self {
            success: false,
            status,
            data: Value::Null,
            error: Some(error),
            elapsed_ms,
        }
    }

    /// The shape stored under the step-output key: later steps reference
    /// `<key>.data`, `<key>.status`, and `<key>.error`.
    pub fn to_value(&self) -> Value {
        json!({
            "data": self.data,
            "status": self.status,
            "error": self.error,
            "elapsed_ms": self.elapsed_ms,
        })
    }
}

pub struct RestExecutor {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl RestExecutor {
    pub fn new(default_timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("Botflow/0.3")
            .build()
            .map_err(|e| FlowError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            default_timeout: Duration::from_secs(default_timeout_secs),
        })
    }

    /// Execute one REST step against the current variable map.
    pub async fn execute(&self, payload: &RestPayload, vars: &HashMap<String, Value>) -> RestOutcome {
        let started = Instant::now();

        let url = fold_arithmetic(&resolve_templates(&payload.url, vars));
        debug!(method = %payload.method, url = %url, "Executing REST step");

        let mut request = match payload.method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
            HttpMethod::Put => self.client.put(&url),
            HttpMethod::Patch => self.client.patch(&url),
            HttpMethod::Delete => self.client.delete(&url),
        };

        for (key, raw) in &payload.headers {
            let value = fold_arithmetic(&resolve_templates(raw, vars));
            match (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                (Ok(name), Ok(value)) => request = request.header(name, value),
                _ => warn!(header = %key, "Skipping malformed header"),
            }
        }

        if let Some(raw_body) = &payload.body {
            let text = fold_arithmetic(&resolve_templates(raw_body, vars));
            request = encode_body(request, payload.content_type, text);
        }

        let timeout = payload
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);

        let response = match request.timeout(timeout).send().await {
            Ok(r) => r,
            Err(e) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                let status = e.status().map(|s| s.as_u16());
                warn!(url = %url, error = %e, "REST step failed to reach endpoint");
                return RestOutcome::failure(status, e.to_string(), elapsed_ms);
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(t) => t,
            Err(e) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                return RestOutcome::failure(
                    Some(status.as_u16()),
                    format!("Failed to read response body: {}", e),
                    elapsed_ms,
                );
            }
        };
        let parsed = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if !status.is_success() {
            let message = extract_error_message(&parsed).unwrap_or_else(|| {
                format!(
                    "HTTP {} {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                )
            });
            return RestOutcome::failure(Some(status.as_u16()), message, elapsed_ms);
        }

        let data = shape_response(parsed, payload, vars);
        RestOutcome {
            success: true,
            status: Some(status.as_u16()),
            data,
            error: None,
            elapsed_ms,
        }
    }
}

fn encode_body(
    request: reqwest::RequestBuilder,
    encoding: BodyEncoding,
    text: String,
) -> reqwest::RequestBuilder {
    match encoding {
        BodyEncoding::Json => match serde_json::from_str::<Value>(&text) {
            Ok(value) => request.json(&value),
            // Unparseable bodies go out as-is; the endpoint gets to complain.
            Err(_) => request
                .header(CONTENT_TYPE, "application/json")
                .body(text),
        },
        BodyEncoding::Multipart => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(fields)) => {
                let mut form = reqwest::multipart::Form::new();
                for (key, value) in fields {
                    form = form.text(key, value_text(&value));
                }
                request.multipart(form)
            }
            _ => request.body(text),
        },
        BodyEncoding::FormUrlencoded => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(fields)) => {
                let pairs: Vec<(String, String)> = fields
                    .into_iter()
                    .map(|(k, v)| (k, value_text(&v)))
                    .collect();
                request.form(&pairs)
            }
            _ => request
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(text),
        },
    }
}

/// Narrow to the configured sub-path, then apply the array filter.
fn shape_response(body: Value, payload: &RestPayload, vars: &HashMap<String, Value>) -> Value {
    let mut data = match &payload.response_path {
        Some(path) => get_path(&body, path).unwrap_or(Value::Null),
        None => body,
    };

    if let Some(filter) = &payload.filter {
        if let Value::Array(items) = &data {
            let wanted = resolve_templates(&filter.value, vars);
            let kept: Vec<Value> = items
                .iter()
                .filter(|item| {
                    item.get(&filter.field)
                        .map(|v| value_text(v) == wanted)
                        .unwrap_or(false)
                })
                .cloned()
                .collect();
            data = Value::Array(kept);
        }
    }

    data
}

/// Best-effort message extraction from common error-body shapes.
fn extract_error_message(body: &Value) -> Option<String> {
    for path in ["message", "error.message", "error", "error_description"] {
        if let Some(found) = get_path(body, path) {
            if let Value::String(s) = found {
                if !s.is_empty() {
                    return Some(s);
                }
            }
        }
    }
    None
}
