//! `LlmGateway` over an OpenAI-compatible `/chat/completions` endpoint using
//! structured outputs (`response_format = json_schema`).

use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{GatewayRequest, LlmGateway};
use crate::config::{EndpointConfig, ModelConfig, TailorConfig};
use crate::errors::GatewayError;

/// Structured-output client shared by every pipeline role.
pub struct OpenAiGateway {
    client: reqwest::Client,
    endpoint: EndpointConfig,
    models: ModelConfig,
}

impl OpenAiGateway {
    pub fn from_config(config: &TailorConfig) -> Result<Self, GatewayError> {
        if config.endpoint.api_key.is_none() {
            return Err(GatewayError::MissingCredentials);
        }
        let client = reqwest::Client::builder()
            .timeout(config.endpoint.request_timeout())
            .build()
            .map_err(|e| GatewayError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            models: config.models.clone(),
        })
    }

    fn request_body(&self, request: &GatewayRequest) -> Value {
        build_request_body(self.models.for_role(request.role), request)
    }
}

#[async_trait]
impl LlmGateway for OpenAiGateway {
    async fn complete(&self, request: &GatewayRequest) -> Result<Value, GatewayError> {
        let start = Instant::now();
        let api_key = self
            .endpoint
            .api_key
            .as_deref()
            .ok_or(GatewayError::MissingCredentials)?;

        let response = self
            .client
            .post(self.endpoint.completions_url())
            .bearer_auth(api_key)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(status_error(status, response.text().await));
        }

        let envelope: ChatResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;

        tracing::debug!(
            role = %request.role,
            shape = %request.shape,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "model call complete"
        );

        parse_content(envelope)
    }
}

impl OpenAiGateway {
    fn classify(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout(self.endpoint.request_timeout_secs)
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

/// Build the JSON request body for one call.
pub(crate) fn build_request_body(model: &str, request: &GatewayRequest) -> Value {
    let mut body = json!({
        "model": model,
        "messages": [
            {"role": "system", "content": request.system},
            {"role": "user", "content": request.user},
        ],
        "response_format": {
            "type": "json_schema",
            "json_schema": {
                "name": request.shape.schema_name(),
                "strict": true,
                "schema": request.shape.schema(),
            },
        },
    });
    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }
    body
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

/// Pull the structured JSON out of the first choice.
/// Status failure carrying the response body, or why it could not be read.
pub(crate) fn status_error<E: std::fmt::Display>(
    status: u16,
    body: Result<String, E>,
) -> GatewayError {
    let body = body.unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
    GatewayError::Status { status, body }
}

pub(crate) fn parse_content(envelope: ChatResponse) -> Result<Value, GatewayError> {
    let message = envelope
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| GatewayError::MalformedResponse("response has no choices".to_string()))?;

    if let Some(refusal) = message.refusal.filter(|r| !r.trim().is_empty()) {
        return Err(GatewayError::Refusal(refusal));
    }

    let content = message
        .content
        .ok_or_else(|| GatewayError::MalformedResponse("message has no content".to_string()))?;
    serde_json::from_str(&content)
        .map_err(|e| GatewayError::MalformedResponse(format!("content is not JSON: {e}")))
}
