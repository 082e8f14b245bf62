//! The single narrow capability the pipeline is built on: send a system
//! instruction and a user payload, get back a value of a declared shape.
//!
//! One `LlmGateway` instance is created per process and shared (behind an
//! `Arc`) by every personalizer and the judge. Callers go through
//! [`generate`], which decodes and validates the answer at this boundary so
//! no caller ever sees an unvalidated response.
//!
//! No caching, no retry.

pub mod openai;
pub mod shapes;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::GatewayError;
use shapes::{OutputShape, ResponseShape};

pub use openai::OpenAiGateway;

/// Which pipeline role issues a request; the gateway maps roles to models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Personalizer,
    Judge,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Personalizer => write!(f, "personalizer"),
            Self::Judge => write!(f, "judge"),
        }
    }
}

/// A prompt before a response shape has been attached to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub role: Role,
    pub system: String,
    pub user: String,
    pub temperature: Option<f64>,
}

impl Prompt {
    pub fn new(role: Role, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            role,
            system: system.into(),
            user: user.into(),
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn into_request(self, shape: OutputShape) -> GatewayRequest {
        GatewayRequest {
            role: self.role,
            system: self.system,
            user: self.user,
            shape,
            temperature: self.temperature,
        }
    }
}

/// Wire-level request handed to an `LlmGateway`.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayRequest {
    pub role: Role,
    pub system: String,
    pub user: String,
    pub shape: OutputShape,
    pub temperature: Option<f64>,
}

/// Object-safe model capability.
///
/// Implementations return the raw JSON value the model produced for
/// `request.shape`; decoding into the typed shape happens in [`generate`].
#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn complete(&self, request: &GatewayRequest) -> Result<Value, GatewayError>;
}

/// Issue one call and decode the answer into `R`.
///
/// Fails with `SchemaViolation` when the JSON does not deserialize into `R`
/// or breaks one of `R`'s content rules.
pub async fn generate<R: ResponseShape>(
    gateway: &dyn LlmGateway,
    prompt: Prompt,
) -> Result<R, GatewayError> {
    let request = prompt.into_request(R::SHAPE);
    tracing::debug!(
        role = %request.role,
        shape = %request.shape,
        system_chars = request.system.len(),
        user_chars = request.user.len(),
        "gateway call"
    );

    let raw = gateway.complete(&request).await?;
    let parsed: R = serde_json::from_value(raw)
        .map_err(|e| GatewayError::schema(R::SHAPE, e.to_string()))?;
    parsed
        .validate()
        .map_err(|reason| GatewayError::schema(R::SHAPE, reason))?;
    Ok(parsed)
}

/// Issue one `Text` call per prompt and return the texts in prompt order.
///
/// Prompts are processed in windows of `concurrency`; within a window the
/// calls run concurrently, windows run one after another. Any failure aborts
/// the whole batch and nothing is returned.
pub async fn generate_texts(
    gateway: &dyn LlmGateway,
    prompts: Vec<Prompt>,
    concurrency: usize,
) -> Result<Vec<String>, GatewayError> {
    let mut texts = Vec::with_capacity(prompts.len());
    for window in prompts.chunks(concurrency.max(1)) {
        let calls = window
            .iter()
            .cloned()
            .map(|prompt| generate::<shapes::TextBlock>(gateway, prompt));
        let blocks = futures::future::try_join_all(calls).await?;
        texts.extend(blocks.into_iter().map(|b| b.text));
    }
    Ok(texts)
}
