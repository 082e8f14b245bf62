//! Error taxonomy for the personalization pipeline.
//!
//! Two layers:
//!
//! | Type           | Raised by                 | Meaning                                   |
//! |----------------|---------------------------|-------------------------------------------|
//! | `GatewayError` | `gateway::*`              | model call failed or returned bad output  |
//! | `TailorError`  | personalizers, judge, CLI | any failure that aborts the current run   |
//!
//! Nothing is retried. Every error propagates to the strategy runner, which
//! halts the run; artifacts written by completed stages stay on disk.

use std::path::PathBuf;

use thiserror::Error;

use crate::gateway::shapes::OutputShape;

/// Failure of a single model call.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Connection, DNS, TLS or body-read failure.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The transport timeout elapsed before the model answered.
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    /// The provider answered with a non-success HTTP status.
    #[error("Provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The model declined to answer.
    #[error("Model refused the request: {0}")]
    Refusal(String),

    /// The response envelope or message content was not valid JSON.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The content parsed as JSON but does not conform to the declared shape.
    #[error("Response does not match shape {shape}: {reason}")]
    SchemaViolation { shape: OutputShape, reason: String },

    /// No API key was configured for the endpoint.
    #[error("No API key configured (set OPENAI_API_KEY or TAILOR_API_KEY)")]
    MissingCredentials,
}

impl GatewayError {
    pub fn schema(shape: OutputShape, reason: impl Into<String>) -> Self {
        Self::SchemaViolation {
            shape,
            reason: reason.into(),
        }
    }
}

/// Unified error type for every pipeline operation.
#[derive(Debug, Error)]
pub enum TailorError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// An operation ran before the stage it depends on.
    #[error("{personalizer}: `{operation}` cannot run in stage {stage}")]
    MissingStage {
        personalizer: String,
        operation: &'static str,
        stage: String,
    },

    /// A stage machine was asked to move along an edge it does not have.
    #[error("Illegal stage transition: {from} → {to}")]
    IllegalTransition { from: String, to: String },

    /// Reading or writing a run artifact failed.
    #[error("Artifact I/O failed at {}: {source}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl TailorError {
    pub fn missing_stage(
        personalizer: impl Into<String>,
        operation: &'static str,
        stage: impl std::fmt::Display,
    ) -> Self {
        Self::MissingStage {
            personalizer: personalizer.into(),
            operation,
            stage: stage.to_string(),
        }
    }

    pub fn artifact(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Artifact {
            path: path.into(),
            source,
        }
    }

    /// `true` when the failure came from the model endpoint rather than local state.
    pub fn is_gateway(&self) -> bool {
        matches!(self, Self::Gateway(_))
    }
}
