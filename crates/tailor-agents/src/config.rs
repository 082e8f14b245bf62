//! Runtime configuration for the gateway, the pipeline, and output paths.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Process environment (a `.env` file is loaded into it by `main`)
//! 2. Built-in defaults below
//!
//! ## Model roles
//!
//! | Role         | Env var                      | Default             |
//! |--------------|------------------------------|---------------------|
//! | personalizer | `TAILOR_PERSONALIZER_MODEL`  | gpt-4o-2024-08-06   |
//! | judge        | `TAILOR_JUDGE_MODEL`         | gpt-4o-2024-08-06   |

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::gateway::Role;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-2024-08-06";
/// Decomposition calls run greedy so repeated runs split chapters the same way.
const DEFAULT_EXTRACTION_TEMPERATURE: f64 = 0.0;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;
const DEFAULT_MAX_CONCURRENCY: usize = 1;
const DEFAULT_OUTPUT_DIR: &str = "output";
const DEFAULT_EVAL_DIR: &str = "evals";

const ENV_BASE_URL: &str = "TAILOR_BASE_URL";
const ENV_API_KEY: &str = "TAILOR_API_KEY";
const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
const ENV_PERSONALIZER_MODEL: &str = "TAILOR_PERSONALIZER_MODEL";
const ENV_JUDGE_MODEL: &str = "TAILOR_JUDGE_MODEL";
const ENV_EXTRACTION_TEMPERATURE: &str = "TAILOR_EXTRACTION_TEMPERATURE";
const ENV_REQUEST_TIMEOUT_SECS: &str = "TAILOR_REQUEST_TIMEOUT_SECS";
const ENV_MAX_CONCURRENCY: &str = "TAILOR_MAX_CONCURRENCY";
const ENV_OUTPUT_DIR: &str = "TAILOR_OUTPUT_DIR";
const ENV_EVAL_DIR: &str = "TAILOR_EVAL_DIR";

/// OpenAI-compatible endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Base URL, without the trailing `/chat/completions`.
    pub base_url: String,
    /// Bearer token. `None` means credentials were never configured.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: env::var(ENV_BASE_URL).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            api_key: env::var(ENV_API_KEY)
                .or_else(|_| env::var(ENV_OPENAI_API_KEY))
                .ok()
                .filter(|k| !k.trim().is_empty()),
            request_timeout_secs: parse_env(ENV_REQUEST_TIMEOUT_SECS)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl EndpointConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Per-role model assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub personalizer: String,
    pub judge: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            personalizer: env::var(ENV_PERSONALIZER_MODEL)
                .unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            judge: env::var(ENV_JUDGE_MODEL).unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
        }
    }
}

impl ModelConfig {
    pub fn for_role(&self, role: Role) -> &str {
        match role {
            Role::Personalizer => &self.personalizer,
            Role::Judge => &self.judge,
        }
    }
}

/// Knobs that shape how the pipeline issues calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Sampling temperature for concept and section extraction.
    pub extraction_temperature: f64,
    /// Per-unit calls issued at once. `1` keeps the pipeline sequential.
    pub max_concurrency: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            extraction_temperature: parse_env(ENV_EXTRACTION_TEMPERATURE)
                .unwrap_or(DEFAULT_EXTRACTION_TEMPERATURE),
            max_concurrency: parse_env(ENV_MAX_CONCURRENCY).unwrap_or(DEFAULT_MAX_CONCURRENCY),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TailorConfig {
    pub endpoint: EndpointConfig,
    pub models: ModelConfig,
    pub generation: GenerationSettings,
    /// Root under which `<course>/<chapter>/<timestamp>` run directories go.
    pub output_dir: PathBuf,
    /// Root for standalone evaluation runs.
    pub eval_dir: PathBuf,
}

impl Default for TailorConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            models: ModelConfig::default(),
            generation: GenerationSettings::default(),
            output_dir: env::var(ENV_OUTPUT_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            eval_dir: env::var(ENV_EVAL_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_EVAL_DIR)),
        }
    }
}

impl TailorConfig {
    /// Build from environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Validate all sub-configs; return an error string if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=2.0).contains(&self.generation.extraction_temperature) {
            return Err(format!(
                "extraction_temperature must be in [0, 2], got {}",
                self.generation.extraction_temperature
            ));
        }
        if self.generation.max_concurrency == 0 {
            return Err("max_concurrency must be > 0".to_string());
        }
        if self.endpoint.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be > 0".to_string());
        }
        if self.endpoint.base_url.trim().is_empty() {
            return Err("base_url must not be empty".to_string());
        }
        if self.models.personalizer.trim().is_empty() || self.models.judge.trim().is_empty() {
            return Err("model names must not be empty".to_string());
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(key, value = %raw, "ignoring unparsable environment value");
                None
            }
        },
        Err(_) => None,
    }
}
