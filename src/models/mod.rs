//! External model boundaries.
//!
//! The classification and generation models are collaborators behind traits;
//! the pipeline never assumes how they are hosted. `http` provides backends
//! that talk to inference endpoints.

pub mod http;

pub use http::{HttpClassifier, HttpGenerator};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ModelError};

/// Default classification input window, in tokens.
pub const DEFAULT_MAX_INPUT_TOKENS: usize = 128;

/// One label/score pair as reported by a classification model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

/// Text-classification model over the four department labels.
#[async_trait]
pub trait ClassificationModel: Send + Sync {
    /// Model identifier for logs and errors.
    fn model_name(&self) -> &str;

    /// Size of the model's fixed input window, in tokens.
    fn max_input_tokens(&self) -> usize {
        DEFAULT_MAX_INPUT_TOKENS
    }

    /// Score the (already windowed) input against every label.
    async fn scores(&self, text: &str) -> Result<Vec<LabelScore>, ModelError>;
}

/// Decoding parameters for the generation model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GenerationParams {
    pub num_beams: u32,
    pub max_new_tokens: u32,
    pub no_repeat_ngram_size: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            num_beams: 4,
            max_new_tokens: 160,
            no_repeat_ngram_size: 3,
        }
    }
}

/// Text-generation model.
#[async_trait]
pub trait GenerationModel: Send + Sync {
    /// Model identifier for logs and errors.
    fn model_name(&self) -> &str;

    /// Generate text for `prompt`. The output may still contain special tokens.
    async fn generate(&self, prompt: &str, params: &GenerationParams)
    -> Result<String, ModelError>;
}

/// Endpoint configuration for both model backends.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub classifier_url: Option<String>,
    pub generator_url: Option<String>,
    pub api_token: Option<secrecy::SecretString>,
    pub max_input_tokens: usize,
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            classifier_url: None,
            generator_url: None,
            api_token: None,
            max_input_tokens: DEFAULT_MAX_INPUT_TOKENS,
            request_timeout_secs: 60,
        }
    }
}

impl ModelConfig {
    /// Build from `CLASSIFIER_URL`, `GENERATOR_URL`, `MODEL_API_TOKEN`,
    /// `CLASSIFIER_MAX_TOKENS` and `MODEL_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|s| !s.trim().is_empty());

        Self {
            classifier_url: non_empty("CLASSIFIER_URL"),
            generator_url: non_empty("GENERATOR_URL"),
            api_token: non_empty("MODEL_API_TOKEN").map(secrecy::SecretString::from),
            max_input_tokens: std::env::var("CLASSIFIER_MAX_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_MAX_INPUT_TOKENS),
            request_timeout_secs: std::env::var("MODEL_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
        }
    }
}

/// Create the classification backend, or `None` when no endpoint is configured.
pub fn create_classifier(
    config: &ModelConfig,
) -> Result<Option<Arc<dyn ClassificationModel>>, ConfigError> {
    let Some(url) = config.classifier_url.as_deref() else {
        tracing::warn!("CLASSIFIER_URL not set; classification will report the model as unavailable");
        return Ok(None);
    };
    let model = HttpClassifier::new(url, config)?;
    tracing::info!("Using classifier endpoint {url}");
    Ok(Some(Arc::new(model)))
}

/// Create the generation backend, or `None` when no endpoint is configured.
pub fn create_generator(
    config: &ModelConfig,
) -> Result<Option<Arc<dyn GenerationModel>>, ConfigError> {
    let Some(url) = config.generator_url.as_deref() else {
        tracing::warn!("GENERATOR_URL not set; replies will use fallback templates");
        return Ok(None);
    };
    let model = HttpGenerator::new(url, config)?;
    tracing::info!("Using generator endpoint {url}");
    Ok(Some(Arc::new(model)))
}
