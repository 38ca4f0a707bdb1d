//! HTTP backends for the classification and generation models.
//!
//! Both speak the JSON shape of Hugging Face style inference endpoints:
//! `{"inputs": ..., "parameters": {...}}` in, a list of label scores or
//! generated texts out.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::{ClassificationModel, GenerationModel, GenerationParams, LabelScore, ModelConfig};
use crate::error::{ConfigError, ModelError};

/// Shared request plumbing for both backends.
#[derive(Debug, Clone)]
struct Endpoint {
    client: reqwest::Client,
    url: reqwest::Url,
    token: Option<SecretString>,
}

impl Endpoint {
    fn new(url: &str, config: &ModelConfig) -> Result<Self, ConfigError> {
        let url = reqwest::Url::parse(url).map_err(|e| ConfigError::InvalidValue {
            key: "model endpoint".into(),
            message: format!("{url}: {e}"),
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "model endpoint".into(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            url,
            token: config.api_token.clone(),
        })
    }

    fn name(&self) -> &str {
        self.url.as_str()
    }

    async fn post<T: DeserializeOwned>(&self, body: serde_json::Value) -> Result<T, ModelError> {
        let mut request = self.client.post(self.url.clone()).json(&body);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ModelError::unavailable(self.name(), format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ModelError::unavailable(
                self.name(),
                format!("HTTP {status}: {}", detail.chars().take(200).collect::<String>()),
            ));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ModelError::InvalidResponse {
                model: self.name().to_string(),
                reason: e.to_string(),
            })
    }
}

// ── Classification ──────────────────────────────────────────────────

/// Classification endpoints answer either `[[{label, score}]]` or `[{label, score}]`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassificationResponse {
    Nested(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
}

impl ClassificationResponse {
    fn into_scores(self) -> Vec<LabelScore> {
        match self {
            Self::Nested(batches) => batches.into_iter().next().unwrap_or_default(),
            Self::Flat(scores) => scores,
        }
    }
}

/// Classification model served over HTTP.
pub struct HttpClassifier {
    endpoint: Endpoint,
    max_input_tokens: usize,
}

impl HttpClassifier {
    pub fn new(url: &str, config: &ModelConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            endpoint: Endpoint::new(url, config)?,
            max_input_tokens: config.max_input_tokens,
        })
    }
}

#[async_trait]
impl ClassificationModel for HttpClassifier {
    fn model_name(&self) -> &str {
        self.endpoint.name()
    }

    fn max_input_tokens(&self) -> usize {
        self.max_input_tokens
    }

    async fn scores(&self, text: &str) -> Result<Vec<LabelScore>, ModelError> {
        let body = json!({
            "inputs": text,
            "parameters": {
                "top_k": null,
                "truncation": true,
                "padding": "max_length",
                "max_length": self.max_input_tokens,
            },
        });
        let response: ClassificationResponse = self.endpoint.post(body).await?;
        Ok(response.into_scores())
    }
}

// ── Generation ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GeneratedText {
    generated_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GenerationResponse {
    List(Vec<GeneratedText>),
    Single(GeneratedText),
}

impl GenerationResponse {
    fn into_text(self) -> Option<String> {
        match self {
            Self::List(items) => items.into_iter().next().map(|g| g.generated_text),
            Self::Single(item) => Some(item.generated_text),
        }
    }
}

/// Generation model served over HTTP.
pub struct HttpGenerator {
    endpoint: Endpoint,
}

impl HttpGenerator {
    pub fn new(url: &str, config: &ModelConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            endpoint: Endpoint::new(url, config)?,
        })
    }
}

#[async_trait]
impl GenerationModel for HttpGenerator {
    fn model_name(&self) -> &str {
        self.endpoint.name()
    }

    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, ModelError> {
        let body = json!({
            "inputs": prompt,
            "parameters": {
                "num_beams": params.num_beams,
                "max_new_tokens": params.max_new_tokens,
                "no_repeat_ngram_size": params.no_repeat_ngram_size,
                "do_sample": false,
            },
        });
        let response: GenerationResponse = self.endpoint.post(body).await?;
        response
            .into_text()
            .ok_or_else(|| ModelError::InvalidResponse {
                model: self.endpoint.name().to_string(),
                reason: "empty generation list".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::routing::post;
    use axum::{Json, Router};
    use tokio::net::TcpListener;

    use super::*;

    /// Serve `app` on a random local port and return its base URL.
    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://127.0.0.1:{port}")
    }

    #[tokio::test]
    async fn classifier_parses_nested_scores_and_sends_window() {
        let seen = Arc::new(Mutex::new(None::<serde_json::Value>));
        let seen_handler = Arc::clone(&seen);
        let app = Router::new().route(
            "/classify",
            post(move |Json(body): Json<serde_json::Value>| {
                let seen = Arc::clone(&seen_handler);
                async move {
                    *seen.lock().unwrap() = Some(body);
                    Json(json!([[
                        {"label": "LABEL_1", "score": 0.8},
                        {"label": "LABEL_0", "score": 0.2}
                    ]]))
                }
            }),
        );
        let base = serve(app).await;
        let config = ModelConfig {
            max_input_tokens: 32,
            ..ModelConfig::default()
        };
        let classifier = HttpClassifier::new(&format!("{base}/classify"), &config).unwrap();

        let scores = classifier.scores("invoice question").await.unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].label, "LABEL_1");

        let body = seen.lock().unwrap().clone().unwrap();
        assert_eq!(body["inputs"], "invoice question");
        assert_eq!(body["parameters"]["max_length"], 32);
        assert_eq!(body["parameters"]["padding"], "max_length");
    }

    #[tokio::test]
    async fn classifier_accepts_flat_scores() {
        let app = Router::new().route(
            "/",
            post(|| async { Json(json!([{"label": "Support", "score": 0.9}])) }),
        );
        let base = serve(app).await;
        let classifier = HttpClassifier::new(&base, &ModelConfig::default()).unwrap();
        let scores = classifier.scores("help").await.unwrap();
        assert_eq!(scores, vec![LabelScore { label: "Support".into(), score: 0.9 }]);
    }

    #[tokio::test]
    async fn generator_sends_decoding_params() {
        let seen = Arc::new(Mutex::new(None::<serde_json::Value>));
        let seen_handler = Arc::clone(&seen);
        let app = Router::new().route(
            "/generate",
            post(move |Json(body): Json<serde_json::Value>| {
                let seen = Arc::clone(&seen_handler);
                async move {
                    *seen.lock().unwrap() = Some(body);
                    Json(json!([{"generated_text": "<pad> Hello there</s>"}]))
                }
            }),
        );
        let base = serve(app).await;
        let generator =
            HttpGenerator::new(&format!("{base}/generate"), &ModelConfig::default()).unwrap();

        let text = generator
            .generate("prompt", &GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(text, "<pad> Hello there</s>");

        let body = seen.lock().unwrap().clone().unwrap();
        assert_eq!(body["parameters"]["num_beams"], 4);
        assert_eq!(body["parameters"]["max_new_tokens"], 160);
        assert_eq!(body["parameters"]["no_repeat_ngram_size"], 3);
    }

    #[tokio::test]
    async fn server_error_maps_to_unavailable() {
        let app = Router::new().route(
            "/",
            post(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "loading") }),
        );
        let base = serve(app).await;
        let generator = HttpGenerator::new(&base, &ModelConfig::default()).unwrap();
        let err = generator
            .generate("prompt", &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let classifier =
            HttpClassifier::new(&format!("http://127.0.0.1:{port}/"), &ModelConfig::default())
                .unwrap();
        let err = classifier.scores("hello").await.unwrap_err();
        assert!(matches!(err, ModelError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn garbage_body_is_invalid_response() {
        let app = Router::new().route("/", post(|| async { "not json" }));
        let base = serve(app).await;
        let classifier = HttpClassifier::new(&base, &ModelConfig::default()).unwrap();
        let err = classifier.scores("hello").await.unwrap_err();
        assert!(matches!(err, ModelError::InvalidResponse { .. }));
    }

    #[test]
    fn invalid_url_is_config_error() {
        let err = HttpGenerator::new("not a url", &ModelConfig::default()).err().unwrap();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
