use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::models::chat::ChatMessage;

/// Decoding settings sent with every generation request.
const MAX_LENGTH: u32 = 500;
const NUM_BEAMS: u32 = 16;
const NO_REPEAT_NGRAM_SIZE: u32 = 14;
const LENGTH_PENALTY: f32 = 0.2;
/// Turns of session history forwarded to the model.
const HISTORY_TURNS: usize = 6;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Request(String),
    #[error("generation API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("failed to parse generation response: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAnswer {
    pub text: String,
    /// Sequence log-likelihood reported by the model, if any.
    pub log_likelihood: Option<f64>,
}

#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(
        &self,
        question: &str,
        context: Option<&str>,
        history: &[ChatMessage],
    ) -> Result<GeneratedAnswer, GenerationError>;
}

pub fn build_prompt(question: &str, context: Option<&str>) -> String {
    format!(
        "Answer this health question: {} [CONTEXT: {}]",
        question.trim(),
        context.map(str::trim).unwrap_or("")
    )
}

#[derive(Debug, Serialize)]
struct HistoryTurn<'a> {
    role: &'a str,
    message: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    prompt: String,
    max_length: u32,
    num_beams: u32,
    no_repeat_ngram_size: u32,
    length_penalty: f32,
    early_stopping: bool,
    do_sample: bool,
    history: Vec<HistoryTurn<'a>>,
}

#[derive(Debug, Deserialize)]
struct GenerationOutput {
    #[serde(alias = "generated_text")]
    text: String,
    #[serde(default, alias = "sequence_score", alias = "log_likelihood")]
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GenerationResponse {
    Single(GenerationOutput),
    Batch(Vec<GenerationOutput>),
}

impl GenerationResponse {
    fn into_answer(self) -> Option<GeneratedAnswer> {
        let output = match self {
            GenerationResponse::Single(output) => output,
            GenerationResponse::Batch(outputs) => outputs.into_iter().next()?,
        };
        Some(GeneratedAnswer {
            text: output.text.trim().to_string(),
            log_likelihood: output.score,
        })
    }
}

/// Client for a text-generation inference endpoint.
#[derive(Debug, Clone)]
pub struct HttpGenerator {
    client: Client,
    url: String,
    api_key: Option<String>,
    max_retry: Duration,
}

impl HttpGenerator {
    pub fn new(url: String, api_key: Option<String>, max_retry: Duration) -> Self {
        Self {
            client: Client::new(),
            url,
            api_key,
            max_retry,
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(10),
            multiplier: 2.0,
            max_elapsed_time: Some(self.max_retry),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn generate(
        &self,
        question: &str,
        context: Option<&str>,
        history: &[ChatMessage],
    ) -> Result<GeneratedAnswer, GenerationError> {
        let recent = &history[history.len().saturating_sub(HISTORY_TURNS)..];
        let request = GenerationRequest {
            prompt: build_prompt(question, context),
            max_length: MAX_LENGTH,
            num_beams: NUM_BEAMS,
            no_repeat_ngram_size: NO_REPEAT_NGRAM_SIZE,
            length_penalty: LENGTH_PENALTY,
            early_stopping: true,
            do_sample: false,
            history: recent
                .iter()
                .map(|m| HistoryTurn {
                    role: m.role.as_str(),
                    message: &m.message,
                })
                .collect(),
        };

        // Connection errors, timeouts, 429 and 5xx gateway errors are retried
        let operation = || async {
            let mut builder = self
                .client
                .post(&self.url)
                .header("content-type", "application/json")
                .timeout(Duration::from_secs(120))
                .json(&request);
            if let Some(ref key) = self.api_key {
                builder = builder.bearer_auth(key);
            }

            let response = builder.send().await.map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    tracing::warn!("Generation API connection error (retrying): {}", e);
                    backoff::Error::transient(GenerationError::Request(e.to_string()))
                } else {
                    backoff::Error::permanent(GenerationError::Request(e.to_string()))
                }
            })?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| backoff::Error::permanent(GenerationError::Request(e.to_string())))?;

            if matches!(status.as_u16(), 429 | 500 | 502 | 503) {
                tracing::warn!("Generation API returned {} (retrying)", status);
                return Err(backoff::Error::transient(GenerationError::Api {
                    status: status.as_u16(),
                    body,
                }));
            }

            if !status.is_success() {
                return Err(backoff::Error::permanent(GenerationError::Api {
                    status: status.as_u16(),
                    body,
                }));
            }

            serde_json::from_str::<GenerationResponse>(&body)
                .map_err(|e| backoff::Error::permanent(GenerationError::Parse(e.to_string())))
        };

        let response = retry(self.backoff(), operation).await?;
        response
            .into_answer()
            .ok_or_else(|| GenerationError::Parse("empty generation batch".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn spawn_stub(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/generate", addr)
    }

    #[test]
    fn prompt_includes_context_marker() {
        assert_eq!(
            build_prompt(" What is malaria? ", Some("Malaria is spread by mosquitoes.")),
            "Answer this health question: What is malaria? [CONTEXT: Malaria is spread by mosquitoes.]"
        );
        assert_eq!(
            build_prompt("What is malaria?", None),
            "Answer this health question: What is malaria? [CONTEXT: ]"
        );
    }

    #[tokio::test]
    async fn parses_text_and_score() {
        let app = Router::new().route(
            "/generate",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["num_beams"], 16);
                Json(json!({"text": " Rest and fluids. ", "score": -0.5}))
            }),
        );
        let generator = HttpGenerator::new(spawn_stub(app).await, None, Duration::from_secs(2));

        let answer = generator.generate("How do I treat a cold?", None, &[]).await.unwrap();
        assert_eq!(answer.text, "Rest and fluids.");
        assert_eq!(answer.log_likelihood, Some(-0.5));
    }

    #[tokio::test]
    async fn accepts_batch_generated_text() {
        let app = Router::new().route(
            "/generate",
            post(|| async { Json(json!([{"generated_text": "Drink water."}])) }),
        );
        let generator = HttpGenerator::new(spawn_stub(app).await, None, Duration::from_secs(2));

        let answer = generator.generate("Hydration?", None, &[]).await.unwrap();
        assert_eq!(answer.text, "Drink water.");
        assert_eq!(answer.log_likelihood, None);
    }

    #[tokio::test]
    async fn retries_service_unavailable() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let app = Router::new().route(
            "/generate",
            post(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": "loading"})))
                    } else {
                        (StatusCode::OK, Json(json!({"text": "ok"})))
                    }
                }
            }),
        );
        let generator = HttpGenerator::new(spawn_stub(app).await, None, Duration::from_secs(10));

        let answer = generator.generate("q", None, &[]).await.unwrap();
        assert_eq!(answer.text, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let app = Router::new().route(
            "/generate",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::BAD_REQUEST, "bad prompt")
                }
            }),
        );
        let generator = HttpGenerator::new(spawn_stub(app).await, None, Duration::from_secs(10));

        let err = generator.generate("q", None, &[]).await.unwrap_err();
        assert!(matches!(err, GenerationError::Api { status: 400, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
