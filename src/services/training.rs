// src/services/training.rs
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::error::AppError;
use crate::models::admin::TrainingSample;
use crate::store::ChatStore;

/// Answers scored above this are treated as positive examples.
pub const POSITIVE_SCORE_THRESHOLD: f64 = 0.5;
pub const MAX_TRAINING_SAMPLES: i64 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub enum TrainingOutcome {
    NoSamples,
    NotConfigured { samples: usize },
    Submitted { samples: usize },
}

#[derive(Debug, Serialize)]
struct TrainingJobRequest<'a> {
    samples: &'a [TrainingSample],
    sample_count: usize,
    min_score: f64,
}

/// Hands positive question/answer pairs to the external training job.
#[derive(Clone)]
pub struct TrainingTrigger {
    store: Arc<dyn ChatStore>,
    client: Client,
    job_url: Option<String>,
}

impl TrainingTrigger {
    pub fn new(store: Arc<dyn ChatStore>, job_url: Option<String>) -> Self {
        Self {
            store,
            client: Client::new(),
            job_url,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.job_url.is_some()
    }

    /// Starts a detached run and returns immediately.
    pub fn trigger(&self) {
        let trigger = self.clone();
        tokio::spawn(async move {
            match trigger.run().await {
                Ok(TrainingOutcome::NoSamples) => {
                    tracing::info!("Reinforcement training skipped: no positive samples")
                }
                Ok(TrainingOutcome::NotConfigured { samples }) => tracing::warn!(
                    "Reinforcement training skipped: {} samples collected but TRAINING_JOB_URL is not set",
                    samples
                ),
                Ok(TrainingOutcome::Submitted { samples }) => {
                    tracing::info!("Reinforcement training job submitted with {} samples", samples)
                }
                Err(e) => tracing::error!("Reinforcement training failed: {}", e),
            }
        });
    }

    pub async fn run(&self) -> Result<TrainingOutcome, AppError> {
        let samples = self
            .store
            .positive_samples(POSITIVE_SCORE_THRESHOLD, MAX_TRAINING_SAMPLES)
            .await?;

        if samples.is_empty() {
            return Ok(TrainingOutcome::NoSamples);
        }

        let Some(ref url) = self.job_url else {
            return Ok(TrainingOutcome::NotConfigured { samples: samples.len() });
        };

        let response = self
            .client
            .post(url)
            .timeout(Duration::from_secs(60))
            .json(&TrainingJobRequest {
                samples: &samples,
                sample_count: samples.len(),
                min_score: POSITIVE_SCORE_THRESHOLD,
            })
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("training job request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "training job rejected samples ({}): {}",
                status, body
            )));
        }

        Ok(TrainingOutcome::Submitted { samples: samples.len() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::NewMessage;
    use crate::store::MemoryChatStore;
    use axum::{routing::post, Json, Router};
    use serde_json::Value;
    use tokio::sync::Mutex;

    async fn seeded_store() -> Arc<MemoryChatStore> {
        let store = Arc::new(MemoryChatStore::new());
        let session = store.create_session("u1", "Health").await.unwrap();
        for (question, answer, score) in [
            ("What is anemia?", "A lack of healthy red blood cells.", Some(0.8)),
            ("Is it contagious?", "I'm not sure.", Some(0.2)),
        ] {
            store
                .append_message(NewMessage::user(session.id, "u1", question))
                .await
                .unwrap();
            store
                .append_message(NewMessage::assistant(session.id, "u1", answer, score, false))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn no_samples_means_nothing_to_do() {
        let trigger = TrainingTrigger::new(Arc::new(MemoryChatStore::new()), None);
        assert_eq!(trigger.run().await.unwrap(), TrainingOutcome::NoSamples);
    }

    #[tokio::test]
    async fn unconfigured_job_reports_sample_count() {
        let trigger = TrainingTrigger::new(seeded_store().await, None);
        assert!(!trigger.is_configured());
        assert_eq!(
            trigger.run().await.unwrap(),
            TrainingOutcome::NotConfigured { samples: 1 }
        );
    }

    #[tokio::test]
    async fn posts_positive_pairs_to_job() {
        let received: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
        let sink = received.clone();
        let app = Router::new().route(
            "/train",
            post(move |Json(body): Json<Value>| {
                let sink = sink.clone();
                async move {
                    *sink.lock().await = Some(body);
                    Json(serde_json::json!({"accepted": true}))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let trigger = TrainingTrigger::new(
            seeded_store().await,
            Some(format!("http://{}/train", addr)),
        );
        assert_eq!(
            trigger.run().await.unwrap(),
            TrainingOutcome::Submitted { samples: 1 }
        );

        let body = received.lock().await.clone().unwrap();
        assert_eq!(body["sample_count"], 1);
        assert_eq!(body["samples"][0]["question"], "What is anemia?");
        assert_eq!(body["samples"][0]["answer"], "A lack of healthy red blood cells.");
    }
}
