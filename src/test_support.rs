//! Stub collaborators and a ready-made `AppState` for unit and router tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::AppConfig;
use crate::engine::ChatEngine;
use crate::generation::{GeneratedAnswer, GenerationError, Generator};
use crate::models::chat::ChatMessage;
use crate::retrieval::{RetrievalError, RetrievalHit, Retriever};
use crate::selector::AnswerSelector;
use crate::store::MemoryChatStore;
use crate::AppState;

pub const TEST_ADMIN_PASSWORD: &str = "correct horse battery staple";
pub const TEST_JWT_SECRET: &str = "test-jwt-secret";

pub struct StubRetriever {
    hit: Option<RetrievalHit>,
    fail: bool,
    calls: AtomicUsize,
}

impl StubRetriever {
    pub fn hit(text: &str, score: f64) -> Self {
        Self {
            hit: Some(RetrievalHit {
                text: text.to_string(),
                score,
            }),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            hit: None,
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Retriever for StubRetriever {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn nearest(&self, _question: &str) -> Result<Option<RetrievalHit>, RetrievalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RetrievalError::Search("index offline".to_string()));
        }
        Ok(self.hit.clone())
    }
}

pub struct StubGenerator {
    answer: Option<GeneratedAnswer>,
    calls: AtomicUsize,
    last_context: Mutex<Option<String>>,
}

impl StubGenerator {
    pub fn answer(text: &str, log_likelihood: Option<f64>) -> Self {
        Self {
            answer: Some(GeneratedAnswer {
                text: text.to_string(),
                log_likelihood,
            }),
            calls: AtomicUsize::new(0),
            last_context: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: None,
            calls: AtomicUsize::new(0),
            last_context: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_context(&self) -> Option<String> {
        self.last_context.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for StubGenerator {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn generate(
        &self,
        _question: &str,
        context: Option<&str>,
        _history: &[ChatMessage],
    ) -> Result<GeneratedAnswer, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_context.lock().unwrap() = context.map(str::to_string);
        self.answer.clone().ok_or_else(|| GenerationError::Api {
            status: 503,
            body: "model loading".to_string(),
        })
    }
}

/// State backed by the memory store, with a retriever that always returns
/// `retrieval_score` and a working generator.
pub fn test_state(retrieval_score: f64) -> Arc<AppState> {
    let engine = ChatEngine::new(
        Some(Arc::new(StubRetriever::hit("Stored answer", retrieval_score))),
        Some(Arc::new(StubGenerator::answer("Generated answer", Some(-0.25)))),
        AnswerSelector::default(),
    );
    let admin_hash = bcrypt::hash(TEST_ADMIN_PASSWORD, 4).unwrap();

    Arc::new(AppState::new(
        AppConfig::default(),
        Arc::new(MemoryChatStore::new()),
        engine,
        Some(admin_hash),
        TEST_JWT_SECRET.to_string(),
    ))
}
