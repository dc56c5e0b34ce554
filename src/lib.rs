// lib.rs - health Q&A chat backend
pub mod client;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod generation;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod retrieval;
pub mod rewards;
pub mod safety;
pub mod selector;
pub mod services;
pub mod store;

#[cfg(test)]
pub mod test_support;

use std::sync::Arc;

use config::AppConfig;
use engine::ChatEngine;
use services::{ChatService, TrainingTrigger};
use store::ChatStore;

// AppState holds the configuration, the chat store and the services built on it
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn ChatStore>,
    pub chat: ChatService,
    pub training: TrainingTrigger,
    /// bcrypt hash checked by admin login; `None` disables it.
    pub admin_password_hash: Option<String>,
    pub jwt_secret: String,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn ChatStore>,
        engine: ChatEngine,
        admin_password_hash: Option<String>,
        jwt_secret: String,
    ) -> Self {
        let chat = ChatService::new(store.clone(), engine, config.history_limit);
        let training = TrainingTrigger::new(store.clone(), config.training_job_url.clone());
        Self {
            config,
            store,
            chat,
            training,
            admin_password_hash,
            jwt_secret,
        }
    }
}
