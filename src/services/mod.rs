// src/services/mod.rs
pub mod chat;
pub mod training;

pub use chat::ChatService;
pub use training::{TrainingOutcome, TrainingTrigger};
