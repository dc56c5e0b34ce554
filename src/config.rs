// src/config.rs
//! Runtime configuration read from the environment (after `.env` is loaded).
//! Optional collaborators stay `None` when their variables are missing.

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::selector::DEFAULT_CONFIDENCE_THRESHOLD;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_TOP_K: u64 = 5;
pub const DEFAULT_HISTORY_LIMIT: i64 = 500;
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;
pub const DEFAULT_EMBEDDINGS_MODEL: &str = "all-MiniLM-L6-v2";
pub const DEFAULT_QDRANT_COLLECTION: &str = "health_answers";
pub const DEFAULT_GENERATION_MAX_RETRY_SECS: u64 = 30;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_url: Option<String>,
    pub confidence_threshold: f64,
    pub retrieval_top_k: u64,
    pub history_limit: i64,
    pub embeddings_url: Option<String>,
    pub embeddings_api_key: Option<String>,
    pub embeddings_model: String,
    pub embedding_dimensions: usize,
    pub qdrant_url: Option<String>,
    pub qdrant_api_key: Option<String>,
    pub qdrant_collection: String,
    pub corpus_path: Option<String>,
    pub generation_url: Option<String>,
    pub generation_api_key: Option<String>,
    pub generation_max_retry: Duration,
    pub training_job_url: Option<String>,
    pub admin_password_hash: Option<String>,
    pub admin_password: Option<String>,
    pub jwt_secret: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            database_url: None,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            retrieval_top_k: DEFAULT_TOP_K,
            history_limit: DEFAULT_HISTORY_LIMIT,
            embeddings_url: None,
            embeddings_api_key: None,
            embeddings_model: DEFAULT_EMBEDDINGS_MODEL.to_string(),
            embedding_dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            qdrant_url: None,
            qdrant_api_key: None,
            qdrant_collection: DEFAULT_QDRANT_COLLECTION.to_string(),
            corpus_path: None,
            generation_url: None,
            generation_api_key: None,
            generation_max_retry: Duration::from_secs(DEFAULT_GENERATION_MAX_RETRY_SECS),
            training_job_url: None,
            admin_password_hash: None,
            admin_password: None,
            jwt_secret: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url: get("DATABASE_URL"),
            confidence_threshold: parse_threshold(&get, "CONFIDENCE_THRESHOLD", defaults.confidence_threshold)?,
            retrieval_top_k: parse_or(&get, "RETRIEVAL_TOP_K", defaults.retrieval_top_k)?,
            history_limit: parse_or(&get, "HISTORY_LIMIT", defaults.history_limit)?,
            embeddings_url: get("EMBEDDINGS_URL"),
            embeddings_api_key: get("EMBEDDINGS_API_KEY"),
            embeddings_model: get("EMBEDDINGS_MODEL").unwrap_or(defaults.embeddings_model),
            embedding_dimensions: parse_or(&get, "EMBEDDING_DIMENSIONS", defaults.embedding_dimensions)?,
            qdrant_url: get("QDRANT_URL"),
            qdrant_api_key: get("QDRANT_API_KEY"),
            qdrant_collection: get("QDRANT_COLLECTION").unwrap_or(defaults.qdrant_collection),
            corpus_path: get("CORPUS_PATH"),
            generation_url: get("GENERATION_URL"),
            generation_api_key: get("GENERATION_API_KEY"),
            generation_max_retry: Duration::from_secs(parse_or(
                &get,
                "GENERATION_MAX_RETRY_SECS",
                DEFAULT_GENERATION_MAX_RETRY_SECS,
            )?),
            training_job_url: get("TRAINING_JOB_URL"),
            admin_password_hash: get("ADMIN_PASSWORD_HASH"),
            admin_password: get("ADMIN_PASSWORD"),
            jwt_secret: get("JWT_SECRET"),
        })
    }
}

/// Random 256-bit secret, hex encoded.
pub fn generate_jwt_secret() -> String {
    use rand::RngCore;

    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    hex::encode(key)
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value: raw,
        }),
        None => Ok(default),
    }
}

/// Similarity thresholds must be finite and within [0, 1].
fn parse_threshold<G>(get: &G, key: &str, default: f64) -> Result<f64, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let value = parse_or(get, key, default)?;
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        return Ok(value);
    }
    Err(ConfigError::Invalid {
        key: key.to_string(),
        value: get(key).unwrap_or_else(|| value.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.confidence_threshold, 0.35);
        assert_eq!(config.retrieval_top_k, 5);
        assert!(config.database_url.is_none());
        assert!(config.generation_url.is_none());
    }

    #[test]
    fn overrides_and_empty_values() {
        let config = AppConfig::from_lookup(lookup(&[
            ("CONFIDENCE_THRESHOLD", "0.6"),
            ("DATABASE_URL", "postgres://localhost/health"),
            ("GENERATION_URL", "   "),
            ("QDRANT_COLLECTION", "faq"),
        ]))
        .unwrap();

        assert_eq!(config.confidence_threshold, 0.6);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/health"));
        assert!(config.generation_url.is_none());
        assert_eq!(config.qdrant_collection, "faq");
    }

    #[test]
    fn generated_secrets_are_random_hex() {
        let a = generate_jwt_secret();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, generate_jwt_secret());
    }

    #[test]
    fn rejects_unparseable_numbers() {
        let err = AppConfig::from_lookup(lookup(&[("RETRIEVAL_TOP_K", "many")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "RETRIEVAL_TOP_K".to_string(),
                value: "many".to_string(),
            }
        );
    }

    #[test]
    fn threshold_must_be_a_finite_fraction() {
        for raw in ["NaN", "inf", "-0.1", "1.5"] {
            let err = AppConfig::from_lookup(lookup(&[("CONFIDENCE_THRESHOLD", raw)])).unwrap_err();
            assert_eq!(
                err,
                ConfigError::Invalid {
                    key: "CONFIDENCE_THRESHOLD".to_string(),
                    value: raw.to_string(),
                }
            );
        }

        for (raw, expected) in [("0", 0.0), ("1", 1.0)] {
            let config = AppConfig::from_lookup(lookup(&[("CONFIDENCE_THRESHOLD", raw)])).unwrap();
            assert_eq!(config.confidence_threshold, expected);
        }
    }
}
