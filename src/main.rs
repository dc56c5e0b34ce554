use health_chatbot::config::{generate_jwt_secret, AppConfig};
use health_chatbot::embeddings::{Embedder, HashedEmbeddings, HttpEmbeddings};
use health_chatbot::engine::ChatEngine;
use health_chatbot::generation::{Generator, HttpGenerator};
use health_chatbot::retrieval::{CorpusRetriever, QdrantRetriever, Retriever};
use health_chatbot::selector::AnswerSelector;
use health_chatbot::store::{ChatStore, MemoryChatStore, PgChatStore};
use health_chatbot::{db, handlers, AppState};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_logging().expect("Failed to initialize logging");

    if let Err(e) = run().await {
        tracing::error!("Server failed to start: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;

    let store: Arc<dyn ChatStore> = match config.database_url.as_deref() {
        Some(url) => {
            tracing::info!("Connecting to PostgreSQL...");
            let pool = db::create_pool(url).await?;
            Arc::new(PgChatStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not found. Using in-memory store; data is lost on restart.");
            Arc::new(MemoryChatStore::new())
        }
    };

    let embedder: Arc<dyn Embedder> = match config.embeddings_url.clone() {
        Some(url) => {
            tracing::info!("Using embeddings API at {} ({})", url, config.embeddings_model);
            Arc::new(HttpEmbeddings::new(
                url,
                config.embeddings_api_key.clone(),
                config.embeddings_model.clone(),
            ))
        }
        None => {
            tracing::warn!("EMBEDDINGS_URL not found. Using hashed text embeddings fallback.");
            tracing::info!("To enable model embeddings, set: EMBEDDINGS_URL, EMBEDDINGS_MODEL");
            Arc::new(HashedEmbeddings::new(config.embedding_dimensions))
        }
    };

    let retriever = init_retriever(&config, embedder).await;

    let generator: Option<Arc<dyn Generator>> = match config.generation_url.clone() {
        Some(url) => {
            tracing::info!("Using generation endpoint at {}", url);
            Some(Arc::new(HttpGenerator::new(
                url,
                config.generation_api_key.clone(),
                config.generation_max_retry,
            )))
        }
        None => {
            tracing::warn!("GENERATION_URL not found. Low-confidence questions get the fallback answer.");
            None
        }
    };

    let admin_password_hash = match (&config.admin_password_hash, &config.admin_password) {
        (Some(hash), _) => Some(hash.clone()),
        (None, Some(password)) => Some(bcrypt::hash(password, bcrypt::DEFAULT_COST)?),
        (None, None) => {
            tracing::warn!("ADMIN_PASSWORD_HASH not found. Admin login is disabled.");
            tracing::info!("To enable admin login, run `cargo run --bin hash_admin_password` and set ADMIN_PASSWORD_HASH");
            None
        }
    };

    let jwt_secret = match config.jwt_secret.clone() {
        Some(secret) => secret,
        None => {
            tracing::warn!("JWT_SECRET not found. Using a random secret; admin tokens will not survive a restart.");
            generate_jwt_secret()
        }
    };

    let engine = ChatEngine::new(
        retriever,
        generator,
        AnswerSelector::new(config.confidence_threshold),
    );

    tracing::info!(
        "Configuration - store: {}, retriever: {}, generator: {}, threshold: {}",
        store.backend(),
        engine.retriever_name().unwrap_or("none"),
        engine.generator_name().unwrap_or("none"),
        config.confidence_threshold
    );

    let bind_addr = config.bind_addr.clone();
    let shared_state = Arc::new(AppState::new(
        config,
        store,
        engine,
        admin_password_hash,
        jwt_secret,
    ));

    let app = handlers::router(shared_state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

async fn init_retriever(config: &AppConfig, embedder: Arc<dyn Embedder>) -> Option<Arc<dyn Retriever>> {
    if let Some(url) = config.qdrant_url.as_deref() {
        tracing::info!("Initializing Qdrant retrieval ({})...", config.qdrant_collection);
        let retriever = match QdrantRetriever::new(
            url,
            config.qdrant_api_key.clone(),
            config.qdrant_collection.clone(),
            config.retrieval_top_k,
            embedder,
        ) {
            Ok(retriever) => retriever,
            Err(e) => {
                tracing::error!("Failed to create Qdrant client: {}", e);
                return None;
            }
        };
        if let Err(e) = retriever
            .ensure_collection(config.embedding_dimensions as u64)
            .await
        {
            tracing::error!("Failed to initialize Qdrant collection: {}", e);
        }
        return Some(Arc::new(retriever));
    }

    if let Some(path) = config.corpus_path.as_deref() {
        return match CorpusRetriever::from_json_file(path, embedder).await {
            Ok(retriever) => {
                tracing::info!("Loaded {} corpus passages from {}", retriever.len(), path);
                Some(Arc::new(retriever))
            }
            Err(e) => {
                tracing::error!("Failed to load corpus: {}", e);
                None
            }
        };
    }

    tracing::warn!("QDRANT_URL and CORPUS_PATH not found. Retrieval is disabled.");
    None
}

// Logging configuration: RUST_LOG overrides, LOG_FORMAT=json for aggregation
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,health_chatbot=trace,sqlx=info,reqwest=info,hyper=info,tower=info,h2=info".to_string()
        } else {
            "info,health_chatbot=info,sqlx=warn,reqwest=warn,hyper=warn,tower=warn,h2=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    tracing::info!("Health chatbot starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Build mode: {}", if cfg!(debug_assertions) { "development" } else { "production" });
    tracing::info!("Log level: {}", log_level);

    Ok(())
}
