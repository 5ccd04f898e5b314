//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        DbKeyValueStore, OpenAiChatAdapter, OpenAiSstAdapter, OpenAiTtsAdapter, OpenAiTutorAdapter,
    },
    config::Config,
    error::ApiError,
    web::{
        auth::{login_handler, password_reset_handler, signup_handler},
        media::{chat_handler, speech_handler, transcribe_handler},
        require_auth,
        rest::{
            create_session_handler, get_session_handler, list_sessions_handler,
            submit_answer_handler, ApiDoc,
        },
        state::AppState,
    },
};
use async_openai::{config::OpenAIConfig, types::audio::SpeechModel, Client};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use thinkpath_core::{
    AccessControl, AuthConfig, ConversationRegistry, KeyValueStore, MemoryKeyValueStore,
    SessionStore, SessionStoreConfig, TextToSpeechService,
};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let durable_store = Arc::new(DbKeyValueStore::new(db_pool));
    info!("Running database migrations...");
    durable_store.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let openai_config = OpenAIConfig::new().with_api_key(
        config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| ApiError::Internal("OPENAI_API_KEY is required".to_string()))?,
    );
    let openai_client = Client::with_config(openai_config);

    let tutor_adapter = Arc::new(OpenAiTutorAdapter::new(
        openai_client.clone(),
        config.fast_model.clone(),
        config.deep_model.clone(),
    ));
    let sst_adapter = Arc::new(OpenAiSstAdapter::new(
        openai_client.clone(),
        config.sst_model.clone(),
    ));
    let chat_adapter = Arc::new(OpenAiChatAdapter::new(
        openai_client.clone(),
        config.chat_model.clone(),
    ));
    let tts_adapter: Option<Arc<dyn TextToSpeechService>> = if config.tts_enabled {
        Some(Arc::new(OpenAiTtsAdapter::new(
            openai_client.clone(),
            SpeechModel::Tts1,
            OpenAiTtsAdapter::voice_from_name(&config.tts_voice),
        )))
    } else {
        info!("Read-aloud is disabled.");
        None
    };

    // --- 4. Build the Core Components ---
    let sessions = Arc::new(
        SessionStore::init(
            durable_store.clone(),
            tutor_adapter.clone(),
            SessionStoreConfig {
                storage_key: config.storage_keys.sessions.clone(),
                model_timeout: config.model_timeout,
            },
        )
        .await,
    );

    // Login throttling lives in process memory; accounts live in Postgres.
    let attempt_store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
    let auth_config = AuthConfig {
        vault_key: config.storage_keys.vault.clone(),
        rate_limit_key: config.storage_keys.rate_limit.clone(),
        max_attempts: config.auth.max_attempts,
        lockout: config.auth.lockout,
        token_ttl: config.auth.token_ttl,
        ..AuthConfig::new(config.auth.token_secret.clone())
    };
    let access = Arc::new(AccessControl::init(
        durable_store,
        attempt_store,
        auth_config,
    )?);

    // --- 5. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        sessions,
        access,
        tutor: tutor_adapter,
        sst: sst_adapter,
        tts: tts_adapter,
        conversations: ConversationRegistry::new(chat_adapter, config.chat_capacity),
    });

    let cors_origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS origin '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 6. Create the Web Router ---
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/password-reset", post(password_reset_handler));

    // Protected routes (bearer token required)
    let protected_routes = Router::new()
        .route(
            "/sessions",
            get(list_sessions_handler).post(create_session_handler),
        )
        .route("/sessions/{id}", get(get_session_handler))
        .route("/sessions/{id}/answer", post(submit_answer_handler))
        .route("/speech", post(speech_handler))
        .route("/transcribe", post(transcribe_handler))
        .route("/chat", post(chat_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    // The peer address scopes login throttling.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
