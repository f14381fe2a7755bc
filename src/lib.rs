pub mod api;
pub mod app_state;
pub mod config;
pub mod storage;
pub mod token;

use axum::Router;
use axum::body::Body;
use axum::extract::Extension;
use axum::http::Request;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::cors::Any;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span};

//
// Re-export
//
pub use api::{create_token, health, log_request_errors, stream_audio};
pub use app_state::AppState;
pub use config::Config;
pub use storage::{StorageBackend, StorageConfig, StorageManager};
pub use token::{
    CreateTokenRequest, CreateTokenResponse, FilenameExtractor, TOKEN_TTL_MS, TOKEN_TTL_SECS,
    TokenError, TokenPayload, TokenSigner, extract_filename, is_valid_object_key,
};

/// Build the HTTP router for `state`
pub fn app(state: AppState) -> Router {
    // CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Spans carry the path only, the query holds the token
    let trace = TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
        info_span!("request", method = %req.method(), path = %req.uri().path())
    });

    Router::new()
        .route("/api/audio-token", post(create_token))
        .route("/api/stream-audio", get(stream_audio))
        .route("/health", get(health))
        .layer(axum::middleware::from_fn(log_request_errors))
        .layer(trace)
        .layer(cors)
        .layer(Extension(state))
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    let storage_manager = StorageManager::new(config.to_storage_config()?)?;
    let state = AppState::new(&config, storage_manager).await?;

    let addr = format!("0.0.0.0:{}", config.listen_on_port);
    info!("Audio API listening on {addr}");
    let listener = TcpListener::bind(&addr).await?;

    axum::serve(listener, app(state)).await?;
    Ok(())
}
