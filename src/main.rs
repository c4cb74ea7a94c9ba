use axum::{middleware, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bombdash::{
    api, auth, config::GameConfig, llm, questions::QuestionGenerator, state::AppState,
    store::MemoryStore, ws,
};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bombdash=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting BombDash...");

    let auth_config = Arc::new(auth::AuthConfig::from_env());

    let llm_config = llm::LlmConfig::from_env();
    let mut game_config = GameConfig::from_env();
    game_config.generation_timeout = llm_config.default_timeout;
    game_config.generation_max_tokens = Some(llm_config.default_max_tokens);

    let llm_manager = match llm_config.build_manager() {
        Ok(manager) => {
            tracing::info!("LLM providers initialized: {}", manager.len());
            Some(manager)
        }
        Err(e) => {
            tracing::warn!(
                "Failed to initialize LLM providers: {}. Questions will come from the fallback bank.",
                e
            );
            None
        }
    };

    let generator = Arc::new(QuestionGenerator::new(
        llm_manager,
        game_config.fallback_bank(),
        &game_config,
    ));
    let state = Arc::new(AppState::new(
        Arc::new(MemoryStore::system()),
        generator,
        Arc::new(game_config),
    ));

    let ws_routes = Router::new()
        .route("/ws", get(ws::ws_handler))
        .layer(middleware::from_fn_with_state(
            auth_config.clone(),
            auth::host_ws_auth_middleware,
        ));

    let app = Router::new()
        .merge(ws_routes)
        .route("/api/session", get(api::get_session))
        .route("/api/leaderboard", get(api::get_leaderboard))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 6573));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind listener");
    axum::serve(listener, app).await.expect("server error");
}
