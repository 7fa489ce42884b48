use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parlor::api::{self, AppState};
use parlor::llm;
use parlor::service::RoomService;
use parlor::store::{spawn_expiry_sweeper, MemoryStore};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parlor=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting parlor room service...");

    // Question generation is optional; sessions fall back to the built-in
    // bank when no provider is reachable. Checking here surfaces
    // misconfiguration at startup instead of mid-game.
    if let Err(e) = llm::LlmConfig::from_env().build_manager() {
        tracing::warn!(
            "No LLM providers available: {}. Question generation will use the built-in bank.",
            e
        );
    }

    let store = MemoryStore::new();
    spawn_expiry_sweeper(store.clone(), Duration::from_secs(60));

    let state = Arc::new(AppState {
        rooms: RoomService::new(Arc::new(store)),
    });

    let app = api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(7466);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("bind listener");
    axum::serve(listener, app).await.expect("serve");
}
