use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rallyboard::{
    api, auth,
    broadcast::{self, ChannelBus},
    config::AppConfig,
    state::AppState,
    store::{FileStore, MemoryStore, Store},
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

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rallyboard=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Rallyboard...");

    let config = AppConfig::from_env();
    let auth_config = Arc::new(auth::AdminAuthConfig::from_env());

    let store: Arc<dyn Store> = match &config.data_dir {
        Some(dir) => match FileStore::open(dir.clone()).await {
            Ok(store) => {
                tracing::info!("Using file store at {}", dir.display());
                Arc::new(store)
            }
            Err(e) => {
                tracing::error!("Failed to open data directory {}: {}", dir.display(), e);
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!("DATA_DIR not set; all data is kept in memory and lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let bus = Arc::new(ChannelBus::new(config.broadcast_capacity));
    let state = Arc::new(AppState::new(store, bus).with_poll_interval(config.poll_interval));

    match state.get_game_code().await {
        Ok(Some(code)) => tracing::info!("Active game code: {}", code.code),
        Ok(None) => tracing::warn!(
            "No game code set; marshals cannot register until an admin creates one"
        ),
        Err(e) => tracing::warn!("Could not read game code: {}", e),
    }

    // Pick up writes from other processes sharing the store
    if let Some(every) = config.store_watch_interval {
        broadcast::spawn_store_watcher(state.clone(), every);
    }

    let app = api::router(state, auth_config, &config.static_dir);

    tracing::info!("Listening on http://{}", config.bind_addr);
    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", config.bind_addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
