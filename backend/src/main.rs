use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use neuro_verse_backend::config::Config;
use neuro_verse_backend::store::{SqliteUserStore, UserStore};
use neuro_verse_backend::{logging, routes, AppState, AuthGate, JwksVerifier};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Neuro Verse identity backend");

    // Composition root: the gate owns nothing global, everything is
    // constructed here and injected.
    let verifier = JwksVerifier::new(
        &config.oidc_issuer,
        &config.oidc_audience,
        Duration::from_secs(config.verify_timeout_secs),
    )
    .await?;

    let users: Arc<dyn UserStore> = Arc::new(SqliteUserStore::new(&config.database_url)?);
    let gate = AuthGate::new(Arc::new(verifier), users.clone());

    let state = Arc::new(AppState {
        config: config.clone(),
        gate,
        users,
    });

    // Build CORS layer
    let allow_origin = match config.cors_origin_list() {
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            AllowOrigin::list(origins)
        }
        None => AllowOrigin::any(),
    };
    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = Router::new()
        .merge(routes::health::router())
        .merge(routes::auth::router(state.clone()))
        .merge(routes::admin::router(state.clone()))
        .layer(axum::middleware::from_fn(logging::request_logger))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
