use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};

use stewarding_gate::config::ServerConfig;
use stewarding_gate::gate::{GateRouteState, gate_routes};
use stewarding_gate::identity::{HttpIdentityService, IdentityConnector};
use stewarding_gate::onboarding::{OnboardingRouteState, onboarding_routes};
use stewarding_gate::store::{LibSqlBackend, ProfileStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServerConfig::from_env().context("Invalid configuration")?;

    eprintln!("⛪ Stewarding Gate v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Identity: {}", config.identity_url);
    eprintln!("   Database: {}", config.database_path.display());
    eprintln!("   API: http://0.0.0.0:{}/api/gate", config.port);

    // ── Database ─────────────────────────────────────────────────────────
    let profiles: Arc<dyn ProfileStore> = Arc::new(
        LibSqlBackend::new_local(&config.database_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.database_path.display()))?,
    );

    // ── Identity ─────────────────────────────────────────────────────────
    let identity: Arc<dyn IdentityConnector> = Arc::new(
        HttpIdentityService::new(&config.identity_url, config.identity_api_key)
            .context("Failed to build identity client")?,
    );

    // ── HTTP ─────────────────────────────────────────────────────────────
    let cors = match config.cors_origin {
        Some(ref origin) => CorsLayer::new()
            .allow_origin(
                origin
                    .parse::<HeaderValue>()
                    .with_context(|| format!("Invalid GATE_CORS_ORIGIN '{origin}'"))?,
            )
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    };

    let gate_state = GateRouteState {
        identity: Arc::clone(&identity),
        profiles: Arc::clone(&profiles),
        config: Arc::new(config.gate),
    };
    let app = gate_routes(gate_state)
        .merge(onboarding_routes(OnboardingRouteState::new(identity, profiles)))
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Gate server started");
    axum::serve(listener, app).await?;

    Ok(())
}
