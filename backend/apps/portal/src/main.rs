//! Portal Server Entry Point
//!
//! Application entry point and server initialization.
//! Uses `anyhow` for startup errors, but application-level
//! errors should use `kernel::error::AppError`.

use axum::{
    Router, http,
    http::{Method, header},
};
use gate::domain::provider::IdentityProvider;
use gate::infra::{IdentityToolkitConfig, IdentityToolkitProvider, InMemoryIdentityDirectory, InMemoryIdentityProvider};
use gate::presentation::GateAppState;
use gate::{ClientRegistry, GateConfig, RoleDirectory, admin_router, gate_router};
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Re-export unified error types for use in handlers
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};

/// How often idle client contexts are swept
const EVICTION_PERIOD: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portal=info,gate=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(gate_config()?);
    tracing::info!(config = ?config, "Gate configured");

    match env::var("IDENTITY_TOOLKIT_API_KEY") {
        Ok(api_key) => {
            let mut toolkit = IdentityToolkitConfig::new(api_key);
            if let Ok(endpoint) = env::var("IDENTITY_TOOLKIT_ENDPOINT") {
                toolkit = toolkit.with_endpoint(endpoint);
            }
            let http = toolkit.http_client()?;
            let toolkit = Arc::new(toolkit);
            tracing::info!("Using the REST identity provider");

            let registry = ClientRegistry::<IdentityToolkitProvider>::new(
                config,
                Arc::new(move || IdentityToolkitProvider::new(http.clone(), toolkit.clone())),
            );
            serve(registry).await
        }
        Err(_) if cfg!(debug_assertions) => {
            let accounts = env::var("GATE_DEV_ACCOUNTS").unwrap_or_default();
            let directory = Arc::new(InMemoryIdentityDirectory::parse(&accounts)?);
            tracing::warn!(
                accounts = directory.len(),
                "IDENTITY_TOOLKIT_API_KEY not set, using in-memory accounts"
            );

            let registry = ClientRegistry::<InMemoryIdentityProvider>::new(
                config,
                Arc::new(move || InMemoryIdentityProvider::new(directory.clone())),
            );
            serve(registry).await
        }
        Err(_) => anyhow::bail!("IDENTITY_TOOLKIT_API_KEY must be set in production"),
    }
}

/// Gate configuration from the environment
fn gate_config() -> anyhow::Result<GateConfig> {
    let mut config = match env::var("GATE_CLIENT_SECRET") {
        Ok(secret_b64) => {
            let client_secret = platform::crypto::key_from_base64(&secret_b64)
                .ok_or_else(|| anyhow::anyhow!("GATE_CLIENT_SECRET must be base64 of 32 bytes"))?;
            GateConfig {
                client_secret,
                cookie_secure: !cfg!(debug_assertions),
                ..GateConfig::default()
            }
        }
        Err(_) if cfg!(debug_assertions) => GateConfig::development(),
        Err(_) => anyhow::bail!("GATE_CLIENT_SECRET must be set in production"),
    };

    let admins = RoleDirectory::parse(&env::var("GATE_ADMIN_EMAILS").unwrap_or_default())?;
    if admins.is_empty() {
        tracing::warn!("GATE_ADMIN_EMAILS is empty, nobody can enter the admin areas");
    }
    config = config.with_admins(admins);

    if let Ok(secs) = env::var("GATE_OVERRIDE_TTL_SECS") {
        config.override_ttl = Some(Duration::from_secs(secs.trim().parse()?));
    }

    Ok(config)
}

async fn serve<P>(registry: ClientRegistry<P>) -> anyhow::Result<()>
where
    P: IdentityProvider + Send + Sync + 'static,
{
    let registry = Arc::new(with_override_slots(registry));

    // Periodic cleanup of idle client contexts
    let sweeper = registry.clone();
    tokio::spawn(async move {
        let max_idle = sweeper.config().client_ttl;
        let mut interval = tokio::time::interval(EVICTION_PERIOD);
        loop {
            interval.tick().await;
            let evicted = sweeper.evict_idle(max_idle);
            if evicted > 0 {
                tracing::info!(evicted, remaining = sweeper.len(), "Idle client contexts evicted");
            }
        }
    });

    // CORS configuration
    let frontend_origins = env::var("FRONTEND_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:40922,http://127.0.0.1:40922".to_string());

    let allowed_origins: Vec<http::HeaderValue> = frontend_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_credentials(true);

    // Build router
    let state = GateAppState::new(registry);
    let app = Router::new()
        .nest("/api/gate", gate_router(state.clone()))
        .merge(admin_router(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr: SocketAddr = env::var("PORTAL_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:31113".to_string())
        .parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(feature = "dev-bypass")]
fn with_override_slots<P>(registry: ClientRegistry<P>) -> ClientRegistry<P>
where
    P: IdentityProvider + Send + Sync + 'static,
{
    match env::var("GATE_OVERRIDE_DIR") {
        Ok(dir) => {
            tracing::warn!(dir = %dir, "Developer role overrides enabled");
            registry.with_override_slots(gate::infra::JsonFileOverrideStore::slot_factory(dir))
        }
        Err(_) => {
            tracing::warn!("dev-bypass enabled but GATE_OVERRIDE_DIR is not set, overrides disabled");
            registry
        }
    }
}

#[cfg(not(feature = "dev-bypass"))]
fn with_override_slots<P>(registry: ClientRegistry<P>) -> ClientRegistry<P>
where
    P: IdentityProvider + Send + Sync + 'static,
{
    registry
}
