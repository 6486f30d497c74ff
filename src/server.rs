//! # Server Configuration
//!
//! Router, shared state and OpenAPI document for the bridge.

use std::sync::Arc;

use axum::{Router, middleware, routing::get};
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::error::BridgeError;
use crate::handlers::{self, create_player, message_received};
use crate::telemetry;
use crate::tenants::{EnvSource, ProcessEnv, TenantConfig, TenantRegistry};

/// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tenants: Arc<TenantRegistry>,
    /// Source for `env:` references, read on every resolution
    pub env: Arc<dyn EnvSource>,
}

impl AppState {
    /// State reading `env:` references from the live process environment.
    pub fn new(config: AppConfig, tenants: TenantRegistry) -> Self {
        Self::with_env(config, tenants, Arc::new(ProcessEnv))
    }

    pub fn with_env(config: AppConfig, tenants: TenantRegistry, env: Arc<dyn EnvSource>) -> Self {
        Self {
            config: Arc::new(config),
            tenants: Arc::new(tenants),
            env,
        }
    }

    /// Resolves `tenant_id`, mapping an unknown id to [`BridgeError::TenantNotFound`].
    pub fn resolve_tenant(&self, tenant_id: &str) -> Result<TenantConfig, BridgeError> {
        self.tenants
            .resolve(tenant_id, self.env.as_ref())
            .ok_or_else(|| BridgeError::TenantNotFound {
                tenant: tenant_id.to_string(),
            })
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route(
            "/api/{client_id}/create-player-from-kommo",
            get(create_player::create_player_health).post(create_player::create_player),
        )
        .route(
            "/api/{client_id}/kommo-message-received",
            get(message_received::message_received_health)
                .post(message_received::message_received),
        )
        .route(
            "/api/create-player-from-kommo",
            get(create_player::create_player_default_health)
                .post(create_player::create_player_default),
        )
        .route(
            "/api/kommo-message-received",
            get(message_received::message_received_default_health)
                .post(message_received::message_received_default),
        )
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(telemetry::trace_id_middleware))
}

/// Loads the tenant registry and serves the API until the process stops
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let tenants = TenantRegistry::load(&config.tenants_file)?;
    info!(
        tenants = tenants.len(),
        file = %config.tenants_file.display(),
        "tenant registry loaded"
    );
    if let Some(default) = &config.default_tenant
        && !tenants.contains(default)
    {
        tracing::warn!(tenant = %default, "default tenant is not in the registry");
    }

    let addr = config.bind_addr()?;
    let profile = config.profile.clone();
    let app = create_app(AppState::new(config, tenants));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, %profile, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::create_player::create_player,
        crate::handlers::create_player::create_player_default,
        crate::handlers::create_player::create_player_health,
        crate::handlers::create_player::create_player_default_health,
        crate::handlers::message_received::message_received,
        crate::handlers::message_received::message_received_default,
        crate::handlers::message_received::message_received_health,
        crate::handlers::message_received::message_received_default_health,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::models::CreatePlayerResponse,
            crate::models::MessageReceivedResponse,
            crate::models::ProofData,
            crate::models::HealthResponse,
            crate::dispatch::DispatchResult,
            crate::error::ApiError,
        )
    ),
    info(
        title = "Kommo Bridge API",
        description = "Webhook bridge between Kommo CRM and betting backends",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
