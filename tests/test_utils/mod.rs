//! Test utilities for end-to-end webhook tests.
//!
//! Spawns the real router on an ephemeral port and builds tenant registries
//! whose CRM, backend and Google endpoints all point at one wiremock server.

use anyhow::{Context, Result};
use kommo_bridge::config::AppConfig;
use kommo_bridge::server::{AppState, create_app};
use kommo_bridge::tenants::{MapEnv, TenantRegistry};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use wiremock::MockServer;

pub const CRM_TOKEN: &str = "crm-token";
pub const BACKEND_TOKEN: &str = "backend-token";
pub const USERNAME_FIELD_ID: u64 = 1001;
pub const PASSWORD_FIELD_ID: u64 = 1002;
pub const PROOF_STATUS_ID: u64 = 777;

pub struct TestServerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<Result<()>>>,
}

impl TestServerHandle {
    fn new(shutdown_tx: oneshot::Sender<()>, join_handle: JoinHandle<Result<()>>) -> Self {
        Self {
            shutdown_tx: Some(shutdown_tx),
            join_handle: Some(join_handle),
        }
    }

    #[allow(dead_code)]
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.join_handle.take() {
            let result = handle.await.context("server task join failed")?;
            result?;
        }

        Ok(())
    }
}

impl Drop for TestServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Config whose CRM origin is `{mock}/{subdomain}` and Google URLs hit the mock.
pub fn config_for(mock: &MockServer) -> AppConfig {
    AppConfig {
        crm_base_url: format!("{}/{{subdomain}}", mock.uri()),
        google_token_url: format!("{}/token", mock.uri()),
        google_people_base_url: format!("{}/v1", mock.uri()),
        default_tenant: Some("acme".to_string()),
        ..AppConfig::default()
    }
}

/// Fully configured `acme` tenant definition; callers may patch it before use.
pub fn acme_definition(mock: &MockServer) -> Value {
    json!({
        "name": "Acme Bets",
        "kommo": {
            "access_token": CRM_TOKEN,
            "subdomain": "acme",
            "whatsapp_scope_id": "scope-1",
            "username_field_id": USERNAME_FIELD_ID,
            "password_field_id": PASSWORD_FIELD_ID,
            "proof_status_id": PROOF_STATUS_ID
        },
        "backend": {
            "type": "bet30",
            "api_url": format!("{}/backend/players", mock.uri()),
            "api_token": BACKEND_TOKEN,
            "skin_id": "skin-9",
            "agent_id": "agent-3",
            "login_url": "https://play.acme.example"
        }
    })
}

pub fn registry_with(definition: Value) -> TenantRegistry {
    let file = json!({ "clients": { "acme": definition } });
    TenantRegistry::from_json_str(&file.to_string()).expect("registry parses")
}

/// Spawns the app and returns its base URL plus a shutdown handle.
pub async fn spawn_test_app(config: AppConfig, registry: TenantRegistry) -> (String, TestServerHandle) {
    let state = AppState::with_env(config, registry, Arc::new(MapEnv::new()));
    let app = create_app(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_url = format!("http://{}", addr);

    let (ready_tx, ready_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let server_task = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let _ = ready_tx.send(());

        server.await.context("axum server error")
    });

    ready_rx.await.expect("server task to signal readiness");

    (server_url, TestServerHandle::new(shutdown_tx, server_task))
}
