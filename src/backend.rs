//! Betting backend player provisioning.

use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Proxy, StatusCode};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::credentials::Credentials;
use crate::error::body_snippet;
use crate::tenants::{BackendSettings, ForwardProxy};

const PLAYER_CONTENT_TYPE: &str = "application/json-patch+json";
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Player creation failures. The first three are the upstream outcomes the
/// caller reports; the rest never reached a usable response.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend answered with an HTML page (status {status}); request was likely blocked")]
    Blocked { status: u16, body: String },

    #[error("backend rejected player creation with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("backend response is not valid JSON: {message}")]
    MalformedResponse { message: String, body: String },

    #[error("invalid forward proxy configuration: {0}")]
    Proxy(#[source] reqwest::Error),

    #[error("failed to build backend HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("backend request failed: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePlayerRequest<'a> {
    user_name: &'a str,
    password: &'a str,
    skin_id: Option<&'a str>,
    agent_id: Option<&'a str>,
    language: &'a str,
}

/// Creates players on one tenant's backend.
#[derive(Debug, Clone)]
pub struct PlayerProvisioner {
    http: Client,
    api_url: String,
    api_token: String,
    skin_id: Option<String>,
    agent_id: Option<String>,
    language: String,
}

impl PlayerProvisioner {
    /// Builds a provisioner, routing through `proxy` when one is given.
    pub fn new(
        config: &AppConfig,
        backend: &BackendSettings,
        proxy: Option<&ForwardProxy>,
    ) -> Result<Self, BackendError> {
        let mut builder = Client::builder().timeout(config.backend_timeout());

        if let Some(proxy) = proxy {
            let relay = Proxy::all(proxy.url())
                .map_err(BackendError::Proxy)?
                .basic_auth(&proxy.username, &proxy.password);
            builder = builder.proxy(relay);
            debug!(proxy_host = %proxy.host, proxy_port = proxy.port, "backend calls use forward proxy");
        }

        let http = builder.build().map_err(BackendError::Client)?;

        Ok(Self {
            http,
            api_url: backend.api_url.clone(),
            api_token: backend.api_token.clone(),
            skin_id: backend.skin_id.clone(),
            agent_id: backend.agent_id.clone(),
            language: config.player_language.clone(),
        })
    }

    /// Submits `credentials` and returns the backend's JSON payload.
    ///
    /// An HTML response is a block page regardless of status; it is checked
    /// before the status code. Only a 200 carrying valid JSON is success.
    pub async fn create_player(&self, credentials: &Credentials) -> Result<Value, BackendError> {
        let request = CreatePlayerRequest {
            user_name: &credentials.username,
            password: &credentials.password,
            skin_id: self.skin_id.as_deref(),
            agent_id: self.agent_id.as_deref(),
            language: &self.language,
        };

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_token)
            .header(CONTENT_TYPE, PLAYER_CONTENT_TYPE)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"));
        let body = response.text().await.unwrap_or_default();

        if is_html {
            warn!(status = status.as_u16(), "backend returned HTML instead of JSON");
            return Err(BackendError::Blocked {
                status: status.as_u16(),
                body: body_snippet(&body),
            });
        }

        if status != StatusCode::OK {
            warn!(status = status.as_u16(), "backend rejected player creation");
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                body: body_snippet(&body),
            });
        }

        let payload: Value =
            serde_json::from_str(&body).map_err(|e| BackendError::MalformedResponse {
                message: e.to_string(),
                body: body_snippet(&body),
            })?;

        info!(username = %credentials.username, "player created on backend");
        Ok(payload)
    }
}
