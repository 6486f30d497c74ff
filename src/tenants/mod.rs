//! # Tenant Registry
//!
//! Static registry of operator definitions, loaded once at startup from a JSON
//! file shaped as `{"clients": {"<tenant-id>": { ... }}}`. Definitions keep
//! their raw values; [`TenantRegistry::resolve`] substitutes `env:` references
//! on every call and produces a [`TenantConfig`].

use std::{collections::BTreeMap, path::Path};

use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

pub mod env;
pub mod validate;

use env::{resolve_id, resolve_value};
pub use env::{EnvSource, MapEnv, ProcessEnv};
pub use validate::{ValidationReport, validate_tenant};

/// Errors raised while loading the registry file.
#[derive(Debug, Error)]
pub enum TenantRegistryError {
    #[error("failed to read tenant registry {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid tenant registry: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    clients: BTreeMap<String, TenantDefinition>,
}

/// Raw tenant definition as written in the registry file.
#[derive(Debug, Clone, Deserialize)]
pub struct TenantDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(alias = "crm")]
    pub kommo: RawCrm,
    pub backend: RawBackend,
    #[serde(default, alias = "contacts")]
    pub google: Option<RawContacts>,
    #[serde(default, alias = "forward_proxy", alias = "forwardProxy")]
    pub proxy: Option<RawProxy>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawCrm {
    pub access_token: Value,
    pub subdomain: Value,
    pub whatsapp_scope_id: Value,
    pub username_field_id: Value,
    pub password_field_id: Value,
    #[serde(alias = "comprobante_status_id")]
    pub proof_status_id: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawBackend {
    #[serde(rename = "type")]
    pub kind: Value,
    pub api_url: Value,
    pub api_token: Value,
    pub skin_id: Value,
    pub agent_id: Value,
    pub login_url: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawContacts {
    pub client_id: Value,
    pub client_secret: Value,
    pub refresh_token: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawProxy {
    pub host: Value,
    pub port: Value,
    pub username: Value,
    pub password: Value,
}

/// Fully resolved configuration for one operator.
///
/// Holds live secrets; use [`TenantConfig::redacted`] for any output.
#[derive(Debug, Clone)]
pub struct TenantConfig {
    pub id: String,
    pub name: String,
    pub crm: CrmSettings,
    pub backend: BackendSettings,
    pub contacts: Option<ContactsSettings>,
    pub forward_proxy: Option<ForwardProxy>,
}

/// CRM account settings. Empty strings mean "not configured".
#[derive(Debug, Clone, Default)]
pub struct CrmSettings {
    pub access_token: String,
    pub subdomain: String,
    pub message_scope_id: Option<String>,
    pub username_field_id: Option<u64>,
    pub password_field_id: Option<u64>,
    pub proof_status_id: Option<u64>,
}

impl CrmSettings {
    /// Whether CRM calls can be attempted at all.
    pub fn has_credentials(&self) -> bool {
        !self.access_token.is_empty() && !self.subdomain.is_empty()
    }
}

/// Betting backend settings. Empty strings mean "not configured".
#[derive(Debug, Clone, Default)]
pub struct BackendSettings {
    pub kind: String,
    pub api_url: String,
    pub api_token: String,
    pub skin_id: Option<String>,
    pub agent_id: Option<String>,
    pub login_url: Option<String>,
}

/// OAuth client used to write into the operator's contacts book.
#[derive(Debug, Clone)]
pub struct ContactsSettings {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

/// Forward proxy for player-creation calls.
#[derive(Debug, Clone)]
pub struct ForwardProxy {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl ForwardProxy {
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl TenantConfig {
    /// JSON view with every secret replaced, for operator output.
    pub fn redacted(&self) -> Value {
        const REDACTED: &str = "[REDACTED]";
        let mask = |value: &str| {
            if value.is_empty() {
                Value::Null
            } else {
                Value::String(REDACTED.to_string())
            }
        };

        json!({
            "id": self.id,
            "name": self.name,
            "crm": {
                "access_token": mask(&self.crm.access_token),
                "subdomain": self.crm.subdomain,
                "message_scope_id": self.crm.message_scope_id,
                "username_field_id": self.crm.username_field_id,
                "password_field_id": self.crm.password_field_id,
                "proof_status_id": self.crm.proof_status_id,
            },
            "backend": {
                "type": self.backend.kind,
                "api_url": self.backend.api_url,
                "api_token": mask(&self.backend.api_token),
                "skin_id": self.backend.skin_id,
                "agent_id": self.backend.agent_id,
                "login_url": self.backend.login_url,
            },
            "contacts": self.contacts.as_ref().map(|c| json!({
                "client_id": c.client_id,
                "client_secret": REDACTED,
                "refresh_token": REDACTED,
            })),
            "forward_proxy": self.forward_proxy.as_ref().map(|p| json!({
                "host": p.host,
                "port": p.port,
                "username": p.username,
                "password": REDACTED,
            })),
        })
    }
}

/// Read-only registry of tenant definitions.
#[derive(Debug, Clone, Default)]
pub struct TenantRegistry {
    definitions: BTreeMap<String, TenantDefinition>,
}

impl TenantRegistry {
    /// Reads and parses the registry file.
    pub fn load(path: &Path) -> Result<Self, TenantRegistryError> {
        let contents =
            std::fs::read_to_string(path).map_err(|source| TenantRegistryError::Read {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_json_str(&contents)
    }

    /// Parses a registry document.
    pub fn from_json_str(contents: &str) -> Result<Self, TenantRegistryError> {
        let file: RegistryFile = serde_json::from_str(contents)?;
        Ok(Self {
            definitions: file.clients,
        })
    }

    /// Known tenant identifiers, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn contains(&self, tenant_id: &str) -> bool {
        self.definitions.contains_key(tenant_id)
    }

    /// Resolves `tenant_id` against `env`.
    ///
    /// Returns `None` only when the tenant is unknown. Unresolvable fields are
    /// left empty; optional blocks are dropped unless every field resolves.
    pub fn resolve(&self, tenant_id: &str, env: &dyn EnvSource) -> Option<TenantConfig> {
        let Some(definition) = self.definitions.get(tenant_id) else {
            warn!(tenant = tenant_id, "tenant not found in registry");
            return None;
        };

        Some(resolve_definition(tenant_id, definition, env))
    }
}

fn resolve_definition(
    tenant_id: &str,
    definition: &TenantDefinition,
    env: &dyn EnvSource,
) -> TenantConfig {
    let crm = CrmSettings {
        access_token: resolve_value(&definition.kommo.access_token, env).unwrap_or_default(),
        subdomain: resolve_value(&definition.kommo.subdomain, env).unwrap_or_default(),
        message_scope_id: resolve_value(&definition.kommo.whatsapp_scope_id, env),
        username_field_id: resolve_id(&definition.kommo.username_field_id, env),
        password_field_id: resolve_id(&definition.kommo.password_field_id, env),
        proof_status_id: resolve_id(&definition.kommo.proof_status_id, env),
    };

    let backend = BackendSettings {
        kind: resolve_value(&definition.backend.kind, env).unwrap_or_default(),
        api_url: resolve_value(&definition.backend.api_url, env).unwrap_or_default(),
        api_token: resolve_value(&definition.backend.api_token, env).unwrap_or_default(),
        skin_id: resolve_value(&definition.backend.skin_id, env),
        agent_id: resolve_value(&definition.backend.agent_id, env),
        login_url: resolve_value(&definition.backend.login_url, env),
    };

    let contacts = definition.google.as_ref().and_then(|raw| {
        match (
            resolve_value(&raw.client_id, env),
            resolve_value(&raw.client_secret, env),
            resolve_value(&raw.refresh_token, env),
        ) {
            (Some(client_id), Some(client_secret), Some(refresh_token)) => Some(ContactsSettings {
                client_id,
                client_secret,
                refresh_token,
            }),
            _ => {
                debug!(tenant = tenant_id, "contacts block incomplete; omitting it");
                None
            }
        }
    });

    let forward_proxy = definition.proxy.as_ref().and_then(|raw| {
        let port = resolve_value(&raw.port, env);
        match (
            resolve_value(&raw.host, env),
            port.as_deref().and_then(|p| p.parse::<u16>().ok()),
            resolve_value(&raw.username, env),
            resolve_value(&raw.password, env),
        ) {
            (Some(host), Some(port), Some(username), Some(password)) => Some(ForwardProxy {
                host,
                port,
                username,
                password,
            }),
            _ => {
                if port.as_deref().is_some_and(|p| p.parse::<u16>().is_err()) {
                    warn!(tenant = tenant_id, "forward proxy port is not a valid port number");
                }
                debug!(tenant = tenant_id, "forward proxy block incomplete; omitting it");
                None
            }
        }
    });

    TenantConfig {
        id: tenant_id.to_string(),
        name: definition.name.clone(),
        crm,
        backend,
        contacts,
        forward_proxy,
    }
}
