//! Configuration loading for the bridge service.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `KOMMO_BRIDGE_`, producing a typed [`AppConfig`]. Tenant definitions live in
//! a separate registry file, see [`crate::tenants`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment prefix for service settings.
pub const ENV_PREFIX: &str = "KOMMO_BRIDGE_";

/// Placeholder replaced by the tenant's CRM subdomain in [`AppConfig::crm_base_url`].
pub const SUBDOMAIN_PLACEHOLDER: &str = "{subdomain}";

/// Application configuration derived from `KOMMO_BRIDGE_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Path of the JSON tenant registry.
    #[serde(default = "default_tenants_file")]
    pub tenants_file: PathBuf,
    /// Tenant served by the legacy routes that carry no client id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_tenant: Option<String>,
    /// CRM origin template, e.g. `https://{subdomain}.kommo.com`.
    #[serde(default = "default_crm_base_url")]
    pub crm_base_url: String,
    #[serde(default = "default_crm_timeout_seconds")]
    pub crm_timeout_seconds: u64,
    #[serde(default = "default_backend_timeout_seconds")]
    pub backend_timeout_seconds: u64,
    #[serde(default = "default_contacts_timeout_seconds")]
    pub contacts_timeout_seconds: u64,
    #[serde(default = "default_google_token_url")]
    pub google_token_url: String,
    #[serde(default = "default_google_people_base_url")]
    pub google_people_base_url: String,
    #[serde(default = "default_username_prefix")]
    pub username_prefix: String,
    #[serde(default = "default_player_language")]
    pub player_language: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            tenants_file: default_tenants_file(),
            default_tenant: None,
            crm_base_url: default_crm_base_url(),
            crm_timeout_seconds: default_crm_timeout_seconds(),
            backend_timeout_seconds: default_backend_timeout_seconds(),
            contacts_timeout_seconds: default_contacts_timeout_seconds(),
            google_token_url: default_google_token_url(),
            google_people_base_url: default_google_people_base_url(),
            username_prefix: default_username_prefix(),
            player_language: default_player_language(),
        }
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Origin of the CRM account owned by `subdomain`, without trailing slash.
    pub fn crm_origin(&self, subdomain: &str) -> String {
        self.crm_base_url
            .replace(SUBDOMAIN_PLACEHOLDER, subdomain)
            .trim_end_matches('/')
            .to_string()
    }

    pub fn crm_timeout(&self) -> Duration {
        Duration::from_secs(self.crm_timeout_seconds)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_seconds)
    }

    pub fn contacts_timeout(&self) -> Duration {
        Duration::from_secs(self.contacts_timeout_seconds)
    }

    /// Returns a pretty JSON representation suitable for startup logs.
    ///
    /// Service settings carry no secrets; tenant secrets are never part of
    /// `AppConfig`.
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Validates the configuration, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(ConfigError::InvalidLogFormat {
                value: self.log_format.clone(),
            });
        }

        if !self.crm_base_url.contains(SUBDOMAIN_PLACEHOLDER) {
            return Err(ConfigError::InvalidCrmBaseUrl {
                value: self.crm_base_url.clone(),
            });
        }

        for (name, value) in [
            ("CRM_TIMEOUT_SECONDS", self.crm_timeout_seconds),
            ("BACKEND_TIMEOUT_SECONDS", self.backend_timeout_seconds),
            ("CONTACTS_TIMEOUT_SECONDS", self.contacts_timeout_seconds),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidTimeout { name });
            }
        }

        if self.username_prefix.is_empty()
            || !self
                .username_prefix
                .chars()
                .all(|c| c.is_ascii_lowercase())
        {
            return Err(ConfigError::InvalidUsernamePrefix {
                value: self.username_prefix.clone(),
            });
        }

        if let Some(tenant) = &self.default_tenant
            && tenant.trim().is_empty()
        {
            return Err(ConfigError::EmptyDefaultTenant);
        }

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_tenants_file() -> PathBuf {
    PathBuf::from("config/clients.json")
}

fn default_crm_base_url() -> String {
    "https://{subdomain}.kommo.com".to_string()
}

fn default_crm_timeout_seconds() -> u64 {
    10
}

fn default_backend_timeout_seconds() -> u64 {
    30
}

fn default_contacts_timeout_seconds() -> u64 {
    15
}

fn default_google_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_google_people_base_url() -> String {
    "https://people.googleapis.com/v1".to_string()
}

fn default_username_prefix() -> String {
    "bet".to_string()
}

fn default_player_language() -> String {
    "es".to_string()
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read env file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("log format must be 'json' or 'pretty', got '{value}'")]
    InvalidLogFormat { value: String },
    #[error("CRM base url must contain {{subdomain}}, got '{value}'")]
    InvalidCrmBaseUrl { value: String },
    #[error("{name} must be greater than zero")]
    InvalidTimeout { name: &'static str },
    #[error("invalid {name} value '{value}'")]
    InvalidNumber { name: &'static str, value: String },
    #[error("username prefix must be non-empty lowercase ascii, got '{value}'")]
    InvalidUsernamePrefix { value: String },
    #[error("default tenant must not be blank when set")]
    EmptyDefaultTenant,
}

/// Loads configuration using layered `.env` files and `KOMMO_BRIDGE_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads and validates the configuration.
    ///
    /// Precedence, lowest first: `.env`, `.env.local`, `.env.{profile}`,
    /// `.env.{profile}.local`, process environment.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = take_non_empty(&mut layered, "PROFILE").unwrap_or(profile_hint);
        let api_bind_addr =
            take_non_empty(&mut layered, "API_BIND_ADDR").unwrap_or_else(default_api_bind_addr);
        let log_level =
            take_non_empty(&mut layered, "LOG_LEVEL").unwrap_or_else(default_log_level);
        let log_format =
            take_non_empty(&mut layered, "LOG_FORMAT").unwrap_or_else(default_log_format);
        let tenants_file = take_non_empty(&mut layered, "TENANTS_FILE")
            .map(|path| self.resolve_path(path))
            .unwrap_or_else(|| self.resolve_path(default_tenants_file()));
        let default_tenant = take_non_empty(&mut layered, "DEFAULT_TENANT");
        let crm_base_url =
            take_non_empty(&mut layered, "CRM_BASE_URL").unwrap_or_else(default_crm_base_url);
        let crm_timeout_seconds = take_number(&mut layered, "CRM_TIMEOUT_SECONDS")?
            .unwrap_or_else(default_crm_timeout_seconds);
        let backend_timeout_seconds = take_number(&mut layered, "BACKEND_TIMEOUT_SECONDS")?
            .unwrap_or_else(default_backend_timeout_seconds);
        let contacts_timeout_seconds = take_number(&mut layered, "CONTACTS_TIMEOUT_SECONDS")?
            .unwrap_or_else(default_contacts_timeout_seconds);
        let google_token_url = take_non_empty(&mut layered, "GOOGLE_TOKEN_URL")
            .unwrap_or_else(default_google_token_url);
        let google_people_base_url = take_non_empty(&mut layered, "GOOGLE_PEOPLE_BASE_URL")
            .unwrap_or_else(default_google_people_base_url);
        let username_prefix = take_non_empty(&mut layered, "USERNAME_PREFIX")
            .unwrap_or_else(default_username_prefix);
        let player_language = take_non_empty(&mut layered, "PLAYER_LANGUAGE")
            .unwrap_or_else(default_player_language);

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            tenants_file,
            default_tenant,
            crm_base_url,
            crm_timeout_seconds,
            backend_timeout_seconds,
            contacts_timeout_seconds,
            google_token_url,
            google_people_base_url,
            username_prefix,
            player_language,
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn resolve_path(&self, path: impl Into<PathBuf>) -> PathBuf {
        let path = path.into();
        if path.is_absolute() {
            path
        } else {
            self.base_dir.join(path)
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{ENV_PREFIX}PROFILE"))
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn take_non_empty(values: &mut BTreeMap<String, String>, key: &str) -> Option<String> {
    values
        .remove(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn take_number(
    values: &mut BTreeMap<String, String>,
    key: &'static str,
) -> Result<Option<u64>, ConfigError> {
    match take_non_empty(values, key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber {
                name: key,
                value: raw,
            }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.bind_addr().is_ok());
    }

    #[test]
    fn crm_origin_substitutes_subdomain() {
        let config = AppConfig::default();
        assert_eq!(config.crm_origin("acme"), "https://acme.kommo.com");

        let config = AppConfig {
            crm_base_url: "http://127.0.0.1:9000/{subdomain}/".to_string(),
            ..AppConfig::default()
        };
        assert_eq!(config.crm_origin("acme"), "http://127.0.0.1:9000/acme");
    }

    #[test]
    fn rejects_unknown_log_format() {
        let config = AppConfig {
            log_format: "xml".to_string(),
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLogFormat { .. })
        ));
    }

    #[test]
    fn rejects_crm_base_url_without_placeholder() {
        let config = AppConfig {
            crm_base_url: "https://kommo.com".to_string(),
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCrmBaseUrl { .. })
        ));
    }

    #[test]
    fn rejects_zero_timeouts() {
        let config = AppConfig {
            backend_timeout_seconds: 0,
            ..AppConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("BACKEND_TIMEOUT_SECONDS"));
    }

    #[test]
    fn rejects_bad_username_prefix() {
        for prefix in ["", "Bet", "bet1"] {
            let config = AppConfig {
                username_prefix: prefix.to_string(),
                ..AppConfig::default()
            };
            assert!(config.validate().is_err(), "prefix {prefix:?} accepted");
        }
    }
}
