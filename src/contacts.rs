//! Google People contacts client
//!
//! Each tenant authorizes the bridge once (see the `bridge-admin` binary) and
//! stores the resulting refresh token. Every contact creation trades that
//! refresh token for a short-lived access token and then calls
//! `people:createContact`.

use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, RefreshToken,
    Scope, TokenResponse, TokenUrl,
};
use reqwest::{Client, redirect};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::AppConfig;
use crate::error::body_snippet;
use crate::tenants::ContactsSettings;

/// Google consent endpoint.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Scope needed to create contacts.
pub const CONTACTS_SCOPE: &str = "https://www.googleapis.com/auth/contacts";

/// Contacts client errors
#[derive(Debug, Error)]
pub enum ContactsError {
    #[error("invalid OAuth endpoint url: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("failed to build contacts HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("token request failed: {0}")]
    Token(String),

    #[error("contacts request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("contacts API returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Contact to create. Email is optional; name and phone are not.
#[derive(Debug, Clone)]
pub struct NewContact<'a> {
    pub name: &'a str,
    pub phone: &'a str,
    pub email: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PersonBody<'a> {
    names: Vec<PersonName<'a>>,
    phone_numbers: Vec<TypedValue<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    email_addresses: Vec<TypedValue<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PersonName<'a> {
    given_name: &'a str,
}

#[derive(Debug, Serialize)]
struct TypedValue<'a> {
    value: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
}

impl<'a> From<&NewContact<'a>> for PersonBody<'a> {
    fn from(contact: &NewContact<'a>) -> Self {
        Self {
            names: vec![PersonName {
                given_name: contact.name,
            }],
            phone_numbers: vec![TypedValue {
                value: contact.phone,
                kind: "mobile",
            }],
            email_addresses: contact
                .email
                .map(|value| TypedValue {
                    value,
                    kind: "home",
                })
                .into_iter()
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedPerson {
    #[serde(default)]
    resource_name: Option<String>,
}

/// Client for the token endpoint and the People API.
#[derive(Debug, Clone)]
pub struct ContactsClient {
    http: Client,
    token_url: String,
    people_base_url: String,
}

impl ContactsClient {
    pub fn new(config: &AppConfig) -> Result<Self, ContactsError> {
        // The oauth2 crate expects redirects to be disabled on its HTTP client.
        let http = Client::builder()
            .timeout(config.contacts_timeout())
            .redirect(redirect::Policy::none())
            .build()
            .map_err(ContactsError::Client)?;

        Ok(Self {
            http,
            token_url: config.google_token_url.clone(),
            people_base_url: config.google_people_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Consent URL asking for offline access to the contacts scope.
    pub fn authorization_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
    ) -> Result<Url, ContactsError> {
        let client = BasicClient::new(ClientId::new(client_id.to_string()))
            .set_auth_uri(AuthUrl::new(GOOGLE_AUTH_URL.to_string())?)
            .set_redirect_uri(RedirectUrl::new(redirect_uri.to_string())?);

        let (url, _state) = client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new(CONTACTS_SCOPE.to_string()))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();
        Ok(url)
    }

    /// Exchanges an authorization code, returning the refresh token if granted.
    pub async fn exchange_authorization_code(
        &self,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
        code: &str,
    ) -> Result<Option<String>, ContactsError> {
        let client = BasicClient::new(ClientId::new(client_id.to_string()))
            .set_client_secret(ClientSecret::new(client_secret.to_string()))
            .set_token_uri(TokenUrl::new(self.token_url.clone())?)
            .set_redirect_uri(RedirectUrl::new(redirect_uri.to_string())?);

        let token = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| ContactsError::Token(e.to_string()))?;

        Ok(token.refresh_token().map(|t| t.secret().to_string()))
    }

    /// Trades the tenant's refresh token for an access token.
    pub async fn access_token(&self, settings: &ContactsSettings) -> Result<String, ContactsError> {
        let client = BasicClient::new(ClientId::new(settings.client_id.clone()))
            .set_client_secret(ClientSecret::new(settings.client_secret.clone()))
            .set_token_uri(TokenUrl::new(self.token_url.clone())?);

        let refresh_token = RefreshToken::new(settings.refresh_token.clone());
        let token = client
            .exchange_refresh_token(&refresh_token)
            .request_async(&self.http)
            .await
            .map_err(|e| ContactsError::Token(e.to_string()))?;

        Ok(token.access_token().secret().to_string())
    }

    /// Creates a contact and returns its resource name when the API reports one.
    pub async fn create_contact(
        &self,
        settings: &ContactsSettings,
        contact: &NewContact<'_>,
    ) -> Result<Option<String>, ContactsError> {
        let access_token = self.access_token(settings).await?;

        let response = self
            .http
            .post(format!("{}/people:createContact", self.people_base_url))
            .bearer_auth(access_token)
            .json(&PersonBody::from(contact))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ContactsError::Status {
                status: status.as_u16(),
                body: body_snippet(&body),
            });
        }

        let created: CreatedPerson = response.json().await.unwrap_or(CreatedPerson {
            resource_name: None,
        });
        debug!(resource_name = ?created.resource_name, "contact created");
        Ok(created.resource_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings() -> ContactsSettings {
        ContactsSettings {
            client_id: "gid".to_string(),
            client_secret: "gsecret".to_string(),
            refresh_token: "grefresh".to_string(),
        }
    }

    fn config_for(server: &MockServer) -> AppConfig {
        AppConfig {
            google_token_url: format!("{}/token", server.uri()),
            google_people_base_url: format!("{}/v1", server.uri()),
            ..AppConfig::default()
        }
    }

    #[test]
    fn person_body_omits_unknown_email() {
        let contact = NewContact {
            name: "Ana",
            phone: "+5411",
            email: None,
        };
        let body = serde_json::to_value(PersonBody::from(&contact)).unwrap();
        assert_eq!(
            body,
            json!({
                "names": [{"givenName": "Ana"}],
                "phoneNumbers": [{"value": "+5411", "type": "mobile"}]
            })
        );
    }

    #[test]
    fn authorization_url_requests_offline_contacts_access() {
        let client = ContactsClient::new(&AppConfig::default()).unwrap();
        let url = client
            .authorization_url("gid", "http://localhost:8085/callback")
            .unwrap();
        let query: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(query.get("client_id").map(String::as_str), Some("gid"));
        assert_eq!(query.get("scope").map(String::as_str), Some(CONTACTS_SCOPE));
        assert_eq!(query.get("access_type").map(String::as_str), Some("offline"));
        assert_eq!(query.get("prompt").map(String::as_str), Some("consent"));
    }

    #[tokio::test]
    async fn refreshes_token_then_creates_contact() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fresh-access",
                "token_type": "Bearer",
                "expires_in": 3599
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/people:createContact"))
            .and(header("authorization", "Bearer fresh-access"))
            .and(body_json(json!({
                "names": [{"givenName": "Ana"}],
                "phoneNumbers": [{"value": "+5411", "type": "mobile"}],
                "emailAddresses": [{"value": "ana@example.com", "type": "home"}]
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"resourceName": "people/c1"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = ContactsClient::new(&config_for(&server)).unwrap();
        let contact = NewContact {
            name: "Ana",
            phone: "+5411",
            email: Some("ana@example.com"),
        };
        let created = client.create_contact(&settings(), &contact).await.unwrap();
        assert_eq!(created.as_deref(), Some("people/c1"));
    }

    #[tokio::test]
    async fn token_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant"
            })))
            .mount(&server)
            .await;

        let client = ContactsClient::new(&config_for(&server)).unwrap();
        let err = client.access_token(&settings()).await.unwrap_err();
        assert!(matches!(err, ContactsError::Token(_)));
    }
}
