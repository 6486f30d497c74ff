//! End-to-end tests for the create-player webhook against mocked CRM,
//! backend and Google endpoints.

use regex::Regex;
use reqwest::StatusCode;
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::{
    BACKEND_TOKEN, CRM_TOKEN, acme_definition, config_for, registry_with, spawn_test_app,
};

const WEBHOOK_FORM: [(&str, &str); 2] = [
    ("leads[add][0][id]", "42"),
    ("email", "ana@example.com"),
];

async fn mount_backend_ok(mock: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/backend/players"))
        .and(header("authorization", format!("Bearer {BACKEND_TOKEN}").as_str()))
        .and(header("content-type", "application/json-patch+json"))
        .and(body_partial_json(json!({
            "skinId": "skin-9",
            "agentId": "agent-3",
            "language": "es"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 9})))
        .expect(1)
        .mount(mock)
        .await;
}

async fn mount_lead_lookup(mock: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/acme/api/v4/leads/42"))
        .and(header("authorization", format!("Bearer {CRM_TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 42,
            "status_id": 10,
            "_embedded": {"contacts": [{"id": 7}]}
        })))
        .mount(mock)
        .await;

    Mock::given(method("GET"))
        .and(path("/acme/api/v4/contacts/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 7,
            "name": "Ana Pérez",
            "custom_fields_values": [
                {"field_id": 1, "field_code": "PHONE", "values": [{"value": "+5491100000000"}]},
                {"field_id": 2, "field_code": "EMAIL", "values": [{"value": "crm@example.com"}]}
            ]
        })))
        .mount(mock)
        .await;
}

async fn post_form(url: &str) -> (StatusCode, Value) {
    let response = reqwest::Client::new()
        .post(url)
        .form(&WEBHOOK_FORM[..])
        .send()
        .await
        .expect("request succeeds");
    let status = response.status();
    (status, response.json().await.expect("json body"))
}

#[tokio::test]
async fn creates_player_and_delivers_credentials_by_message() {
    let mock = MockServer::start().await;
    mount_backend_ok(&mock).await;
    mount_lead_lookup(&mock).await;

    Mock::given(method("PATCH"))
        .and(path("/acme/api/v4/leads/42"))
        .and(body_string_contains("\"field_id\":1001"))
        .and(body_string_contains("\"field_id\":1002"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 42})))
        .expect(1)
        .mount(&mock)
        .await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "g-access",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&mock)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/people:createContact"))
        .and(header("authorization", "Bearer g-access"))
        .and(body_partial_json(json!({
            "names": [{"givenName": "Ana Pérez"}],
            "phoneNumbers": [{"value": "+5491100000000", "type": "mobile"}],
            "emailAddresses": [{"value": "ana@example.com", "type": "home"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"resourceName": "people/c1"})))
        .expect(1)
        .mount(&mock)
        .await;

    Mock::given(method("POST"))
        .and(path("/acme/api/v4/talks/messages"))
        .and(body_partial_json(json!({"conversation_id": 42, "scope_id": "scope-1"})))
        .and(body_string_contains("Podés iniciar sesión en: https://play.acme.example"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&mock)
        .await;

    Mock::given(method("POST"))
        .and(path("/acme/api/v4/leads/notes"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock)
        .await;

    let mut definition = acme_definition(&mock);
    definition["google"] = json!({
        "client_id": "gid",
        "client_secret": "gsecret",
        "refresh_token": "grefresh"
    });
    let (server_url, handle) = spawn_test_app(config_for(&mock), registry_with(definition)).await;

    let (status, body) = post_form(&format!("{server_url}/api/acme/create-player-from-kommo")).await;

    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Player created successfully");
    assert_eq!(body["client"], "acme");
    assert!(
        Regex::new(r"^bet\d{8}$")
            .unwrap()
            .is_match(body["username"].as_str().unwrap())
    );
    assert_eq!(body["password"].as_str().unwrap().len(), 10);
    assert_eq!(body["player_data"], json!({"id": 9}));
    assert_eq!(body["custom_fields_updated"], true);
    assert_eq!(body["contact_created"], true);
    assert_eq!(body["message_sent"], true);
    assert_eq!(body["note_sent"], false);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn json_webhook_body_creates_player() {
    let mock = MockServer::start().await;
    mount_backend_ok(&mock).await;
    mount_lead_lookup(&mock).await;

    Mock::given(method("PATCH"))
        .and(path("/acme/api/v4/leads/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 42})))
        .mount(&mock)
        .await;
    Mock::given(method("POST"))
        .and(path("/acme/api/v4/talks/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&mock)
        .await;

    let (server_url, handle) =
        spawn_test_app(config_for(&mock), registry_with(acme_definition(&mock))).await;

    let response = reqwest::Client::new()
        .post(format!("{server_url}/api/acme/create-player-from-kommo"))
        .json(&json!({"leads[add][0][id]": "42", "email": "a@b.com"}))
        .send()
        .await
        .expect("request succeeds");
    let status = response.status();
    let body: Value = response.json().await.expect("json body");

    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["success"], true);
    assert!(
        Regex::new(r"^bet\d{8}$")
            .unwrap()
            .is_match(body["username"].as_str().unwrap())
    );
    assert_eq!(body["player_data"], json!({"id": 9}));
    assert_eq!(body["message_sent"], true);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn failed_message_falls_back_to_note_on_legacy_route() {
    let mock = MockServer::start().await;
    mount_backend_ok(&mock).await;

    Mock::given(method("GET"))
        .and(path("/acme/api/v4/leads/42"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/acme/api/v4/leads/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 42})))
        .mount(&mock)
        .await;

    Mock::given(method("POST"))
        .and(path("/acme/api/v4/talks/messages"))
        .respond_with(ResponseTemplate::new(500).set_body_string("talks down"))
        .expect(1)
        .mount(&mock)
        .await;

    Mock::given(method("POST"))
        .and(path("/acme/api/v4/leads/notes"))
        .and(body_string_contains("Usuario: bet"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&mock)
        .await;

    let (server_url, handle) =
        spawn_test_app(config_for(&mock), registry_with(acme_definition(&mock))).await;

    let (status, body) = post_form(&format!("{server_url}/api/create-player-from-kommo")).await;

    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["client"], "acme");
    assert_eq!(body["message_sent"], false);
    assert_eq!(body["note_sent"], true);
    assert_eq!(body["contact_created"], false);
    assert_eq!(body["custom_fields_updated"], true);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn html_block_page_is_reported_and_nothing_is_dispatched() {
    let mock = MockServer::start().await;
    mount_lead_lookup(&mock).await;

    Mock::given(method("POST"))
        .and(path("/backend/players"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<html><body>Access denied</body></html>", "text/html; charset=utf-8"),
        )
        .expect(1)
        .mount(&mock)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/acme/api/v4/leads/42"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock)
        .await;
    Mock::given(method("POST"))
        .and(path("/acme/api/v4/talks/messages"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock)
        .await;
    Mock::given(method("POST"))
        .and(path("/acme/api/v4/leads/notes"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock)
        .await;

    let (server_url, handle) =
        spawn_test_app(config_for(&mock), registry_with(acme_definition(&mock))).await;

    let (status, body) = post_form(&format!("{server_url}/api/acme/create-player-from-kommo")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "BACKEND_BLOCKED");
    assert_eq!(body["details"]["status"], 200);
    assert!(
        body["details"]["body_snippet"]
            .as_str()
            .unwrap()
            .contains("Access denied")
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn backend_rejection_keeps_its_status() {
    let mock = MockServer::start().await;
    mount_lead_lookup(&mock).await;

    Mock::given(method("POST"))
        .and(path("/backend/players"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({"error": "user exists"})),
        )
        .mount(&mock)
        .await;

    let (server_url, handle) =
        spawn_test_app(config_for(&mock), registry_with(acme_definition(&mock))).await;

    let (status, body) = post_form(&format!("{server_url}/api/acme/create-player-from-kommo")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "BACKEND_REJECTED");
    assert_eq!(body["details"]["status"], 409);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn non_json_success_is_malformed() {
    let mock = MockServer::start().await;
    mount_lead_lookup(&mock).await;

    Mock::given(method("POST"))
        .and(path("/backend/players"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("created", "text/plain"))
        .mount(&mock)
        .await;

    let (server_url, handle) =
        spawn_test_app(config_for(&mock), registry_with(acme_definition(&mock))).await;

    let (status, body) = post_form(&format!("{server_url}/api/acme/create-player-from-kommo")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "BACKEND_MALFORMED_RESPONSE");
    assert_eq!(body["details"]["body_snippet"], "created");

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn unknown_tenant_makes_no_upstream_calls() {
    let mock = MockServer::start().await;

    let (server_url, handle) =
        spawn_test_app(config_for(&mock), registry_with(acme_definition(&mock))).await;

    let (status, body) = post_form(&format!("{server_url}/api/ghost/create-player-from-kommo")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "TENANT_NOT_FOUND");
    assert!(mock.received_requests().await.unwrap().is_empty());

    handle.shutdown().await.unwrap();
}
