#![allow(clippy::unwrap_used)]
// Integration tests for `DeviceApiClient` using wiremock.

use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use devgrid_api::{BodyEncoding, DeviceApiClient, Error, WireId, WireState};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, DeviceApiClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let client = DeviceApiClient::with_client(reqwest::Client::new(), base_url).unwrap();
    (server, client)
}

// ── Listing ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_list_devices() {
    let (server, client) = setup().await;

    let body = json!([
        { "id": 1, "type_name": "Light", "name": "Lamp", "state": "off", "commands": ["on", "off"] },
        { "id": 2, "type_name": "Light", "name": "Bulb", "state": "on" },
        { "id": "fan-3", "type_name": "Switch", "name": "Fan", "state": "off", "commands": ["toggle"] }
    ]);

    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let devices = client.list_devices().await.unwrap();

    assert_eq!(devices.len(), 3);
    assert_eq!(devices[0].name, "Lamp");
    assert_eq!(devices[0].commands, vec!["on", "off"]);
    assert!(devices[1].commands.is_empty());
    assert_eq!(devices[2].id, WireId::Text("fan-3".into()));
}

#[tokio::test]
async fn test_list_devices_server_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let result = client.list_devices().await;

    assert!(
        matches!(result, Err(Error::Status { status: 500, ref body }) if body == "boom"),
        "expected Status error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_list_devices_malformed_entry_fails_whole_list() {
    let (server, client) = setup().await;

    let body = json!([
        { "id": 1, "type_name": "Light", "name": "Lamp", "state": "off" },
        { "id": 2, "type_name": "Light", "state": "on" }
    ]);

    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let result = client.list_devices().await;

    assert!(
        matches!(result, Err(Error::Deserialization { .. })),
        "expected Deserialization error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_bearer_token_is_sent() {
    let server = MockServer::start().await;
    let transport = devgrid_api::TransportConfig::default()
        .with_bearer_token(secrecy::SecretString::from("hub-token".to_string()));
    let client = DeviceApiClient::new(Url::parse(&server.uri()).unwrap(), &transport).unwrap();

    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .and(header("authorization", "Bearer hub-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let devices = client.list_devices().await.unwrap();
    assert!(devices.is_empty());
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_send_command_json_body() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/device/1"))
        .and(body_json(json!({ "command": "on" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1, "state": "on" })))
        .expect(1)
        .mount(&server)
        .await;

    let ack = client.send_command("1", "on").await.unwrap();

    assert_eq!(ack.id, WireId::Integer(1));
    assert_eq!(ack.state, WireState::Text("on".into()));
}

#[tokio::test]
async fn test_send_command_form_body() {
    let (server, client) = setup().await;
    let client = client.with_body_encoding(BodyEncoding::Form);

    Mock::given(method("POST"))
        .and(path("/api/device/7"))
        .and(body_string("command=dim"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 7, "state": 40 })))
        .expect(1)
        .mount(&server)
        .await;

    let ack = client.send_command("7", "dim").await.unwrap();

    assert_eq!(ack.state.to_string(), "40");
}

#[tokio::test]
async fn test_send_command_missing_state() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/device/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1 })))
        .mount(&server)
        .await;

    let result = client.send_command("1", "on").await;

    assert!(
        matches!(result, Err(Error::MalformedResponse { ref reason }) if reason.contains("state")),
        "expected MalformedResponse error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_send_command_missing_id() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/device/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "state": "on" })))
        .mount(&server)
        .await;

    let result = client.send_command("1", "on").await;

    assert!(
        matches!(result, Err(Error::MalformedResponse { ref reason }) if reason.contains("id")),
        "expected MalformedResponse error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_send_command_not_found() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/device/99"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such device"))
        .mount(&server)
        .await;

    let err = client.send_command("99", "on").await.unwrap_err();

    assert!(err.is_not_found(), "expected not-found, got: {err:?}");
}
