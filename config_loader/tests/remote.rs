use config_loader::{ConfigError, FileFormat, TetrisConfig};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

async fn serve(status: u16, body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/kiosk/config"))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .expect(1)
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_remote_toml_is_merged_over_defaults() {
    let server = serve(
        200,
        r#"
        [api]
        base_url = "http://10.0.0.5:5000"
        max_retries = 5

        [stream]
        heartbeat_interval_ms = 45000
        "#,
    )
    .await;

    let config = TetrisConfig::load_remote(&format!("{}/kiosk/config", server.uri()), FileFormat::Toml)
        .await
        .unwrap();

    assert_eq!(config.api.base_url, "http://10.0.0.5:5000");
    assert_eq!(config.api.max_retries, 5);
    assert_eq!(config.stream.heartbeat_interval_ms, 45_000);
    assert_eq!(config.polling.active_ms, 2_000);
}

#[tokio::test]
async fn test_remote_json_source() {
    let server = serve(200, r#"{ "polling": { "idle_ms": 12000 } }"#).await;

    let config = TetrisConfig::load_remote(&format!("{}/kiosk/config", server.uri()), FileFormat::Json)
        .await
        .unwrap();

    assert_eq!(config.polling.idle_ms, 12_000);
}

#[tokio::test]
async fn test_remote_error_status_is_reported() {
    let server = serve(500, "boom").await;
    let uri = format!("{}/kiosk/config", server.uri());

    let err = TetrisConfig::load_remote(&uri, FileFormat::Toml).await.unwrap_err();

    match err {
        ConfigError::Message(message) => {
            assert!(message.contains("500"), "{message}");
            assert!(message.contains(&uri), "{message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_remote_config_is_validated() {
    let server = serve(200, "[polling]\nactive_ms = 20000\n").await;

    let err = TetrisConfig::load_remote(&format!("{}/kiosk/config", server.uri()), FileFormat::Toml)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("active <= idle <= error"), "{err}");
}
