//! Integration test: start the gateway on a free port, GET /, assert health JSON.
//! Does not spawn any listing. The server task is left running when the test ends.

mod common;

#[tokio::test]
async fn gateway_health_http_responds_with_running() {
    let port = common::free_port();
    let (root, config_path) = common::temp_sandbox(&[]);
    common::start_gateway(common::test_config(port, &root), config_path).await;

    let url = format!("http://127.0.0.1:{}/", port);
    let resp = reqwest::get(&url).await.expect("GET /");
    assert!(resp.status().is_success());
    let json: serde_json::Value = resp.json().await.expect("parse JSON");
    assert_eq!(json.get("runtime").and_then(|v| v.as_str()), Some("running"));
    assert_eq!(json.get("protocol").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(json.get("port").and_then(|v| v.as_u64()), Some(port as u64));
    assert_eq!(json.get("program").and_then(|v| v.as_str()), Some("ls"));
}

#[tokio::test]
async fn gateway_refuses_missing_sandbox_root() {
    let port = common::free_port();
    let (root, config_path) = common::temp_sandbox(&[]);
    let missing = root.join("not-there");
    let config = common::test_config(port, &missing);
    let err = lsgate_core::gateway::run_gateway(config, config_path)
        .await
        .expect_err("missing root must fail startup");
    assert!(format!("{:#}", err).contains("sandbox root"));
}

#[tokio::test]
async fn gateway_refuses_public_bind_without_token() {
    let port = common::free_port();
    let (root, config_path) = common::temp_sandbox(&[]);
    let mut config = common::test_config(port, &root);
    config.gateway.bind = "0.0.0.0".to_string();
    if std::env::var("LSGATE_GATEWAY_TOKEN").is_ok() {
        return;
    }
    let err = lsgate_core::gateway::run_gateway(config, config_path)
        .await
        .expect_err("public bind without auth must fail");
    assert!(err.to_string().contains("refusing to bind"));
}
