//! Shared helpers: start a gateway on a free port against a temp sandbox root.

#![allow(dead_code)]

use lsgate_core::config::Config;
use lsgate_core::gateway;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

/// Temp dir holding `config.json` and a `data` sandbox root seeded with `files`.
pub fn temp_sandbox(files: &[&str]) -> (PathBuf, PathBuf) {
    let dir = std::env::temp_dir().join(format!("lsgate-gateway-test-{}", uuid::Uuid::new_v4()));
    let root = dir.join("data");
    std::fs::create_dir_all(&root).expect("create sandbox root");
    for f in files {
        let path = root.join(f);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(path, b"x").expect("write sandbox file");
    }
    let config_path = dir.join("config.json");
    std::fs::write(&config_path, b"{}").expect("write config.json");
    (root, config_path)
}

pub fn test_config(port: u16, root: &Path) -> Config {
    let mut config = Config::default();
    config.gateway.port = port;
    config.gateway.bind = "127.0.0.1".to_string();
    config.sandbox.root = Some(root.to_path_buf());
    config
}

/// Spawn the gateway and wait until GET / answers. The server task is left running when the test ends.
pub async fn start_gateway(config: Config, config_path: PathBuf) -> u16 {
    let port = config.gateway.port;
    tokio::spawn(async move {
        if let Err(e) = gateway::run_gateway(config, config_path).await {
            eprintln!("gateway exited: {:#}", e);
        }
    });

    let url = format!("http://127.0.0.1:{}/", port);
    let client = reqwest::Client::new();
    for _ in 0..100 {
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return port;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("gateway on port {} did not become healthy within 5s", port);
}
