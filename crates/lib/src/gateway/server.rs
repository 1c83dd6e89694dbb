//! Gateway HTTP + WebSocket server (single port).

use crate::config::{self, Config};
use crate::dispatch::Reply;
use crate::gateway::protocol::{
    reply_frame, ClientFrame, ConnectParams, HelloOk, WsEvent, WsRequest, WsResponse,
    MESSAGE_EVENT,
};
use crate::sandbox::Sandbox;
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

const PROTOCOL_VERSION: u32 = 1;

/// Messages a single connection may have waiting behind the one currently running. When full, the
/// connection stops reading frames until the worker catches up.
const COMMAND_QUEUE_DEPTH: usize = 16;

const SHUTDOWN_EVENT_JSON: &str = r#"{"type":"event","event":"shutdown","payload":{}}"#;

/// When auth mode is token and a token is configured, returns it for connect validation.
fn require_connect_token(config: &Config) -> Option<String> {
    if config.gateway.auth.mode == config::GatewayAuthMode::Token {
        config::resolve_gateway_token(config)
    } else {
        None
    }
}

/// Shared state for the gateway. Everything here is read-only after startup.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub sandbox: Arc<Sandbox>,
    /// When Some, WebSocket connect must provide params.auth.token matching this before any message is run.
    pub required_token: Option<String>,
    /// Broadcasts events to connected clients (e.g. shutdown). Subscribers receive JSON event frames.
    pub event_tx: broadcast::Sender<String>,
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// When bind is not loopback, a gateway token must be configured or startup fails.
/// The sandbox root must exist and be a directory. Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config, config_path: PathBuf) -> Result<()> {
    let bind = config.gateway.bind.trim().to_string();
    if !config::is_loopback_bind(&bind) {
        let token = config::resolve_gateway_token(&config);
        if token.is_none() || config.gateway.auth.mode != config::GatewayAuthMode::Token {
            anyhow::bail!(
                "refusing to bind gateway to {} without auth (set gateway.auth.mode to \"token\" and gateway.auth.token or LSGATE_GATEWAY_TOKEN)",
                bind
            );
        }
    }

    let root = config::resolve_sandbox_root(&config, &config_path);
    let sandbox = Sandbox::open(&root, &config.sandbox)?;
    log::info!(
        "sandbox root {} (program {}, confine {})",
        sandbox.root().display(),
        sandbox.program(),
        config.sandbox.confine
    );

    let (event_tx, _) = broadcast::channel(16);
    let state = GatewayState {
        required_token: require_connect_token(&config),
        config: Arc::new(config),
        sandbox: Arc::new(sandbox),
        event_tx: event_tx.clone(),
    };
    let port = state.config.gateway.port;

    let app = Router::new()
        .route("/", get(health_http))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let bind_addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(event_tx))
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// Broadcasts a shutdown event so WebSocket handlers close their sockets.
async fn shutdown_signal(event_tx: broadcast::Sender<String>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, broadcasting shutdown and draining connections");
    let _ = event_tx.send(SHUTDOWN_EVENT_JSON.to_string());
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "protocol": PROTOCOL_VERSION,
        "port": state.config.gateway.port,
        "program": state.sandbox.program(),
    }))
}

/// GET /ws upgrades to WebSocket.
async fn ws_handler(State(state): State<GatewayState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// One entry in a connection's reply order: a command to run, or a reply already decided when the
/// message arrived (unauthorized, malformed payload).
#[derive(Debug)]
enum Job {
    Run(String),
    Reply(Reply),
}

/// Works through one connection's jobs in arrival order, one child at a time.
async fn run_commands(
    sandbox: Arc<Sandbox>,
    mut jobs: mpsc::Receiver<Job>,
    replies: mpsc::Sender<Reply>,
) {
    while let Some(job) = jobs.recv().await {
        let reply = match job {
            Job::Run(raw) => sandbox.handle(&raw).await,
            Job::Reply(reply) => reply,
        };
        if replies.send(reply).await.is_err() {
            break;
        }
    }
}

async fn send_text(socket: &mut WebSocket, text: String) -> bool {
    socket.send(Message::Text(text)).await.is_ok()
}

async fn send_response(socket: &mut WebSocket, res: &WsResponse) -> bool {
    send_text(socket, serde_json::to_string(res).unwrap_or_default()).await
}

async fn handle_socket(mut socket: WebSocket, state: GatewayState) {
    let conn_id = uuid::Uuid::new_v4();
    log::debug!("ws {} opened", conn_id);
    let mut authorized = state.required_token.is_none();
    let mut event_rx = state.event_tx.subscribe();
    let (job_tx, job_rx) = mpsc::channel::<Job>(COMMAND_QUEUE_DEPTH);
    let (reply_tx, mut reply_rx) = mpsc::channel::<Reply>(COMMAND_QUEUE_DEPTH);
    let worker = tokio::spawn(run_commands(state.sandbox.clone(), job_rx, reply_tx));
    // A message waiting for room in the job queue. While set, no further frames are read.
    let mut pending: Option<Job> = None;

    loop {
        tokio::select! {
            biased;

            event = event_rx.recv() => {
                match event {
                    Ok(text) => {
                        let is_shutdown = text == SHUTDOWN_EVENT_JSON;
                        let _ = send_text(&mut socket, text).await;
                        if is_shutdown {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::debug!("ws client lagged {} broadcast messages", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            Some(reply) = reply_rx.recv() => {
                if !send_text(&mut socket, reply_frame(&reply)).await {
                    break;
                }
            }
            permit = job_tx.reserve(), if pending.is_some() => {
                let Ok(permit) = permit else {
                    log::warn!("ws {} command worker stopped unexpectedly", conn_id);
                    break;
                };
                if let Some(job) = pending.take() {
                    permit.send(job);
                }
            }
            msg = socket.recv(), if pending.is_none() => {
                let Some(Ok(msg)) = msg else { break };
                let Message::Text(text) = msg else { continue };
                let frame: ClientFrame = match serde_json::from_str(&text) {
                    Ok(f) => f,
                    Err(e) => {
                        log::debug!("ws {} ignoring unparseable frame: {}", conn_id, e);
                        continue;
                    }
                };
                match frame {
                    ClientFrame::Req(req) => {
                        let res = handle_request(&state, &req, &mut authorized);
                        if !send_response(&mut socket, &res).await {
                            break;
                        }
                    }
                    ClientFrame::Event(event) => {
                        pending = message_job(&state, event, authorized);
                    }
                }
            }
        }
    }

    drop(job_tx);
    worker.abort();
    log::debug!("ws {} closed", conn_id);
}

/// Answer a request frame. `connect` flips `authorized` on success.
fn handle_request(state: &GatewayState, req: &WsRequest, authorized: &mut bool) -> WsResponse {
    match req.method.as_str() {
        "connect" => {
            let params: ConnectParams = if req.params.is_null() {
                ConnectParams::default()
            } else {
                match serde_json::from_value(req.params.clone()) {
                    Ok(p) => p,
                    Err(_) => return WsResponse::err(&req.id, "invalid connect params"),
                }
            };
            if let Some(ref required) = state.required_token {
                let provided = params.auth.token.as_deref().unwrap_or("").trim();
                if provided.is_empty() {
                    return WsResponse::err(
                        &req.id,
                        "unauthorized: gateway token missing (set LSGATE_GATEWAY_TOKEN or gateway.auth.token)",
                    );
                }
                if provided != required {
                    return WsResponse::err(&req.id, "unauthorized: gateway token mismatch");
                }
            }
            *authorized = true;
            log::debug!(
                "ws connect from client {}",
                params.client.id.as_deref().unwrap_or("(anonymous)")
            );
            let hello = HelloOk {
                typ: "hello-ok".to_string(),
                protocol: PROTOCOL_VERSION,
                program: state.sandbox.program().to_string(),
            };
            WsResponse::ok(&req.id, serde_json::to_value(&hello).unwrap_or(json!({})))
        }
        "health" => WsResponse::ok(
            &req.id,
            json!({
                "runtime": "running",
                "protocol": PROTOCOL_VERSION,
            }),
        ),
        other => WsResponse::err(&req.id, format!("unknown method: {}", other)),
    }
}

/// Turn a client event into the job it occupies in the connection's reply order. Events other than
/// `message` get no reply at all.
fn message_job(state: &GatewayState, event: WsEvent, authorized: bool) -> Option<Job> {
    if event.event != MESSAGE_EVENT {
        log::debug!("ignoring client event {}", event.event);
        return None;
    }
    if !authorized {
        return Some(Job::Reply(Reply::Error(
            "unauthorized: send connect with gateway token first".to_string(),
        )));
    }
    match event.payload.as_str() {
        Some(raw) => Some(Job::Run(raw.to_string())),
        None => Some(Job::Reply(state.sandbox.reject_malformed())),
    }
}
