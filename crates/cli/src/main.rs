use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use lsgate_core::config;
use lsgate_core::dispatch::Reply;
use lsgate_core::sandbox::Sandbox;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser)]
#[command(name = "lsgate")]
#[command(about = "lsgate: remote ls behind a command gate", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory, a default config, and the sandbox root.
    Init {
        /// Config file path (default: LSGATE_CONFIG_PATH or ~/.lsgate/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the gateway (HTTP + WebSocket). Clients send `message` events and get `content` or `error` back.
    Gateway {
        /// Config file path (default: LSGATE_CONFIG_PATH or ~/.lsgate/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// WebSocket and HTTP port (default from config or 8080)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Run one command through the gate locally and print its output (e.g. `lsgate run -- ls -la`).
    Run {
        /// Config file path (default: LSGATE_CONFIG_PATH or ~/.lsgate/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// The raw command, as a caller would send it.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, num_args = 0..)]
        command: Vec<String>,
    },

    /// Validate a command without running it; prints accepted tokens or the rejection reason.
    Check {
        /// Config file path (default: LSGATE_CONFIG_PATH or ~/.lsgate/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        #[arg(trailing_var_arg = true, allow_hyphen_values = true, num_args = 0..)]
        command: Vec<String>,
    },

    /// Send commands to a running gateway (interactive).
    Client {
        /// Config file path (default: LSGATE_CONFIG_PATH or ~/.lsgate/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("lsgate {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Run { config, command }) => match run_once(config, command.join(" ")).await {
            Ok(Reply::Content(text)) => print!("{}", text),
            Ok(Reply::Error(text)) => {
                eprintln!("{}", text.trim_end());
                std::process::exit(1);
            }
            Err(e) => {
                log::error!("run failed: {:#}", e);
                std::process::exit(1);
            }
        },
        Some(Commands::Check { config, command }) => {
            if let Err(e) = run_check(config, command.join(" ")) {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Client { config }) => {
            if let Err(e) = run_client(config).await {
                log::error!("client failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(config::default_config_path);
    let root = lsgate_core::init::init_config_dir(&path)?;
    println!(
        "initialized configuration at {} (sandbox root {})",
        path.display(),
        root.display()
    );
    Ok(())
}

async fn run_gateway(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!("starting gateway on {}:{}", config.gateway.bind, config.gateway.port);
    lsgate_core::gateway::run_gateway(config, path).await
}

async fn run_once(config_path: Option<std::path::PathBuf>, raw: String) -> anyhow::Result<Reply> {
    let (config, path) = config::load_config(config_path)?;
    let root = config::resolve_sandbox_root(&config, &path);
    let sandbox = Sandbox::open(&root, &config.sandbox)?;
    Ok(sandbox.handle(&raw).await)
}

fn run_check(config_path: Option<std::path::PathBuf>, raw: String) -> anyhow::Result<()> {
    let (config, _) = config::load_config(config_path)?;
    let policy = lsgate_core::command::CommandPolicy::from_config(&config.sandbox);
    let cmd = policy.validate(&raw)?;
    println!("accepted: {}", cmd.program());
    for arg in cmd.args() {
        println!("  {:?}", arg);
    }
    Ok(())
}

async fn run_client(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    use std::io::{self, Write};

    let (config, _) = config::load_config(config_path)?;
    let bind = config.gateway.bind.trim();
    let host = if bind == "0.0.0.0" { "127.0.0.1" } else { bind };
    let ws_url = format!("ws://{}:{}/ws", host, config.gateway.port);
    let (mut ws, _) = tokio_tungstenite::connect_async(&ws_url).await?;

    let mut connect_params = serde_json::json!({
        "client": { "id": "lsgate-cli", "version": env!("CARGO_PKG_VERSION") }
    });
    if let Some(token) = config::resolve_gateway_token(&config) {
        connect_params["auth"] = serde_json::json!({ "token": token });
    }
    let connect_req = serde_json::json!({
        "type": "req",
        "id": "1",
        "method": "connect",
        "params": connect_params
    });
    ws.send(Message::Text(connect_req.to_string())).await?;

    while let Some(msg) = ws.next().await {
        let Message::Text(text) = msg? else { continue };
        let res: serde_json::Value = serde_json::from_str(&text)?;
        if res.get("type").and_then(|v| v.as_str()) != Some("res") {
            continue;
        }
        if res.get("id").and_then(|v| v.as_str()) == Some("1") {
            if !res.get("ok").and_then(|v| v.as_bool()).unwrap_or(false) {
                let err = res
                    .get("error")
                    .and_then(|v| v.as_str())
                    .unwrap_or("connect failed");
                anyhow::bail!("{}", err);
            }
            break;
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        write!(stdout, "$ ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            break;
        }

        let event = serde_json::json!({ "type": "event", "event": "message", "payload": input });
        ws.send(Message::Text(event.to_string())).await?;

        loop {
            let Some(msg) = ws.next().await else {
                anyhow::bail!("gateway closed the connection");
            };
            let Message::Text(text) = msg? else { continue };
            let frame: serde_json::Value = serde_json::from_str(&text)?;
            if frame.get("type").and_then(|v| v.as_str()) != Some("event") {
                continue;
            }
            let payload = frame.get("payload").and_then(|v| v.as_str()).unwrap_or("");
            match frame.get("event").and_then(|v| v.as_str()) {
                Some("content") => {
                    print!("{}", payload);
                    break;
                }
                Some("error") => {
                    eprintln!("error: {}", payload.trim_end());
                    break;
                }
                Some("shutdown") => anyhow::bail!("gateway is shutting down"),
                _ => continue,
            }
        }
    }

    Ok(())
}
