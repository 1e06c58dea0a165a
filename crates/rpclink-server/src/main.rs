//! rpclink server entry point.
//!
//! Loads the TOML configuration, registers the built-in demonstration
//! objects, and runs the TCP serve loop plus the UDP discovery responder
//! until Ctrl-C.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rpclink_core::{TypeDesc, Value};
use rpclink_server::registry::InvokeFault;
use rpclink_server::{load_config, DiscoveryResponder, ObjectRegistry, RpcServer};

#[derive(Debug, Parser)]
#[command(name = "rpclink-server", about = "rpclink RPC server", version)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long, default_value = "rpclink-server.toml")]
    config: PathBuf,

    /// Override the TCP port from the config file.
    #[arg(short, long)]
    port: Option<u16>,

    /// Disable the UDP discovery responder.
    #[arg(long)]
    no_discovery: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config).context("loading config")?;

    // Level from the config file; `RUST_LOG` wins when set.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.server.log_level.clone())),
        )
        .init();

    info!("rpclink server {:?} starting", config.server.name);

    let mut registry = ObjectRegistry::new();
    register_demo_objects(&mut registry)?;
    for pattern in &config.security.denied_methods {
        registry
            .deny(pattern)
            .with_context(|| format!("denylist pattern {pattern:?}"))?;
    }

    let port = cli.port.unwrap_or(config.network.port);
    let bind: SocketAddr = format!("{}:{port}", config.network.bind_address)
        .parse()
        .context("bind address")?;
    let server = RpcServer::start(bind, registry)
        .await
        .context("starting rpc server")?;

    let _discovery = if cli.no_discovery {
        None
    } else {
        let host = config
            .network
            .advertise_host
            .as_deref()
            .unwrap_or(&config.network.bind_address);
        let advertise: SocketAddr = format!("{host}:{}", server.local_addr().port())
            .parse()
            .context("advertise address")?;
        match DiscoveryResponder::start(&config.server.name, config.network.discovery_port, advertise)
        {
            Ok(responder) => Some(responder),
            Err(e) => {
                // Discovery is best-effort; direct connections still work.
                error!("discovery responder failed to start: {e}");
                None
            }
        }
    };

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutting down");
    server.shutdown().await;
    Ok(())
}

/// Registers the objects served by the stock binary: a calculator and a
/// status enum, enough to exercise every wire feature from a stock client.
fn register_demo_objects(registry: &mut ObjectRegistry) -> anyhow::Result<()> {
    registry.register_enum("RunMode", [("Idle", 0), ("Active", 1), ("Fault", 2)]);

    registry.register_method(
        "Calc",
        "Add",
        vec![TypeDesc::I32, TypeDesc::I32],
        Some(TypeDesc::I32),
        |args| match (&args[0], &args[1]) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
            _ => Err(InvokeFault::new("bad arguments")),
        },
    )?;
    registry.register_method(
        "Calc",
        "Sum",
        vec![TypeDesc::Array(Box::new(TypeDesc::I32))],
        Some(TypeDesc::I32),
        |args| match &args[0] {
            Value::Array(items) => {
                let mut total = 0i64;
                for item in items {
                    match item {
                        Value::Int(n) => total += n,
                        _ => return Err(InvokeFault::new("non-integer element")),
                    }
                }
                Ok(Value::Int(total))
            }
            _ => Err(InvokeFault::new("bad arguments")),
        },
    )?;
    registry.register_method(
        "Server",
        "Echo",
        vec![TypeDesc::Str],
        Some(TypeDesc::Str),
        |args| match &args[0] {
            Value::Str(s) => Ok(Value::Str(s.clone())),
            _ => Err(InvokeFault::new("bad arguments")),
        },
    )?;
    registry.register_method(
        "Server",
        "SetMode",
        vec![TypeDesc::Enum("RunMode".to_string())],
        None,
        |args| match &args[0] {
            Value::Int(mode) => {
                info!("run mode set to {mode}");
                Ok(Value::Null)
            }
            _ => Err(InvokeFault::new("bad arguments")),
        },
    )?;
    Ok(())
}
