//! rpclink client entry point: one-shot method invocation from the shell.
//!
//! ```text
//! rpclink-client --server 192.168.1.20:4410 Calc Add --hint Int32 2 --hint Int32 3
//! rpclink-client Server Echo hello            # discovery finds the server
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rpclink_client::{broadcast_target, load_config, RpcClient, ServerLocation};
use rpclink_core::{InvokeRequest, StatusCode, TypeDesc, WireParam};

#[derive(Debug, Parser)]
#[command(name = "rpclink-client", about = "rpclink RPC client", version)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long, default_value = "rpclink-client.toml")]
    config: PathBuf,

    /// Connect directly to `host:port`, skipping config and discovery.
    #[arg(short, long)]
    server: Option<SocketAddr>,

    /// Object to invoke on.
    object: String,

    /// Method to invoke.
    method: String,

    /// Positional string-encoded arguments.
    args: Vec<String>,

    /// Type hint for each argument, in order (e.g. `Int32`, `Double[]`).
    /// Unhinted arguments are sent as raw strings.
    #[arg(long = "hint")]
    hints: Vec<String>,

    /// Post the call without waiting for the method to finish.
    #[arg(short, long)]
    asynchronous: bool,

    /// Free-text comment logged by the server.
    #[arg(long)]
    comment: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config).context("loading config")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.client.log_level.clone())),
        )
        .init();

    if cli.hints.len() > cli.args.len() {
        bail!(
            "{} hints given for {} arguments",
            cli.hints.len(),
            cli.args.len()
        );
    }

    let mut request = InvokeRequest::new(&cli.object, &cli.method)
        .context("object and method must be identifiers")?
        .with_asynchronous(cli.asynchronous);
    if let Some(comment) = &cli.comment {
        request = request.with_comment(comment.clone());
    }
    for (i, arg) in cli.args.iter().enumerate() {
        let param = match cli.hints.get(i) {
            Some(hint) => {
                let ty = TypeDesc::parse(hint)
                    .with_context(|| format!("bad type hint {hint:?}"))?;
                WireParam::typed(arg.clone(), ty)
            }
            None => WireParam::raw(arg.clone()),
        };
        request = request.with_param(param);
    }

    let location = match cli.server {
        Some(addr) => ServerLocation::Addr(addr),
        None => match &config.server.host {
            Some(host) => ServerLocation::Addr(
                format!("{host}:{}", config.server.port)
                    .parse()
                    .context("server address from config")?,
            ),
            None => ServerLocation::Discover {
                name: config.server.name.clone(),
                target: broadcast_target(config.server.discovery_port),
                timeout: Duration::from_secs(5),
            },
        },
    };

    let mut client = RpcClient::new(location, config.client.to_options());
    info!("invoking {}.{}", cli.object, cli.method);
    let result = client.invoke(&request).await?;

    match result.status {
        StatusCode::SuccessAndReturn => {
            let ty = result
                .return_type
                .as_ref()
                .map(TypeDesc::wire_name)
                .unwrap_or_default();
            println!("{} ({ty}): {}", result.object_method, result.return_value.unwrap_or_default());
        }
        StatusCode::Success => println!("{}: ok", result.object_method),
        status => {
            bail!(
                "{} answered {:?}: {}",
                result.object_method,
                status,
                result.exception_message.unwrap_or_default()
            );
        }
    }
    Ok(())
}
