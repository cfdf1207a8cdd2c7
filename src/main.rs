#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
use std::{process::ExitCode, time::Duration};

use argh::FromArgs;
use mcslp::{Config, ServerAddress, tokio::Pinger};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[macro_use]
extern crate tracing;

const DEFAULT_LOG: &str = "slping=info,mcslp=info";

/// Ping a Minecraft server and print its status as JSON.
#[derive(FromArgs)]
struct Args {
    /// server address, `host` or `host:port`
    #[argh(positional)]
    address: String,
    /// overall timeout in milliseconds
    #[argh(option, default = "10_000")]
    timeout_ms: u64,
    /// protocol version sent in the handshake
    #[argh(option, default = "mcslp::packet::DEFAULT_PROTOCOL_VERSION")]
    protocol: u32,
    /// use the pre-1.7 ping instead of the JSON status query
    #[argh(switch)]
    legacy: bool,
    /// resolve with the system resolver only
    #[argh(switch)]
    no_doh: bool,
    /// log as JSON lines
    #[argh(switch)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args: Args = argh::from_env();
    start_tracing(args.json_logs);

    let address = ServerAddress::parse(&args.address)?;
    let pinger = Pinger::new(Config {
        timeout: Duration::from_millis(args.timeout_ms),
        protocol_version: args.protocol,
        enable_doh: !args.no_doh,
        ..Config::default()
    });

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling ping");
            on_signal.cancel();
        }
    });

    info!(%address, legacy = args.legacy, "pinging");
    let result = if args.legacy {
        pinger.ping_legacy(&address, &cancel).await
    } else {
        pinger.ping(&address, &cancel).await?
    };

    let Some(result) = result else {
        error!(%address, "server is unreachable or sent an unusable response");
        return Ok(ExitCode::FAILURE);
    };
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(ExitCode::SUCCESS)
}

fn start_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_env("LOG").unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG));
    tracing_subscriber::registry()
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .with(env_filter)
        .init();
}
