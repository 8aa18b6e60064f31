//! Bus gateway entry point.
//!
//! Connects to the AMQP broker, opens the gateway's two channels, and serves
//! the HTTP surface. A broker that cannot be reached at startup does not kill
//! the process: the gateway serves in degraded mode and every bus call is
//! answered with a connection-error envelope until the process is restarted
//! with a reachable broker.

use anyhow::{Context, Result};
use busgate::bus::{self, GatewayState};
use busgate::config::Config;
use busgate::rpc::BusGateway;
use busgate_amqp::env::SystemEnv;
use busgate_amqp::{GatewayChannels, connect};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Bus gateway CLI.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/busgate.toml")]
    config: String,

    /// HTTP listen port (overrides config file)
    #[arg(long, env = "HTTP_PORT")]
    port: Option<u16>,

    /// AMQP host (overrides config file)
    #[arg(long, env = "AMQP_HOST")]
    amqp_host: Option<String>,

    /// AMQP port (overrides config file)
    #[arg(long, env = "AMQP_PORT")]
    amqp_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "busgate=debug,busgate_amqp=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting bus gateway");

    let args = Args::parse();

    let mut config = if std::path::Path::new(&args.config).exists() {
        info!("Loading config from file: {}", args.config);
        Config::from_file(&args.config)?
    } else {
        info!("Config file not found, using environment variables");
        Config::from_env(&SystemEnv)
    };

    if let Some(port) = args.port {
        config.http.port = port;
    }
    if let Some(host) = args.amqp_host {
        config.amqp.host = host;
    }
    if let Some(port) = args.amqp_port {
        config.amqp.port = port;
    }

    info!(
        amqp_host = %config.amqp.host,
        amqp_port = config.amqp.port,
        http_port = config.http.port,
        "Configuration loaded"
    );

    // Kept alive for the life of the process; dropping it would close the
    // channels under the gateway.
    let mut _amqp_connection = None;
    let channels = match connect(&config.amqp).await {
        Ok(conn) => match GatewayChannels::open(&conn).await {
            Ok(channels) => {
                _amqp_connection = Some(conn);
                Some(channels)
            }
            Err(e) => {
                error!(error = %e, "Failed to open AMQP channels, serving in degraded mode");
                None
            }
        },
        Err(e) => {
            error!(error = %e, "Failed to connect to AMQP broker, serving in degraded mode");
            None
        }
    };

    let gateway = BusGateway::new(channels, config.timing.clone());
    let app = bus::router(GatewayState::new(gateway));

    let addr = format!("0.0.0.0:{}", config.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(addr = %addr, "Bus gateway listening");
    axum::serve(listener, app).await?;

    Ok(())
}
