use chorus_crypto::Laplace;
use chorus_server::coordinator::Coordinator;
use chorus_server::ws::{self, ClientRegistry};
use chorus_server::{config::DEFAULT_LISTEN_ADDR, rpc, ConvoService, Histogram, ServerConfig};
use chorus_types::Pki;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const STALE_ROUND_AGE: Duration = Duration::from_secs(600);

#[derive(Parser)]
#[command(name = "chorusd", about = "Chorus mix server")]
struct Cli {
    /// Server config file
    #[arg(long)]
    conf: PathBuf,

    /// PKI file
    #[arg(long, default_value = "pki.json")]
    pki: PathBuf,

    /// Create a default config file and exit
    #[arg(long)]
    init: bool,

    /// Server name written into the config by --init
    #[arg(long, default_value = "S1")]
    name: String,

    /// Override convo_mu from the config file
    #[arg(long)]
    mu: Option<f64>,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[arg(long)]
    quiet: bool,
}

fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "info,chorus_server=debug",
            2 => "debug",
            _ => "trace",
        }
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(cli.verbose >= 2))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.init {
        ServerConfig::write_default(&cli.conf, &cli.name)?;
        return Ok(());
    }

    init_logging(&cli);

    let pki = Arc::new(Pki::from_file(&cli.pki)?);
    let mut config = ServerConfig::from_file(&cli.conf)?;
    if let Some(mu) = cli.mu {
        config.convo_mu = mu;
    }
    config.validate()?;

    let laplace = Laplace::new(config.convo_mu, config.convo_b);
    let (service, access_counts) = ConvoService::new(
        config.server_name.clone(),
        config.private_key.clone(),
        pki.clone(),
        laplace,
    )?;

    if pki.is_last(&config.server_name, &pki.server_order) {
        let histogram = Histogram {
            mu: config.convo_mu,
            num_servers: pki.server_order.len(),
        };
        tokio::spawn(histogram.run(access_counts));
    } else {
        drop(access_counts);
    }

    let sweeper = service.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            sweeper.sweep_stale(STALE_ROUND_AGE);
        }
    });

    let is_entry =
        pki.server_order.first().map(String::as_str) == Some(config.server_name.as_str());
    if is_entry {
        if let Some(ws_addr) = config.ws_listen_addr.clone() {
            let registry = Arc::new(ClientRegistry::new());
            let (request_tx, request_rx) = mpsc::unbounded_channel();
            let ws_listener = TcpListener::bind(&ws_addr).await?;
            info!(%ws_addr, "WebSocket entry listening");
            tokio::spawn(ws::serve_ws(ws_listener, registry.clone(), request_tx));

            let coordinator = Coordinator::new(
                service.clone(),
                registry,
                Duration::from_millis(config.round_interval_ms),
                Duration::from_millis(config.round_window_ms),
            );
            tokio::spawn(coordinator.run(request_rx));
        }
    }

    let listen_addr = config
        .listen_addr
        .clone()
        .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
    let listener = TcpListener::bind(&listen_addr).await?;
    info!(%listen_addr, server = %config.server_name, "RPC listening");
    rpc::serve(listener, service).await?;
    Ok(())
}
