use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use lockstep_server::clock::ClockSync;
use lockstep_server::config::{generate_config_template, Cli, Config};
use lockstep_server::gateway::Gateway;
use lockstep_server::{routes, state};

/// Upper bound on how long shutdown waits for connections to close.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Handle --generate-config: print template and exit
    if cli.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load(&cli)?;

    // Initialize tracing/logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lockstep_server=info"));
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(env_filter)
            .init();
    }

    tracing::info!("lockstep relay v{} starting", env!("CARGO_PKG_VERSION"));

    // The relay is built once here and handed to every connection through AppState
    let gateway = Arc::new(Gateway::new(ClockSync::default(), config.max_room_size));
    let app_state = state::AppState::new(gateway.clone(), config.keepalive());

    match config.keepalive() {
        Some(keepalive) => tracing::info!(
            interval_secs = keepalive.interval.as_secs(),
            timeout_secs = keepalive.timeout.as_secs(),
            "Keepalive enabled"
        ),
        None => tracing::info!("Keepalive disabled, half-open connections are not reaped"),
    }
    if let Some(max) = config.max_room_size.filter(|max| *max > 0) {
        tracing::info!(max_room_size = max, "Room size cap enabled");
    }

    // Build router
    let app = routes::build_router(app_state, &config.ws_path);

    // Bind and serve
    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {} (WebSocket path {})", addr, config.ws_path);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(gateway.clone()))
    .await?;

    // Give reader loops a moment to finish their disconnect transitions
    let deadline = tokio::time::Instant::now() + SHUTDOWN_DRAIN_TIMEOUT;
    while !gateway.connections().is_empty() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    tracing::info!("lockstep relay stopped");
    Ok(())
}

/// Resolve on Ctrl-C, asking every open connection to close on the way out.
async fn shutdown_signal(gateway: Arc<Gateway>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
    gateway.close_all();
}
