use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use renderd::cdp::CdpRenderer;
use renderd::server::{app, AppState};
use renderd::{LoadCondition, RenderConfig};

#[derive(Debug, Parser)]
#[command(name = "renderd", version, about = "Render JavaScript-driven pages with headless Chrome over HTTP")]
struct Cli {
    /// Port to listen on (binds all interfaces)
    #[arg(long, env = "PORT", default_value_t = 3001)]
    port: u16,

    /// Navigation timeout in milliseconds
    #[arg(long, default_value_t = 30_000)]
    timeout_ms: u64,

    /// Load-completion policy: networkidle0, networkidle2, or domcontentloaded
    #[arg(long, default_value = "networkidle2")]
    load_condition: String,

    /// Mask automation markers and send a desktop user agent
    #[arg(long)]
    spoof_identity: bool,

    /// Additional Chrome launch argument (repeatable)
    #[arg(long = "chrome-arg", value_name = "ARG")]
    chrome_args: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = RenderConfig {
        navigation_timeout_ms: cli.timeout_ms,
        load_condition: cli.load_condition.parse::<LoadCondition>()?,
        spoof_identity: cli.spoof_identity,
        extra_args: cli.chrome_args,
        ..Default::default()
    };
    info!(
        "render policy: {} within {}ms, spoofing {}",
        config.load_condition,
        config.navigation_timeout_ms,
        if config.spoof_identity { "on" } else { "off" }
    );

    let state = AppState::new(Arc::new(CdpRenderer::new(config)));

    let addr = format!("0.0.0.0:{}", cli.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("render server listening on http://{addr}");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Resolves on SIGINT or SIGTERM. In-flight renders drain before exit, and
/// each one releases its browser instance on the way out.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received, draining in-flight renders");
}
