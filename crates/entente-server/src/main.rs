use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use entente_server::api::{self, AppState};
use entente_server::config::ServerConfig;
use entente_server::dispatch::HttpTaskDispatcher;
use entente_server::signer::PassthroughSigner;
use entente_store::MemoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,entente_server=debug")),
        )
        .init();

    info!("Starting Entente host v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = ServerConfig::from_env();
    info!(
        instance = %config.instance_name,
        public_host = %config.public_host,
        "Loaded configuration"
    );

    // Outbound HTTP client, shared by the fan-out engine and the
    // dispatcher.  Its timeout is the only timeout peer calls get.
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.peer_timeout_secs))
        .build()?;

    // Dispatcher delivering queue tasks to this instance's own worker
    // endpoints.  A deployment with a real queue service replaces this.
    let dispatcher = HttpTaskDispatcher::new(
        http.clone(),
        format!("http://{}", config.public_host),
    );

    let http_addr = config.http_addr;
    let state = AppState {
        store: Arc::new(MemoryStore::new()),
        dispatcher: Arc::new(dispatcher),
        signer: Arc::new(PassthroughSigner),
        http,
        config: Arc::new(config),
    };

    tokio::select! {
        result = api::serve(state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
