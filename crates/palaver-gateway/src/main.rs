//! Palaver Gateway - Entry Point

use std::sync::Arc;

use clap::Parser;
use palaver_context::{ConversationHub, ConversationStore, FileStore, MemoryStore};
use palaver_gateway::{build_app, AppState, GatewayConfig, LogFormat, GATEWAY_VERSION};
use palaver_runtime::WorkersAiProvider;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "palaver_gateway=debug,palaver_context=debug,tower_http=debug";

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = GatewayConfig::parse();
    init_tracing(config.log_format);

    tracing::info!("Starting Palaver Gateway v{}", GATEWAY_VERSION);

    let store: Arc<dyn ConversationStore> = match &config.data_dir {
        Some(dir) => Arc::new(FileStore::open(dir).await?),
        None => {
            tracing::warn!("PALAVER_DATA_DIR not set, conversations are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let provider = WorkersAiProvider::from_env()?;
    tracing::info!(model = provider.default_model(), "using Workers AI provider");

    let hub = ConversationHub::new(store, Arc::new(provider), config.conversation_config());
    let app = build_app(AppState::new(Arc::new(hub)), config.assets_dir.clone());

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
