//! Gateway configuration from flags, environment and `.env`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use palaver_context::ConversationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Palaver Gateway configuration
#[derive(Debug, Clone, Parser)]
#[command(name = "palaver-gateway", version, about = "Conversational proxy gateway")]
pub struct GatewayConfig {
    /// Address to listen on
    #[arg(long, env = "PALAVER_BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: SocketAddr,

    /// Directory for persisted conversations; in-memory when unset
    #[arg(long, env = "PALAVER_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Directory of static assets served for unmatched paths
    #[arg(long, env = "PALAVER_ASSETS_DIR")]
    pub assets_dir: Option<PathBuf>,

    /// Upper bound on a single provider call, in seconds
    #[arg(long, env = "PALAVER_PROVIDER_TIMEOUT_SECS", default_value_t = 60)]
    pub provider_timeout_secs: u64,

    #[arg(long, env = "PALAVER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl GatewayConfig {
    pub fn conversation_config(&self) -> ConversationConfig {
        ConversationConfig::default()
            .with_provider_timeout(Duration::from_secs(self.provider_timeout_secs))
    }
}
