//! Prometheus metrics for Palaver Gateway
//!
//! Exposes request counts, provider failures by kind and chat latency.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Encoder, Gauge, Histogram, TextEncoder,
};

lazy_static! {
    /// Total chat requests received
    pub static ref CHAT_REQUESTS_TOTAL: Counter =
        register_counter!("palaver_chat_requests_total", "Total chat requests received")
            .expect("register palaver_chat_requests_total");

    /// Provider failures by classified kind
    pub static ref PROVIDER_ERRORS: CounterVec = register_counter_vec!(
        "palaver_provider_errors_total",
        "Provider failures by classified kind",
        &["kind"]
    )
    .expect("register palaver_provider_errors_total");

    /// End-to-end chat latency, including waiting behind earlier turns
    pub static ref CHAT_LATENCY: Histogram = register_histogram!(
        "palaver_chat_latency_seconds",
        "Chat request latency in seconds",
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    )
    .expect("register palaver_chat_latency_seconds");

    pub static ref HISTORY_REQUESTS_TOTAL: Counter =
        register_counter!("palaver_history_requests_total", "Total history requests received")
            .expect("register palaver_history_requests_total");

    pub static ref CLEAR_REQUESTS_TOTAL: Counter =
        register_counter!("palaver_clear_requests_total", "Total clear requests received")
            .expect("register palaver_clear_requests_total");

    /// Conversation actors currently running
    pub static ref ACTIVE_CONVERSATIONS: Gauge = register_gauge!(
        "palaver_active_conversations",
        "Number of running conversation actors"
    )
    .expect("register palaver_active_conversations");
}

/// Render every registered metric in the Prometheus text format.
pub fn render() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
