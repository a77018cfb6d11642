//! Prometheus metrics

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and describe the gateway's counters.
/// The handle renders the scrape body for the /metrics route.
pub fn init_metrics() -> Option<PrometheusHandle> {
    let handle = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!(error = %e, "metrics recorder not installed");
            return None;
        }
    };

    metrics::describe_counter!(
        "voice_gateway_calls_total",
        "Telephony calls accepted by this instance"
    );
    metrics::describe_counter!(
        "voice_gateway_media_frames_total",
        "Inbound telephony media-stream frames"
    );
    metrics::describe_counter!(
        "voice_gateway_browser_frames_total",
        "Inbound browser audio frames"
    );

    Some(handle)
}
