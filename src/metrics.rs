//! Pipeline metrics.
//!
//! Counters are no-ops until a recorder is installed; `init_metrics` installs
//! the Prometheus exporter for long-running processes.

use metrics::{counter, histogram};
use std::net::SocketAddr;

pub fn init_metrics(port: u16) {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => {
            tracing::info!("Prometheus exporter listening on http://{}/metrics", addr);
        }
        Err(e) => {
            tracing::warn!("Prometheus exporter install failed (possibly already installed): {}", e);
        }
    }
}

/// Port from `ANS_METRICS_PORT`, if set and valid.
pub fn port_from_env() -> Option<u16> {
    std::env::var("ANS_METRICS_PORT").ok().and_then(|s| s.trim().parse().ok())
}

pub fn listing_fetched() {
    counter!("ans_listings_fetched_total").increment(1);
}

pub fn archive_downloaded(bytes: u64) {
    counter!("ans_archives_downloaded_total").increment(1);
    counter!("ans_downloaded_bytes_total").increment(bytes);
}

pub fn file_read(kind: &'static str) {
    counter!("ans_files_read_total", "kind" => kind).increment(1);
}

pub fn file_skipped(reason: &'static str) {
    counter!("ans_files_skipped_total", "reason" => reason).increment(1);
}

pub fn archive_member_rejected() {
    counter!("ans_archive_members_rejected_total").increment(1);
}

pub fn rows(stage: &'static str, count: usize) {
    counter!("ans_rows_total", "stage" => stage).increment(count as u64);
}

pub fn stage_duration(stage: &'static str, secs: f64) {
    histogram!("ans_stage_duration_seconds", "stage" => stage).record(secs);
}
