//! Prometheus metrics (default registry, exposed on /metrics)

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter_vec, register_int_gauge, Histogram, IntCounterVec,
    IntGauge,
};

lazy_static! {
    pub static ref PROBES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "iptv_probes_total",
        "Stream probes by resulting status",
        &["status"]
    )
    .unwrap();
    pub static ref PROBE_LATENCY: Histogram = register_histogram!(
        "iptv_probe_latency_seconds",
        "Latency of successful probes",
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();
    pub static ref REPAIRS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "iptv_repairs_total",
        "Successful auto-repairs by strategy",
        &["strategy"]
    )
    .unwrap();
    pub static ref PIPELINE_RUNS: IntCounterVec = register_int_counter_vec!(
        "iptv_pipeline_runs_total",
        "Playlist update runs by outcome",
        &["outcome"]
    )
    .unwrap();
    pub static ref CATALOG_SIZE: IntGauge =
        register_int_gauge!("iptv_catalog_channels", "Channels in the catalog").unwrap();
}
