// Metrics module for observability
// Describes the registry and cluster metrics and optionally serves them

use std::net::SocketAddr;

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Initialize all metric descriptions
/// Should be called once at application startup
pub fn init_metrics() {
    // Registry metrics
    describe_counter!(
        "registry_register_total",
        "Total number of successful register calls"
    );
    describe_counter!(
        "registry_unregister_total",
        "Total number of successful unregister calls"
    );
    describe_counter!(
        "registry_operation_errors_total",
        "Total number of failed registry operations"
    );
    describe_counter!(
        "registry_node_cleanup_total",
        "Total number of node cleanup runs by outcome"
    );

    // Lock metrics
    describe_gauge!("lock_active_total", "Number of live distributed locks");

    // Cluster metrics
    describe_gauge!("cluster_members_total", "Total number of cluster members");
    describe_gauge!(
        "cluster_members_healthy",
        "Number of healthy cluster members"
    );

    tracing::info!("Metrics initialized");
}

/// Install the Prometheus recorder with an HTTP scrape endpoint on `listen`
pub fn install_exporter(listen: &str) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = listen.parse()?;
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("Serving Prometheus metrics on {}", addr);
    Ok(())
}
