// Registry metrics
// Counters recorded through the `metrics` facade; the host installs the exporter

use metrics::counter;

use meridian_common::RegistryError;

/// Record the outcome of a register or unregister call
pub fn record_operation(op: &'static str, result: &Result<(), RegistryError>) {
    match result {
        Ok(()) => match op {
            "register" => counter!("registry_register_total").increment(1),
            "unregister" => counter!("registry_unregister_total").increment(1),
            _ => {}
        },
        Err(e) => {
            counter!("registry_operation_errors_total", "op" => op, "kind" => e.kind()).increment(1)
        }
    }
}

/// Record a node cleanup run, `outcome` is one of `complete`, `partial` or `failed`
pub fn record_node_cleanup(outcome: &'static str) {
    counter!("registry_node_cleanup_total", "outcome" => outcome).increment(1);
}
