//! Prometheus metrics for the uptime operator

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

/// Labels for the check mutation counter
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct MutationLabels {
    pub provider: String,
    pub mutation: String,
    pub outcome: String,
}

/// Labels for the reconcile error counter
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub kind: String,
}

/// Check mutations per provider, mutation and outcome
pub static CHECK_MUTATIONS: Lazy<Family<MutationLabels, Counter>> = Lazy::new(Family::default);

/// Failed reconciles per error kind
pub static RECONCILE_ERRORS: Lazy<Family<ErrorLabels, Counter>> = Lazy::new(Family::default);

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();
    registry.register(
        "uptime_operator_check_mutations",
        "Uptime check mutations by provider, mutation and outcome",
        CHECK_MUTATIONS.clone(),
    );
    registry.register(
        "uptime_operator_reconcile_errors",
        "Failed reconciles by error kind",
        RECONCILE_ERRORS.clone(),
    );
    registry
});

/// Count one check mutation
pub fn record_mutation(provider: &str, mutation: &str, outcome: &str) {
    let labels = MutationLabels {
        provider: provider.to_string(),
        mutation: mutation.to_string(),
        outcome: outcome.to_string(),
    };
    CHECK_MUTATIONS.get_or_create(&labels).inc();
}

/// Count one failed reconcile
pub fn record_reconcile_error(kind: &str) {
    let labels = ErrorLabels {
        kind: kind.to_string(),
    };
    RECONCILE_ERRORS.get_or_create(&labels).inc();
}
