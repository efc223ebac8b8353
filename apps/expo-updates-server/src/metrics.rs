use expo_updates_core::{ErrorClass, ResponseKind};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::warn;

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static MANIFEST_RESPONSES: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "expo_updates_manifest_responses_total",
            "manifest endpoint responses by kind",
        ),
        &["kind"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static REQUEST_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "expo_updates_request_errors_total",
            "failed requests by endpoint and error class",
        ),
        &["endpoint", "class"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static ASSETS_SERVED: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::with_opts(Opts::new(
        "expo_updates_assets_served_total",
        "asset files streamed to clients",
    ))
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub fn record_response(kind: ResponseKind) {
    let label = match kind {
        ResponseKind::Manifest => "manifest",
        ResponseKind::Rollback => "rollback",
        ResponseKind::NoUpdate => "no_update",
    };
    MANIFEST_RESPONSES.with_label_values(&[label]).inc();
}

pub fn record_error(endpoint: &str, class: ErrorClass) {
    let class = match class {
        ErrorClass::InvalidRequest => "bad_request",
        ErrorClass::NotFound => "not_found",
        ErrorClass::Internal => "internal",
    };
    REQUEST_ERRORS.with_label_values(&[endpoint, class]).inc();
}

pub fn gather() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %err, "metrics encode error");
    }
    buffer
}
