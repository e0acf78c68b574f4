// Prometheus metrics for the preapproval relay
//
// Exposes metrics on the /metrics HTTP endpoint:
// - Webhook delivery attempts and final outcomes (counters)
// - Webhook delivery duration including backoff (histogram)
// - Lead trigger decisions (counter)
// - Submitted applications (counter)

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    // Webhook metrics
    pub static ref WEBHOOK_DELIVERY_ATTEMPTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("webhook_delivery_attempts_total", "Webhook HTTP attempts by event and result"),
        &["event", "result"]
    ).expect("Failed to create webhook attempts metric");

    pub static ref WEBHOOK_DELIVERIES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("webhook_deliveries_total", "Webhook deliveries by event and final outcome"),
        &["event", "outcome"]
    ).expect("Failed to create webhook deliveries metric");

    pub static ref WEBHOOK_DELIVERY_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "webhook_delivery_duration_seconds",
            "Wall time of a webhook delivery including retries"
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["event"]
    ).expect("Failed to create webhook duration metric");

    // Lead tracking metrics
    pub static ref LEAD_TRIGGERS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("lead_triggers_total", "Lead engagement signals by limiter decision"),
        &["decision"]
    ).expect("Failed to create lead triggers metric");

    // Intake metrics
    pub static ref APPLICATIONS_SUBMITTED_TOTAL: IntCounter = IntCounter::new(
        "applications_submitted_total",
        "Total number of persisted preapproval applications"
    ).expect("Failed to create applications submitted metric");
}

/// Register all metrics with the registry
///
/// Safe to call more than once; already-registered collectors are skipped.
pub fn init() -> prometheus::Result<()> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(WEBHOOK_DELIVERY_ATTEMPTS_TOTAL.clone()),
        Box::new(WEBHOOK_DELIVERIES_TOTAL.clone()),
        Box::new(WEBHOOK_DELIVERY_DURATION_SECONDS.clone()),
        Box::new(LEAD_TRIGGERS_TOTAL.clone()),
        Box::new(APPLICATIONS_SUBMITTED_TOTAL.clone()),
    ];

    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}

pub fn record_attempt(event: &str, result: &str) {
    WEBHOOK_DELIVERY_ATTEMPTS_TOTAL
        .with_label_values(&[event, result])
        .inc();
}

pub fn record_delivery(event: &str, outcome: &str) {
    WEBHOOK_DELIVERIES_TOTAL
        .with_label_values(&[event, outcome])
        .inc();
}

pub fn observe_duration(event: &str, elapsed: Duration) {
    WEBHOOK_DELIVERY_DURATION_SECONDS
        .with_label_values(&[event])
        .observe(elapsed.as_secs_f64());
}

pub fn record_lead_trigger(forwarded: bool) {
    let decision = if forwarded { "forwarded" } else { "suppressed" };
    LEAD_TRIGGERS_TOTAL.with_label_values(&[decision]).inc();
}
