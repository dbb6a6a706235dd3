use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Registry,
    opts, register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_vec_with_registry,
    register_int_gauge_with_registry,
};
use std::sync::LazyLock;

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

trait ResultExt<T> {
    fn or_exit(self, context: &str) -> T;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn or_exit(self, context: &str) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                eprintln!("failed to initialize metric ({context}): {err}");
                std::process::exit(1);
            }
        }
    }
}

// Probe metrics
pub static CERT_PROBES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        opts!(
            "certpulse_probes_total",
            "Total certificate probes by resulting status"
        ),
        &["status"],
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static CERT_PROBE_ATTEMPT_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        opts!(
            "certpulse_probe_attempt_errors_total",
            "Failed probe attempts by port and type (connection, handshake, timeout, parse, no_certificate)"
        ),
        &["port", "error_type"],
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static CERT_PROBE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram_with_registry!(
        HistogramOpts::new(
            "certpulse_probe_duration_seconds",
            "Duration of a full probe including the fallback attempt"
        ),
        &REGISTRY
    )
    .or_exit("metric can be created")
});

// Sweep metrics
pub static CERT_EXPIRY_DAYS: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    register_int_gauge_vec_with_registry!(
        opts!(
            "certpulse_cert_expiry_days",
            "Days until TLS certificate expiration (negative if expired)"
        ),
        &["domain"],
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static CERT_VALID: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    register_int_gauge_vec_with_registry!(
        opts!(
            "certpulse_cert_valid",
            "1 if the domain presents a non-expired certificate, 0 otherwise"
        ),
        &["domain"],
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static DOMAINS: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge_with_registry!("certpulse_domains", "Number of tracked domain records", &REGISTRY)
        .or_exit("metric can be created")
});

pub static SWEEPS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        opts!("certpulse_sweeps_total", "Total background sweeps"),
        &["status"],
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static LAST_SWEEP_RUNTIME_MS: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge_with_registry!(
        "certpulse_sweep_runtime_last_milliseconds",
        "Runtime of the most recent sweep in milliseconds",
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static LAST_SWEEP_SUCCESS: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge_with_registry!(
        "certpulse_last_sweep_timestamp_seconds",
        "Unix timestamp of last successful sweep",
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static PANICS_RECOVERED: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter_with_registry!(
        opts!(
            "certpulse_panics_recovered_total",
            "Total panics recovered from"
        ),
        &REGISTRY
    )
    .or_exit("metric can be created")
});

// Store metrics
pub static STORE_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        opts!(
            "certpulse_store_errors_total",
            "Record store failures by operation (read, write)"
        ),
        &["operation"],
        &REGISTRY
    )
    .or_exit("metric can be created")
});

/// Encode and return metrics for HTTP export
///
/// # Errors
///
/// Returns an error if metrics encoding fails
pub fn encode_metrics() -> Result<Vec<u8>, String> {
    let mut buffer = Vec::new();
    let encoder = prometheus::TextEncoder::new();

    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| format!("could not encode custom metrics: {e}"))?;

    Ok(buffer)
}
