use crate::{
    metrics::{
        CERT_EXPIRY_DAYS, CERT_VALID, LAST_SWEEP_RUNTIME_MS, LAST_SWEEP_SUCCESS, PANICS_RECOVERED,
        STORE_ERRORS, SWEEPS_TOTAL,
    },
    store::RecordStore,
    tls::{CertificateProbeResult, CertificateStatus, ProbeCoalescer, Prober},
};
use chrono::{Duration, Utc};
use futures::{FutureExt, StreamExt, stream};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, sync::Arc};
use tokio::time;
use tracing::{error, info, warn};

/// Probes started at once by a sweep
const SWEEP_CONCURRENCY: usize = 8;

/// One line per sweep, logged as JSON
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub time: String,
    pub runtime_ms: i64,
    pub domains: usize,
    pub valid: usize,
    pub expiring_soon: usize,
    pub invalid: usize,
}

impl SweepSummary {
    fn record(&mut self, status: CertificateStatus) {
        match status {
            CertificateStatus::Valid => self.valid += 1,
            CertificateStatus::ExpiringSoon => self.expiring_soon += 1,
            CertificateStatus::Invalid => self.invalid += 1,
        }
    }
}

#[inline]
fn remaining_sleep_duration(wait_time: Duration, runtime: Duration) -> Option<time::Duration> {
    wait_time
        .checked_sub(&runtime)
        .and_then(|remaining| remaining.to_std().ok())
        .filter(|duration| !duration.is_zero())
}

/// Distinct fqdns in first-seen order
fn unique_domains<I>(fqdns: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = BTreeSet::new();
    fqdns
        .into_iter()
        .filter(|fqdn| !fqdn.is_empty() && seen.insert(fqdn.clone()))
        .collect()
}

/// Publish per-domain gauges and drop the series of domains no longer tracked
///
/// A tracked domain without a result keeps its previous series.
fn update_domain_metrics(
    results: &[CertificateProbeResult],
    tracked: &BTreeSet<String>,
    now: chrono::DateTime<Utc>,
    labelled: &mut BTreeSet<String>,
) {
    for stale in labelled.difference(tracked) {
        let _ = CERT_EXPIRY_DAYS.remove_label_values(&[stale.as_str()]);
        let _ = CERT_VALID.remove_label_values(&[stale.as_str()]);
    }

    for result in results {
        let domain = result.domain.as_str();
        CERT_VALID
            .with_label_values(&[domain])
            .set(i64::from(result.has_valid_certificate));
        match result.days_remaining(now) {
            Some(days) => CERT_EXPIRY_DAYS.with_label_values(&[domain]).set(days),
            None => {
                let _ = CERT_EXPIRY_DAYS.remove_label_values(&[domain]);
            }
        }
    }

    labelled.clone_from(tracked);
}

/// Probe every tracked domain once
///
/// Returns `None` when the record store could not be read.
pub async fn sweep_once(
    store: &RecordStore,
    prober: &Arc<Prober>,
    inflight: &ProbeCoalescer,
    labelled: &mut BTreeSet<String>,
) -> Option<SweepSummary> {
    let started = Utc::now();

    let records = match store.list_all().await {
        Ok(records) => records,
        Err(e) => {
            warn!("sweep skipped: {e}");
            STORE_ERRORS.with_label_values(&["read"]).inc();
            SWEEPS_TOTAL.with_label_values(&["error"]).inc();
            return None;
        }
    };
    let domains = unique_domains(records.into_iter().map(|record| record.fqdn));
    let tracked: BTreeSet<String> = domains.iter().cloned().collect();

    let results: Vec<CertificateProbeResult> = stream::iter(domains)
        .map(|domain| async move {
            match inflight.probe(prober, &domain).await {
                Ok(result) => Some(result),
                Err(e) => {
                    error!(%domain, "{e}");
                    None
                }
            }
        })
        .buffer_unordered(SWEEP_CONCURRENCY)
        .filter_map(|result| async move { result })
        .collect()
        .await;

    let finished = Utc::now();
    update_domain_metrics(&results, &tracked, finished, labelled);

    let mut summary = SweepSummary {
        time: started.to_rfc3339(),
        runtime_ms: finished.signed_duration_since(started).num_milliseconds(),
        domains: results.len(),
        ..SweepSummary::default()
    };
    for result in &results {
        summary.record(result.certificate_status);
    }

    SWEEPS_TOTAL.with_label_values(&["success"]).inc();
    LAST_SWEEP_SUCCESS.set(finished.timestamp());
    LAST_SWEEP_RUNTIME_MS.set(summary.runtime_ms);

    Some(summary)
}

/// Sweep every `every` seconds until the task is dropped
pub async fn run_loop(
    store: Arc<RecordStore>,
    prober: Arc<Prober>,
    inflight: Arc<ProbeCoalescer>,
    every: u32,
) {
    let mut labelled = BTreeSet::new();

    loop {
        // Catch panics in individual iterations to keep loop alive
        let iteration_result = std::panic::AssertUnwindSafe(async {
            let now = Utc::now();
            let wait_time = Duration::seconds(every.into());

            if let Some(summary) = sweep_once(&store, &prober, &inflight, &mut labelled).await {
                match serde_json::to_string(&summary) {
                    Ok(serialized) => info!(target: "certpulse::sweep", "{serialized}"),
                    Err(e) => warn!("could not serialize sweep summary: {e}"),
                }
            }

            let runtime = Utc::now().signed_duration_since(now);

            // Sleep for remaining interval time to maintain fixed interval
            if let Some(remaining) = remaining_sleep_duration(wait_time, runtime) {
                time::sleep(remaining).await;
            }
        })
        .catch_unwind()
        .await;

        if let Err(panic_info) = iteration_result {
            error!("panic in sweep iteration: {panic_info:?}");
            PANICS_RECOVERED.inc();
            SWEEPS_TOTAL.with_label_values(&["panic"]).inc();
            // Sleep for the interval before retrying
            time::sleep(time::Duration::from_secs(every.into())).await;
        }
    }
}
