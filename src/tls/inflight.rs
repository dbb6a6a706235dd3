use super::{CertificateProbeResult, Prober};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, PoisonError},
};
use thiserror::Error;
use tracing::debug;

type SharedProbe = Shared<BoxFuture<'static, Result<CertificateProbeResult, String>>>;
type Pending = Arc<Mutex<HashMap<String, SharedProbe>>>;

/// The probe task ended without producing a result
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ProbeTaskError(String);

/// Set of probes currently in flight, keyed by domain.
///
/// A request for a domain that is already being probed waits for that probe
/// instead of opening its own connections. Entries are dropped as soon as the
/// probe finishes, so a later request always performs a fresh round trip.
#[derive(Default)]
pub struct ProbeCoalescer {
    pending: Pending,
}

impl fmt::Debug for ProbeCoalescer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeCoalescer")
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Removes the in-flight entry when the probe task ends, even by panic
struct Release {
    pending: Pending,
    domain: String,
}

impl Drop for Release {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.domain);
    }
}

impl ProbeCoalescer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe `domain`, joining an identical probe if one is already running
    ///
    /// # Errors
    ///
    /// Returns an error only if the probe task panicked or was aborted
    pub async fn probe(
        &self,
        prober: &Arc<Prober>,
        domain: &str,
    ) -> Result<CertificateProbeResult, ProbeTaskError> {
        let shared = {
            let mut pending = self
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            if let Some(existing) = pending.get(domain) {
                debug!(domain, "joining in-flight probe");
                existing.clone()
            } else {
                let release = Release {
                    pending: Arc::clone(&self.pending),
                    domain: domain.to_string(),
                };
                let prober = Arc::clone(prober);
                let handle = tokio::spawn(async move { prober.probe(&release.domain).await });

                let label = domain.to_string();
                let shared = async move {
                    handle
                        .await
                        .map_err(|e| format!("certificate probe for {label} failed: {e}"))
                }
                .boxed()
                .shared();

                pending.insert(domain.to_string(), shared.clone());
                shared
            }
        };

        shared.await.map_err(ProbeTaskError)
    }

    /// Number of domains currently being probed
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
