//! TLS certificate probing
//!
//! Opens a TLS session to a host, reads the leaf certificate it presents and
//! classifies how long it remains valid. The primary port is tried first and
//! the secondary port once when the first attempt yields no certificate.
//!
//! # Module Organization
//!
//! - `config` - probe ports, timeout and trust settings
//! - `metadata` - probe results and expiry classification
//! - `probe` - connection, handshake and certificate extraction
//! - `verifier` - certificate verifiers (inspect-only or `WebPKI`)
//! - `inflight` - de-duplication of concurrent probes for one domain
//!
//! # Example
//!
//! ```rust,ignore
//! use certpulse::tls::{ProbeConfig, Prober};
//!
//! let prober = Prober::new(ProbeConfig::default()).await?;
//! let result = prober.probe("example.com").await;
//! println!("{}", result.certificate_status);
//! ```

pub mod config;
pub mod inflight;
pub mod metadata;
pub mod probe;
pub mod verifier;

// Re-export commonly used types
pub use config::ProbeConfig;
pub use inflight::{ProbeCoalescer, ProbeTaskError};
pub use metadata::{CertificateProbeResult, CertificateStatus, PeerCertificate, classify};
pub use probe::{AttemptError, Prober, ensure_crypto_provider};
pub use verifier::{NoVerifier, build_verifier};
