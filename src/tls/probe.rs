use super::{CertificateProbeResult, PeerCertificate, ProbeConfig, verifier::build_verifier};
use crate::metrics::{CERT_PROBE_ATTEMPT_ERRORS, CERT_PROBE_DURATION, CERT_PROBES_TOTAL};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rustls::{ClientConfig, pki_types::ServerName};
use std::{
    io,
    net::IpAddr,
    sync::{Arc, OnceLock},
    time::Duration,
};
use thiserror::Error;
use tokio::{net::TcpStream, time::timeout};
use tokio_rustls::{TlsConnector, client::TlsStream};
use tracing::{debug, instrument};
use x509_parser::prelude::{FromDer, X509Certificate};

static CRYPTO_PROVIDER_INIT: OnceLock<()> = OnceLock::new();

/// Ensure the rustls crypto provider is initialized
///
/// This should be called before any TLS operations. It's safe to call
/// multiple times as initialization only happens once, and a provider
/// installed elsewhere in the process is left in place.
pub fn ensure_crypto_provider() {
    CRYPTO_PROVIDER_INIT.get_or_init(|| {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            debug!("rustls crypto provider already installed");
        }
    });
}

/// Why a single port attempt produced no certificate
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("invalid server name: {0}")]
    ServerName(String),
    #[error("failed to connect: {0}")]
    Connect(#[source] io::Error),
    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] io::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to parse peer certificate: {0}")]
    Parse(String),
}

impl AttemptError {
    /// Prometheus label value
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ServerName(_) => "server_name",
            Self::Connect(_) => "connection",
            Self::Handshake(_) => "handshake",
            Self::Timeout(_) => "timeout",
            Self::Parse(_) => "parse",
        }
    }
}

/// Reads and classifies the leaf certificate a host presents
#[derive(Clone)]
pub struct Prober {
    config: ProbeConfig,
    connector: TlsConnector,
}

impl std::fmt::Debug for Prober {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prober")
            .field("config", &self.config)
            .field("connector", &"TlsConnector")
            .finish()
    }
}

impl Prober {
    /// Build a prober; the TLS client configuration is shared by every probe
    ///
    /// # Errors
    ///
    /// Returns an error if the certificate verifier cannot be built
    pub async fn new(config: ProbeConfig) -> Result<Self> {
        ensure_crypto_provider();

        let verifier = build_verifier(&config)
            .await
            .context("failed to build certificate verifier")?;
        let client_config = ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(verifier)
            .with_no_client_auth();

        Ok(Self {
            config,
            connector: TlsConnector::from(Arc::new(client_config)),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Probe `domain` on the primary port, falling back once to the secondary
    /// port when the first attempt yields no usable certificate.
    ///
    /// Never fails: unreachable hosts come back as an `Invalid` result.
    #[instrument(skip(self))]
    pub async fn probe(&self, domain: &str) -> CertificateProbeResult {
        let timer = CERT_PROBE_DURATION.start_timer();

        let mut presented = None;
        for port in self.config.ports() {
            match self.attempt(domain, port).await {
                Ok(Some(cert)) => {
                    debug!(
                        port,
                        subject = %cert.subject,
                        issuer = %cert.issuer,
                        not_after = %cert.not_after,
                        "certificate presented"
                    );
                    presented = Some(cert);
                    break;
                }
                Ok(None) => {
                    debug!(port, "handshake completed without a peer certificate");
                    CERT_PROBE_ATTEMPT_ERRORS
                        .with_label_values(&[port.to_string().as_str(), "no_certificate"])
                        .inc();
                }
                Err(e) => {
                    debug!(port, error = %e, "probe attempt failed");
                    CERT_PROBE_ATTEMPT_ERRORS
                        .with_label_values(&[port.to_string().as_str(), e.kind()])
                        .inc();
                }
            }
        }

        let result = presented.map_or_else(
            || CertificateProbeResult::unreachable(domain),
            |cert| CertificateProbeResult::from_expiry(domain, cert.not_after, Utc::now()),
        );

        timer.observe_duration();
        CERT_PROBES_TOTAL
            .with_label_values(&[result.certificate_status.label()])
            .inc();

        result
    }

    /// One bounded attempt: TCP connect, TLS handshake, leaf extraction
    ///
    /// # Errors
    ///
    /// Returns an error if the host name is unusable, the connection or
    /// handshake fails or times out, or the leaf certificate cannot be parsed
    pub async fn attempt(
        &self,
        host: &str,
        port: u16,
    ) -> std::result::Result<Option<PeerCertificate>, AttemptError> {
        let server_name = server_name_from_host(host)?;

        let handshake = async {
            let stream = TcpStream::connect((host, port))
                .await
                .map_err(AttemptError::Connect)?;
            self.connector
                .connect(server_name, stream)
                .await
                .map_err(AttemptError::Handshake)
        };

        let tls_stream = timeout(self.config.timeout, handshake)
            .await
            .map_err(|_| AttemptError::Timeout(self.config.timeout))??;

        extract_leaf_certificate(&tls_stream)
    }
}

fn server_name_from_host(host: &str) -> std::result::Result<ServerName<'static>, AttemptError> {
    host.parse::<IpAddr>().map_or_else(
        |_| {
            ServerName::try_from(host.to_string())
                .map_err(|_| AttemptError::ServerName(host.to_string()))
        },
        |ip| Ok(ServerName::from(ip).to_owned()),
    )
}

fn extract_leaf_certificate(
    stream: &TlsStream<TcpStream>,
) -> std::result::Result<Option<PeerCertificate>, AttemptError> {
    let (_, connection) = stream.get_ref();
    let Some(certs) = connection.peer_certificates() else {
        return Ok(None);
    };
    let Some(cert) = certs.first() else {
        return Ok(None);
    };

    parse_certificate(cert.as_ref()).map(Some)
}

/// Extract subject, issuer and expiry from a DER-encoded certificate
fn parse_certificate(cert_der: &[u8]) -> std::result::Result<PeerCertificate, AttemptError> {
    let (_, cert) =
        X509Certificate::from_der(cert_der).map_err(|e| AttemptError::Parse(e.to_string()))?;

    let raw = cert.validity().not_after.to_datetime();
    let not_after = DateTime::<Utc>::from_timestamp(raw.unix_timestamp(), raw.nanosecond())
        .ok_or_else(|| AttemptError::Parse("invalid certificate expiry timestamp".to_string()))?;

    Ok(PeerCertificate {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        not_after,
    })
}
