use super::ProbeConfig;
use anyhow::{Context, Result, anyhow};
use rustls::{
    DigitallySignedStruct, RootCertStore, SignatureScheme,
    client::{
        WebPkiServerVerifier,
        danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    },
    pki_types::{CertificateDer, ServerName, UnixTime},
};
use rustls_pemfile::certs;
use std::{io::Cursor, path::Path, sync::Arc};
use tokio::fs;

/// Pick the server certificate verifier for a probe configuration
///
/// Without `verify_chain` every presented certificate is accepted so its
/// expiry can be read. With it, the chain and hostname are checked against
/// the webpki roots plus the optional extra CA file.
///
/// # Errors
///
/// Returns an error if the CA file cannot be read or contains no usable
/// certificate, or if the `WebPKI` verifier cannot be built
pub async fn build_verifier(config: &ProbeConfig) -> Result<Arc<dyn ServerCertVerifier>> {
    if !config.verify_chain {
        return Ok(Arc::new(NoVerifier));
    }

    let mut roots: RootCertStore = webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();
    if let Some(ca) = &config.ca {
        for cert in load_cert_chain(ca).await? {
            roots
                .add(cert)
                .map_err(|e| anyhow!("invalid CA certificate in {}: {e}", ca.display()))?;
        }
    }

    let verifier = WebPkiServerVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| anyhow!("failed to build WebPKI verifier: {e}"))?;

    Ok(verifier)
}

async fn load_cert_chain(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let data = fs::read(path)
        .await
        .with_context(|| format!("failed to read certificate {}", path.display()))?;
    let mut reader = Cursor::new(data);
    let parsed = certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| anyhow!("invalid certificate PEM: {e}"))?;

    if parsed.is_empty() {
        anyhow::bail!("no certificates found in {}", path.display());
    }

    Ok(parsed)
}

/// Certificate verifier that accepts any certificate without validation.
///
/// # Security Note
///
/// Only used to read the presented leaf certificate. No data is exchanged
/// over a connection established with this verifier; the session is torn
/// down right after the certificate has been parsed.
#[derive(Debug)]
pub struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}
