#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use certpulse::{
    server::{AppState, router},
    store::{DomainRecord, RecordStore},
    tls::{ProbeConfig, Prober},
};
use chrono::{DateTime, Duration, Utc};
use rcgen::{CertificateParams, KeyPair};
use rustls::{
    ServerConfig,
    pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer},
};
use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tempfile::TempDir;
use tokio::{io::AsyncReadExt, net::TcpListener};
use tokio_rustls::TlsAcceptor;

/// A local listener and the number of connections it accepted
pub struct TestServer {
    pub port: u16,
    accepted: Arc<AtomicUsize>,
}

impl TestServer {
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

/// Expiry `days` from now, truncated to whole seconds as X.509 stores it
pub fn expiry_in(days: i64) -> DateTime<Utc> {
    let at = Utc::now() + Duration::days(days);
    DateTime::from_timestamp(at.timestamp(), 0).unwrap()
}

/// Self-signed certificate for localhost/127.0.0.1 expiring at `not_after`
pub fn mint_certificate(
    not_after: DateTime<Utc>,
) -> (CertificateDer<'static>, PrivateKeyDer<'static>) {
    let key_pair = KeyPair::generate().unwrap();
    let mut params =
        CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()]).unwrap();
    let not_before = not_after - Duration::days(30);
    params.not_before = time::OffsetDateTime::from_unix_timestamp(not_before.timestamp()).unwrap();
    params.not_after = time::OffsetDateTime::from_unix_timestamp(not_after.timestamp()).unwrap();

    let cert = params.self_signed(&key_pair).unwrap();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
    (cert.der().clone(), key)
}

async fn bind_local() -> (TcpListener, u16) {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// TLS server presenting a certificate that expires at `not_after`
pub async fn spawn_tls_server(not_after: DateTime<Utc>) -> TestServer {
    let (cert, key) = mint_certificate(not_after);
    let config = ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_no_client_auth()
    .with_single_cert(vec![cert], key)
    .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let (listener, port) = bind_local().await;
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                if let Ok(mut tls) = acceptor.accept(stream).await {
                    let mut buf = [0u8; 1];
                    let _ = tls.read(&mut buf).await;
                }
            });
        }
    });

    TestServer { port, accepted }
}

/// Plain TCP server that closes every connection right away
pub async fn spawn_plain_server() -> TestServer {
    let (listener, port) = bind_local().await;
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            drop(stream);
        }
    });

    TestServer { port, accepted }
}

/// TCP server that accepts and never answers
pub async fn spawn_silent_server() -> TestServer {
    let (listener, port) = bind_local().await;
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            held.push(stream);
        }
    });

    TestServer { port, accepted }
}

/// A port nothing listens on
pub fn closed_port() -> u16 {
    std::net::TcpListener::bind(("127.0.0.1", 0))
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

pub fn probe_config(primary: u16, secondary: Option<u16>) -> ProbeConfig {
    ProbeConfig {
        primary_port: primary,
        secondary_port: secondary,
        timeout: std::time::Duration::from_secs(2),
        ..ProbeConfig::default()
    }
}

pub fn record(fqdn: &str, private_ip: &str, owner: &str) -> DomainRecord {
    DomainRecord::new(fqdn, private_ip, owner)
}

/// Running API bound to a random local port
pub struct TestApp {
    pub base_url: String,
    pub data_file: PathBuf,
    _dir: TempDir,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Records as currently stored on disk
    pub fn stored(&self) -> Vec<DomainRecord> {
        let data = std::fs::read(&self.data_file).unwrap();
        serde_json::from_slice(&data).unwrap()
    }
}

/// Serve the API over a temporary data file seeded with `records`
pub async fn spawn_app(records: Option<&[DomainRecord]>, probe: ProbeConfig) -> TestApp {
    spawn_app_with_cors(records, probe, false).await
}

pub async fn spawn_app_with_cors(
    records: Option<&[DomainRecord]>,
    probe: ProbeConfig,
    cors: bool,
) -> TestApp {
    let dir = TempDir::new().unwrap();
    let data_file = dir.path().join("data.json");
    if let Some(records) = records {
        std::fs::write(&data_file, serde_json::to_vec_pretty(records).unwrap()).unwrap();
    }

    let static_dir = dir.path().join("build");
    std::fs::create_dir_all(static_dir.join("static")).unwrap();
    std::fs::write(
        static_dir.join("index.html"),
        "<!doctype html><title>certpulse</title>",
    )
    .unwrap();
    std::fs::write(static_dir.join("static").join("app.js"), "console.log(1);").unwrap();

    let prober = Arc::new(Prober::new(probe).await.unwrap());
    let store = Arc::new(RecordStore::new(&data_file));
    let app = router(AppState::new(store, prober, static_dir), cors);

    let (listener, port) = bind_local().await;
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });

    TestApp {
        base_url: format!("http://127.0.0.1:{port}"),
        data_file,
        _dir: dir,
    }
}
