use crate::{
    metrics::{STORE_ERRORS, encode_metrics},
    store::{DomainRecord, RecordStore, StoreError},
    sweep,
    tls::{CertificateProbeResult, ProbeCoalescer, ProbeConfig, ProbeTaskError, Prober},
};
use axum::{
    Json, Router,
    extract::{
        Path as UrlPath, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderName, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::{get, put},
};
use serde::Deserialize;
use serde_json::json;
use std::{
    net::IpAddr,
    path::{Component, Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{fs, net::TcpListener, task};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, error, info};

/// Shared handles every request works with
#[derive(Debug, Clone)]
pub struct AppState {
    store: Arc<RecordStore>,
    prober: Arc<Prober>,
    inflight: Arc<ProbeCoalescer>,
    static_dir: Arc<PathBuf>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<RecordStore>, prober: Arc<Prober>, static_dir: PathBuf) -> Self {
        Self {
            store,
            prober,
            inflight: Arc::new(ProbeCoalescer::new()),
            static_dir: Arc::new(static_dir),
        }
    }
}

/// Request failures and the response each one maps to
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing fields")]
    MissingFields,
    #[error("Invalid index")]
    InvalidIndex,
    #[error("Domain not found")]
    NotFound,
    #[error("Error reading data file")]
    Read(#[source] StoreError),
    #[error("Error writing data file")]
    Write(#[source] StoreError),
    #[error("Domain is required")]
    DomainRequired,
    #[error("{0}")]
    Probe(#[from] ProbeTaskError),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => Self::NotFound,
            err if err.is_read() => Self::Read(err),
            err => Self::Write(err),
        }
    }
}

impl ApiError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingFields | Self::InvalidIndex | Self::DomainRequired => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Read(_) | Self::Write(_) | Self::Probe(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Read(source) => {
                error!("{source}");
                STORE_ERRORS.with_label_values(&["read"]).inc();
            }
            Self::Write(source) => {
                error!("{source}");
                STORE_ERRORS.with_label_values(&["write"]).inc();
            }
            Self::Probe(source) => error!("{source}"),
            _ => debug!(%status, "{self}"),
        }

        match self {
            Self::DomainRequired | Self::Probe(_) => {
                (status, Json(json!({ "error": self.to_string() }))).into_response()
            }
            _ => (status, self.to_string()).into_response(),
        }
    }
}

/// Body accepted by POST and PUT; every field must be a non-empty string
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct DomainPayload {
    fqdn: Option<String>,
    private_ip: Option<String>,
    owner: Option<String>,
}

impl DomainPayload {
    fn into_record(self) -> Option<DomainRecord> {
        let non_empty = |field: Option<String>| field.filter(|value| !value.is_empty());
        Some(DomainRecord::new(
            non_empty(self.fqdn)?,
            non_empty(self.private_ip)?,
            non_empty(self.owner)?,
        ))
    }
}

fn record_from_body(
    body: Result<Json<DomainPayload>, JsonRejection>,
) -> Result<DomainRecord, ApiError> {
    let Json(payload) = body.map_err(|rejection| {
        debug!("rejected domain payload: {rejection}");
        ApiError::MissingFields
    })?;
    payload.into_record().ok_or(ApiError::MissingFields)
}

/// Parse a positional index; negative indexes can never match a record
fn parse_index(raw: &str) -> Result<usize, ApiError> {
    let index = raw
        .trim()
        .parse::<i64>()
        .map_err(|_| ApiError::InvalidIndex)?;
    usize::try_from(index).map_err(|_| ApiError::NotFound)
}

#[derive(Debug, Deserialize)]
struct CheckQuery {
    domain: Option<String>,
}

/// Cross-origin access for a dashboard served from another origin
///
/// The request origin is echoed back because credentials are allowed, and
/// browsers reject a wildcard origin on credentialed responses.
#[must_use]
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ORIGIN,
            header::ACCEPT,
            HeaderName::from_static("x-access-token"),
            HeaderName::from_static("x-requested-with"),
        ])
        .allow_credentials(true)
}

/// Build the HTTP surface
#[must_use]
pub fn router(state: AppState, cors: bool) -> Router {
    let router = Router::new()
        .route("/domains", get(list_domains).post(add_domain))
        .route("/domains/{index}", put(update_domain).delete(delete_domain))
        .route("/check-ssl", get(check_ssl))
        .route("/metrics", get(metrics_handler))
        .fallback(ui_shell)
        .with_state(state);

    if cors {
        router.layer(cors_layer())
    } else {
        router
    }
}

async fn list_domains(State(state): State<AppState>) -> Result<Json<Vec<DomainRecord>>, ApiError> {
    let records = state.store.list_all().await?;
    Ok(Json(records))
}

async fn add_domain(
    State(state): State<AppState>,
    body: Result<Json<DomainPayload>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let record = record_from_body(body)?;
    info!(fqdn = %record.fqdn, owner = %record.owner, "adding domain");
    state.store.append(record).await?;
    Ok((StatusCode::CREATED, "Data added"))
}

async fn update_domain(
    State(state): State<AppState>,
    UrlPath(raw_index): UrlPath<String>,
    body: Result<Json<DomainPayload>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let index = parse_index(&raw_index)?;
    let record = record_from_body(body)?;
    info!(index, fqdn = %record.fqdn, "updating domain");
    state.store.replace_at(index, record).await?;
    Ok("Data updated")
}

async fn delete_domain(
    State(state): State<AppState>,
    UrlPath(raw_index): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let index = parse_index(&raw_index)?;
    let removed = state.store.remove_at(index).await?;
    info!(index, fqdn = %removed.fqdn, "deleted domain");
    Ok("Data deleted")
}

async fn check_ssl(
    State(state): State<AppState>,
    query: Result<Query<CheckQuery>, QueryRejection>,
) -> Result<Json<CertificateProbeResult>, ApiError> {
    let Query(query) = query.map_err(|rejection| {
        debug!("rejected check-ssl query: {rejection}");
        ApiError::DomainRequired
    })?;
    let domain = query
        .domain
        .filter(|domain| !domain.is_empty())
        .ok_or(ApiError::DomainRequired)?;

    let result = state.inflight.probe(&state.prober, &domain).await?;
    info!(
        domain = %result.domain,
        status = %result.certificate_status,
        "certificate checked"
    );
    Ok(Json(result))
}

async fn metrics_handler() -> impl IntoResponse {
    match encode_metrics() {
        Ok(buffer) => (StatusCode::OK, buffer),
        Err(e) => {
            error!("{e}");
            (StatusCode::INTERNAL_SERVER_ERROR, Vec::new())
        }
    }
}

/// Serve UI assets from the static directory, falling back to `index.html`
async fn ui_shell(State(state): State<AppState>, uri: Uri) -> Response {
    let mut path = state.static_dir.join("index.html");
    if let Some(asset) = resolve_asset(&state.static_dir, uri.path())
        && fs::metadata(&asset).await.is_ok_and(|meta| meta.is_file())
    {
        path = asset;
    }

    match fs::read(&path).await {
        Ok(body) => ([(header::CONTENT_TYPE, content_type_for(&path))], body).into_response(),
        Err(e) => {
            debug!(path = %path.display(), "static file unavailable: {e}");
            (StatusCode::NOT_FOUND, "Not found").into_response()
        }
    }
}

/// Map a request path below `root`, refusing anything that could escape it
fn resolve_asset(root: &Path, request_path: &str) -> Option<PathBuf> {
    let relative = Path::new(request_path.trim_start_matches('/'));
    if relative.as_os_str().is_empty() {
        return None;
    }
    if !relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
    {
        return None;
    }
    Some(root.join(relative))
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("json" | "map") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("ico") => "image/x-icon",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Start the dashboard service
///
/// # Errors
///
/// Returns an error if the prober cannot be built, the port cannot be bound,
/// or the server or the sweep task stops
pub async fn start(
    listen: Option<IpAddr>,
    port: u16,
    data_file: PathBuf,
    static_dir: PathBuf,
    interval: u32,
    probe: ProbeConfig,
    cors: bool,
) -> anyhow::Result<()> {
    let prober = Arc::new(Prober::new(probe).await?);
    let store = Arc::new(RecordStore::new(data_file));
    let state = AppState::new(Arc::clone(&store), Arc::clone(&prober), static_dir);
    let inflight = Arc::clone(&state.inflight);
    let app = router(state, cors);

    // Bind to socket with smart fallback
    let (listener, bind_addr) = match listen {
        Some(addr) => {
            // Explicit address specified - bind to it
            let socket_addr = format!("{addr}:{port}");
            let listener = TcpListener::bind(&socket_addr).await?;
            (listener, socket_addr)
        }
        None => {
            // Auto mode: try IPv6 first, fallback to IPv4
            if let Ok(l) = TcpListener::bind(format!("[::]:{port}")).await {
                (l, format!("[::]:{port}"))
            } else {
                let socket_addr = format!("0.0.0.0:{port}");
                (TcpListener::bind(&socket_addr).await?, socket_addr)
            }
        }
    };

    info!(
        %bind_addr,
        data_file = %store.path().display(),
        interval,
        cors,
        primary_port = prober.config().primary_port,
        secondary_port = ?prober.config().secondary_port,
        verify_chain = prober.config().verify_chain,
        "listening"
    );

    let server = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal());

    if interval == 0 {
        info!("background sweep disabled");
        server.await?;
        return Ok(());
    }

    // keep JoinHandle to detect sweep failures
    let sweep_handle = task::spawn(sweep::run_loop(store, prober, inflight, interval));

    tokio::select! {
        result = server => {
            result?;
        }
        result = sweep_handle => {
            match result {
                Ok(()) => {
                    error!("certificate sweep exited unexpectedly");
                    anyhow::bail!("certificate sweep stopped");
                }
                Err(e) => {
                    error!("certificate sweep panicked: {e}");
                    anyhow::bail!("certificate sweep panicked: {e}");
                }
            }
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
