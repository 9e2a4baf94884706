//! Serving mode for fstimeline.
//!
//! A small local HTTP server that exposes a content directory holding a
//! timeline file, so it can be browsed with a viewer page:
//!
//! - `GET /` and `GET /index.html` serve `index.html` from the content root,
//!   falling back to a built-in viewer when there is none.
//! - `GET /fileEvents.json` serves the timeline itself.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use thiserror::Error;
use tokio::fs;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use fstimeline_core::DEFAULT_OUTPUT_FILE;

/// Port the viewer listens on.
pub const DEFAULT_PORT: u16 = 9999;

/// Loopback address the viewer listens on.
pub const DEFAULT_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, DEFAULT_PORT));

/// Name of the viewer page looked up in the content root.
pub const INDEX_FILE: &str = "index.html";

/// Page served when the content root has no `index.html`.
const VIEWER_PAGE: &str = include_str!("viewer.html");

/// Serving mode errors.
#[derive(Debug, Error)]
pub enum ServeError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// A requested file does not exist in the content root.
    #[error("not found: {path}")]
    NotFound { path: PathBuf },

    /// A file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServeError::NotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Shared application state.
#[derive(Debug)]
pub struct AppState {
    pub content_root: PathBuf,
}

/// Build the router for a content root.
pub fn build_router(content_root: impl Into<PathBuf>) -> Router {
    let state = Arc::new(AppState {
        content_root: content_root.into(),
    });

    Router::new()
        .route("/", get(index))
        .route("/index.html", get(index))
        .route("/fileEvents.json", get(file_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index(State(state): State<Arc<AppState>>) -> Result<Response, ServeError> {
    let path = state.content_root.join(INDEX_FILE);
    match fs::read(&path).await {
        Ok(body) => Ok(([(header::CONTENT_TYPE, "text/html; charset=utf-8")], body).into_response()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no index page, using built-in viewer");
            Ok(Html(VIEWER_PAGE).into_response())
        }
        Err(source) => Err(ServeError::Read { path, source }),
    }
}

async fn file_events(State(state): State<Arc<AppState>>) -> Result<Response, ServeError> {
    let path = state.content_root.join(DEFAULT_OUTPUT_FILE);
    match fs::read(&path).await {
        Ok(body) => Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Err(ServeError::NotFound { path }),
        Err(source) => Err(ServeError::Read { path, source }),
    }
}

/// Serve `content_root` on `addr` until `shutdown` is cancelled.
pub async fn serve(
    content_root: impl Into<PathBuf>,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> Result<(), ServeError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServeError::Bind { addr, source })?;
    serve_listener(listener, content_root, shutdown).await
}

/// Serve on an already bound listener.
pub async fn serve_listener(
    listener: TcpListener,
    content_root: impl Into<PathBuf>,
    shutdown: CancellationToken,
) -> Result<(), ServeError> {
    let content_root = content_root.into();
    let addr = listener.local_addr()?;
    info!(%addr, root = %content_root.display(), "viewer listening on http://{addr}/");

    axum::serve(listener, build_router(content_root))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("viewer shut down");
    Ok(())
}
