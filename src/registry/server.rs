//! HTTP surface of the registry
//!
//! One path, three behaviours:
//! - `GET`: alive addresses, comma-joined, in the `X-Cleanwk-Servers` header
//! - `POST`: register the address carried in `X-Cleanwk-Servers`
//! - anything else: 405

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use super::{Registry, SERVERS_HEADER};
use crate::error::RegistryError;

/// Characters the router would read as parameters or wildcards
const RESERVED_PATH_CHARS: [char; 4] = [':', '*', '{', '}'];

/// Check that `path` is served literally: absolute, with no route syntax.
pub fn validate_path(path: &str) -> Result<(), RegistryError> {
    if !path.starts_with('/') || path.contains(RESERVED_PATH_CHARS) {
        return Err(RegistryError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Build a router serving `registry` at `path`.
pub fn router(registry: Arc<Registry>, path: &str) -> Result<Router, RegistryError> {
    validate_path(path)?;

    Ok(Router::new()
        .route(path, any(handle))
        .layer(TraceLayer::new_for_http())
        .with_state(registry))
}

/// Bind the registry listener. Failure is reported, never retried.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, RegistryError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| RegistryError::Bind { addr, source })
}

/// Serve `registry` at `path` on `listener` until `shutdown` fires.
pub async fn serve(
    registry: Arc<Registry>,
    listener: TcpListener,
    path: &str,
    shutdown: CancellationToken,
) -> Result<(), RegistryError> {
    let app = router(registry, path)?;
    let local_addr = listener.local_addr()?;
    info!("rpc registry path: {} (listening on http://{})", path, local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Registry server on {} stopped", local_addr);
    Ok(())
}

async fn handle(
    State(registry): State<Arc<Registry>>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, RegistryError> {
    match method {
        Method::GET => {
            let value = encode_header(&registry.list_alive().join(","))?;
            Ok((StatusCode::OK, [(SERVERS_HEADER, value)]).into_response())
        }
        Method::POST => {
            let address = headers
                .get(SERVERS_HEADER)
                .map(|v| decode_header(v.as_bytes()))
                .filter(|v| !v.is_empty())
                .ok_or(RegistryError::MissingAddress)?;

            registry.register(&address);
            debug!(address = %address, "Heartbeat received");
            Ok(StatusCode::OK.into_response())
        }
        other => Err(RegistryError::UnsupportedMethod(other.to_string())),
    }
}

/// Header bytes as text, one char per byte (ISO-8859-1).
///
/// Never fails, so obs-text bytes survive a register/list round trip.
pub fn decode_header(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Inverse of [`decode_header`]; chars above U+00FF have no byte form.
pub fn encode_header(value: &str) -> Result<HeaderValue, RegistryError> {
    let bytes = value
        .chars()
        .map(|c| u8::try_from(c).map_err(|_| RegistryError::InvalidHeader(value.to_string())))
        .collect::<Result<Vec<u8>, _>>()?;
    HeaderValue::from_bytes(&bytes).map_err(|e| RegistryError::InvalidHeader(e.to_string()))
}
