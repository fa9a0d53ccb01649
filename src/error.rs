//! Registry errors

use std::net::SocketAddr;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

/// Errors raised by the registry server, heartbeat sender and discovery client
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("missing service address in registration request")]
    MissingAddress,

    #[error("method {0} not allowed")]
    UnsupportedMethod(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to bind registry listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid registry path {0:?}: must start with '/' and contain no ':', '*', '{{' or '}}'")]
    InvalidPath(String),

    #[error("invalid header value: {0}")]
    InvalidHeader(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for RegistryError {
    fn from(e: reqwest::Error) -> Self {
        RegistryError::Transport(e.to_string())
    }
}

impl RegistryError {
    /// HTTP status this error maps to when it surfaces from the handler
    pub fn status_code(&self) -> StatusCode {
        match self {
            RegistryError::UnsupportedMethod(_) => StatusCode::METHOD_NOT_ALLOWED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response = (status, self.to_string()).into_response();
        if status == StatusCode::METHOD_NOT_ALLOWED {
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static("GET, POST"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            RegistryError::MissingAddress.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            RegistryError::UnsupportedMethod("PUT".into()).status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }

    #[test]
    fn test_method_not_allowed_carries_allow_header() {
        let response = RegistryError::UnsupportedMethod("DELETE".into()).into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(header::ALLOW).unwrap(), "GET, POST");
    }
}
