use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use crate::xds::{registry_response, RegistryError, RegistryResponse};

pub type Result<T> = std::result::Result<T, MediatorError>;

#[derive(Debug, thiserror::Error)]
pub enum MediatorError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("XML error: {0}")]
    Xml(#[from] crate::xml::XmlError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl MediatorError {
    /// XDS keeps transport-level success even for business failures; every
    /// error renders as a `RegistryResponse` at HTTP 200, with internal
    /// detail withheld from the wire.
    fn registry_error(&self) -> RegistryError {
        match self {
            MediatorError::MalformedRequest(msg) => {
                RegistryError::registry(format!("Malformed request: {}", msg))
            }
            MediatorError::Xml(e) => RegistryError::registry(format!("Malformed request: {}", e)),
            MediatorError::Transport(msg) => {
                RegistryError::error(registry_response::ERR_REPOSITORY_ERROR, msg.clone())
            }
            MediatorError::Timeout(msg) => {
                RegistryError::error(registry_response::ERR_REPOSITORY_ERROR, msg.clone())
            }
            MediatorError::Config(_) | MediatorError::Internal(_) => {
                RegistryError::registry("Internal mediator error")
            }
        }
    }
}

impl IntoResponse for MediatorError {
    fn into_response(self) -> Response {
        if matches!(self, MediatorError::Internal(_) | MediatorError::Config(_)) {
            tracing::error!(error = %self, "Unexpected mediator error");
        } else {
            tracing::warn!(error = %self, "Request failed");
        }

        let body = RegistryResponse::failure(vec![self.registry_error()]).to_soap();
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/soap+xml")],
            body,
        )
            .into_response()
    }
}
