use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::config::Config;
use crate::orchestration::{Orchestrator, PnrOutcome};
use crate::pnr::PnrRequest;

pub struct PnrState {
    pub orchestrator: Arc<Orchestrator>,
    pub config: Arc<Config>,
}

pub type SharedPnrState = Arc<PnrState>;

const SOAP_CONTENT_TYPE: &str = "application/soap+xml";

/// Provide and Register Document Set-b ingress.
///
/// XDS convention: both the enriched envelope and the failure
/// `RegistryResponse` go back at HTTP 200.
pub async fn provide_and_register(
    State(state): State<SharedPnrState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if let Some(content_type) = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        if !content_type.contains("xml") {
            tracing::warn!(content_type, "Rejecting non-XML Provide-and-Register request");
            return crate::error::MediatorError::MalformedRequest(format!(
                "unsupported content type: {}",
                content_type
            ))
            .into_response();
        }
    }

    let outcome = if state.config.pnr.send_parse_orchestration {
        // Pre-parse stage: the orchestrator receives an already-built DOM.
        match PnrRequest::parse(&body) {
            Ok(request) => state.orchestrator.orchestrate_parsed(request).await,
            Err(e) => return e.into_response(),
        }
    } else {
        state.orchestrator.orchestrate(&body).await
    };

    match outcome {
        PnrOutcome::Enriched { envelope } => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, SOAP_CONTENT_TYPE)],
            envelope,
        )
            .into_response(),
        PnrOutcome::Rejected { body, .. } => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, SOAP_CONTENT_TYPE)],
            body,
        )
            .into_response(),
    }
}
