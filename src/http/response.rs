//! Response handling and error mapping.
//!
//! # Responsibilities
//! - Map forwarding failures to gateway status codes
//! - Build the rejection sent when an inbound body fails validation
//!
//! # Design Decisions
//! - Backend timeouts result in 504 Gateway Timeout
//! - A closed client results in 503; other transport errors in 502
//! - Rejections carry structured details as JSON when available

use std::time::Duration;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::client::ClientError;
use crate::validation::ValidationOutcome;

/// Why a request could not be forwarded.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("invalid outbound request: {0}")]
    Request(#[from] axum::http::Error),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("reading backend response failed: {0}")]
    Body(#[source] axum::Error),
    #[error("backend did not answer within {0:?}")]
    Timeout(Duration),
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        let status = match &self {
            ForwardError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ForwardError::Client(ClientError::Closed) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_GATEWAY,
        };
        (status, "Upstream request failed").into_response()
    }
}

/// 400 response for an inbound body that failed validation.
pub fn inbound_rejection(outcome: &ValidationOutcome) -> Response {
    match outcome.details() {
        Some(details) => (
            StatusCode::BAD_REQUEST,
            [(header::CONTENT_TYPE, "application/json")],
            details.to_string(),
        )
            .into_response(),
        None => (
            StatusCode::BAD_REQUEST,
            outcome.message().unwrap_or("Bad Request").to_string(),
        )
            .into_response(),
    }
}
