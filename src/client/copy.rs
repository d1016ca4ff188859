//! Resource copy through the outbound client.

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};

use crate::client::outbound::{ClientError, OutboundClient};

/// Describes a copy of one backend resource to another location.
#[derive(Debug, Clone)]
pub struct CopyTask {
    source_uri: String,
    destination_uri: String,
    headers: HeaderMap,
}

impl CopyTask {
    pub fn new(source_uri: impl Into<String>, destination_uri: impl Into<String>, headers: HeaderMap) -> Self {
        Self {
            source_uri: source_uri.into(),
            destination_uri: destination_uri.into(),
            headers,
        }
    }

    pub fn source_uri(&self) -> &str {
        &self.source_uri
    }

    pub fn destination_uri(&self) -> &str {
        &self.destination_uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("invalid copy request: {0}")]
    Request(#[from] axum::http::Error),
    #[error("source responded with {0}")]
    Source(StatusCode),
    #[error("reading source body failed: {0}")]
    Body(#[from] axum::Error),
}

/// GET the source and PUT its body to the destination, sending the task's
/// headers on both requests. Returns the destination's status.
pub async fn copy_resource<C>(client: &C, task: &CopyTask) -> Result<StatusCode, CopyError>
where
    C: OutboundClient + ?Sized,
{
    let get = with_headers(Request::builder().method(Method::GET).uri(task.source_uri()), task.headers())
        .body(Body::empty())?;
    let source = client.request(get).await?;
    if !source.status().is_success() {
        return Err(CopyError::Source(source.status()));
    }

    let data = axum::body::to_bytes(source.into_body(), usize::MAX).await?;
    tracing::debug!(
        source = %task.source_uri(),
        destination = %task.destination_uri(),
        bytes = data.len(),
        "Copying resource"
    );

    let put = with_headers(Request::builder().method(Method::PUT).uri(task.destination_uri()), task.headers())
        .body(Body::from(data))?;
    let destination = client.request(put).await?;
    Ok(destination.status())
}

fn with_headers(mut builder: axum::http::request::Builder, headers: &HeaderMap) -> axum::http::request::Builder {
    if let Some(target) = builder.headers_mut() {
        target.extend(headers.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    builder
}
