//! Outbound HTTP client capability.
//!
//! # Responsibilities
//! - Define the narrow interface the gateway needs from an outbound client
//! - Provide the hyper-backed implementation pointed at one backend
//! - Rewrite request URIs to the backend authority
//!
//! # Design Decisions
//! - `request` returns a `'static` boxed future so decorators can do
//!   synchronous bookkeeping before any async work is scheduled
//! - Closing drops the pooled client; calls already in flight keep their own
//!   handle and finish normally

use std::str::FromStr;

use axum::body::Body;
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{Request, Response, Uri};
use futures_util::future::{self, BoxFuture, FutureExt};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use parking_lot::RwLock;

/// Errors produced by an outbound client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("client is closed")]
    Closed,
    #[error("invalid outbound request: {0}")]
    InvalidRequest(String),
    #[error("upstream request failed: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),
}

/// The capability the gateway needs from an outbound client.
pub trait OutboundClient: Send + Sync + 'static {
    /// Issue a request. The response body streams from the backend.
    fn request(&self, req: Request<Body>) -> BoxFuture<'static, Result<Response<Body>, ClientError>>;

    /// Release the client's pooled resources.
    fn close(&self);

    /// Whether `close` has taken effect.
    fn is_closed(&self) -> bool;
}

/// Pooled hyper client bound to a single backend address.
#[derive(Debug)]
pub struct HyperClient {
    authority: Authority,
    inner: RwLock<Option<Client<HttpConnector, Body>>>,
}

impl HyperClient {
    /// Create a client for the given backend address (e.g. "127.0.0.1:3000").
    pub fn new(address: &str) -> Result<Self, ClientError> {
        let authority = Authority::from_str(address)
            .map_err(|e| ClientError::InvalidRequest(format!("backend address '{}': {}", address, e)))?;

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Ok(Self {
            authority,
            inner: RwLock::new(Some(client)),
        })
    }

    /// The backend this client talks to.
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    fn backend_uri(&self, uri: &Uri) -> Result<Uri, ClientError> {
        let mut uri_parts = uri.clone().into_parts();
        uri_parts.scheme = Some(Scheme::HTTP);
        uri_parts.authority = Some(self.authority.clone());
        if uri_parts.path_and_query.is_none() {
            uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
        }
        Uri::from_parts(uri_parts).map_err(|e| ClientError::InvalidRequest(e.to_string()))
    }
}

impl OutboundClient for HyperClient {
    fn request(&self, mut req: Request<Body>) -> BoxFuture<'static, Result<Response<Body>, ClientError>> {
        let Some(client) = self.inner.read().clone() else {
            return future::ready(Err(ClientError::Closed)).boxed();
        };

        match self.backend_uri(req.uri()) {
            Ok(uri) => *req.uri_mut() = uri,
            Err(e) => return future::ready(Err(e)).boxed(),
        }

        async move {
            let response = client.request(req).await?;
            Ok(response.map(Body::new))
        }
        .boxed()
    }

    fn close(&self) {
        if self.inner.write().take().is_some() {
            tracing::debug!(backend = %self.authority, "Outbound client closed");
        } else {
            tracing::warn!(backend = %self.authority, "Outbound client closed twice");
        }
    }

    fn is_closed(&self) -> bool {
        self.inner.read().is_none()
    }
}
