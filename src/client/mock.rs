//! Scripted outbound client for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use bytes::Bytes;
use futures_util::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;

use crate::client::outbound::{ClientError, OutboundClient};

/// How the mock answers every request.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Respond {
        status: StatusCode,
        headers: Vec<(&'static str, &'static str)>,
        body: &'static str,
    },
    Fail,
    Hang,
}

impl Reply {
    pub(crate) fn ok(body: &'static str) -> Self {
        Reply::Respond {
            status: StatusCode::OK,
            headers: vec![("content-type", "application/json")],
            body,
        }
    }

    pub(crate) fn status(status: StatusCode, body: &'static str) -> Self {
        Reply::Respond {
            status,
            headers: vec![("content-type", "application/json")],
            body,
        }
    }
}

/// A request as the backend saw it.
#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Clone)]
pub(crate) struct MockClient {
    reply: Reply,
    recorded: Arc<Mutex<Vec<Recorded>>>,
    closes: Arc<AtomicUsize>,
}

impl MockClient {
    pub(crate) fn new(reply: Reply) -> Self {
        Self {
            reply,
            recorded: Arc::default(),
            closes: Arc::default(),
        }
    }

    pub(crate) fn recorded(&self) -> Vec<Recorded> {
        self.recorded.lock().clone()
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl OutboundClient for MockClient {
    fn request(&self, req: Request<Body>) -> BoxFuture<'static, Result<Response<Body>, ClientError>> {
        let reply = self.reply.clone();
        let recorded = Arc::clone(&self.recorded);

        async move {
            let (parts, body) = req.into_parts();
            let body = axum::body::to_bytes(body, usize::MAX)
                .await
                .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
            recorded.lock().push(Recorded {
                method: parts.method,
                uri: parts.uri,
                headers: parts.headers,
                body,
            });

            match reply {
                Reply::Respond { status, headers, body } => {
                    let mut builder = Response::builder().status(status);
                    for (name, value) in headers {
                        builder = builder.header(name, value);
                    }
                    Ok(builder.body(Body::from(body)).expect("static response parts"))
                }
                Reply::Fail => Err(ClientError::Closed),
                Reply::Hang => future::pending().await,
            }
        }
        .boxed()
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.close_count() > 0
    }
}
