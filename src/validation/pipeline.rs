//! Validation-gated forwarding.
//!
//! # Stages
//! ```text
//! START → INBOUND_CHECK → FORWARDED → OUTBOUND_CHECK → DONE
//!              │                           │
//!              ▼                           ▼
//!      INBOUND_REJECTED            OUTBOUND_REJECTED
//! ```
//!
//! Each stage finishes before the next starts: the inbound body is checked
//! before the backend is contacted, and the response body is checked only
//! once it has been received in full.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, request, response, HeaderValue, Method, Request, Response, StatusCode};
use axum::response::IntoResponse;
use bytes::Bytes;

use crate::client::OutboundClient;
use crate::config::GatewayConfig;
use crate::http::response::{inbound_rejection, ForwardError};
use crate::observability::metrics;
use crate::validation::gate::VALID_HEADER;
use crate::validation::rule::{SchemaLocation, ValidationRule};
use crate::validation::validator::SchemaValidator;

/// Methods whose request body is validated.
const IN_METHODS: [Method; 2] = [Method::PUT, Method::POST];
/// Methods whose response body is validated.
const OUT_METHODS: [Method; 2] = [Method::GET, Method::POST];

/// Tunables of the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Reject invalid bodies instead of only logging them.
    pub fail_on_error: bool,
    /// Deadline for the backend exchange, response body included.
    pub forward_timeout: Duration,
    /// Largest inbound body accepted for validation.
    pub max_body_bytes: usize,
}

impl PipelineSettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            fail_on_error: config.validation.fail_on_error,
            forward_timeout: config.timeouts.forward(),
            max_body_bytes: config.validation.max_body_bytes,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&GatewayConfig::default())
    }
}

/// Terminal state of one pass through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    Done,
    InboundRejected,
    OutboundRejected,
    ForwardFailed,
}

impl PipelineOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineOutcome::Done => "done",
            PipelineOutcome::InboundRejected => "inbound_rejected",
            PipelineOutcome::OutboundRejected => "outbound_rejected",
            PipelineOutcome::ForwardFailed => "forward_failed",
        }
    }
}

enum InboundVerdict {
    Forward(Bytes),
    Reject(Response<Body>),
}

enum OutboundVerdict {
    Deliver(Response<Body>),
    Reject(Response<Body>),
}

/// Validates, forwards and validates again.
#[derive(Clone)]
pub struct ValidationPipeline {
    client: Arc<dyn OutboundClient>,
    validator: SchemaValidator,
    settings: PipelineSettings,
}

impl ValidationPipeline {
    pub fn new(client: Arc<dyn OutboundClient>, validator: SchemaValidator, settings: PipelineSettings) -> Self {
        Self {
            client,
            validator,
            settings,
        }
    }

    /// Run `request` through the pipeline under `rule`.
    pub async fn handle(&self, request: Request<Body>, rule: &ValidationRule) -> Response<Body> {
        let (outcome, response) = self.run(request, rule).await;
        metrics::record_pipeline(outcome);
        response
    }

    /// Like [`handle`](Self::handle), also reporting where the request ended.
    pub async fn run(&self, request: Request<Body>, rule: &ValidationRule) -> (PipelineOutcome, Response<Body>) {
        let (parts, body) = request.into_parts();
        let location = rule.schema_location();

        if declared_length(&parts).is_some_and(|len| len > self.settings.max_body_bytes) {
            tracing::warn!(uri = %parts.uri, limit = self.settings.max_body_bytes, "Request body too large to validate");
            let response = (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
            return (PipelineOutcome::InboundRejected, response);
        }

        let body = match axum::body::to_bytes(body, self.settings.max_body_bytes).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(uri = %parts.uri, error = %e, "Could not read request body");
                let response = (StatusCode::BAD_REQUEST, "Could not read request body").into_response();
                return (PipelineOutcome::InboundRejected, response);
            }
        };

        let body = match self.inbound_check(&parts, body, location.as_ref()).await {
            InboundVerdict::Forward(body) => body,
            InboundVerdict::Reject(response) => return (PipelineOutcome::InboundRejected, response),
        };

        let (head, data) = match self.forward(&parts, body).await {
            Ok(exchange) => exchange,
            Err(e) => {
                tracing::error!(method = %parts.method, uri = %parts.uri, error = %e, "Forwarding validated request failed");
                return (PipelineOutcome::ForwardFailed, e.into_response());
            }
        };

        match self.outbound_check(&parts.method, head, data, location.as_ref()).await {
            OutboundVerdict::Deliver(response) => (PipelineOutcome::Done, response),
            OutboundVerdict::Reject(response) => (PipelineOutcome::OutboundRejected, response),
        }
    }

    async fn inbound_check(
        &self,
        parts: &request::Parts,
        body: Bytes,
        location: Option<&SchemaLocation>,
    ) -> InboundVerdict {
        if !IN_METHODS.contains(&parts.method) {
            return InboundVerdict::Forward(body);
        }

        let tag = format!("{}/in", parts.method);
        let outcome = self.validator.validate(&tag, &body, location).await;
        if outcome.is_success() {
            return InboundVerdict::Forward(body);
        }

        metrics::record_validation_failure("in");
        if self.settings.fail_on_error {
            tracing::info!(tag = %tag, uri = %parts.uri, message = ?outcome.message(), "Rejecting invalid request body");
            InboundVerdict::Reject(inbound_rejection(&outcome))
        } else {
            tracing::warn!(tag = %tag, uri = %parts.uri, message = ?outcome.message(), "Invalid request body forwarded");
            InboundVerdict::Forward(body)
        }
    }

    async fn forward(&self, parts: &request::Parts, body: Bytes) -> Result<(response::Parts, Bytes), ForwardError> {
        let mut builder = Request::builder().method(parts.method.clone()).uri(parts.uri.clone());
        if let Some(headers) = builder.headers_mut() {
            headers.extend(parts.headers.clone());
            headers.insert(VALID_HEADER, HeaderValue::from_static("0"));
        }
        let outbound = builder.body(Body::from(body))?;

        // The cycle starts here, before anything is awaited.
        let call = self.client.request(outbound);
        let exchange = async move {
            let response = call.await?;
            let (head, body) = response.into_parts();
            let data = axum::body::to_bytes(body, usize::MAX)
                .await
                .map_err(ForwardError::Body)?;
            Ok::<_, ForwardError>((head, data))
        };

        tokio::time::timeout(self.settings.forward_timeout, exchange)
            .await
            .map_err(|_| ForwardError::Timeout(self.settings.forward_timeout))?
    }

    async fn outbound_check(
        &self,
        method: &Method,
        head: response::Parts,
        data: Bytes,
        location: Option<&SchemaLocation>,
    ) -> OutboundVerdict {
        if head.status != StatusCode::OK || !OUT_METHODS.contains(method) || data.is_empty() {
            return OutboundVerdict::Deliver(Response::from_parts(head, Body::from(data)));
        }

        let tag = format!("{}/out", method);
        let outcome = self.validator.validate(&tag, &data, location).await;
        if outcome.is_success() {
            return OutboundVerdict::Deliver(Response::from_parts(head, Body::from(data)));
        }

        metrics::record_validation_failure("out");
        tracing::warn!(tag = %tag, message = ?outcome.message(), "Backend response failed validation");
        if self.settings.fail_on_error {
            let mut rejected = Response::new(Body::empty());
            *rejected.status_mut() = StatusCode::BAD_REQUEST;
            OutboundVerdict::Reject(rejected)
        } else {
            OutboundVerdict::Deliver(Response::from_parts(head, Body::from(data)))
        }
    }
}

fn declared_length(parts: &request::Parts) -> Option<usize> {
    parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{MockClient, Reply};
    use crate::client::DeferCloseClient;
    use crate::validation::schema::InMemorySchemaResolver;
    use serde_json::{json, Value};

    fn validator() -> SchemaValidator {
        let resolver = InMemorySchemaResolver::new();
        resolver
            .insert(
                "/schemas/a",
                &json!({
                    "type": "object",
                    "required": ["name"],
                    "properties": { "name": { "type": "string" } }
                }),
            )
            .unwrap();
        SchemaValidator::new(Arc::new(resolver))
    }

    fn pipeline(mock: &MockClient, fail_on_error: bool) -> ValidationPipeline {
        let settings = PipelineSettings {
            fail_on_error,
            ..PipelineSettings::default()
        };
        ValidationPipeline::new(Arc::new(mock.clone()), validator(), settings)
    }

    fn rule() -> ValidationRule {
        ValidationRule::new("PUT|GET|POST", "/a/.*", Some("/schemas/a"))
    }

    fn request(method: Method, body: &'static str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri("/a/1")
            .header("content-type", "application/json")
            .header("x-trace", "t-1")
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_of(response: Response<Body>) -> Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap()
    }

    #[tokio::test]
    async fn invalid_put_is_rejected_before_forwarding() {
        let mock = MockClient::new(Reply::ok(""));
        let (outcome, response) = pipeline(&mock, true)
            .run(request(Method::PUT, r#"{"name":1}"#), &rule())
            .await;

        assert_eq!(outcome, PipelineOutcome::InboundRejected);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()["content-type"], "application/json");
        let details: Value = serde_json::from_slice(&body_of(response).await).unwrap();
        assert_eq!(details[0]["path"], "/name");
        assert!(mock.recorded().is_empty());
    }

    #[tokio::test]
    async fn non_json_put_is_rejected_with_message() {
        let mock = MockClient::new(Reply::ok(""));
        let (_, response) = pipeline(&mock, true)
            .run(request(Method::PUT, "name=x"), &rule())
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let text = String::from_utf8(body_of(response).await.to_vec()).unwrap();
        assert!(text.contains("PUT/in"));
        assert!(mock.recorded().is_empty());
    }

    #[tokio::test]
    async fn invalid_put_is_forwarded_when_fail_open() {
        let mock = MockClient::new(Reply::status(StatusCode::NO_CONTENT, ""));
        let (outcome, response) = pipeline(&mock, false)
            .run(request(Method::PUT, r#"{"name":1}"#), &rule())
            .await;

        assert_eq!(outcome, PipelineOutcome::Done);
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let recorded = mock.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(&recorded[0].body[..], br#"{"name":1}"#);
    }

    #[tokio::test]
    async fn oversized_body_is_refused() {
        let mock = MockClient::new(Reply::ok(""));
        let settings = PipelineSettings {
            max_body_bytes: 4,
            ..PipelineSettings::default()
        };
        let p = ValidationPipeline::new(Arc::new(mock.clone()), validator(), settings);
        let req = Request::builder()
            .method(Method::PUT)
            .uri("/a/1")
            .header("content-length", "12")
            .body(Body::from(r#"{"name":"x"}"#))
            .unwrap();

        let (outcome, response) = p.run(req, &rule()).await;
        assert_eq!(outcome, PipelineOutcome::InboundRejected);
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(mock.recorded().is_empty());
    }

    #[tokio::test]
    async fn forwarded_request_keeps_headers_and_is_marked() {
        let mock = MockClient::new(Reply::ok(""));
        pipeline(&mock, true)
            .run(request(Method::POST, r#"{"name":"x"}"#), &rule())
            .await;

        let recorded = mock.recorded();
        assert_eq!(recorded[0].method, Method::POST);
        assert_eq!(recorded[0].uri, "/a/1");
        assert_eq!(recorded[0].headers["x-trace"], "t-1");
        assert_eq!(recorded[0].headers["x-valid"], "0");
        assert_eq!(&recorded[0].body[..], br#"{"name":"x"}"#);
    }

    #[tokio::test]
    async fn conforming_get_response_is_delivered_unchanged() {
        let mock = MockClient::new(Reply::Respond {
            status: StatusCode::OK,
            headers: vec![("content-type", "application/json"), ("etag", "\"v1\"")],
            body: r#"{"name":"x"}"#,
        });
        let (outcome, response) = pipeline(&mock, true).run(request(Method::GET, ""), &rule()).await;

        assert_eq!(outcome, PipelineOutcome::Done);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["etag"], "\"v1\"");
        assert_eq!(&body_of(response).await[..], br#"{"name":"x"}"#);
    }

    #[tokio::test]
    async fn non_conforming_get_response_is_replaced() {
        let mock = MockClient::new(Reply::Respond {
            status: StatusCode::OK,
            headers: vec![("content-type", "application/json"), ("etag", "\"v1\"")],
            body: r#"{"other":true}"#,
        });
        let (outcome, response) = pipeline(&mock, true).run(request(Method::GET, ""), &rule()).await;

        assert_eq!(outcome, PipelineOutcome::OutboundRejected);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().is_empty());
        assert!(body_of(response).await.is_empty());
    }

    #[tokio::test]
    async fn non_conforming_get_response_passes_when_fail_open() {
        let mock = MockClient::new(Reply::ok(r#"{"other":true}"#));
        let (outcome, response) = pipeline(&mock, false).run(request(Method::GET, ""), &rule()).await;

        assert_eq!(outcome, PipelineOutcome::Done);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(&body_of(response).await[..], br#"{"other":true}"#);
    }

    #[tokio::test]
    async fn only_status_200_is_checked() {
        let mock = MockClient::new(Reply::status(StatusCode::CREATED, r#"{"other":true}"#));
        let (outcome, response) = pipeline(&mock, true)
            .run(request(Method::POST, r#"{"name":"x"}"#), &rule())
            .await;

        assert_eq!(outcome, PipelineOutcome::Done);
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn put_response_is_not_checked() {
        let mock = MockClient::new(Reply::ok(r#"{"other":true}"#));
        let (outcome, response) = pipeline(&mock, true)
            .run(request(Method::PUT, r#"{"name":"x"}"#), &rule())
            .await;

        assert_eq!(outcome, PipelineOutcome::Done);
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn rule_without_schema_passes_everything() {
        let mock = MockClient::new(Reply::ok("not json"));
        let rule = ValidationRule::new("PUT|GET", "/a/.*", None);
        let p = pipeline(&mock, true);

        let (outcome, _) = p.run(request(Method::PUT, "not json either"), &rule).await;
        assert_eq!(outcome, PipelineOutcome::Done);
        let (outcome, response) = p.run(request(Method::GET, ""), &rule).await;
        assert_eq!(outcome, PipelineOutcome::Done);
        assert_eq!(&body_of(response).await[..], b"not json");
    }

    #[tokio::test]
    async fn transport_failure_is_gateway_error() {
        let mock = MockClient::new(Reply::Fail);
        let guarded = DeferCloseClient::new(mock, Duration::from_secs(60));
        let p = ValidationPipeline::new(Arc::new(guarded.clone()), validator(), PipelineSettings::default());

        let (outcome, response) = p.run(request(Method::GET, ""), &rule()).await;
        assert_eq!(outcome, PipelineOutcome::ForwardFailed);
        assert!(response.status().is_server_error());
        assert_eq!(guarded.pending_cycles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn backend_timeout_releases_cycle() {
        let mock = MockClient::new(Reply::Hang);
        let guarded = DeferCloseClient::new(mock.clone(), Duration::from_secs(3600));
        let settings = PipelineSettings {
            forward_timeout: Duration::from_secs(120),
            ..PipelineSettings::default()
        };
        let p = ValidationPipeline::new(Arc::new(guarded.clone()), validator(), settings);

        let (outcome, response) = p.run(request(Method::GET, ""), &rule()).await;
        assert_eq!(outcome, PipelineOutcome::ForwardFailed);
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(guarded.pending_cycles(), 0);
        assert_eq!(mock.recorded().len(), 1);
    }

    #[tokio::test]
    async fn guarded_cycle_spans_the_whole_exchange() {
        let mock = MockClient::new(Reply::ok(r#"{"name":"x"}"#));
        let guarded = DeferCloseClient::new(mock.clone(), Duration::from_secs(60));
        let p = ValidationPipeline::new(Arc::new(guarded.clone()), validator(), PipelineSettings::default());

        let (_, response) = p.run(request(Method::GET, ""), &rule()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(guarded.pending_cycles(), 0);

        guarded.request_close();
        assert_eq!(mock.close_count(), 1);
    }
}
