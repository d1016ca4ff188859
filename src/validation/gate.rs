//! Decides whether a request goes through the validation pipeline.

use std::sync::Arc;

use axum::http::{header, HeaderMap, Method, Request, Uri};

use crate::config::ValidationConfig;
use crate::validation::matcher::RuleMatcher;
use crate::validation::rule::ValidationRule;

/// Marker header set on requests the gateway already validated.
pub const VALID_HEADER: &str = "x-valid";
/// Query parameter that opts a request out of validation.
pub const EXPAND_PARAM: &str = "expand";
/// Hook management endpoints are never validated.
pub const HOOKS_LISTENERS_URI_PART: &str = "/_hooks/listeners/";
pub const HOOKS_ROUTE_URI_PART: &str = "/_hooks/route";

/// Combines the cheap request checks with the rule lookup.
pub struct ValidationGate {
    supported_methods: Vec<Method>,
    matcher: Arc<RuleMatcher>,
}

impl ValidationGate {
    pub fn new(supported_methods: Vec<Method>, matcher: Arc<RuleMatcher>) -> Self {
        Self {
            supported_methods,
            matcher,
        }
    }

    pub fn from_config(config: &ValidationConfig, matcher: Arc<RuleMatcher>) -> Self {
        let supported_methods = config
            .supported_methods
            .iter()
            .filter_map(|name| match Method::from_bytes(name.as_bytes()) {
                Ok(method) => Some(method),
                Err(_) => {
                    tracing::warn!(method = %name, "Ignoring unsupported method in validation config");
                    None
                }
            })
            .collect();
        Self::new(supported_methods, matcher)
    }

    /// Returns true when the request must be validated.
    pub fn is_to_validate<B>(&self, request: &Request<B>) -> bool {
        self.selected_rule(request).is_some()
    }

    /// The rule that applies to this request, or `None` if the request is
    /// not validated.
    pub fn selected_rule<B>(&self, request: &Request<B>) -> Option<ValidationRule> {
        let uri = request.uri();
        let do_validate = self.supported_methods.contains(request.method())
            && is_json_request(request.headers(), uri)
            && !request.headers().contains_key(VALID_HEADER)
            && !has_query_param(uri, EXPAND_PARAM);
        if !do_validate {
            return None;
        }

        let target = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("");
        if target.contains(HOOKS_ROUTE_URI_PART) || target.contains(HOOKS_LISTENERS_URI_PART) {
            return None;
        }

        self.matcher.matching_rule(request.method(), uri)
    }
}

fn is_json_request(headers: &HeaderMap, uri: &Uri) -> bool {
    let accept = header_str(headers, header::ACCEPT);
    let content_type = header_str(headers, header::CONTENT_TYPE);

    accept.is_some_and(|v| v.contains("application/json"))
        || accept.is_some_and(|v| v.contains("text/plain"))
        || content_type.is_some_and(|v| v.contains("application/json"))
        || has_no_extension(uri.path())
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// True when the last path segment contains no dot.
fn has_no_extension(path: &str) -> bool {
    path.rsplit_once('/')
        .map(|(_, last)| !last.contains('.'))
        .unwrap_or(false)
}

fn has_query_param(uri: &Uri, name: &str) -> bool {
    uri.query()
        .map(|query| {
            query
                .split('&')
                .any(|pair| pair.split('=').next() == Some(name))
        })
        .unwrap_or(false)
}
