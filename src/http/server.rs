//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create the Axum router with the gateway handler and admin routes
//! - Wire up middleware (request ID, tracing, inbound timeout)
//! - Send selected requests through the validation pipeline, forward the rest
//! - Apply configuration reloads without dropping in-flight cycles
//! - Close the outbound client on shutdown

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::client::{ClientError, GatewayClient, HyperClient, OutboundClient};
use crate::config::GatewayConfig;
use crate::http::request::{request_id, UuidRequestId, X_REQUEST_ID};
use crate::http::response::ForwardError;
use crate::observability::metrics;
use crate::validation::{
    FileSchemaResolver, PipelineSettings, RuleMatcher, RuleStore, SchemaValidator, ValidationGate,
    ValidationPipeline,
};

/// Everything derived from one configuration generation.
pub struct GatewayRuntime {
    pub config: Arc<GatewayConfig>,
    pub client: GatewayClient,
    pub gate: ValidationGate,
    pub pipeline: ValidationPipeline,
    pub resolver: Arc<FileSchemaResolver>,
}

impl GatewayRuntime {
    fn assemble(
        config: GatewayConfig,
        client: GatewayClient,
        resolver: Arc<FileSchemaResolver>,
        matcher: Arc<RuleMatcher>,
    ) -> Self {
        let gate = ValidationGate::from_config(&config.validation, matcher);
        let pipeline = ValidationPipeline::new(
            Arc::new(client.clone()),
            SchemaValidator::new(resolver.clone()),
            PipelineSettings::from_config(&config),
        );
        Self {
            config: Arc::new(config),
            client,
            gate,
            pipeline,
            resolver,
        }
    }
}

fn guarded_client(config: &GatewayConfig) -> Result<GatewayClient, ClientError> {
    let delegate = HyperClient::new(&config.backend.address)?;
    Ok(GatewayClient::new(delegate, config.lifecycle.close_anyway_after()))
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<ArcSwap<GatewayRuntime>>,
    pub rules: Arc<RuleStore>,
    matcher: Arc<RuleMatcher>,
    in_flight: Arc<Semaphore>,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> Result<Self, ClientError> {
        let rules = Arc::new(RuleStore::new(config.validation.rules.clone()));
        let matcher = Arc::new(RuleMatcher::new(rules.clone()));
        let client = guarded_client(&config)?;
        let resolver = Arc::new(FileSchemaResolver::new(&config.validation.schema_root));
        let in_flight = Arc::new(Semaphore::new(config.listener.max_connections));

        let runtime = GatewayRuntime::assemble(config, client, resolver, matcher.clone());
        Ok(Self {
            inner: Arc::new(ArcSwap::from_pointee(runtime)),
            rules,
            matcher,
            in_flight,
        })
    }

    /// Install a reloaded configuration.
    ///
    /// Rules and validation settings take effect for the next request. A new
    /// backend address gets a new client; the previous one drains and closes.
    /// Listener and lifecycle settings only apply at startup.
    pub fn apply_config(&self, config: GatewayConfig) -> Result<(), ClientError> {
        let current = self.inner.load_full();

        let backend_changed = config.backend != current.config.backend;
        let client = if backend_changed {
            guarded_client(&config)?
        } else {
            current.client.clone()
        };

        let resolver = if config.validation.schema_root != current.config.validation.schema_root {
            Arc::new(FileSchemaResolver::new(&config.validation.schema_root))
        } else {
            current.resolver.clone()
        };

        self.rules.publish(config.validation.rules.clone());
        let rule_count = config.validation.rules.len();
        let runtime = GatewayRuntime::assemble(config, client, resolver, self.matcher.clone());
        self.inner.store(Arc::new(runtime));

        if backend_changed {
            let disposition = current.client.request_close();
            tracing::info!(
                previous = %current.config.backend.address,
                ?disposition,
                "Backend changed, previous client retired"
            );
        }
        tracing::info!(rules = rule_count, "Configuration applied");
        Ok(())
    }

    /// The runtime serving requests right now.
    pub fn runtime(&self) -> Arc<GatewayRuntime> {
        self.inner.load_full()
    }
}

/// HTTP server for the validating gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, ClientError> {
        let request_timeout = Duration::from_secs(config.timeouts.request_secs);
        let admin_enabled = config.admin.enabled;
        let state = AppState::new(config)?;
        let router = Self::build_router(state.clone(), request_timeout, admin_enabled);
        Ok(Self { router, state })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState, request_timeout: Duration, admin_enabled: bool) -> Router {
        let mut router = Router::new()
            .route("/", any(gateway_handler))
            .route("/{*path}", any(gateway_handler));
        if admin_enabled {
            router = router.merge(admin::admin_router(state.clone()));
        }

        router.with_state(state).layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
                .layer(TimeoutLayer::new(request_timeout)),
        )
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve on `listener` until `shutdown` fires, applying configuration
    /// updates as they arrive. The outbound client is closed on the way out.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let reload_state = self.state.clone();
        let reloader = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                if let Err(e) = reload_state.apply_config(config) {
                    tracing::error!(error = %e, "Rejected configuration update. Keeping current configuration.");
                }
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        reloader.abort();
        let disposition = self.state.runtime().client.request_close();
        tracing::info!(?disposition, "HTTP server stopped");
        Ok(())
    }
}

/// Main gateway handler.
/// Validates selected requests, forwards everything else untouched.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();

    let Ok(_permit) = state.in_flight.clone().try_acquire_owned() else {
        tracing::warn!(request_id = %request_id(&request), "Too many requests in flight");
        metrics::record_request(&method, 503, false, start);
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many requests in flight").into_response();
    };

    let runtime = state.runtime();
    let rule = runtime.gate.selected_rule(&request);
    let validated = rule.is_some();

    tracing::debug!(
        request_id = %request_id(&request),
        method = %method,
        uri = %request.uri(),
        validated,
        "Handling request"
    );

    let response = match rule {
        Some(rule) => runtime.pipeline.handle(request, &rule).await,
        None => forward_unvalidated(&runtime, request)
            .await
            .unwrap_or_else(IntoResponse::into_response),
    };

    metrics::record_request(&method, response.status().as_u16(), validated, start);
    response
}

/// Forward as-is. The response body streams back; its cycle ends when the
/// body has been sent or dropped.
async fn forward_unvalidated(runtime: &GatewayRuntime, request: Request<Body>) -> Result<Response, ForwardError> {
    let request_id = request_id(&request).to_string();
    let deadline = runtime.config.timeouts.forward();

    let call = runtime.client.request(request);
    match tokio::time::timeout(deadline, call).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => {
            tracing::error!(request_id = %request_id, error = %e, "Upstream error");
            Err(e.into())
        }
        Err(_) => {
            tracing::error!(request_id = %request_id, timeout = ?deadline, "Upstream timed out");
            Err(ForwardError::Timeout(deadline))
        }
    }
}
