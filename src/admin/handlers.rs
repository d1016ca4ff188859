use std::collections::HashMap;

use axum::{
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::client::{copy_resource, CopyTask, GuardState};
use crate::http::server::AppState;
use crate::validation::{ValidationRule, ValidationRuleSource};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub backend: String,
    pub fail_on_error: bool,
    pub rules: usize,
}

#[derive(Serialize)]
pub struct ClientStatus {
    pub backend: String,
    pub state: GuardState,
    pub pending_cycles: usize,
}

#[derive(Deserialize)]
pub struct CopyRequest {
    pub source: String,
    pub destination: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[derive(Serialize)]
pub struct CopyResult {
    pub status: u16,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let runtime = state.runtime();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        backend: runtime.config.backend.address.clone(),
        fail_on_error: runtime.config.validation.fail_on_error,
        rules: state.rules.current_rules().len(),
    })
}

pub async fn get_rules(State(state): State<AppState>) -> Json<Vec<ValidationRule>> {
    Json(state.rules.current_rules().as_ref().clone())
}

pub async fn get_client(State(state): State<AppState>) -> Json<ClientStatus> {
    let runtime = state.runtime();
    Json(ClientStatus {
        backend: runtime.config.backend.address.clone(),
        state: runtime.client.state(),
        pending_cycles: runtime.client.pending_cycles(),
    })
}

pub async fn post_copy(
    State(state): State<AppState>,
    Json(request): Json<CopyRequest>,
) -> Result<Json<CopyResult>, (StatusCode, String)> {
    let mut headers = HeaderMap::new();
    for (name, value) in &request.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("header value for '{}': {}", name, e)))?;
        headers.insert(name, value);
    }

    let task = CopyTask::new(request.source, request.destination, headers);
    let runtime = state.runtime();
    match copy_resource(&runtime.client, &task).await {
        Ok(status) => {
            tracing::info!(
                source = %task.source_uri(),
                destination = %task.destination_uri(),
                status = %status,
                "Copy finished"
            );
            Ok(Json(CopyResult { status: status.as_u16() }))
        }
        Err(e) => {
            tracing::error!(source = %task.source_uri(), error = %e, "Copy failed");
            Err((StatusCode::BAD_GATEWAY, e.to_string()))
        }
    }
}
