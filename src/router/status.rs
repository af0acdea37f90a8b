//! Liveness probe and metrics exposition.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::config::Configuration;

/// Liveness payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct Status {
    pub status: String,
    pub name: String,
    pub version: String,
}

/// Answer as long as the process serves requests.
pub async fn health(State(config): State<Arc<Configuration>>) -> Json<Status> {
    Json(Status {
        status: "ready".into(),
        name: config.name.clone(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// Prometheus exposition format.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
