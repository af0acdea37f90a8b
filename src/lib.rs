//! oauth issues, introspects and expires opaque bearer access tokens.

#![forbid(unsafe_code)]
pub mod clock;
pub mod config;
mod database;
pub mod error;
mod router;
pub mod telemetry;
pub mod token;
pub mod user;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::FromRef;
use axum::http::{Method, StatusCode, header};
use axum::routing::{get, post};
use axum::{Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

pub use error::ServerError;

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    app.oneshot(
        Request::builder()
            .method(method)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(body))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub tokens: Arc<token::TokenService>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create a new [`AppState`] without metrics exposition.
    pub fn new(
        config: Arc<config::Configuration>,
        tokens: token::TokenService,
    ) -> Self {
        Self {
            config,
            tokens: Arc::new(tokens),
            metrics: None,
        }
    }

    /// Expose `handle` on `GET /metrics`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

impl FromRef<AppState> for Arc<token::TokenService> {
    fn from_ref(state: &AppState) -> Arc<token::TokenService> {
        Arc::clone(&state.tokens)
    }
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Mark credentials sensitive before any layer records headers.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any),
        );

    Router::new()
        // `GET /health` goes to `health`.
        .route("/health", get(router::status::health))
        .route("/metrics", get(router::status::metrics))
        // `GET /oauth/access_token/{id}` goes to `get`.
        .route(
            "/oauth/access_token/{access_token_id}",
            get(router::access_token::get),
        )
        // `POST /oauth/access_token` goes to `create`.
        .route("/oauth/access_token", post(router::access_token::create))
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state(
    config: Arc<config::Configuration>,
) -> Result<AppState, Box<dyn std::error::Error + Send + Sync>> {
    let db = match config.postgres {
        Some(ref config) => {
            database::Database::new(
                &config.address,
                config
                    .username
                    .as_deref()
                    .unwrap_or(database::DEFAULT_CREDENTIALS),
                config
                    .password
                    .as_deref()
                    .unwrap_or(database::DEFAULT_CREDENTIALS),
                config
                    .database
                    .as_deref()
                    .unwrap_or(database::DEFAULT_DATABASE_NAME),
                config.pool_size.unwrap_or(database::DEFAULT_POOL_SIZE),
            )
            .await?
        },
        None => {
            tracing::error!("missing `postgres` entry on `config.yaml` file");
            return Err("missing `postgres` configuration".into());
        },
    };

    // execute migrations scripts on start.
    db.migrate().await?;

    let users = user::HttpUsersRepository::new(
        &config.users_api.address,
        config.users_api.timeout(),
    )?;
    tracing::info!(
        address = %config.users_api.address,
        timeout_ms = config.users_api.timeout_ms,
        "users API configured"
    );

    let tokens = token::TokenService::new(
        Arc::new(token::PgTokenRepository::new(db.postgres)),
        Arc::new(users),
        Arc::new(clock::SystemClock),
    );

    Ok(AppState::new(config, tokens))
}
