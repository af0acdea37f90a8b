//! Traces, logs and Prometheus metrics.
use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics_exporter_prometheus::{
    BuildError, Matcher, PrometheusBuilder, PrometheusHandle,
};
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::trace::{Span, Status, Tracer};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, SpanExporter, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::{SdkLogger, SdkLoggerProvider};
use opentelemetry_sdk::trace::SdkTracerProvider;

use crate::error::{self, ErrorKind};
use crate::token::AccessToken;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Metric names exposed on `GET /metrics`.
pub mod names {
    pub const HTTP_REQUESTS: &str = "http_requests_total";
    pub const HTTP_DURATION: &str = "http_requests_duration_seconds";
    pub const TOKENS_ISSUED: &str = "access_tokens_issued_total";
    pub const TOKENS_LOOKUP: &str = "access_tokens_lookup_total";
}

/// Route label used when no route matched.
const UNMATCHED_ROUTE: &str = "unmatched";

fn resource() -> Resource {
    Resource::builder()
        .with_service_name(env!("CARGO_PKG_NAME"))
        .with_attribute(KeyValue::new(
            "service.version",
            env!("CARGO_PKG_VERSION"),
        ))
        .build()
}

/// Create tracer exporting spans to the OTLP collector at `endpoint`.
pub fn setup_tracer(endpoint: &str) -> Result<SdkTracerProvider, BoxError> {
    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource())
        .build())
}

/// Bridge `tracing` events to the OTLP collector at `endpoint`.
pub fn setup_logging(
    endpoint: &str,
) -> Result<OpenTelemetryTracingBridge<SdkLoggerProvider, SdkLogger>, BoxError>
{
    let exporter = LogExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;
    let provider = SdkLoggerProvider::builder()
        .with_resource(resource())
        .with_batch_exporter(exporter)
        .build();

    Ok(OpenTelemetryTracingBridge::new(&provider))
}

fn describe() {
    metrics::describe_counter!(
        names::HTTP_REQUESTS,
        "HTTP requests by method, route and status."
    );
    metrics::describe_histogram!(
        names::HTTP_DURATION,
        metrics::Unit::Seconds,
        "HTTP request latency by method, route and status."
    );
    metrics::describe_counter!(
        names::TOKENS_ISSUED,
        "Access tokens created after a successful login, by grant type."
    );
    metrics::describe_counter!(
        names::TOKENS_LOOKUP,
        "Access token lookups by identifier, by outcome."
    );
}

/// Install the global Prometheus recorder.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    const LATENCY_BUCKETS: &[f64] =
        &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(names::HTTP_DURATION.to_owned()),
            LATENCY_BUCKETS,
        )?
        .install_recorder()?;
    describe();

    Ok(handle)
}

/// Count a token stored after a successful login.
pub fn record_token_issued(grant_type: &str) {
    metrics::counter!(names::TOKENS_ISSUED, "grant_type" => grant_type.to_owned())
        .increment(1);
}

/// Count a lookup by identifier, labelled by its outcome.
pub fn record_token_lookup(result: &error::Result<AccessToken>) {
    let outcome = match result {
        Ok(_) => "found",
        Err(err) if err.kind() == ErrorKind::NotFound => "not_found",
        Err(_) => "error",
    };

    metrics::counter!(names::TOKENS_LOOKUP, "outcome" => outcome).increment(1);
}

/// Route template of `req`. Raw paths carry token identifiers and are never
/// used as labels.
fn route(req: &Request) -> String {
    req.extensions()
        .get::<MatchedPath>()
        .map_or_else(|| UNMATCHED_ROUTE.to_owned(), |path| path.as_str().to_owned())
}

/// Record one span and the request metrics of every routed request.
pub async fn track(req: Request, next: Next) -> Response {
    let route = route(&req);
    let method = req.method().as_str().to_owned();

    let mut span = global::tracer(env!("CARGO_PKG_NAME"))
        .start(format!("{method} {route}"));
    let started = Instant::now();

    let response = next.run(req).await;

    let elapsed = started.elapsed().as_secs_f64();
    let status = response.status();

    span.set_attributes([
        KeyValue::new("http.request.method", method.clone()),
        KeyValue::new("http.route", route.clone()),
        KeyValue::new("http.response.status_code", i64::from(status.as_u16())),
    ]);
    if status.is_server_error() {
        span.set_status(Status::error(status.to_string()));
    }
    span.end();

    let labels = [
        ("method", method),
        ("route", route),
        ("status", status.as_str().to_owned()),
    ];
    metrics::counter!(names::HTTP_REQUESTS, &labels).increment(1);
    metrics::histogram!(names::HTTP_DURATION, &labels).record(elapsed);

    response
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::middleware::from_fn;
    use axum::routing::get;
    use tower::util::ServiceExt;

    use super::*;
    use crate::ServerError;

    #[tokio::test]
    async fn test_track_labels_by_route() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let app = Router::new()
            .route("/oauth/access_token/{access_token_id}", get(|| async { "ok" }))
            .route_layer(from_fn(track));

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/oauth/access_token/secret-id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let rendered = handle.render();
        assert!(rendered.contains("route=\"/oauth/access_token/{access_token_id}\""));
        assert!(rendered.contains("status=\"200\""));
        assert!(!rendered.contains("secret-id"));
    }

    #[test]
    fn test_token_counters() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_token_issued("password");
            record_token_issued("password");
            record_token_lookup(&Ok(AccessToken::default()));
            record_token_lookup(&Err(ServerError::NotFound("missing".into())));
            record_token_lookup(&Err(ServerError::internal("database down")));
        });

        let rendered = handle.render();
        assert!(rendered.contains("access_tokens_issued_total{grant_type=\"password\"} 2"));
        for outcome in ["found", "not_found", "error"] {
            assert!(rendered.contains(&format!(
                "access_tokens_lookup_total{{outcome=\"{outcome}\"}} 1"
            )));
        }
    }
}
