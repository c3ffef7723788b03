//! Correlation ID middleware
//!
//! Tags every request with a fresh UUID v4, records it on a tracing span
//! wrapping the rest of the stack, exposes it to handlers as a request
//! extension and echoes it in the `X-Correlation-ID` response header.
//! The same layer feeds request counts, latencies and the in-flight gauge
//! into [`RequestMetrics`].

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderValue, Request},
    response::Response,
};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::metrics::RequestMetrics;

/// Response header carrying the correlation ID
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Request extension holding the ID assigned to the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

/// Route label for requests no route matched
const UNMATCHED_ROUTE: &str = "unmatched";

/// Correlation ID layer
#[derive(Clone)]
pub struct CorrelationIdLayer {
    metrics: Arc<RequestMetrics>,
}

impl CorrelationIdLayer {
    pub fn new(metrics: Arc<RequestMetrics>) -> Self {
        Self { metrics }
    }
}

impl<S> Layer<S> for CorrelationIdLayer {
    type Service = CorrelationIdMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorrelationIdMiddleware {
            inner,
            metrics: Arc::clone(&self.metrics),
        }
    }
}

/// Correlation ID middleware service
#[derive(Clone)]
pub struct CorrelationIdMiddleware<S> {
    inner: S,
    metrics: Arc<RequestMetrics>,
}

impl<S> Service<Request<Body>> for CorrelationIdMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let correlation_id = Uuid::new_v4().to_string();
        let span = info_span!(
            "request",
            correlation_id = %correlation_id,
            method = %request.method(),
            path = %request.uri().path(),
        );

        let method = request.method().to_string();
        let route = request
            .extensions()
            .get::<MatchedPath>()
            .map(|matched| matched.as_str().to_string())
            .unwrap_or_else(|| UNMATCHED_ROUTE.to_string());

        request
            .extensions_mut()
            .insert(CorrelationId(correlation_id.clone()));

        let metrics = Arc::clone(&self.metrics);
        let in_flight = metrics.begin();
        let started = Instant::now();

        let future = self.inner.call(request);
        Box::pin(
            async move {
                let mut response = future.await?;
                drop(in_flight);
                metrics.record(&method, &route, response.status().as_u16(), started.elapsed());

                if let Ok(value) = HeaderValue::from_str(&correlation_id) {
                    response.headers_mut().insert(CORRELATION_ID_HEADER, value);
                }
                Ok(response)
            }
            .instrument(span),
        )
    }
}
