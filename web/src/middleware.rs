//! Correlation ID middleware.
//!
//! Every request runs inside an `http_request` span that carries the
//! correlation id, the caller forwarded by the auth proxy (when there is one)
//! and, once the handler returns, the response status. Gateway callbacks
//! arrive without a caller, so their span has an empty `user_id`.
//!
//! The id comes from the `X-Correlation-ID` request header when it holds a
//! UUID, and is generated otherwise. It is stored in the request extensions
//! (see [`CorrelationIdExt`] and [`crate::CorrelationId`]) and echoed in the
//! response header.
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use studio_web::middleware::correlation_id_layer;
//!
//! let app = Router::new()
//!     .route("/api/reservations", post(create_reservation))
//!     .layer(correlation_id_layer());
//! ```

use crate::extractors::USER_ID_HEADER;
use axum::{extract::Request, http::HeaderValue, response::Response};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::Instrument;
use uuid::Uuid;

/// Header name for correlation ID.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Layer that tags every request with a correlation id.
#[must_use]
pub const fn correlation_id_layer() -> CorrelationIdLayer {
    CorrelationIdLayer
}

/// See [`correlation_id_layer`].
#[derive(Clone, Debug)]
pub struct CorrelationIdLayer;

impl<S> Layer<S> for CorrelationIdLayer {
    type Service = CorrelationIdMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorrelationIdMiddleware { inner }
    }
}

/// Service produced by [`CorrelationIdLayer`].
#[derive(Clone, Debug)]
pub struct CorrelationIdMiddleware<S> {
    inner: S,
}

impl<S> Service<Request> for CorrelationIdMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let correlation_id = incoming_id(&req).unwrap_or_else(Uuid::new_v4);
        req.extensions_mut().insert(correlation_id);

        let span = tracing::info_span!(
            "http_request",
            correlation_id = %correlation_id,
            method = %req.method(),
            path = %req.uri().path(),
            user_id = tracing::field::Empty,
            status = tracing::field::Empty,
        );
        if let Some(user_id) = req.headers().get(USER_ID_HEADER).and_then(|v| v.to_str().ok()) {
            span.record("user_id", user_id);
        }

        let fut = self.inner.call(req);

        Box::pin(async move {
            let mut response = fut.instrument(span.clone()).await?;
            span.record("status", response.status().as_u16());

            if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
                response.headers_mut().insert(CORRELATION_ID_HEADER, value);
            }
            Ok(response)
        })
    }
}

fn incoming_id(req: &Request) -> Option<Uuid> {
    req.headers()
        .get(CORRELATION_ID_HEADER)?
        .to_str()
        .ok()
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
}

/// Access to the correlation ID stored by [`correlation_id_layer`].
pub trait CorrelationIdExt {
    /// The correlation ID, or `None` when the middleware is not installed.
    fn correlation_id(&self) -> Option<Uuid>;
}

impl CorrelationIdExt for Request {
    fn correlation_id(&self) -> Option<Uuid> {
        self.extensions().get::<Uuid>().copied()
    }
}
