use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use serde::Serialize;
use std::net::SocketAddr;
use tower::{Layer, Service};

use crate::RateLimiter;

/// Wraps a [`RateLimiter`] as a `tower::Layer` for the daemon's admin HTTP
/// surface (`/healthz`, `/metrics`); the inner limiter is identical to the
/// one used for the `url`/P2P host builtins, keyed here by peer address
/// instead of app id.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter>,
}

pub fn rate_limit_layer(limiter: Arc<RateLimiter>) -> RateLimitLayer {
    RateLimitLayer { limiter }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
}

impl<S, ReqBody> Service<Request<ReqBody>> for RateLimitService<S>
where
    S: Service<Request<ReqBody>, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let mut inner = self.inner.clone();
        let limiter = self.limiter.clone();
        let key = identity_key(&request);

        Box::pin(async move {
            if limiter.allow(&key).await {
                inner.call(request).await
            } else {
                let retry_after = limiter
                    .retry_after(&key)
                    .await
                    .map(|d| d.as_secs().max(1))
                    .unwrap_or(1);
                Ok(RateLimitRejection { retry_after }.into_response())
            }
        })
    }
}

fn identity_key<B>(request: &Request<B>) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|addr| addr.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

struct RateLimitRejection {
    retry_after: u64,
}

#[derive(Serialize)]
struct RateLimitBody {
    error: &'static str,
    retry_after_seconds: u64,
}

impl IntoResponse for RateLimitRejection {
    fn into_response(self) -> Response {
        let body = RateLimitBody {
            error: "rate_limited",
            retry_after_seconds: self.retry_after,
        };
        let mut response = (StatusCode::TOO_MANY_REQUESTS, axum::Json(body)).into_response();
        response.headers_mut().insert(
            header::RETRY_AFTER,
            axum::http::HeaderValue::from_str(&self.retry_after.to_string())
                .unwrap_or_else(|_| axum::http::HeaderValue::from_static("1")),
        );
        response
    }
}
