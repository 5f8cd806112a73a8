//! Logging middleware for outgoing gRPC calls with request IDs and timing.

use std::task::{Context, Poll};
use std::time::Instant;

use http::{Request, Response};
use tower::{Layer, Service};
use tracing::{Instrument, debug, warn};
use uuid::Uuid;

/// Header name for request ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// A `Layer` that stamps outgoing requests with an ID and logs their timing.
#[derive(Debug, Clone)]
pub struct RequestLoggerLayer;

impl<S> Layer<S> for RequestLoggerLayer {
    type Service = RequestLoggerService<S>;

    fn layer(&self, service: S) -> Self::Service {
        RequestLoggerService { service }
    }
}

/// A `Service` that logs outgoing request information with request IDs and timing.
#[derive(Debug, Clone)]
pub struct RequestLoggerService<S> {
    service: S,
}

impl<S, B, RB> Service<Request<B>> for RequestLoggerService<S>
where
    S: Service<Request<B>, Response = Response<RB>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
    RB: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<B>) -> Self::Future {
        // Keep a caller-provided ID so the call can be correlated across services
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map_or_else(|| Uuid::new_v4().to_string(), ToString::to_string);

        if !request.headers().contains_key(REQUEST_ID_HEADER) {
            if let Ok(header_value) = http::HeaderValue::from_str(&request_id) {
                request.headers_mut().insert(REQUEST_ID_HEADER, header_value);
            }
        }

        let path = request.uri().path().to_string();
        let start_time = Instant::now();

        let span = tracing::span!(
            tracing::Level::DEBUG,
            "grpc_call",
            request_id = %request_id,
            path = %path
        );

        debug!(parent: &span, "Sending request");

        let future = self.service.call(request);
        Box::pin(
            async move {
                let result = future.await;
                let duration = start_time.elapsed();

                match &result {
                    Ok(response) => {
                        // Trailers-only responses carry the gRPC status in the headers
                        let grpc_status = response
                            .headers()
                            .get("grpc-status")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("0");
                        debug!(
                            http_status = response.status().as_u16(),
                            grpc_status,
                            duration_ms = duration.as_millis() as u64,
                            "Response received"
                        );
                    }
                    Err(_) => {
                        warn!(duration_ms = duration.as_millis() as u64, "Request failed in transport");
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::convert::Infallible;
    use std::future::{Ready, ready};

    /// Echoes the request ID header back in the response.
    #[derive(Clone)]
    struct EchoId;

    impl Service<Request<()>> for EchoId {
        type Response = Response<String>;
        type Error = Infallible;
        type Future = Ready<Result<Self::Response, Self::Error>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, request: Request<()>) -> Self::Future {
            let id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .map(|v| v.to_str().unwrap().to_string())
                .unwrap_or_default();
            ready(Ok(Response::new(id)))
        }
    }

    #[tokio::test]
    async fn test_request_id_is_generated() {
        let mut service = RequestLoggerLayer.layer(EchoId);
        let response = service.call(Request::new(())).await.unwrap();
        let id = response.into_body();
        assert!(Uuid::parse_str(&id).is_ok(), "expected a uuid, got {:?}", id);
    }

    #[tokio::test]
    async fn test_existing_request_id_is_kept() {
        let mut service = RequestLoggerLayer.layer(EchoId);
        let request = Request::builder().header(REQUEST_ID_HEADER, "job-42-call").body(()).unwrap();
        let response = service.call(request).await.unwrap();
        assert_eq!(response.into_body(), "job-42-call");
    }
}
