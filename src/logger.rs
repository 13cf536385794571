use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, FromRequest, HttpMessage, HttpRequest,
};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;
use std::time::Instant;
use tracing::Instrument;

use crate::client_origin::OriginPolicy;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Id of the current request, shared by its log span, error logs and error body
#[derive(Debug, Clone, PartialEq)]
pub struct RequestId(String);

impl RequestId {
    fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id set by [`LoggerMiddleware`], or a fresh one outside it
    pub fn of(req: &impl HttpMessage) -> Self {
        req.extensions()
            .get::<RequestId>()
            .cloned()
            .unwrap_or_else(Self::generate)
    }
}

impl FromRequest for RequestId {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Ok(Self::of(req)))
    }
}

/// Request logging middleware
///
/// Opens one span per request carrying the method, path and client origin,
/// and logs the response status and latency when the request completes.
pub struct LoggerMiddleware {
    origin_policy: OriginPolicy,
}

impl LoggerMiddleware {
    pub fn new(origin_policy: OriginPolicy) -> Self {
        Self { origin_policy }
    }
}

impl<S, B> Transform<S, ServiceRequest> for LoggerMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = LoggerMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(LoggerMiddlewareService {
            service: Rc::new(service),
            origin_policy: self.origin_policy,
        }))
    }
}

pub struct LoggerMiddlewareService<S> {
    service: Rc<S>,
    origin_policy: OriginPolicy,
}

impl<S, B> Service<ServiceRequest> for LoggerMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let client_origin = self.origin_policy.client_origin(&req.connection_info());
        let request_id = RequestId::generate();
        req.extensions_mut().insert(request_id.clone());

        let span = tracing::info_span!(
            "http_request",
            request_id = %request_id.as_str(),
            method = %req.method(),
            path = %req.path(),
            client_origin = %client_origin,
        );

        let service = self.service.clone();

        Box::pin(
            async move {
                tracing::info!("Request started");

                let mut res = service.call(req).await;
                let elapsed_ms = start_time.elapsed().as_millis() as u64;

                match &mut res {
                    Ok(res) => {
                        if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
                            res.headers_mut()
                                .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
                        }
                        tracing::info!(
                            status = res.status().as_u16(),
                            elapsed_ms = elapsed_ms,
                            "Request completed"
                        )
                    }
                    Err(e) => tracing::info!(
                        status = e.as_response_error().status_code().as_u16(),
                        elapsed_ms = elapsed_ms,
                        "Request completed"
                    ),
                }

                res
            }
            .instrument(span),
        )
    }
}
