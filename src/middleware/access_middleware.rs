/// Access Token Middleware
///
/// Validates the access token of every request to a protected route and
/// injects the verified [`AccessClaims`] into request extensions for use by
/// route handlers.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderMap, AUTHORIZATION},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::sync::Arc;

use crate::auth::{AccessClaims, AccessValidator};
use crate::error::{AppError, AuthError, ErrorContext};
use crate::logger::RequestId;

pub const ACCESS_HEADER: &str = "Authorization-Access";
pub const REFRESH_HEADER: &str = "Authorization-Refresh";

/// Access token from `Authorization-Access`, falling back to `Authorization: Bearer`
pub fn access_token_from(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = header_value(headers, ACCESS_HEADER) {
        return Some(token);
    }

    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Non-empty value of a header, if present and valid ASCII
pub fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Must wrap every route that requires a live session
pub struct AccessMiddleware {
    validator: Arc<AccessValidator>,
}

impl AccessMiddleware {
    pub fn new(validator: Arc<AccessValidator>) -> Self {
        Self { validator }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AccessMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AccessMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(AccessMiddlewareService {
            service: Rc::new(service),
            validator: self.validator.clone(),
        }))
    }
}

pub struct AccessMiddlewareService<S> {
    service: Rc<S>,
    validator: Arc<AccessValidator>,
}

impl<S, B> Service<ServiceRequest> for AccessMiddlewareService<S>
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
        let service = self.service.clone();
        let validator = self.validator.clone();

        Box::pin(async move {
            let context = ErrorContext::new(format!("access {}", req.path()))
                .with_request_id(RequestId::of(&req).as_str());

            let Some(token) = access_token_from(req.headers()) else {
                return Err(context.fail(AppError::Auth(AuthError::MissingToken)).into());
            };

            let claims: AccessClaims = validator
                .validate(&token)
                .await
                .map_err(|e| Error::from(context.fail(e)))?;

            tracing::debug!(
                session_id = %claims.sid,
                guid = %claims.guid,
                "Access token validated"
            );
            req.extensions_mut().insert(claims);

            service.call(req).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::header::{HeaderName, HeaderValue};

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }
        map
    }

    #[test]
    fn test_access_header_preferred() {
        let map = headers(&[
            ("authorization-access", "from-access-header"),
            ("authorization", "Bearer from-bearer"),
        ]);
        assert_eq!(access_token_from(&map).as_deref(), Some("from-access-header"));
    }

    #[test]
    fn test_bearer_fallback() {
        let map = headers(&[("authorization", "Bearer abc.def.ghi")]);
        assert_eq!(access_token_from(&map).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_missing_or_empty_token() {
        assert!(access_token_from(&HeaderMap::new()).is_none());
        assert!(access_token_from(&headers(&[("authorization", "Basic abc")])).is_none());
        assert!(access_token_from(&headers(&[("authorization", "Bearer ")])).is_none());
        assert!(access_token_from(&headers(&[("authorization-access", " ")])).is_none());
    }
}
