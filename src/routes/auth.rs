/// Authentication Routes
///
/// Handles registration, authentication, token rotation and the current
/// session lookup.

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{AccessClaims, AuthServices};
use crate::client_origin::OriginPolicy;
use crate::error::{AppError, AuthError, ErrorContext, RequestError};
use crate::logger::RequestId;
use crate::middleware::{access_token_from, header_value, REFRESH_HEADER};

/// Registration request
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub guid: String,
}

/// Authentication request
#[derive(Deserialize)]
pub struct AuthRequest {
    pub guid: String,
    pub password: String,
}

/// Session bound to the presented access token
#[derive(Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub guid: String,
    pub origin: String,
    pub expires_at: i64,
}

/// POST /api/register
///
/// # Errors
/// - 400: invalid email or weak password
/// - 409: email already registered
pub async fn register(
    request_id: RequestId,
    form: web::Json<RegisterRequest>,
    services: web::Data<AuthServices>,
) -> Result<HttpResponse, RequestError> {
    let context = ErrorContext::new("register").with_request_id(request_id.as_str());

    let guid = services
        .accounts
        .register(&form.email, &form.password)
        .await
        .map_err(|e| context.fail(e))?;

    tracing::info!(request_id = %context.request_id, guid = %guid, "User registered");

    Ok(HttpResponse::Created().json(RegisterResponse { guid }))
}

/// POST /api/auth
///
/// Issues a token pair bound to the caller's network origin.
///
/// # Errors
/// - 401: unknown guid or wrong password (indistinguishable)
pub async fn authenticate(
    req: HttpRequest,
    request_id: RequestId,
    form: web::Json<AuthRequest>,
    services: web::Data<AuthServices>,
    origin_policy: web::Data<OriginPolicy>,
) -> Result<HttpResponse, RequestError> {
    let context = ErrorContext::new("authenticate")
        .with_request_id(request_id.as_str())
        .with_guid(form.guid.clone());
    let client_origin = origin_policy.client_origin(&req.connection_info());

    let identity = services
        .accounts
        .authenticate(&form.guid, &form.password)
        .await
        .map_err(|e| context.fail(e))?;
    let tokens = services
        .issuer
        .issue(&identity.guid, &client_origin)
        .await
        .map_err(|e| context.fail(e))?;

    tracing::info!(request_id = %context.request_id, guid = %identity.guid, "User authenticated");

    Ok(HttpResponse::Created().json(tokens))
}

/// GET /api/refresh
///
/// Exchanges the pair in `Authorization-Access` and `Authorization-Refresh`
/// for a successor pair. The access token may be past its expiry as long as
/// it is still inside the refresh window, so this route does its own
/// verification instead of sitting behind the access middleware.
///
/// # Errors
/// - 401: missing, invalid, mismatched or revoked tokens
/// - 503: the origin-change alert could not be delivered
pub async fn refresh(
    req: HttpRequest,
    request_id: RequestId,
    services: web::Data<AuthServices>,
    origin_policy: web::Data<OriginPolicy>,
) -> Result<HttpResponse, RequestError> {
    let context = ErrorContext::new("refresh").with_request_id(request_id.as_str());
    let missing_token = || context.fail(AppError::Auth(AuthError::MissingToken));

    let access_token = access_token_from(req.headers()).ok_or_else(missing_token)?;
    let refresh_token = header_value(req.headers(), REFRESH_HEADER).ok_or_else(missing_token)?;
    let client_origin = origin_policy.client_origin(&req.connection_info());

    let tokens = services
        .rotator
        .rotate(&access_token, &refresh_token, &client_origin)
        .await
        .map_err(|e| context.fail(e))?;

    tracing::info!(request_id = %context.request_id, "Tokens rotated");

    Ok(HttpResponse::Accepted().json(tokens))
}

/// GET /api/session
///
/// Requires the access middleware.
pub async fn current_session(req: HttpRequest) -> Result<HttpResponse, AppError> {
    let claims = req
        .extensions()
        .get::<AccessClaims>()
        .cloned()
        .ok_or(AppError::Auth(AuthError::MissingToken))?;

    Ok(HttpResponse::Ok().json(SessionResponse {
        session_id: claims.sid,
        guid: claims.guid,
        origin: claims.origin,
        expires_at: claims.exp,
    }))
}
