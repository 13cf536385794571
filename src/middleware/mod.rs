/// Middleware module
///
/// Custom middleware for access token authentication.

mod access_middleware;

pub use access_middleware::{
    access_token_from, header_value, AccessMiddleware, ACCESS_HEADER, REFRESH_HEADER,
};
