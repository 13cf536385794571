/// Access token validation for protected routes.
///
/// A token must verify cryptographically and its session record must still
/// exist; deleting the record is how a token is revoked.

use std::sync::Arc;

use crate::auth::claims::AccessClaims;
use crate::auth::codec::TokenCodec;
use crate::error::{AppError, AuthError};
use crate::storage::SessionStore;

pub struct AccessValidator {
    codec: Arc<TokenCodec>,
    sessions: Arc<dyn SessionStore>,
}

impl AccessValidator {
    pub fn new(codec: Arc<TokenCodec>, sessions: Arc<dyn SessionStore>) -> Self {
        Self { codec, sessions }
    }

    /// Returns the verified claims; `claims.sid` is the live session id
    pub async fn validate(&self, access_token: &str) -> Result<AccessClaims, AppError> {
        let claims = self.codec.verify_access(access_token)?;

        if !self.sessions.exists(claims.session_id()).await? {
            tracing::warn!(session_id = %claims.sid, "Access token for revoked session");
            return Err(AppError::Auth(AuthError::SessionRevoked));
        }

        Ok(claims)
    }
}
