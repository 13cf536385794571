/// Refresh Token Rotation
///
/// One rotation attempt runs these steps in order, stopping at the first
/// failure:
/// 1. verify the access token (signature, structure, refresh window)
/// 2. check the refresh value was derived from that access token
/// 3. check the session record holds the hash of that refresh value
/// 4. on an origin change, alert the owner (bounded by a timeout)
/// 5. issue the successor session
/// 6. delete the predecessor, rolling the successor back if that fails
///
/// Nothing is written before step 5, so any earlier failure leaves the old
/// session usable.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::codec::TokenCodec;
use crate::auth::hasher::CredentialHasher;
use crate::auth::issuer::{TokenIssuer, TokenPair};
use crate::auth::claims::AccessClaims;
use crate::error::{AppError, AuthError, EmailError};
use crate::notifier::{Notifier, SECURITY_ALERT_BODY, SECURITY_ALERT_SUBJECT};
use crate::storage::SessionStore;

pub struct RefreshRotator {
    codec: Arc<TokenCodec>,
    hasher: Arc<CredentialHasher>,
    sessions: Arc<dyn SessionStore>,
    issuer: Arc<TokenIssuer>,
    notifier: Arc<dyn Notifier>,
    notify_timeout: Duration,
}

impl RefreshRotator {
    pub fn new(
        codec: Arc<TokenCodec>,
        hasher: Arc<CredentialHasher>,
        sessions: Arc<dyn SessionStore>,
        issuer: Arc<TokenIssuer>,
        notifier: Arc<dyn Notifier>,
        notify_timeout: Duration,
    ) -> Self {
        Self {
            codec,
            hasher,
            sessions,
            issuer,
            notifier,
            notify_timeout,
        }
    }

    /// Exchange a valid access/refresh pair for a successor pair.
    ///
    /// # Errors
    /// - `InvalidSignature`, `MalformedToken`, `TokenExpired` from verification
    /// - `RefreshMismatch` when the refresh value is not bound to the access token
    /// - `SessionRevoked` when the session is gone or was rotated concurrently
    /// - `EmailError` when the origin-change alert fails or times out
    /// - allocation and storage errors from issuing the successor
    pub async fn rotate(
        &self,
        access_token: &str,
        refresh_token: &str,
        client_origin: &str,
    ) -> Result<TokenPair, AppError> {
        // The bind check and the stored hash must see the same bytes
        let refresh_token = refresh_token.trim();

        let claims = self.codec.verify_for_rotation(access_token)?;

        if !self.codec.matches_refresh(access_token, refresh_token) {
            tracing::warn!(session_id = %claims.sid, "Refresh token not bound to access token");
            return Err(AppError::Auth(AuthError::RefreshMismatch));
        }

        let refresh_hash = self.hasher.hash(refresh_token);
        if !self
            .sessions
            .refresh_hash_matches(claims.session_id(), &refresh_hash)
            .await?
        {
            tracing::warn!(session_id = %claims.sid, "Refresh attempted on revoked session");
            return Err(AppError::Auth(AuthError::SessionRevoked));
        }

        if claims.origin != client_origin {
            tracing::warn!(
                session_id = %claims.sid,
                guid = %claims.guid,
                "Refresh from a new client origin"
            );
            self.alert_owner(&claims).await?;
        }

        let successor = self
            .issuer
            .issue_session(&claims.guid, client_origin)
            .await?;

        match self.sessions.delete(claims.session_id()).await {
            Ok(true) => {
                tracing::info!(
                    previous_session_id = %claims.sid,
                    session_id = %successor.session_id,
                    "Session rotated"
                );
                Ok(successor.tokens)
            }
            Ok(false) => {
                // Another rotation of the same pair deleted it first
                tracing::warn!(session_id = %claims.sid, "Session rotated concurrently");
                self.discard(&successor.session_id).await;
                Err(AppError::Auth(AuthError::SessionRevoked))
            }
            Err(e) => {
                self.discard(&successor.session_id).await;
                Err(e)
            }
        }
    }

    async fn alert_owner(&self, claims: &AccessClaims) -> Result<(), AppError> {
        let delivery = self
            .notifier
            .send(&claims.guid, SECURITY_ALERT_SUBJECT, SECURITY_ALERT_BODY);

        match tokio::time::timeout(self.notify_timeout, delivery).await {
            Ok(result) => result,
            Err(_) => {
                let waited_ms = self.notify_timeout.as_millis() as u64;
                tracing::error!(guid = %claims.guid, waited_ms = waited_ms, "Security alert timed out");
                Err(AppError::Email(EmailError::Timeout(waited_ms)))
            }
        }
    }

    /// Remove a successor that will never reach its client
    async fn discard(&self, session_id: &str) {
        if let Err(e) = self.sessions.delete(session_id).await {
            tracing::error!(
                session_id = %session_id,
                error = %e,
                "Failed to roll back successor session"
            );
        }
    }
}
