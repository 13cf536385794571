/// Token Pair Issuance
///
/// Allocates a session id, mints the access token and its bound refresh value,
/// and persists the hashed refresh value as the session record.

use std::sync::Arc;

use serde::Serialize;

use crate::auth::codec::TokenCodec;
use crate::auth::hasher::CredentialHasher;
use crate::error::AppError;
use crate::storage::SessionStore;

/// Source of candidate session identifiers
pub trait SessionIdSource: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random v4 UUIDs
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidSessionIds;

impl SessionIdSource for UuidSessionIds {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// An access token and the refresh value bound to it
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// A minted pair together with the session it belongs to
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session_id: String,
    pub tokens: TokenPair,
}

pub struct TokenIssuer {
    codec: Arc<TokenCodec>,
    hasher: Arc<CredentialHasher>,
    sessions: Arc<dyn SessionStore>,
    session_ids: Arc<dyn SessionIdSource>,
    max_attempts: u32,
}

impl TokenIssuer {
    pub fn new(
        codec: Arc<TokenCodec>,
        hasher: Arc<CredentialHasher>,
        sessions: Arc<dyn SessionStore>,
        session_ids: Arc<dyn SessionIdSource>,
        max_attempts: u32,
    ) -> Self {
        Self {
            codec,
            hasher,
            sessions,
            session_ids,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Mint a token pair for `guid` bound to `client_origin`
    pub async fn issue(&self, guid: &str, client_origin: &str) -> Result<TokenPair, AppError> {
        self.issue_session(guid, client_origin)
            .await
            .map(|issued| issued.tokens)
    }

    /// Like [`issue`](Self::issue) but also reports the allocated session id.
    ///
    /// # Errors
    /// - `SessionAllocationExhausted` when every candidate id collided
    /// - storage errors from the session store, unchanged
    pub async fn issue_session(
        &self,
        guid: &str,
        client_origin: &str,
    ) -> Result<IssuedSession, AppError> {
        for attempt in 1..=self.max_attempts {
            let session_id = self.session_ids.next_id();

            if self.sessions.exists(&session_id).await? {
                tracing::warn!(attempt = attempt, "Generated session id already in use");
                continue;
            }

            let access = self.codec.sign_access(&session_id, guid, client_origin)?;
            let refresh = self.codec.derive_refresh(&access)?;

            match self
                .sessions
                .insert(&session_id, &self.hasher.hash(&refresh))
                .await
            {
                Ok(()) => {
                    tracing::info!(session_id = %session_id, guid = %guid, "Session issued");
                    return Ok(IssuedSession {
                        session_id,
                        tokens: TokenPair { access, refresh },
                    });
                }
                // Lost a race for the same id between the check and the insert
                Err(e) if e.is_duplicate() => {
                    tracing::warn!(attempt = attempt, "Session id claimed concurrently");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::SessionAllocationExhausted {
            attempts: self.max_attempts,
        })
    }
}
