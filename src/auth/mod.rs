/// Authentication module
///
/// Keyed credential hashing, access token signing with bound refresh values,
/// session issuance, validation and rotation, and account registration.

mod accounts;
mod claims;
mod codec;
mod hasher;
mod issuer;
mod rotator;
mod validator;

use std::sync::Arc;

pub use accounts::AccountService;
pub use claims::AccessClaims;
pub use codec::TokenCodec;
pub use hasher::{constant_time_eq, CredentialHasher, HASH_HEX_LENGTH};
pub use issuer::{IssuedSession, SessionIdSource, TokenIssuer, TokenPair, UuidSessionIds};
pub use rotator::RefreshRotator;
pub use validator::AccessValidator;

use crate::configuration::SecuritySettings;
use crate::error::AppError;
use crate::notifier::Notifier;
use crate::storage::{IdentityStore, SessionStore};

/// Every token lifecycle service, sharing one codec, hasher and set of stores
#[derive(Clone)]
pub struct AuthServices {
    pub accounts: Arc<AccountService>,
    pub issuer: Arc<TokenIssuer>,
    pub validator: Arc<AccessValidator>,
    pub rotator: Arc<RefreshRotator>,
}

impl AuthServices {
    pub fn new(
        settings: &SecuritySettings,
        sessions: Arc<dyn SessionStore>,
        identities: Arc<dyn IdentityStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, AppError> {
        let codec = Arc::new(TokenCodec::from_settings(settings));
        let hasher = Arc::new(CredentialHasher::new(&settings.secret)?);

        let issuer = Arc::new(TokenIssuer::new(
            codec.clone(),
            hasher.clone(),
            sessions.clone(),
            Arc::new(UuidSessionIds),
            settings.max_session_attempts,
        ));
        let validator = Arc::new(AccessValidator::new(codec.clone(), sessions.clone()));
        let rotator = Arc::new(RefreshRotator::new(
            codec,
            hasher.clone(),
            sessions,
            issuer.clone(),
            notifier,
            settings.notify_timeout(),
        ));
        let accounts = Arc::new(AccountService::new(hasher, identities));

        Ok(Self {
            accounts,
            issuer,
            validator,
            rotator,
        })
    }
}
