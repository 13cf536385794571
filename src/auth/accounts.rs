/// Account Registration and Authentication
///
/// Passwords are stored as `CredentialHasher` output. Authentication never
/// reveals whether the guid or the password was wrong.

use std::sync::Arc;

use crate::auth::hasher::CredentialHasher;
use crate::error::{AppError, AuthError, ValidationError};
use crate::storage::{Identity, IdentityStore};
use crate::validators::{is_valid_email, is_valid_guid};

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

pub struct AccountService {
    hasher: Arc<CredentialHasher>,
    identities: Arc<dyn IdentityStore>,
}

impl AccountService {
    pub fn new(hasher: Arc<CredentialHasher>, identities: Arc<dyn IdentityStore>) -> Self {
        Self { hasher, identities }
    }

    /// Create an identity and return its newly allocated guid
    ///
    /// # Errors
    /// - `ValidationError` for a bad email or weak password
    /// - `UniqueConstraintViolation` when the email is already registered
    pub async fn register(&self, email: &str, password: &str) -> Result<String, AppError> {
        let email = is_valid_email(email)?;
        validate_password_strength(password)?;

        let identity = Identity {
            guid: uuid::Uuid::new_v4().to_string(),
            email,
            password_hash: self.hasher.hash(password),
        };
        self.identities.create(&identity).await?;

        tracing::info!(guid = %identity.guid, "Identity registered");
        Ok(identity.guid)
    }

    /// Resolve the identity for a guid and password
    ///
    /// An unknown guid and a wrong password both yield `InvalidCredentials`.
    pub async fn authenticate(&self, guid: &str, password: &str) -> Result<Identity, AppError> {
        let guid = is_valid_guid(guid)
            .map_err(|_| AppError::Auth(AuthError::InvalidCredentials))?;

        match self
            .identities
            .lookup(&guid, &self.hasher.hash(password))
            .await
        {
            Ok(identity) => Ok(identity),
            Err(e) if e.is_not_found() => {
                tracing::warn!(guid = %guid, "Authentication rejected");
                Err(AppError::Auth(AuthError::InvalidCredentials))
            }
            Err(e) => Err(e),
        }
    }
}

/// Requirements:
/// - 8 to 128 characters
/// - At least one digit, one lowercase and one uppercase letter
fn validate_password_strength(password: &str) -> Result<(), AppError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        )));
    }

    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AppError::Validation(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_LENGTH,
        )));
    }

    let has_digit = password.chars().any(|c| c.is_numeric());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());

    if !has_digit || !has_lowercase || !has_uppercase {
        return Err(AppError::Validation(ValidationError::InvalidFormat(
            "password must contain at least one digit, one lowercase letter, and one uppercase letter"
                .to_string(),
        )));
    }

    Ok(())
}
